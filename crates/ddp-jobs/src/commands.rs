//! Per-rank command synthesis
//!
//! Produces the shell commands one node runs:
//! - `pip3 install -r <requirements>` when a requirements file is set
//! - one `export NAME="value"` per environment variable
//! - a single `torchrun` invocation
//!
//! The master advertises its own address (`$JOB_HOSTNAME`, `$JOB_PORT_0`) as
//! the rendezvous endpoint. Workers point at the master's address instead
//! (`$MASTER_JOB_HOSTNAME`, `$MASTER_JOB_PORT_0`), because the orchestrator
//! only assigns addresses after scheduling and substitutes them at launch.

use std::collections::BTreeMap;

use ddp_common::ScriptArgs;

use crate::resolve::LauncherSpec;
use crate::types::Resources;

/// Distributed launcher binary
pub const LAUNCHER: &str = "torchrun";

/// Rendezvous endpoint placeholders, substituted by the orchestrator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rendezvous {
    /// Passed to `--master_addr`
    pub addr: &'static str,
    /// Passed to `--master_port`
    pub port: &'static str,
}

/// The current job's own address. Used by the master.
pub const SELF_RENDEZVOUS: Rendezvous = Rendezvous {
    addr: "$JOB_HOSTNAME",
    port: "$JOB_PORT_0",
};

/// The master job's address. Used by workers.
pub const MASTER_RENDEZVOUS: Rendezvous = Rendezvous {
    addr: "$MASTER_JOB_HOSTNAME",
    port: "$MASTER_JOB_PORT_0",
};

impl Rendezvous {
    /// The endpoint a node dials: its own for the master, the master's otherwise
    pub fn for_role(is_master: bool) -> Self {
        if is_master {
            SELF_RENDEZVOUS
        } else {
            MASTER_RENDEZVOUS
        }
    }
}

/// Build the ordered command list for one node.
///
/// `is_master` selects the rendezvous endpoint; `node_rank` is only rendered
/// into `--node_rank`.
pub fn synthesize_commands(
    launch: &LauncherSpec,
    resources: &Resources,
    environment: &BTreeMap<String, String>,
    node_rank: u32,
    is_master: bool,
) -> Vec<String> {
    let mut commands = Vec::with_capacity(environment.len() + 2);

    if let Some(requirements) = launch.requirements.as_deref().filter(|r| !r.is_empty()) {
        commands.push(format!("pip3 install -r {}", requirements));
    }

    commands.extend(
        environment
            .iter()
            .map(|(name, value)| export_command(name, value)),
    );

    commands.push(launcher_command(
        launch,
        resources,
        node_rank,
        Rendezvous::for_role(is_master),
    ));

    commands
}

/// `export NAME="value"` with the value escaped for double quotes
pub fn export_command(name: &str, value: &str) -> String {
    format!("export {}=\"{}\"", name, escape_double_quoted(value))
}

fn launcher_command(
    launch: &LauncherSpec,
    resources: &Resources,
    node_rank: u32,
    rendezvous: Rendezvous,
) -> String {
    let mut parts = vec![LAUNCHER.to_string()];

    if let Some(gpu) = resources.gpu.as_ref().filter(|g| g.count > 0) {
        parts.push(format!("--nproc_per_node={}", gpu.count));
    }
    parts.push(format!("--nnodes={}", resources.nodes));
    parts.push(format!("--node_rank={}", node_rank));
    parts.push(format!("--master_addr {}", rendezvous.addr));
    parts.push(format!("--master_port {}", rendezvous.port));
    parts.push(launch.script.clone());

    if let Some(args) = launch.args.as_ref().map(render_args).filter(|a| !a.is_empty()) {
        parts.push(args);
    }

    parts.join(" ")
}

/// Render script arguments.
///
/// A pre-formatted line is kept verbatim. List items are each wrapped in
/// double quotes, escaped, and joined by a space.
pub fn render_args(args: &ScriptArgs) -> String {
    match args {
        ScriptArgs::Line(line) => line.trim().to_string(),
        ScriptArgs::List(items) => items
            .iter()
            .map(|arg| format!("\"{}\"", escape_double_quoted(arg)))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Escape a value for use inside a double-quoted shell string.
///
/// Backslash, `"`, `$` and backtick each get one backslash, so the shell
/// sees the raw value with no expansion.
pub fn escape_double_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Gpu;

    fn resources(nodes: u32, gpus: Option<u32>) -> Resources {
        Resources {
            cpu: None,
            memory: None,
            gpu: gpus.map(|count| Gpu {
                count,
                name: None,
                memory: None,
            }),
            shm_size: None,
            nodes,
        }
    }

    fn launch(script: &str) -> LauncherSpec {
        LauncherSpec {
            script: script.to_string(),
            requirements: None,
            args: None,
        }
    }

    #[test]
    fn master_command_uses_own_address() {
        let commands =
            synthesize_commands(&launch("train.py"), &resources(2, Some(4)), &BTreeMap::new(), 0, true);

        assert_eq!(
            commands,
            vec![
                "torchrun --nproc_per_node=4 --nnodes=2 --node_rank=0 \
                 --master_addr $JOB_HOSTNAME --master_port $JOB_PORT_0 train.py"
            ]
        );
    }

    #[test]
    fn worker_command_uses_master_address() {
        let commands =
            synthesize_commands(&launch("train.py"), &resources(2, Some(4)), &BTreeMap::new(), 1, false);

        assert_eq!(
            commands,
            vec![
                "torchrun --nproc_per_node=4 --nnodes=2 --node_rank=1 \
                 --master_addr $MASTER_JOB_HOSTNAME --master_port $MASTER_JOB_PORT_0 train.py"
            ]
        );
    }

    #[test]
    fn nproc_omitted_without_gpu() {
        let commands =
            synthesize_commands(&launch("train.py"), &resources(1, None), &BTreeMap::new(), 0, true);
        assert!(!commands[0].contains("--nproc_per_node"));
        assert!(commands[0].starts_with("torchrun --nnodes=1 --node_rank=0 "));
    }

    #[test]
    fn requirements_install_comes_first() {
        let mut spec = launch("train.py");
        spec.requirements = Some("reqs.txt".to_string());
        let environment = BTreeMap::from([("MODE".to_string(), "fast".to_string())]);

        let commands = synthesize_commands(&spec, &resources(1, Some(1)), &environment, 0, true);

        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0], "pip3 install -r reqs.txt");
        assert_eq!(commands[1], "export MODE=\"fast\"");
        assert!(commands[2].starts_with("torchrun "));
    }

    #[test]
    fn exports_are_sorted_by_name() {
        let environment = BTreeMap::from([
            ("ZETA".to_string(), "1".to_string()),
            ("ALPHA".to_string(), "2".to_string()),
        ]);
        let commands = synthesize_commands(&launch("t.py"), &resources(1, None), &environment, 0, true);
        assert_eq!(commands[0], "export ALPHA=\"2\"");
        assert_eq!(commands[1], "export ZETA=\"1\"");
    }

    #[test]
    fn export_escapes_quotes_once() {
        assert_eq!(
            export_command("GREETING", r#"say "hi""#),
            r#"export GREETING="say \"hi\"""#
        );
        assert_eq!(export_command("EMPTY", ""), "export EMPTY=\"\"");
    }

    #[test]
    fn export_keeps_shell_specials_literal() {
        assert_eq!(export_command("DIR", r"C:\dir\"), r#"export DIR="C:\\dir\\""#);
        assert_eq!(export_command("V", r#"a\"b"#), r#"export V="a\\\"b""#);
        assert_eq!(export_command("COST", "cost $HOME"), r#"export COST="cost \$HOME""#);
        assert_eq!(export_command("CMD", "`id`"), r#"export CMD="\`id\`""#);
    }

    #[test]
    fn line_args_are_appended_verbatim() {
        let mut spec = launch("train.py");
        spec.args = Some(ScriptArgs::Line("--epochs 3 --name \"run a\"".to_string()));
        let commands = synthesize_commands(&spec, &resources(1, None), &BTreeMap::new(), 0, true);
        assert!(commands[0].ends_with("train.py --epochs 3 --name \"run a\""));
    }

    #[test]
    fn list_args_are_quoted_individually() {
        let args = ScriptArgs::List(vec![
            "--msg".to_string(),
            r#"a "quoted" word"#.to_string(),
        ]);
        assert_eq!(render_args(&args), r#""--msg" "a \"quoted\" word""#);
    }

    #[test]
    fn list_args_do_not_expand_variables() {
        let args = ScriptArgs::List(vec!["$HOME".to_string(), r"end\".to_string()]);
        assert_eq!(render_args(&args), r#""\$HOME" "end\\""#);
    }

    #[test]
    fn rendezvous_for_role() {
        assert_eq!(Rendezvous::for_role(true), SELF_RENDEZVOUS);
        assert_eq!(Rendezvous::for_role(false), MASTER_RENDEZVOUS);
    }
}
