//! Generating commands: `ddp torchrun` and `ddp docker`

use clap::Args;
use tracing::info;

use ddp_common::{ScriptArgs, WorkflowConfig};
use ddp_jobs::{compile_workflow, Provider};

use super::{apply_overrides, load_workflow, write_jobs, OverrideArgs, SourceArgs};
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct TorchrunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Requirements file installed before launch
    #[arg(short = 'r', long, value_name = "PATH")]
    pub requirements: Option<String>,

    /// Python version used to pick the image
    #[arg(long, value_name = "VERSION")]
    pub python: Option<String>,

    /// Run without GPUs unless --gpu is given
    #[arg(long)]
    pub no_gpu: bool,

    /// Training script
    pub file: Option<String>,

    /// Arguments passed to the training script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DockerArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Container image
    #[arg(long, value_name = "IMAGE")]
    pub image: Option<String>,

    /// Command run on every node (repeatable, in order)
    #[arg(short = 'c', long = "command", value_name = "CMD")]
    pub commands: Vec<String>,

    /// Port exposed by the master (repeatable)
    #[arg(long = "port", value_name = "PORT")]
    pub ports: Vec<u16>,
}

pub fn run_torchrun(args: TorchrunArgs) -> Result<()> {
    let (config, provider) = torchrun_workflow(&args)?;
    let jobs = compile_workflow(&config, provider)?;
    write_jobs(&jobs, args.overrides.output.as_deref())
}

pub fn run_docker(args: DockerArgs) -> Result<()> {
    let config = docker_workflow(&args)?;
    let jobs = compile_workflow(&config, Provider::Docker)?;
    write_jobs(&jobs, args.overrides.output.as_deref())
}

/// Build the effective workflow and provider for `ddp torchrun`
pub fn torchrun_workflow(args: &TorchrunArgs) -> Result<(WorkflowConfig, Provider)> {
    let base = load_workflow(&args.source)?;
    let configured = configured_provider(&base)?;

    let provider = match configured {
        Some(Provider::Docker) => {
            return Err(Error::validation(
                "workflow uses the docker provider, run it with `ddp docker`",
            ))
        }
        _ if args.no_gpu => Provider::TorchrunCpu,
        Some(provider) => provider,
        None => Provider::Torchrun,
    };

    let mut config = apply_overrides(base, &args.overrides)?;
    if let Some(ref file) = args.file {
        info!("CLI override: script = {} (was {:?})", file, config.script);
        config.script = Some(file.clone());
    }
    if !args.args.is_empty() {
        config.args = Some(ScriptArgs::List(args.args.clone()));
    }
    if let Some(ref requirements) = args.requirements {
        info!(
            "CLI override: requirements = {} (was {:?})",
            requirements, config.requirements
        );
        config.requirements = Some(requirements.clone());
    }
    if let Some(ref python) = args.python {
        info!("CLI override: version = {} (was {:?})", python, config.version);
        config.version = Some(python.clone());
    }
    config.provider = Some(provider.to_string());

    Ok((config, provider))
}

/// Build the effective workflow for `ddp docker`
pub fn docker_workflow(args: &DockerArgs) -> Result<WorkflowConfig> {
    let base = load_workflow(&args.source)?;
    if let Some(provider) = configured_provider(&base)?.filter(|p| p.synthesizes_commands()) {
        return Err(Error::validation(format!(
            "workflow uses the {} provider, run it with `ddp torchrun`",
            provider
        )));
    }

    let mut config = apply_overrides(base, &args.overrides)?;
    if let Some(ref image) = args.image {
        info!("CLI override: image = {} (was {:?})", image, config.image);
        config.image = Some(image.clone());
    }
    if !args.commands.is_empty() {
        config.commands = args.commands.clone();
    }
    if !args.ports.is_empty() {
        config.ports = args.ports.clone();
    }
    config.provider = Some(Provider::Docker.to_string());

    Ok(config)
}

fn configured_provider(config: &WorkflowConfig) -> Result<Option<Provider>> {
    Ok(config
        .provider
        .as_deref()
        .map(str::parse::<Provider>)
        .transpose()?)
}
