//! Workflow configuration model
//!
//! A workflow is read from YAML as an untyped document and extracted field by
//! field, so that a bad value is reported with its dotted path (for example
//! `resources.nodes must be a positive integer, got "three"`) instead of a
//! generic deserializer message.
//!
//! Numeric fields accept integers and numeric strings. Zero, negatives,
//! floats and non-numeric strings are rejected here, before any resolution.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::{Error, Result};

// =============================================================================
// Types
// =============================================================================

/// Extra arguments passed to the training script
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptArgs {
    /// A pre-formatted argument string, appended verbatim
    Line(String),
    /// Individual arguments, each quoted when rendered
    List(Vec<String>),
}

/// GPU request for every node of the workflow
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuRequest {
    /// GPUs per node
    pub count: u32,
    /// GPU model (e.g. "V100"), opaque to the generator
    pub name: Option<String>,
    /// GPU memory (e.g. "16GB"), opaque to the generator
    pub memory: Option<String>,
}

impl GpuRequest {
    /// Request `count` GPUs of any model
    pub fn with_count(count: u32) -> Self {
        Self {
            count,
            name: None,
            memory: None,
        }
    }
}

/// Resource request as written by the user; defaults are applied at resolution
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceRequest {
    /// CPU cores per node
    pub cpu: Option<u32>,
    /// Memory per node (e.g. "64GB"), opaque
    pub memory: Option<String>,
    /// GPU request per node
    pub gpu: Option<GpuRequest>,
    /// Shared memory size (e.g. "8GB"), opaque
    pub shm_size: Option<String>,
    /// Number of nodes
    pub nodes: Option<u32>,
}

/// User-supplied workflow settings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Workflow name, when loaded from a workflows file
    pub name: Option<String>,
    /// Provider name (e.g. "torchrun", "docker")
    pub provider: Option<String>,
    /// Training script path (`script`, or its alias `file`)
    pub script: Option<String>,
    /// Container image for providers that take one explicitly
    pub image: Option<String>,
    /// Commands for providers that take them explicitly
    pub commands: Vec<String>,
    /// Interpreter version used to pick the image tag
    pub version: Option<String>,
    /// Requirements file installed before launch
    pub requirements: Option<String>,
    /// Environment variables for every node
    pub environment: BTreeMap<String, String>,
    /// Artifact paths to collect
    pub artifacts: Vec<String>,
    /// Working directory inside the container
    pub working_dir: Option<String>,
    /// Ports exposed by the master, for providers that take them explicitly
    pub ports: Vec<u16>,
    /// Resource request
    pub resources: ResourceRequest,
    /// Extra script arguments
    pub args: Option<ScriptArgs>,
}

// =============================================================================
// Loading
// =============================================================================

impl WorkflowConfig {
    /// Parse a single workflow from a YAML string.
    ///
    /// An empty document yields the default (empty) workflow.
    pub fn from_yaml(input: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(input)?;
        Self::from_value(&value)
    }

    /// Extract a workflow from an already-parsed YAML document.
    pub fn from_value(doc: &Value) -> Result<Self> {
        if doc.is_null() {
            return Ok(Self::default());
        }
        if !doc.is_mapping() {
            return Err(Error::invalid("workflow", "expected a mapping"));
        }

        let script = match optional_string(doc, "script")? {
            Some(script) => Some(script),
            None => optional_string(doc, "file")?,
        };

        let mut resources = match doc.get("resources") {
            Some(value) => parse_resources(value)?,
            None => ResourceRequest::default(),
        };
        // `resources.nodes` wins over the top-level shorthand
        if resources.nodes.is_none() {
            resources.nodes = optional_positive_int(doc, "nodes", "nodes")?;
        }

        Ok(Self {
            name: optional_string(doc, "name")?,
            provider: optional_string(doc, "provider")?,
            script,
            image: optional_string(doc, "image")?,
            commands: string_list(doc.get("commands"), "commands")?,
            version: optional_string(doc, "version")?,
            requirements: optional_string(doc, "requirements")?,
            environment: parse_environment(doc.get("environment"))?,
            artifacts: parse_artifacts(doc.get("artifacts"))?,
            working_dir: optional_string(doc, "working_dir")?,
            ports: parse_ports(doc.get("ports"))?,
            resources,
            args: parse_args(doc.get("args"))?,
        })
    }
}

fn parse_resources(value: &Value) -> Result<ResourceRequest> {
    if value.is_null() {
        return Ok(ResourceRequest::default());
    }
    if !value.is_mapping() {
        return Err(Error::invalid("resources", "expected a mapping"));
    }

    Ok(ResourceRequest {
        cpu: optional_positive_int(value, "cpu", "resources.cpu")?,
        memory: optional_string_at(value, "memory", "resources.memory")?,
        gpu: parse_gpu(value.get("gpu"))?,
        shm_size: optional_string_at(value, "shm_size", "resources.shm_size")?,
        nodes: optional_positive_int(value, "nodes", "resources.nodes")?,
    })
}

/// `gpu: 2` or `gpu: { count: 2, name: V100, memory: 16GB }`
fn parse_gpu(value: Option<&Value>) -> Result<Option<GpuRequest>> {
    let value = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };

    if value.is_mapping() {
        let count = optional_positive_int(value, "count", "resources.gpu.count")?.unwrap_or(1);
        return Ok(Some(GpuRequest {
            count,
            name: optional_string_at(value, "name", "resources.gpu.name")?,
            memory: optional_string_at(value, "memory", "resources.gpu.memory")?,
        }));
    }

    positive_int("resources.gpu", value).map(|count| Some(GpuRequest::with_count(count)))
}

/// Environment as a mapping, or as a list of `NAME=value` entries.
fn parse_environment(value: Option<&Value>) -> Result<BTreeMap<String, String>> {
    let mut environment = BTreeMap::new();
    match value {
        None | Some(Value::Null) => {}
        Some(Value::Mapping(map)) => {
            for (key, value) in map {
                let name = key
                    .as_str()
                    .ok_or_else(|| Error::invalid("environment", "variable names must be strings"))?;
                check_env_name(name)?;
                let field = format!("environment.{}", name);
                let value = match value {
                    Value::Null => String::new(),
                    other => scalar_string(other, &field)?,
                };
                environment.insert(name.to_string(), value);
            }
        }
        Some(Value::Sequence(entries)) => {
            for (i, entry) in entries.iter().enumerate() {
                let entry = scalar_string(entry, &format!("environment[{}]", i))?;
                let (name, value) = parse_env_entry(&entry)?;
                environment.insert(name, value);
            }
        }
        Some(_) => {
            return Err(Error::invalid(
                "environment",
                "expected a mapping or a list of NAME=value entries",
            ))
        }
    }
    Ok(environment)
}

/// Split a `NAME=value` entry. A bare `NAME` maps to an empty value.
pub fn parse_env_entry(entry: &str) -> Result<(String, String)> {
    let (name, value) = entry.split_once('=').unwrap_or((entry, ""));
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid(
            "environment",
            format!("'{}' has no variable name", entry),
        ));
    }
    check_env_name(name)?;
    Ok((name.to_string(), value.to_string()))
}

/// True for names matching `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_env_name(name: &str) -> Result<()> {
    if !is_env_name(name) {
        return Err(Error::invalid(
            "environment",
            format!("'{}' is not a valid variable name", name),
        ));
    }
    Ok(())
}

/// Artifacts as plain paths or `{ path: ... }` mappings.
fn parse_artifacts(value: Option<&Value>) -> Result<Vec<String>> {
    let entries = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(entries)) => entries,
        Some(other) => return Ok(vec![scalar_string(other, "artifacts")?]),
    };

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let field = format!("artifacts[{}]", i);
            if entry.is_mapping() {
                optional_string_at(entry, "path", &format!("{}.path", field))?
                    .ok_or_else(|| Error::missing(format!("{}.path", field)))
            } else {
                scalar_string(entry, &field)
            }
        })
        .collect()
}

fn parse_ports(value: Option<&Value>) -> Result<Vec<u16>> {
    let entries: Vec<&Value> = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(entries)) => entries.iter().collect(),
        Some(other) => vec![other],
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let field = format!("ports[{}]", i);
            let port = positive_int(&field, entry)?;
            u16::try_from(port).map_err(|_| Error::invalid(field, format!("{} is not a valid port", port)))
        })
        .collect()
}

fn parse_args(value: Option<&Value>) -> Result<Option<ScriptArgs>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Sequence(_)) => {
            let args = string_list(value, "args")?;
            Ok((!args.is_empty()).then_some(ScriptArgs::List(args)))
        }
        Some(other) => Ok(Some(ScriptArgs::Line(scalar_string(other, "args")?))),
    }
}

// =============================================================================
// Field helpers
// =============================================================================

/// Validate that `value` is a positive integer that fits in a `u32`.
///
/// Numeric strings are accepted (`"4"`), matching what users write when a
/// value comes from templated YAML.
pub fn positive_int(field: &str, value: &Value) -> Result<u32> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| Error::NotAnInteger {
            field: field.to_string(),
            value: n.to_string(),
        })?,
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| Error::NotAnInteger {
            field: field.to_string(),
            value: format!("{:?}", s),
        })?,
        other => {
            return Err(Error::NotAnInteger {
                field: field.to_string(),
                value: describe(other),
            })
        }
    };

    if parsed <= 0 {
        return Err(Error::NotPositive {
            field: field.to_string(),
            value: parsed,
        });
    }
    u32::try_from(parsed).map_err(|_| Error::invalid(field, format!("{} is too large", parsed)))
}

fn optional_positive_int(doc: &Value, key: &str, field: &str) -> Result<Option<u32>> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => positive_int(field, value).map(Some),
    }
}

fn optional_string(doc: &Value, key: &str) -> Result<Option<String>> {
    optional_string_at(doc, key, key)
}

fn optional_string_at(doc: &Value, key: &str, field: &str) -> Result<Option<String>> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_string(value, field).map(Some),
    }
}

/// A list of scalars, or a single scalar treated as a one-element list.
fn string_list(value: Option<&Value>, field: &str) -> Result<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| scalar_string(item, &format!("{}[{}]", field, i)))
            .collect(),
        Some(other) => Ok(vec![scalar_string(other, field)?]),
    }
}

/// Render a scalar as a string. Numbers and booleans are stringified so that
/// `version: 3.9` and `EPOCHS: 10` behave as the user expects.
fn scalar_string(value: &Value, field: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::invalid(
            field,
            format!("expected a scalar, got {}", describe(other)),
        )),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{:?}", s),
        Value::Sequence(_) => "a list".to_string(),
        Value::Mapping(_) => "a mapping".to_string(),
        Value::Tagged(tagged) => format!("a value tagged {}", tagged.tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_workflow() {
        let yaml = r#"
name: train
provider: torchrun
script: train.py
version: "3.10"
requirements: requirements.txt
working_dir: src
environment:
  EPOCHS: 10
  MODE: fast
artifacts:
  - checkpoints
  - path: logs
resources:
  cpu: 8
  memory: 64GB
  shm_size: 8GB
  nodes: 3
  gpu:
    count: 2
    name: V100
    memory: 16GB
args: ["--lr", "0.1"]
"#;
        let config = WorkflowConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.name.as_deref(), Some("train"));
        assert_eq!(config.provider.as_deref(), Some("torchrun"));
        assert_eq!(config.script.as_deref(), Some("train.py"));
        assert_eq!(config.version.as_deref(), Some("3.10"));
        assert_eq!(config.requirements.as_deref(), Some("requirements.txt"));
        assert_eq!(config.working_dir.as_deref(), Some("src"));
        assert_eq!(config.environment["EPOCHS"], "10");
        assert_eq!(config.environment["MODE"], "fast");
        assert_eq!(config.artifacts, vec!["checkpoints", "logs"]);
        assert_eq!(config.resources.cpu, Some(8));
        assert_eq!(config.resources.memory.as_deref(), Some("64GB"));
        assert_eq!(config.resources.shm_size.as_deref(), Some("8GB"));
        assert_eq!(config.resources.nodes, Some(3));
        let gpu = config.resources.gpu.unwrap();
        assert_eq!(gpu.count, 2);
        assert_eq!(gpu.name.as_deref(), Some("V100"));
        assert_eq!(gpu.memory.as_deref(), Some("16GB"));
        assert_eq!(
            config.args,
            Some(ScriptArgs::List(vec!["--lr".to_string(), "0.1".to_string()]))
        );
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(WorkflowConfig::from_yaml("").unwrap(), WorkflowConfig::default());
    }

    #[test]
    fn file_is_an_alias_for_script() {
        let config = WorkflowConfig::from_yaml("file: main.py").unwrap();
        assert_eq!(config.script.as_deref(), Some("main.py"));
    }

    #[test]
    fn gpu_as_plain_count() {
        let config = WorkflowConfig::from_yaml("resources:\n  gpu: 4").unwrap();
        assert_eq!(config.resources.gpu, Some(GpuRequest::with_count(4)));
    }

    #[test]
    fn gpu_mapping_without_count_defaults_to_one() {
        let config = WorkflowConfig::from_yaml("resources:\n  gpu:\n    name: A100").unwrap();
        let gpu = config.resources.gpu.unwrap();
        assert_eq!(gpu.count, 1);
        assert_eq!(gpu.name.as_deref(), Some("A100"));
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let config = WorkflowConfig::from_yaml("resources:\n  cpu: \"4\"\n  nodes: '2'").unwrap();
        assert_eq!(config.resources.cpu, Some(4));
        assert_eq!(config.resources.nodes, Some(2));
    }

    #[test]
    fn non_numeric_nodes_is_rejected() {
        let err = WorkflowConfig::from_yaml("resources:\n  nodes: three").unwrap_err();
        assert!(matches!(err, Error::NotAnInteger { ref field, .. } if field == "resources.nodes"));
        assert_eq!(
            err.to_string(),
            "configuration error: resources.nodes must be a positive integer, got \"three\""
        );
    }

    #[test]
    fn zero_and_negative_counts_are_rejected() {
        let err = WorkflowConfig::from_yaml("resources:\n  gpu: 0").unwrap_err();
        assert!(matches!(err, Error::NotPositive { value: 0, .. }));

        let err = WorkflowConfig::from_yaml("resources:\n  cpu: -2").unwrap_err();
        assert!(matches!(err, Error::NotPositive { value: -2, .. }));
    }

    #[test]
    fn fractional_count_is_rejected() {
        let err = WorkflowConfig::from_yaml("resources:\n  cpu: 1.5").unwrap_err();
        assert!(matches!(err, Error::NotAnInteger { ref value, .. } if value == "1.5"));
    }

    #[test]
    fn resources_nodes_wins_over_top_level() {
        let config = WorkflowConfig::from_yaml("nodes: 2\nresources:\n  nodes: 5").unwrap();
        assert_eq!(config.resources.nodes, Some(5));

        let config = WorkflowConfig::from_yaml("nodes: 2").unwrap();
        assert_eq!(config.resources.nodes, Some(2));
    }

    #[test]
    fn top_level_nodes_is_validated() {
        let err = WorkflowConfig::from_yaml("nodes: many").unwrap_err();
        assert!(matches!(err, Error::NotAnInteger { ref field, .. } if field == "nodes"));
    }

    #[test]
    fn environment_as_list() {
        let config =
            WorkflowConfig::from_yaml("environment:\n  - A=1\n  - B=x=y\n  - C").unwrap();
        assert_eq!(config.environment["A"], "1");
        assert_eq!(config.environment["B"], "x=y");
        assert_eq!(config.environment["C"], "");
    }

    #[test]
    fn environment_rejects_nested_values() {
        let err = WorkflowConfig::from_yaml("environment:\n  A:\n    - 1").unwrap_err();
        assert!(matches!(err, Error::InvalidField { ref field, .. } if field == "environment.A"));
    }

    #[test]
    fn args_as_line() {
        let config = WorkflowConfig::from_yaml("args: --epochs 3").unwrap();
        assert_eq!(config.args, Some(ScriptArgs::Line("--epochs 3".to_string())));
    }

    #[test]
    fn ports_must_fit_u16() {
        let config = WorkflowConfig::from_yaml("ports: [6006, 8888]").unwrap();
        assert_eq!(config.ports, vec![6006, 8888]);

        let err = WorkflowConfig::from_yaml("ports: [70000]").unwrap_err();
        assert!(matches!(err, Error::InvalidField { ref field, .. } if field == "ports[0]"));
    }

    #[test]
    fn unquoted_version_is_stringified() {
        let config = WorkflowConfig::from_yaml("version: 3.8").unwrap();
        assert_eq!(config.version.as_deref(), Some("3.8"));
    }

    #[test]
    fn non_mapping_root_is_rejected() {
        let err = WorkflowConfig::from_yaml("- a\n- b").unwrap_err();
        assert!(matches!(err, Error::InvalidField { .. }));
    }

    #[test]
    fn env_entry_requires_name() {
        assert!(parse_env_entry("=value").is_err());
        assert_eq!(
            parse_env_entry("KEY=a=b").unwrap(),
            ("KEY".to_string(), "a=b".to_string())
        );
    }

    #[test]
    fn env_names_must_be_identifiers() {
        assert!(is_env_name("_PATH2"));
        assert!(!is_env_name("2FAST"));
        assert!(!is_env_name("MY VAR"));

        let err = parse_env_entry("MY VAR=1").unwrap_err();
        assert!(matches!(err, Error::InvalidField { ref field, .. } if field == "environment"));
        assert!(parse_env_entry("A;rm -rf x=1").is_err());

        let err = WorkflowConfig::from_yaml("environment:\n  \"MY VAR\": 1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: invalid environment: 'MY VAR' is not a valid variable name"
        );
    }
}
