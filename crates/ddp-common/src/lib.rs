//! Common types for ddp: workflow configuration, loading, and errors

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod workflows;

pub use config::{GpuRequest, ResourceRequest, ScriptArgs, WorkflowConfig};
pub use error::Error;
pub use workflows::WorkflowsFile;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Interpreter version used when a workflow does not pin one
pub const DEFAULT_PYTHON_VERSION: &str = "3.9";

/// Workflows file looked up when no explicit path is given
pub const DEFAULT_WORKFLOWS_FILE: &str = ".dstack/workflows.yaml";
