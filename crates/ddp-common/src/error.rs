//! Error types for workflow configuration
//!
//! Every variant is a configuration-time failure. Nothing here is retryable:
//! the caller reports the message and stops before any job is emitted.

use thiserror::Error;

/// Configuration error raised while loading or resolving a workflow
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a workflow file
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Workflow file is not valid YAML
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A field that must hold an integer holds something else
    #[error("configuration error: {field} must be a positive integer, got {value}")]
    NotAnInteger {
        /// Dotted path of the offending field (e.g. "resources.nodes")
        field: String,
        /// Rendering of the rejected value
        value: String,
    },

    /// An integer field is zero or negative
    #[error("configuration error: {field} must be a positive integer, got {value}")]
    NotPositive {
        /// Dotted path of the offending field
        field: String,
        /// The rejected value
        value: i64,
    },

    /// A mandatory field is absent
    #[error("configuration error: missing required field '{field}'")]
    MissingField {
        /// Dotted path of the missing field
        field: String,
    },

    /// A field has the wrong shape
    #[error("configuration error: invalid {field}: {message}")]
    InvalidField {
        /// Dotted path of the offending field
        field: String,
        /// What was expected
        message: String,
    },

    /// The requested workflow does not exist in the workflows file
    #[error("workflow not found: {name}")]
    WorkflowNotFound {
        /// Requested workflow name
        name: String,
    },
}

impl Error {
    /// Create a `MissingField` error
    pub fn missing(field: impl Into<String>) -> Self {
        Error::MissingField {
            field: field.into(),
        }
    }

    /// Create an `InvalidField` error
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}
