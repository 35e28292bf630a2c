//! Workflows file loading
//!
//! A workflows file is either a single workflow mapping, or a document with a
//! `workflows:` list of named workflows:
//!
//! ```yaml
//! workflows:
//!   - name: train
//!     provider: torchrun
//!     script: train.py
//!     resources:
//!       nodes: 2
//!       gpu: 4
//! ```

use std::path::Path;

use serde_yaml::Value;

use crate::{Error, Result, WorkflowConfig};

/// All workflows declared in one file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkflowsFile {
    /// Workflows in declaration order
    pub workflows: Vec<WorkflowConfig>,
}

impl WorkflowsFile {
    /// Read and parse a workflows file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse a workflows file from a YAML string
    pub fn from_yaml(input: &str) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(input)?;

        let workflows = match doc.get("workflows") {
            Some(Value::Sequence(entries)) => entries
                .iter()
                .map(WorkflowConfig::from_value)
                .collect::<Result<Vec<_>>>()?,
            Some(Value::Null) => Vec::new(),
            Some(_) => return Err(Error::invalid("workflows", "expected a list")),
            None if doc.is_null() => Vec::new(),
            None => vec![WorkflowConfig::from_value(&doc)?],
        };

        Ok(Self { workflows })
    }

    /// Look up a workflow by name
    pub fn find(&self, name: &str) -> Result<&WorkflowConfig> {
        self.workflows
            .iter()
            .find(|w| w.name.as_deref() == Some(name))
            .ok_or_else(|| Error::WorkflowNotFound {
                name: name.to_string(),
            })
    }
}
