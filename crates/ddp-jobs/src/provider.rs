//! Generator variants
//!
//! A provider fixes the parts of job generation that differ between workflow
//! kinds: whether a GPU is implied, where commands come from, how the master
//! exposes ports, and which nodes receive artifacts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use ddp_common::Error;

/// Job generator variant
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// Script launched with torchrun on GPU nodes (one GPU per node if unspecified)
    #[default]
    Torchrun,
    /// Script launched with torchrun; GPUs only when requested
    TorchrunCpu,
    /// User-supplied image and commands, replicated across nodes
    Docker,
}

impl Provider {
    /// Whether resolution defaults the GPU request to one GPU per node
    pub fn requires_gpu(self) -> bool {
        matches!(self, Self::Torchrun)
    }

    /// Whether commands are synthesized per rank (vs. taken from the workflow)
    pub fn synthesizes_commands(self) -> bool {
        matches!(self, Self::Torchrun | Self::TorchrunCpu)
    }

    /// Whether workers collect artifacts too, not only the master
    pub fn shares_artifacts_with_workers(self) -> bool {
        matches!(self, Self::Docker)
    }

    /// Name as written in workflow files
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Torchrun => "torchrun",
            Self::TorchrunCpu => "torchrun-cpu",
            Self::Docker => "docker",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "torchrun" | "pytorch" => Ok(Self::Torchrun),
            "torchrun-cpu" => Ok(Self::TorchrunCpu),
            "docker" | "pytorch-ddp" => Ok(Self::Docker),
            other => Err(Error::invalid(
                "provider",
                format!(
                    "unknown provider '{}', expected torchrun, torchrun-cpu or docker",
                    other
                ),
            )),
        }
    }
}
