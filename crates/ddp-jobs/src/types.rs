//! Job descriptor serialization types
//!
//! Typed representation of the jobs handed to the external orchestrator.
//! Field names are snake_case to match the orchestrator's job API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One node's job: image, commands, resources and environment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JobDescriptor {
    /// `master` for rank 0, `worker-{rank}` otherwise
    pub name: String,

    pub node_rank: u32,

    pub image: String,

    /// Shell commands run in order inside the container
    pub commands: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    pub resources: Resources,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Number of ports the orchestrator should allocate (`$JOB_PORT_0`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_count: Option<u32>,

    /// Explicit ports to expose
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,

    /// Set on workers only. The orchestrator resolves the master's address
    /// from this reference and exposes it as `$MASTER_JOB_*`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<MasterRef>,
}

impl JobDescriptor {
    /// True for the rank-0 job
    pub fn is_master(&self) -> bool {
        self.master.is_none()
    }
}

/// Reference from a worker to the master job, by position and name
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MasterRef {
    /// Position of the master in the job list
    pub index: usize,
    pub name: String,
}

/// Resolved per-node resources
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<Gpu>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shm_size: Option<String>,

    /// Total number of nodes in the distributed job
    pub nodes: u32,
}

impl Resources {
    /// GPUs per node, zero when none were requested
    pub fn gpu_count(&self) -> u32 {
        self.gpu.as_ref().map(|g| g.count).unwrap_or(0)
    }
}

/// GPU allocation per node
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gpu {
    /// GPUs per node, also the number of processes per node
    pub count: u32,

    /// GPU model (e.g. "A100")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Memory per GPU (e.g. "40GB")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}
