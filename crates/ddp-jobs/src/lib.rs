//! Torchrun job compiler for distributed training workflows
//!
//! Compiles a `WorkflowConfig` into an ordered list of job descriptors: one
//! master followed by its workers, each carrying the shell commands that
//! launch its rank. Pure compilation crate; nothing is scheduled or executed.

mod builder;
mod commands;
mod provider;
mod resolve;
mod types;

pub use builder::{build_jobs, MASTER_JOB_NAME};
pub use commands::{
    escape_double_quoted, export_command, render_args, synthesize_commands, Rendezvous, LAUNCHER,
    MASTER_RENDEZVOUS, SELF_RENDEZVOUS,
};
pub use provider::Provider;
pub use resolve::{
    resolve, select_image, CommandSource, LauncherSpec, Ports, ResolvedWorkflow, MAX_NODES,
};
pub use types::{Gpu, JobDescriptor, MasterRef, Resources};

use ddp_common::{Result, WorkflowConfig};
use tracing::info;

/// Resolve a workflow and build its job list in one step.
///
/// Returns no descriptors at all when any field is invalid.
pub fn compile_workflow(config: &WorkflowConfig, provider: Provider) -> Result<Vec<JobDescriptor>> {
    let resolved = resolve(config, provider)?;
    let jobs = build_jobs(&resolved);
    info!(
        provider = %provider,
        image = %resolved.image,
        jobs = jobs.len(),
        "compiled workflow"
    );
    Ok(jobs)
}
