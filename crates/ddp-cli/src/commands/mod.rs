//! CLI commands
//!
//! Flags shared by the generating subcommands, workflow lookup, CLI
//! overrides, and descriptor output.

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use ddp_common::config::parse_env_entry;
use ddp_common::{GpuRequest, WorkflowConfig, WorkflowsFile, DEFAULT_WORKFLOWS_FILE};
use ddp_jobs::JobDescriptor;

use crate::{Error, Result};

pub mod run;
pub mod validate;

// =============================================================================
// Shared flags
// =============================================================================

/// Where the base workflow comes from
#[derive(Args, Debug, Default, Clone)]
pub struct SourceArgs {
    /// Workflows file to load the workflow from
    #[arg(long, value_name = "PATH")]
    pub workflows: Option<PathBuf>,

    /// Name of the workflow inside the workflows file
    #[arg(short = 'w', long, value_name = "NAME")]
    pub workflow: Option<String>,
}

/// Per-node settings that override the loaded workflow
#[derive(Args, Debug, Default, Clone)]
pub struct OverrideArgs {
    /// Environment variable for every node (repeatable)
    #[arg(short = 'e', long = "env", value_name = "NAME[=VALUE]")]
    pub env: Vec<String>,

    /// Artifact path to collect (repeatable, replaces configured artifacts)
    #[arg(long = "artifact", value_name = "PATH")]
    pub artifacts: Vec<String>,

    /// Working directory inside the container
    #[arg(long, value_name = "DIR")]
    pub working_dir: Option<String>,

    /// CPU cores per node
    #[arg(long, value_name = "N")]
    pub cpu: Option<u32>,

    /// Memory per node (e.g. 64GB)
    #[arg(long, value_name = "SIZE")]
    pub memory: Option<String>,

    /// GPUs per node
    #[arg(long, value_name = "N")]
    pub gpu: Option<u32>,

    /// GPU model (e.g. V100)
    #[arg(long, value_name = "NAME")]
    pub gpu_name: Option<String>,

    /// Memory per GPU (e.g. 16GB)
    #[arg(long, value_name = "SIZE")]
    pub gpu_memory: Option<String>,

    /// Shared memory size (e.g. 8GB)
    #[arg(long, value_name = "SIZE")]
    pub shm_size: Option<String>,

    /// Number of nodes
    #[arg(long, value_name = "N")]
    pub nnodes: Option<u32>,

    /// Write descriptors to this file instead of stdout
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

// =============================================================================
// Workflow lookup
// =============================================================================

/// Load the base workflow.
///
/// Without `--workflows` or `--workflow` the base is empty and flags supply
/// everything. A file with several workflows needs `--workflow` to pick one.
pub fn load_workflow(source: &SourceArgs) -> Result<WorkflowConfig> {
    if source.workflows.is_none() && source.workflow.is_none() {
        return Ok(WorkflowConfig::default());
    }

    let path = source
        .workflows
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKFLOWS_FILE));
    let file = load_workflows_file(&path)?;

    let config = match source.workflow.as_deref() {
        Some(name) => file.find(name)?.clone(),
        None => match file.workflows.as_slice() {
            [only] => only.clone(),
            [] => {
                return Err(Error::validation(format!(
                    "{} declares no workflows",
                    path.display()
                )))
            }
            many => {
                return Err(Error::validation(format!(
                    "{} declares {} workflows, select one with --workflow",
                    path.display(),
                    many.len()
                )))
            }
        },
    };

    info!(
        path = %path.display(),
        workflow = config.name.as_deref().unwrap_or("<unnamed>"),
        "loaded workflow"
    );
    Ok(config)
}

pub fn load_workflows_file(path: &Path) -> Result<WorkflowsFile> {
    if !path.exists() {
        return Err(Error::WorkflowsFileNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(WorkflowsFile::load(path)?)
}

// =============================================================================
// Overrides
// =============================================================================

/// Apply per-node flags on top of a loaded workflow, returning the new value.
pub fn apply_overrides(mut config: WorkflowConfig, args: &OverrideArgs) -> Result<WorkflowConfig> {
    for entry in &args.env {
        let (name, value) = parse_env_entry(entry)?;
        info!("CLI override: environment {} set", name);
        config.environment.insert(name, value);
    }

    if !args.artifacts.is_empty() {
        info!(
            "CLI override: artifacts = {:?} (was {:?})",
            args.artifacts, config.artifacts
        );
        config.artifacts = args.artifacts.clone();
    }

    if let Some(ref dir) = args.working_dir {
        info!(
            "CLI override: working_dir = {} (was {:?})",
            dir, config.working_dir
        );
        config.working_dir = Some(dir.clone());
    }

    let resources = &mut config.resources;
    if let Some(cpu) = args.cpu {
        info!("CLI override: cpu = {} (was {:?})", cpu, resources.cpu);
        resources.cpu = Some(cpu);
    }
    if let Some(ref memory) = args.memory {
        info!("CLI override: memory = {} (was {:?})", memory, resources.memory);
        resources.memory = Some(memory.clone());
    }
    if let Some(ref shm_size) = args.shm_size {
        info!(
            "CLI override: shm_size = {} (was {:?})",
            shm_size, resources.shm_size
        );
        resources.shm_size = Some(shm_size.clone());
    }
    if let Some(nodes) = args.nnodes {
        info!("CLI override: nodes = {} (was {:?})", nodes, resources.nodes);
        resources.nodes = Some(nodes);
    }

    if args.gpu.is_some() || args.gpu_name.is_some() || args.gpu_memory.is_some() {
        // A model or memory flag alone keeps the configured count
        let mut gpu = resources
            .gpu
            .take()
            .unwrap_or_else(|| GpuRequest::with_count(1));
        if let Some(count) = args.gpu {
            info!("CLI override: gpu = {} (was {})", count, gpu.count);
            gpu.count = count;
        }
        if let Some(ref name) = args.gpu_name {
            gpu.name = Some(name.clone());
        }
        if let Some(ref memory) = args.gpu_memory {
            gpu.memory = Some(memory.clone());
        }
        resources.gpu = Some(gpu);
    }

    Ok(config)
}

// =============================================================================
// Output
// =============================================================================

/// Write descriptors as a pretty JSON array to `output`, or stdout.
pub fn write_jobs(jobs: &[JobDescriptor], output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(jobs)?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", json))?;
            info!(path = %path.display(), jobs = jobs.len(), "wrote job descriptors");
        }
        None => println!("{}", json),
    }
    Ok(())
}
