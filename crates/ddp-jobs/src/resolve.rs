//! Configuration resolution
//!
//! Applies defaults once, checks numeric invariants, and selects the image.
//! The result is plain data consumed by the command synthesizer and the
//! job-list builder; nothing downstream re-reads the raw workflow.

use std::collections::BTreeMap;

use ddp_common::{Error, GpuRequest, Result, ScriptArgs, WorkflowConfig, DEFAULT_PYTHON_VERSION};

use crate::provider::Provider;
use crate::types::{Gpu, Resources};

/// CUDA runtime baked into the GPU image tags
const CUDA_TAG: &str = "cuda-11.1";

/// Largest node count a single workflow may request
pub const MAX_NODES: u32 = 1024;

/// What the launcher command is built from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LauncherSpec {
    /// Training script passed to the launcher
    pub script: String,
    /// Requirements file installed before launch
    pub requirements: Option<String>,
    /// Extra script arguments
    pub args: Option<ScriptArgs>,
}

/// Where a node's commands come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandSource {
    /// Synthesized per rank from a launcher spec
    Launcher(LauncherSpec),
    /// Taken verbatim from the workflow, identical on every node
    Explicit(Vec<String>),
}

/// Ports exposed by the master job
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ports {
    /// Let the orchestrator allocate this many ports
    Count(u32),
    /// Expose exactly these ports
    List(Vec<u16>),
}

/// A workflow with defaults applied and invariants checked
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedWorkflow {
    pub provider: Provider,
    /// Image shared by every node
    pub image: String,
    pub commands: CommandSource,
    pub working_dir: Option<String>,
    /// Per-node resources with defaults applied
    pub resources: Resources,
    /// Artifact paths, placed on nodes according to the provider
    pub artifacts: Vec<String>,
    /// Variables exported on every node
    pub environment: BTreeMap<String, String>,
    /// Ports of the master, if any
    pub ports: Option<Ports>,
}

/// Resolve a workflow for the given provider.
///
/// Fails on the first invalid or missing field; no partial result is returned.
pub fn resolve(config: &WorkflowConfig, provider: Provider) -> Result<ResolvedWorkflow> {
    let resources = resolve_resources(config, provider)?;

    let (image, commands, ports) = if provider.synthesizes_commands() {
        let script = config
            .script
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::missing("script"))?;
        let version = config.version.as_deref().unwrap_or(DEFAULT_PYTHON_VERSION);

        let launcher = LauncherSpec {
            script,
            requirements: config.requirements.clone(),
            args: config.args.clone(),
        };
        (
            select_image(version, resources.gpu.as_ref()),
            CommandSource::Launcher(launcher),
            Some(Ports::Count(1)),
        )
    } else {
        let image = config
            .image
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::missing("image"))?;
        let ports = (!config.ports.is_empty()).then(|| Ports::List(config.ports.clone()));
        (image, CommandSource::Explicit(config.commands.clone()), ports)
    };

    Ok(ResolvedWorkflow {
        provider,
        image,
        commands,
        working_dir: config.working_dir.clone(),
        resources,
        artifacts: config.artifacts.clone(),
        environment: config.environment.clone(),
        ports,
    })
}

fn resolve_resources(config: &WorkflowConfig, provider: Provider) -> Result<Resources> {
    let request = &config.resources;

    let nodes = ensure_positive("resources.nodes", request.nodes.unwrap_or(1))?;
    if nodes > MAX_NODES {
        return Err(Error::invalid(
            "resources.nodes",
            format!("{} exceeds the limit of {} nodes", nodes, MAX_NODES),
        ));
    }
    let cpu = request
        .cpu
        .map(|cpu| ensure_positive("resources.cpu", cpu))
        .transpose()?;

    let gpu = match &request.gpu {
        Some(gpu) => Some(resolve_gpu(gpu)?),
        None if provider.requires_gpu() => Some(resolve_gpu(&GpuRequest::with_count(1))?),
        None => None,
    };

    Ok(Resources {
        cpu,
        memory: request.memory.clone(),
        gpu,
        shm_size: request.shm_size.clone(),
        nodes,
    })
}

fn resolve_gpu(gpu: &GpuRequest) -> Result<Gpu> {
    Ok(Gpu {
        count: ensure_positive("resources.gpu.count", gpu.count)?,
        name: gpu.name.clone(),
        memory: gpu.memory.clone(),
    })
}

/// Values from CLI flags skip the document parser, so zero is caught here.
fn ensure_positive(field: &str, value: u32) -> Result<u32> {
    if value == 0 {
        return Err(Error::NotPositive {
            field: field.to_string(),
            value: 0,
        });
    }
    Ok(value)
}

/// Pick the image tag for an interpreter version.
///
/// GPU workloads get the CUDA-enabled tag; everything else gets the plain
/// interpreter image.
pub fn select_image(version: &str, gpu: Option<&Gpu>) -> String {
    match gpu {
        Some(gpu) if gpu.count > 0 => format!("dstackai/python:{}-{}", version, CUDA_TAG),
        _ => format!("python:{}", version),
    }
}
