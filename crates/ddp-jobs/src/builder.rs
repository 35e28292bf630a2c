//! Job-list construction
//!
//! Expands a resolved workflow into one master job followed by `nodes - 1`
//! workers. The master is always at index 0 and every worker references it.

use tracing::debug;

use crate::commands::synthesize_commands;
use crate::resolve::{CommandSource, Ports, ResolvedWorkflow};
use crate::types::{JobDescriptor, MasterRef};

/// Name of the rank-0 job
pub const MASTER_JOB_NAME: &str = "master";

/// Build the ordered job list for a resolved workflow.
///
/// Deterministic: the same workflow always yields the same descriptors.
pub fn build_jobs(workflow: &ResolvedWorkflow) -> Vec<JobDescriptor> {
    let nodes = workflow.resources.nodes;
    let mut jobs = Vec::with_capacity(nodes as usize);

    jobs.push(build_master(workflow));
    let master = MasterRef {
        index: 0,
        name: MASTER_JOB_NAME.to_string(),
    };
    jobs.extend((1..nodes).map(|rank| build_worker(workflow, rank, master.clone())));

    jobs
}

fn build_master(workflow: &ResolvedWorkflow) -> JobDescriptor {
    let mut job = base_job(workflow, MASTER_JOB_NAME.to_string(), 0, true);
    job.artifacts = workflow.artifacts.clone();

    match &workflow.ports {
        Some(Ports::Count(count)) => job.port_count = Some(*count),
        Some(Ports::List(ports)) => job.ports = ports.clone(),
        None => {}
    }

    debug!(
        job = %job.name,
        provider = %workflow.provider,
        nodes = workflow.resources.nodes,
        commands = job.commands.len(),
        "built master job"
    );
    job
}

fn build_worker(workflow: &ResolvedWorkflow, rank: u32, master: MasterRef) -> JobDescriptor {
    let mut job = base_job(workflow, format!("worker-{}", rank), rank, false);
    if workflow.provider.shares_artifacts_with_workers() {
        job.artifacts = workflow.artifacts.clone();
    }
    job.master = Some(master);

    debug!(job = %job.name, rank, "built worker job");
    job
}

fn base_job(workflow: &ResolvedWorkflow, name: String, rank: u32, is_master: bool) -> JobDescriptor {
    let commands = match &workflow.commands {
        CommandSource::Launcher(launch) => synthesize_commands(
            launch,
            &workflow.resources,
            &workflow.environment,
            rank,
            is_master,
        ),
        CommandSource::Explicit(commands) => commands.clone(),
    };

    JobDescriptor {
        name,
        node_rank: rank,
        image: workflow.image.clone(),
        commands,
        working_dir: workflow.working_dir.clone(),
        resources: workflow.resources.clone(),
        artifacts: Vec::new(),
        environment: workflow.environment.clone(),
        port_count: None,
        ports: Vec::new(),
        master: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use crate::resolve::resolve;
    use ddp_common::WorkflowConfig;

    fn jobs(yaml: &str, provider: Provider) -> Vec<JobDescriptor> {
        let config = WorkflowConfig::from_yaml(yaml).unwrap();
        build_jobs(&resolve(&config, provider).unwrap())
    }

    #[test]
    fn one_node_yields_only_the_master() {
        let jobs = jobs("script: train.py", Provider::Torchrun);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "master");
        assert!(jobs[0].is_master());
        assert_eq!(jobs[0].port_count, Some(1));
    }

    #[test]
    fn n_nodes_yield_one_master_and_n_minus_one_workers() {
        let jobs = jobs("script: train.py\nresources:\n  nodes: 4", Provider::Torchrun);

        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs.iter().filter(|j| j.is_master()).count(), 1);
        for (rank, job) in jobs.iter().enumerate().skip(1) {
            assert_eq!(job.name, format!("worker-{}", rank));
            assert_eq!(job.node_rank, rank as u32);
            assert_eq!(
                job.master,
                Some(MasterRef {
                    index: 0,
                    name: "master".to_string()
                })
            );
            assert!(job.port_count.is_none());
        }
    }

    #[test]
    fn three_node_scenario() {
        let yaml = "script: train.py\nrequirements: reqs.txt\nresources:\n  nodes: 3\n  gpu: 2";
        let jobs = jobs(yaml, Provider::Torchrun);

        assert_eq!(jobs.len(), 3);
        for job in &jobs {
            assert_eq!(job.image, "dstackai/python:3.9-cuda-11.1");
            assert_eq!(job.commands[0], "pip3 install -r reqs.txt");
            let launch = job.commands.last().unwrap();
            assert!(launch.contains("--nproc_per_node=2"));
            assert!(launch.contains("--nnodes=3"));
            assert!(launch.contains(&format!("--node_rank={}", job.node_rank)));
        }

        let master = jobs[0].commands.last().unwrap();
        assert!(master.contains("--master_addr $JOB_HOSTNAME "));
        assert!(master.contains("--master_port $JOB_PORT_0 "));
        assert!(!master.contains("MASTER_JOB_"));

        for worker in &jobs[1..] {
            let launch = worker.commands.last().unwrap();
            assert!(launch.contains("--master_addr $MASTER_JOB_HOSTNAME "));
            assert!(launch.contains("--master_port $MASTER_JOB_PORT_0 "));
            assert!(!launch.contains("--master_addr $JOB_HOSTNAME"));
            assert!(!launch.contains("--master_port $JOB_PORT_0"));
        }
    }

    #[test]
    fn artifacts_stay_on_the_master_for_torchrun() {
        let jobs = jobs(
            "script: t.py\nnodes: 2\nartifacts: [checkpoints]",
            Provider::Torchrun,
        );
        assert_eq!(jobs[0].artifacts, vec!["checkpoints"]);
        assert!(jobs[1].artifacts.is_empty());
    }

    #[test]
    fn docker_replicates_commands_and_artifacts() {
        let jobs = jobs(
            "image: pytorch/pytorch\ncommands: [python a.py]\nports: [29500]\nnodes: 3\nartifacts: [out]",
            Provider::Docker,
        );

        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].ports, vec![29500]);
        assert!(jobs[0].port_count.is_none());
        for job in &jobs {
            assert_eq!(job.commands, vec!["python a.py"]);
            assert_eq!(job.artifacts, vec!["out"]);
        }
        assert!(jobs[1].ports.is_empty());
    }

    #[test]
    fn output_is_deterministic() {
        let yaml = "script: t.py\nnodes: 3\nenvironment:\n  B: 2\n  A: 1";
        assert_eq!(jobs(yaml, Provider::Torchrun), jobs(yaml, Provider::Torchrun));
    }

    #[test]
    fn environment_is_exported_on_every_node() {
        let jobs = jobs(
            "script: t.py\nnodes: 2\nenvironment:\n  MSG: 'say \"hi\"'",
            Provider::TorchrunCpu,
        );
        for job in &jobs {
            assert_eq!(job.commands[0], r#"export MSG="say \"hi\"""#);
            assert_eq!(job.environment["MSG"], r#"say "hi""#);
            assert!(!job.commands.last().unwrap().contains("--nproc_per_node"));
        }
    }
}
