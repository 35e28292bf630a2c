//! Validate command

use std::path::PathBuf;

use clap::Args;
use tracing::warn;

use ddp_common::{WorkflowConfig, DEFAULT_WORKFLOWS_FILE};
use ddp_jobs::{compile_workflow, Provider};

use super::load_workflows_file;
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Workflows file to check
    #[arg(long, value_name = "PATH", default_value = DEFAULT_WORKFLOWS_FILE)]
    pub workflows: PathBuf,
}

pub fn run(args: ValidateArgs) -> Result<()> {
    let file = load_workflows_file(&args.workflows)?;
    if file.workflows.is_empty() {
        return Err(Error::validation(format!(
            "{} declares no workflows",
            args.workflows.display()
        )));
    }

    let mut errors = Vec::new();
    for (i, workflow) in file.workflows.iter().enumerate() {
        let label = workflow
            .name
            .clone()
            .unwrap_or_else(|| format!("workflows[{}]", i));

        match check_workflow(workflow) {
            Ok(jobs) => println!("  {} valid ({} jobs)", label, jobs),
            Err(e) => {
                warn!(workflow = %label, error = %e, "workflow failed validation");
                errors.push(format!("{}: {}", label, e));
            }
        }
    }

    println!();
    if errors.is_empty() {
        println!("All validations passed");
        Ok(())
    } else {
        println!("Validation errors:");
        for error in &errors {
            println!("  - {}", error);
        }
        Err(Error::validation(format!(
            "{} of {} workflows failed",
            errors.len(),
            file.workflows.len()
        )))
    }
}

/// Resolve and build a workflow, returning how many jobs it yields
fn check_workflow(workflow: &WorkflowConfig) -> Result<usize> {
    let provider = match workflow.provider.as_deref() {
        Some(name) => name.parse::<Provider>()?,
        None => Provider::default(),
    };
    Ok(compile_workflow(workflow, provider)?.len())
}
