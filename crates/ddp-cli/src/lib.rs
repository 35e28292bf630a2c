//! ddp CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// ddp - Job descriptors for multi-node torchrun training
#[derive(Parser, Debug)]
#[command(name = "ddp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate jobs that launch a training script with torchrun
    Torchrun(commands::run::TorchrunArgs),
    /// Generate jobs from an explicit image and command list
    Docker(commands::run::DockerArgs),
    /// Check every workflow in a workflows file
    Validate(commands::validate::ValidateArgs),
}

impl Cli {
    /// Run the CLI command
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Torchrun(args) => commands::run::run_torchrun(args),
            Commands::Docker(args) => commands::run::run_docker(args),
            Commands::Validate(args) => commands::validate::run(args),
        }
    }
}
