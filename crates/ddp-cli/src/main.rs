//! ddp CLI
//!
//! Turns a workflow into master and worker job descriptors for an external
//! orchestrator. Descriptors go to stdout; logs go to stderr.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ddp_cli::Cli;

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = cli.run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
