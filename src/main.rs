//! The Matrix Lab Runner command line binary.

#![allow(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

use clap::Parser;
use clap::Subcommand;
use clap_verbosity_flag::Verbosity;

use matrixlab_runner::commands::probe;
use matrixlab_runner::commands::serve;

/// The Matrix Lab Runner.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// The subcommand to run.
    #[command(subcommand)]
    command: Commands,

    /// Logging verbosity.
    #[command(flatten)]
    verbosity: Verbosity,
}

/// Runner subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Starts the HTTP Runner.
    Serve(serve::Args),
    /// Runs Preflight and the Capability Probe once and prints a report.
    Probe(probe::Args),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(cli.verbosity.tracing_level_filter().to_string())
            }),
        )
        .init();

    match cli.command {
        Commands::Serve(args) => serve::serve(args).await,
        Commands::Probe(args) => probe::probe(args).await,
    }
}
