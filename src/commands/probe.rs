//! Implementation of the `probe` subcommand: runs Preflight and the
//! Capability Probe once, without starting the HTTP server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::runner::capability;
use crate::runner::container::CliContainerRuntime;
use crate::runner::container::ContainerRuntime;
use crate::runner::preflight;

/// Arguments to the `probe` subcommand.
#[derive(Parser, Debug)]
pub struct Args {
    /// Configuration file path.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// The main function for the `probe` subcommand.
pub async fn probe(args: Args) -> Result<()> {
    let config = crate::config::Config::load(args.config.as_deref())?;
    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(CliContainerRuntime::new(config.runner.container_runtime.clone()));

    print!("preflight: ");
    match preflight::run(runtime.as_ref(), preflight::default_socket_path()).await {
        Ok(()) => println!("{}", "ok".green()),
        Err(err) => {
            println!("{}", "failed".red());
            anyhow::bail!(err);
        }
    }

    if config.runner.known_sandboxes.is_empty() {
        println!("no sandboxes configured under `runner.known_sandboxes`");
        return Ok(());
    }

    let progress = indicatif::ProgressBar::new(config.runner.known_sandboxes.len() as u64);
    let report = capability::probe(runtime.as_ref(), &config.runner.known_sandboxes).await;
    progress.finish_and_clear();

    for (name, health) in &report.sandboxes {
        let marker = if health.ok { "ok".green() } else { "degraded".red() };
        println!("  {name} ({}): {marker}", health.image);
        if let Some(error) = &health.error {
            println!("    {error}");
        }
    }

    println!(
        "overall: {}",
        match report.status {
            capability::Status::Ok => "ok".green(),
            capability::Status::Degraded => "degraded".yellow(),
            capability::Status::Error => "error".red(),
        }
    );

    Ok(())
}
