//! Implementation of the `serve` subcommand.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

/// Arguments to the `serve` subcommand.
#[derive(Parser, Debug)]
pub struct Args {
    /// Configuration file path.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// The main function for the `serve` subcommand.
pub async fn serve(args: Args) -> Result<()> {
    let config = crate::config::Config::load(args.config.as_deref())?;
    crate::server::run(config).await
}
