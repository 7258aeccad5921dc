//! npd - reproducible npm dependencies per package

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use npd_cli::cmd;
use npd_cli::{Cli, Commands, Context};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs share stderr with progress; stdout carries results only.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::from_opts(&cli.global)?;

    match cli.command {
        Commands::Build { dirs } => cmd::build::build(&ctx, &dirs).await,
        Commands::Bundle { output, dirs } => cmd::bundle::bundle(&ctx, &output, &dirs).await,
        Commands::Status { dirs } => cmd::status::status(&ctx, &dirs).await,
    }
}
