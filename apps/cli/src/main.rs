//! driveup entry point.

mod app;
mod auth_command;
mod cli;
mod config;
mod render;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<ExitCode> {
    let cli = cli::Cli::parse();

    // Initialize structured logging on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting driveup");

    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if cli.fail_fast {
        config.fail_fast = true;
    }
    config.validate()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli, config))
}
