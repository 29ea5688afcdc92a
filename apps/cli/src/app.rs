//! Wires configuration, credentials, the Graph client and the orchestrator
//! into one upload run.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use driveup_auth::CredentialLease;
use driveup_graph::GraphClient;
use driveup_upload::{UploadError, UploadOrchestrator};

use crate::auth_command::CommandTokenProvider;
use crate::cli::Cli;
use crate::config::Config;
use crate::render;

/// Exit status after Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

/// Runs one upload and maps its outcome to a process exit code.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();

    // Ctrl-C cancels every transfer; sessions are still cleaned up.
    let signal_task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling upload");
                cancel.cancel();
            }
        }
    });

    let provider = Arc::new(CommandTokenProvider::new(&config.auth_command)?);
    let lease = Arc::new(CredentialLease::start(
        provider,
        config.refresh_margin(),
        cancel.child_token(),
    ));
    let graph = GraphClient::new(Arc::clone(&lease))
        .context("creating HTTP client")?
        .with_base_url(config.graph_base_url.clone());

    let orchestrator = UploadOrchestrator::new(Arc::new(graph), config.upload_options())
        .with_cancel_token(cancel.child_token());

    let render_stop = CancellationToken::new();
    let renderer = tokio::spawn(render::run(
        orchestrator.subscribe_progress(),
        config.progress_interval(),
        render_stop.clone(),
    ));

    info!(
        source = %cli.source.display(),
        destination = %cli.destination,
        concurrency = config.concurrency,
        "starting"
    );
    let result = orchestrator.run(&cli.source, &cli.destination).await;

    render_stop.cancel();
    let _ = renderer.await;
    lease.dispose();
    signal_task.abort();

    let summary = orchestrator.summary();
    eprintln!("{}", render::format_summary(&summary));

    match result {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(UploadError::Cancelled) => {
            warn!("upload cancelled");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(e) => {
            error!(error = %e, "upload failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
