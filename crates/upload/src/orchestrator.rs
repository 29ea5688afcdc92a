//! Upload orchestrator.
//!
//! Resolves the destination while the source tree is scanned, then uploads
//! every file under the concurrency limit and aggregates the results.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use driveup_transfer::{ProgressSnapshot, ProgressTree};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::UploadError;
use crate::resolver::resolve_destination;
use crate::scanner::scan_files_for_upload;
use crate::scheduler::BoundedWorkScheduler;
use crate::session::ChunkedTransfer;
use crate::store::RemoteStore;
use crate::types::{FileOutcome, UploadOptions, UploadSummary};

#[derive(Default)]
struct Counters {
    discovered: AtomicUsize,
    uploaded: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    bytes: AtomicU64,
}

/// Uploads a local directory tree into a remote destination.
///
/// Each orchestrator drives a single run and owns its progress tree.
pub struct UploadOrchestrator {
    store: Arc<dyn RemoteStore>,
    options: UploadOptions,
    cancel: CancellationToken,
    progress: ProgressTree,
    counters: Arc<Counters>,
}

impl UploadOrchestrator {
    pub fn new(store: Arc<dyn RemoteStore>, options: UploadOptions) -> Self {
        Self {
            store,
            options,
            cancel: CancellationToken::new(),
            progress: ProgressTree::start("Preparing", 0),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Uses `cancel` as this run's token, typically a child of a process-wide one.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the token that cancels this run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receiver for progress snapshots of this run.
    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    /// Counters so far; final once [`run`](Self::run) has returned.
    pub fn summary(&self) -> UploadSummary {
        let c = &self.counters;
        let discovered = c.discovered.load(Ordering::SeqCst);
        let uploaded = c.uploaded.load(Ordering::SeqCst);
        let skipped = c.skipped.load(Ordering::SeqCst);
        let failed = c.failed.load(Ordering::SeqCst);
        let cancelled = c.cancelled.load(Ordering::SeqCst);
        UploadSummary {
            discovered,
            uploaded,
            skipped,
            failed,
            cancelled,
            not_started: discovered.saturating_sub(uploaded + skipped + failed + cancelled),
            bytes: c.bytes.load(Ordering::SeqCst),
        }
    }

    /// Uploads every file below `source` into `destination`.
    ///
    /// Files that already exist remotely are skipped. Per-file failures do
    /// not stop the others unless `fail_fast` is set; the first one is
    /// returned once every started file has finished.
    pub async fn run(&self, source: &Path, destination: &str) -> Result<UploadSummary, UploadError> {
        let root = self.progress.root().clone();
        root.set_label(format!("Scanning {}", source.display()));

        let scan = {
            let source = source.to_path_buf();
            tokio::task::spawn_blocking(move || scan_files_for_upload(&source))
        };
        let prepare = async {
            tokio::try_join!(resolve_destination(self.store.as_ref(), destination), async {
                scan.await?
            })
        };

        let (factory, (files, total_bytes)) = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                root.complete(Some("cancelled"));
                return Err(UploadError::Cancelled);
            }
            prepared = prepare => match prepared {
                Ok(prepared) => prepared,
                Err(e) => {
                    root.complete(Some("failed"));
                    return Err(e);
                }
            },
        };

        self.counters
            .discovered
            .store(files.len(), Ordering::SeqCst);
        info!(
            files = files.len(),
            total_bytes,
            root = %factory.root(),
            "starting upload"
        );

        root.add_to_total(total_bytes);
        root.set_label(format!("Uploading to {destination}"));

        let transfer = Arc::new(ChunkedTransfer::new(self.store.clone(), &self.options));
        let work_cancel = self.cancel.child_token();
        let mut seen = HashSet::new();

        let units = files.into_iter().map(|file| {
            let address = factory.locate(&file.relative_path);
            let duplicate = !seen.insert(address.clone());
            let transfer = Arc::clone(&transfer);
            let counters = Arc::clone(&self.counters);
            let cancel = work_cancel.clone();
            let root = root.clone();

            async move {
                let node = root.create_child(file.length);
                node.set_label(&file.relative_path);

                if duplicate {
                    node.complete(Some("failed"));
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    let e = UploadError::DuplicateAddress {
                        path: file.relative_path.clone(),
                        address: address.to_string(),
                    };
                    error!(error = %e, "upload failed");
                    return Err(e);
                }

                match transfer.upload(&file, &address, &node, &cancel).await {
                    Ok(FileOutcome::Uploaded) => {
                        counters.uploaded.fetch_add(1, Ordering::SeqCst);
                        counters.bytes.fetch_add(file.length, Ordering::SeqCst);
                        info!(path = %file.relative_path, bytes = file.length, "uploaded");
                        Ok(())
                    }
                    Ok(FileOutcome::Skipped) => {
                        counters.skipped.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                    Err(UploadError::Cancelled) => {
                        counters.cancelled.fetch_add(1, Ordering::SeqCst);
                        debug!(path = %file.relative_path, "upload cancelled");
                        Ok(())
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                        error!(
                            path = %file.relative_path,
                            address = %address,
                            error = %e,
                            "upload failed"
                        );
                        Err(e)
                    }
                }
            }
        });

        let result = BoundedWorkScheduler::new(self.options.concurrency, work_cancel.clone())
            .fail_fast(self.options.fail_fast)
            .run(units)
            .await;

        let summary = self.summary();
        if let Err(run_error) = result {
            root.complete(Some("failed"));
            return Err(UploadError::FilesFailed {
                failed: run_error.failed(),
                first: Box::new(run_error.first),
            });
        }
        if self.cancel.is_cancelled() {
            root.complete(Some("cancelled"));
            return Err(UploadError::Cancelled);
        }

        root.complete(None);
        info!(
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            bytes = summary.bytes,
            "upload finished"
        );
        Ok(summary)
    }
}
