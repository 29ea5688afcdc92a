//! Resumable transfer of one file.

use std::sync::Arc;

use driveup_protocol::{
    ConflictBehavior, FileRecord, RemoteAddress, UploadMetadata, UploadSession,
};
use driveup_transfer::{ChunkReader, ProgressNode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::store::{ChunkOutcome, RemoteStore, SessionOutcome};
use crate::types::{FileOutcome, UploadOptions};

/// How one session attempt ended when it did not fail outright.
enum AttemptOutcome {
    Finished(FileOutcome),
    Transient(String),
}

/// Bytes pushed for one file and the size the progress node expects.
///
/// Survives retries so the expected size only ever grows.
struct ByteAccount {
    sent: u64,
    expected: u64,
}

/// Transfers single files through resumable upload sessions.
pub struct ChunkedTransfer {
    store: Arc<dyn RemoteStore>,
    chunk_size: u64,
    max_attempts: u32,
}

impl ChunkedTransfer {
    pub fn new(store: Arc<dyn RemoteStore>, options: &UploadOptions) -> Self {
        Self {
            store,
            chunk_size: options.chunk_size.max(1),
            max_attempts: options.max_attempts.max(1),
        }
    }

    /// Uploads `file` to `address`, reporting bytes on `progress`.
    ///
    /// `progress` is completed on every path, with an annotation unless the
    /// upload succeeded.
    pub async fn upload(
        &self,
        file: &FileRecord,
        address: &RemoteAddress,
        progress: &ProgressNode,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome, UploadError> {
        let result = self.upload_with_retry(file, address, progress, cancel).await;
        match &result {
            Ok(FileOutcome::Uploaded) => progress.complete(None),
            Ok(FileOutcome::Skipped) => progress.complete(Some("skipped, already exists")),
            Err(UploadError::Cancelled) => progress.complete(Some("cancelled")),
            Err(_) => progress.complete(Some("failed")),
        }
        result
    }

    async fn upload_with_retry(
        &self,
        file: &FileRecord,
        address: &RemoteAddress,
        progress: &ProgressNode,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome, UploadError> {
        let mut reader = ChunkReader::open(&file.full_path).await?;
        let mut metadata = UploadMetadata::for_file(file);
        metadata.file_size = reader.length();

        let mut account = ByteAccount {
            sent: 0,
            expected: file.length,
        };
        if reader.length() > account.expected {
            progress.add_to_total(reader.length() - account.expected);
            account.expected = reader.length();
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            check_cancelled(cancel)?;

            let outcome = self
                .attempt(
                    file,
                    address,
                    &metadata,
                    &mut reader,
                    &mut account,
                    progress,
                    cancel,
                )
                .await?;

            match outcome {
                AttemptOutcome::Finished(outcome) => return Ok(outcome),
                AttemptOutcome::Transient(reason) if attempt < self.max_attempts => {
                    warn!(
                        path = %file.relative_path,
                        attempt,
                        reason = %reason,
                        "transient fault, restarting upload session"
                    );
                }
                AttemptOutcome::Transient(reason) => {
                    return Err(UploadError::RetriesExhausted {
                        path: file.relative_path.clone(),
                        attempts: attempt,
                        last: reason,
                    });
                }
            }
        }
    }

    /// One session from creation to success, conflict, or cleanup.
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        file: &FileRecord,
        address: &RemoteAddress,
        metadata: &UploadMetadata,
        reader: &mut ChunkReader,
        account: &mut ByteAccount,
        progress: &ProgressNode,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome, UploadError> {
        let outcome = self
            .store
            .create_upload_session(address, metadata, ConflictBehavior::Fail)
            .await?;

        let mut session = match outcome {
            SessionOutcome::Created(session) => session,
            SessionOutcome::Conflict => {
                info!(path = %file.relative_path, "already exists remotely, skipping");
                return Ok(AttemptOutcome::Finished(FileOutcome::Skipped));
            }
            SessionOutcome::TransientFault(reason) => {
                return Ok(AttemptOutcome::Transient(reason));
            }
        };

        let result = self
            .drive_session(file, &mut session, reader, account, progress, cancel)
            .await;

        if !matches!(result, Ok(AttemptOutcome::Finished(FileOutcome::Uploaded))) {
            self.discard(file, &session).await;
        }
        result
    }

    /// Sends pending chunks until the server reports the item complete.
    async fn drive_session(
        &self,
        file: &FileRecord,
        session: &mut UploadSession,
        reader: &mut ChunkReader,
        account: &mut ByteAccount,
        progress: &ProgressNode,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome, UploadError> {
        loop {
            check_cancelled(cancel)?;

            let chunks = self.store.pending_chunks(session, self.chunk_size).await?;
            if chunks.is_empty() {
                return Err(UploadError::NoPendingChunks(file.relative_path.clone()));
            }

            let pending: u64 = chunks.iter().map(|c| c.len()).sum();
            let needed = account.sent + pending;
            if needed > account.expected {
                progress.add_to_total(needed - account.expected);
                account.expected = needed;
            }

            for range in chunks {
                check_cancelled(cancel)?;

                let data = reader.read_range(range).await?;
                match self.store.submit_chunk(session, range, data).await? {
                    ChunkOutcome::Completed => {
                        account.sent += range.len();
                        progress.advance(&file.relative_path, range.len());
                        debug!(path = %file.relative_path, bytes = account.sent, "upload complete");
                        return Ok(AttemptOutcome::Finished(FileOutcome::Uploaded));
                    }
                    ChunkOutcome::Accepted => {
                        account.sent += range.len();
                        progress.advance(&file.relative_path, range.len());
                    }
                    ChunkOutcome::TransientFault(reason) => {
                        return Ok(AttemptOutcome::Transient(reason));
                    }
                }
            }

            debug!(path = %file.relative_path, "batch sent without completion, refreshing status");
            self.store.refresh_session_status(session).await?;
        }
    }

    async fn discard(&self, file: &FileRecord, session: &UploadSession) {
        if let Err(e) = self.store.delete_session(session).await {
            warn!(path = %file.relative_path, error = %e, "failed to delete upload session");
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), UploadError> {
    if cancel.is_cancelled() {
        Err(UploadError::Cancelled)
    } else {
        Ok(())
    }
}
