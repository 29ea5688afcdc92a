//! Upload error types.

use driveup_auth::AuthError;
use driveup_protocol::ProtocolError;
use driveup_transfer::TransferError;

/// Errors produced during an upload run.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("more than one shared or root item named '{0}' was found")]
    AmbiguousDestination(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("server expects no more ranges for '{0}' but never reported completion")]
    NoPendingChunks(String),

    #[error("'{path}' still failing after {attempts} attempts: {last}")]
    RetriesExhausted {
        path: String,
        attempts: u32,
        last: String,
    },

    #[error("'{path}' maps to {address}, already used by another file")]
    DuplicateAddress { path: String, address: String },

    #[error("cancelled")]
    Cancelled,

    #[error("task join error: {0}")]
    Join(String),

    #[error("{failed} file(s) failed to upload; first error: {first}")]
    FilesFailed {
        failed: usize,
        first: Box<UploadError>,
    },
}

impl From<tokio::task::JoinError> for UploadError {
    fn from(e: tokio::task::JoinError) -> Self {
        UploadError::Join(e.to_string())
    }
}
