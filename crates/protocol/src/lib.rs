//! Shared data model for driveup.
//!
//! Types here are exchanged between the enumeration, resolution, transfer
//! and remote-store layers. Nothing in this crate performs I/O.

pub mod constants;
pub mod session;
pub mod types;

pub use session::{ByteRange, ConflictBehavior, FileSystemInfo, UploadMetadata, UploadSession};
pub use types::{
    FileRecord, ItemParent, LookupScope, RemoteAddress, RemoteItem, RemoteItemReference,
    RemoteRoot,
};

/// Errors produced while interpreting protocol values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid byte range: {0}")]
    InvalidRange(String),
}
