//! Building blocks for moving one file's bytes to a path-addressed store.
//!
//! - [`encode_path`] escapes a relative path for use inside an item address.
//! - [`ChunkReader`] reads arbitrary byte ranges of a local file.
//! - [`ProgressTree`] aggregates weighted progress across concurrent work.

mod chunked;
mod path;
mod progress;

pub use chunked::ChunkReader;
pub use path::{encode_path, join_remote_path};
pub use progress::{ProgressLine, ProgressNode, ProgressSnapshot, ProgressTree};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("range {start}-{end} is outside a {length}-byte file")]
    RangeOutOfBounds { start: u64, end: u64, length: u64 },
}
