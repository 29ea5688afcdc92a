//! Remote store seam.
//!
//! `RemoteStore` is implemented by the application on top of the actual
//! drive API. Keeping it a trait keeps resolution and transfer logic
//! independent of HTTP and testable with in-memory stores.

use std::future::Future;
use std::pin::Pin;

use driveup_protocol::{
    ByteRange, ConflictBehavior, LookupScope, RemoteAddress, RemoteItem, UploadMetadata,
    UploadSession,
};

use crate::error::UploadError;

/// Boxed future returned by [`RemoteStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// Result of asking the server for an upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Created(UploadSession),
    /// An item already exists at the address and the conflict behavior was `fail`.
    Conflict,
    /// Worth retrying with a fresh session.
    TransientFault(String),
}

/// Result of submitting one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The item is complete on the server.
    Completed,
    /// The chunk was stored; more ranges are expected.
    Accepted,
    /// Worth retrying with a fresh session.
    TransientFault(String),
}

/// Abstract connection to the remote drive.
///
/// Errors returned as `Err` are fatal for the file being transferred.
/// Conditions worth a retry are reported through the `TransientFault`
/// variants instead.
pub trait RemoteStore: Send + Sync {
    /// Lists at most `limit` items in `scope` whose name equals `name`.
    fn lookup_by_name<'a>(
        &'a self,
        scope: LookupScope,
        name: &'a str,
        limit: usize,
    ) -> StoreFuture<'a, Vec<RemoteItem>>;

    /// Opens a resumable upload session for `address`.
    fn create_upload_session<'a>(
        &'a self,
        address: &'a RemoteAddress,
        metadata: &'a UploadMetadata,
        conflict: ConflictBehavior,
    ) -> StoreFuture<'a, SessionOutcome>;

    /// Ranges the server still expects, split into chunks of at most
    /// `chunk_size` bytes in increasing offset order.
    fn pending_chunks<'a>(
        &'a self,
        session: &'a UploadSession,
        chunk_size: u64,
    ) -> StoreFuture<'a, Vec<ByteRange>>;

    /// Sends the bytes of `range`.
    fn submit_chunk<'a>(
        &'a self,
        session: &'a UploadSession,
        range: ByteRange,
        data: Vec<u8>,
    ) -> StoreFuture<'a, ChunkOutcome>;

    /// Re-reads the expected ranges of `session` from the server.
    fn refresh_session_status<'a>(&'a self, session: &'a mut UploadSession)
    -> StoreFuture<'a, ()>;

    /// Discards `session` and any bytes it holds.
    fn delete_session<'a>(&'a self, session: &'a UploadSession) -> StoreFuture<'a, ()>;
}
