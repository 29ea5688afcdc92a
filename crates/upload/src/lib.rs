//! Upload orchestration for a path-addressed remote drive.
//!
//! This crate holds the **business logic** of an upload run. It has no
//! transport dependencies: the application provides a [`RemoteStore`]
//! implementation that talks to the actual service.
//!
//! # Pipeline
//!
//! 1. **Resolve** the destination into a [`RemoteLocatorFactory`] while the
//!    source directory is **scanned**
//! 2. **Schedule** one transfer per file under a concurrency ceiling
//! 3. **Transfer** each file through a resumable upload session, retrying
//!    transient faults and cleaning up failed sessions

pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod scanner;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::UploadError;
pub use orchestrator::UploadOrchestrator;
pub use resolver::{RemoteLocatorFactory, resolve_destination};
pub use scanner::{FileWalker, scan_files_for_upload};
pub use scheduler::{BoundedWorkScheduler, RunError, RunStats};
pub use session::ChunkedTransfer;
pub use store::{ChunkOutcome, RemoteStore, SessionOutcome, StoreFuture};
pub use types::{FileOutcome, UploadOptions, UploadSummary};
