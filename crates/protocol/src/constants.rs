//! Protocol constants shared across crates.

use std::time::Duration;

/// Separator used by the remote namespace.
pub const REMOTE_SEPARATOR: char = '/';

/// Default number of files transferred concurrently.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Whole-session attempts per file before a transient fault becomes fatal.
pub const MAX_SESSION_ATTEMPTS: u32 = 5;

/// Result cap for by-name lookups. Two is enough to detect ambiguity.
pub const LOOKUP_LIMIT: usize = 2;

/// Upload chunks must be a multiple of 320 KiB.
pub const CHUNK_ALIGNMENT: u64 = 320 * 1024;

/// Default chunk size: 5 MiB (16 × 320 KiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * CHUNK_ALIGNMENT;

/// How long before expiry a credential is refreshed.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(4);
