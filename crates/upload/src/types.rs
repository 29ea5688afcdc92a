use driveup_protocol::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, MAX_SESSION_ATTEMPTS};

/// Terminal state of one file that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Uploaded,
    /// An item already existed at the target address.
    Skipped,
}

/// Tunables for an upload run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Maximum number of files in flight at once.
    pub concurrency: usize,
    /// Upper bound for a single chunk, in bytes.
    pub chunk_size: u64,
    /// Whole-session attempts per file.
    pub max_attempts: u32,
    /// Stop starting new files after the first failure.
    pub fail_fast: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_attempts: MAX_SESSION_ATTEMPTS,
            fail_fast: false,
        }
    }
}

/// Counters describing a finished or interrupted run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub discovered: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Files interrupted by cancellation after they started.
    pub cancelled: usize,
    /// Files never started because the run was cancelled first.
    pub not_started: usize,
    /// Bytes of files that finished uploading.
    pub bytes: u64,
}

impl UploadSummary {
    /// True when every discovered file was uploaded or skipped.
    pub fn is_clean(&self) -> bool {
        self.uploaded + self.skipped == self.discovered
    }
}
