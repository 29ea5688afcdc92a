use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ProtocolError;
use crate::types::FileRecord;

/// Half-open byte range `[start, end)` within one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parses a server range such as `"0-1023"` (inclusive) or the
    /// open-ended `"1024-"`, which runs to the end of the file.
    pub fn parse(value: &str, file_length: u64) -> Result<Self, ProtocolError> {
        let (start, end) = value
            .split_once('-')
            .ok_or_else(|| ProtocolError::InvalidRange(value.to_string()))?;
        let start: u64 = start
            .trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidRange(value.to_string()))?;
        let end = match end.trim() {
            "" => file_length,
            last => last
                .parse::<u64>()
                .map_err(|_| ProtocolError::InvalidRange(value.to_string()))?
                .saturating_add(1)
                .min(file_length),
        };
        if start > end {
            return Err(ProtocolError::InvalidRange(value.to_string()));
        }
        Ok(Self { start, end })
    }

    /// Formats the range as an HTTP `Content-Range` value.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end.saturating_sub(1), total)
    }

    /// Splits the range into consecutive pieces of at most `chunk_size` bytes.
    pub fn split(self, chunk_size: u64) -> impl Iterator<Item = ByteRange> {
        let step = chunk_size.max(1);
        let mut cursor = self.start;
        std::iter::from_fn(move || {
            if cursor >= self.end {
                return None;
            }
            let end = cursor.saturating_add(step).min(self.end);
            let piece = ByteRange::new(cursor, end);
            cursor = end;
            Some(piece)
        })
    }
}

/// What the server does when an item already exists at the target address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictBehavior {
    Fail,
    Replace,
    Rename,
}

/// Local timestamps preserved on the uploaded item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemInfo {
    pub created_date_time: DateTime<Utc>,
    pub last_modified_date_time: DateTime<Utc>,
    pub last_accessed_date_time: DateTime<Utc>,
}

/// Item properties sent when creating an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub file_size: u64,
    pub file_system_info: FileSystemInfo,
}

impl UploadMetadata {
    pub fn for_file(file: &FileRecord) -> Self {
        Self {
            file_size: file.length,
            file_system_info: FileSystemInfo {
                created_date_time: file.created,
                last_modified_date_time: file.modified,
                last_accessed_date_time: file.accessed,
            },
        }
    }
}

/// Server-issued resumable upload session and the ranges it still expects.
///
/// Owned by exactly one transfer for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_url: String,
    pub expires_on: Option<DateTime<Utc>>,
    pub next_expected_ranges: Vec<ByteRange>,
    pub file_length: u64,
}

impl UploadSession {
    /// Splits the outstanding ranges into chunks, in increasing offset order.
    pub fn pending_chunks(&self, chunk_size: u64) -> Vec<ByteRange> {
        let mut ranges = self.next_expected_ranges.clone();
        ranges.sort_by_key(|r| r.start);
        ranges
            .into_iter()
            .filter(|r| !r.is_empty())
            .flat_map(|r| r.split(chunk_size))
            .collect()
    }

    /// Total bytes the server still expects.
    pub fn pending_bytes(&self) -> u64 {
        self.next_expected_ranges.iter().map(ByteRange::len).sum()
    }
}
