use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use driveup_protocol::ByteRange;

use crate::TransferError;

/// Reads byte ranges of a local file in whatever order the server asks for.
///
/// The length is captured when the file is opened; ranges beyond it are
/// rejected rather than silently shortened.
pub struct ChunkReader {
    file: File,
    path: PathBuf,
    length: u64,
    position: u64,
}

impl ChunkReader {
    /// Opens `path` for reading and records its current length.
    pub async fn open(path: &Path) -> Result<Self, TransferError> {
        let file = File::open(path).await?;
        let length = file.metadata().await?.len();
        debug!(path = %path.display(), length, "opened file for chunked read");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            length,
            position: 0,
        })
    }

    /// Reads exactly the bytes of `range`.
    pub async fn read_range(&mut self, range: ByteRange) -> Result<Vec<u8>, TransferError> {
        if range.start > range.end || range.end > self.length {
            return Err(TransferError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                length: self.length,
            });
        }

        if self.position != range.start {
            debug!(path = %self.path.display(), from = self.position, to = range.start, "seeking");
            self.file.seek(SeekFrom::Start(range.start)).await?;
        }

        let mut buf = vec![0u8; range.len() as usize];
        self.file.read_exact(&mut buf).await?;
        self.position = range.end;
        Ok(buf)
    }

    /// File length in bytes at open time.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
