//! Local file enumeration for upload.
//!
//! Walks a directory tree lazily and yields one [`FileRecord`] per regular,
//! non-empty file. Relative paths use `/` as separator on every platform.
//! Entries that cannot be read are logged and skipped so one bad directory
//! does not abort the whole walk.

use std::fs::{self, Metadata, ReadDir};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use driveup_protocol::FileRecord;
use tracing::{debug, warn};

use crate::error::UploadError;

/// Lazy, depth-first iterator over uploadable files below a root directory.
///
/// Skips directories, zero-length files, symlinks that point at directories
/// and (on Windows) entries carrying the system attribute.
pub struct FileWalker {
    root: PathBuf,
    stack: Vec<ReadDir>,
}

impl FileWalker {
    /// Starts a walk at `root`. Fails only if `root` itself cannot be listed.
    pub fn new(root: &Path) -> Result<Self, UploadError> {
        let entries = fs::read_dir(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            stack: vec![entries],
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record(&self, path: &Path, metadata: &Metadata) -> Option<FileRecord> {
        let rel_path = match path.strip_prefix(&self.root) {
            Ok(rel) => rel,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "entry outside walk root");
                return None;
            }
        };

        // Normalize to forward slashes.
        let relative_path = rel_path.to_string_lossy().replace('\\', "/");
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        Some(FileRecord {
            full_path: path.to_path_buf(),
            relative_path,
            length: metadata.len(),
            created: to_utc(metadata.created().unwrap_or(modified)),
            modified: to_utc(modified),
            accessed: to_utc(metadata.accessed().unwrap_or(modified)),
        })
    }
}

impl Iterator for FileWalker {
    type Item = FileRecord;

    fn next(&mut self) -> Option<FileRecord> {
        loop {
            let entry = match self.stack.last_mut()?.next() {
                None => {
                    self.stack.pop();
                    continue;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
                Some(Ok(entry)) => entry,
            };
            let path = entry.path();

            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping entry");
                    continue;
                }
            };

            if file_type.is_dir() {
                match fs::read_dir(&path) {
                    Ok(entries) => self.stack.push(entries),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping directory"),
                }
                continue;
            }

            // Follows symlinks, so a link to a file uploads the target.
            let metadata = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping entry");
                    continue;
                }
            };

            if !metadata.is_file() {
                debug!(path = %path.display(), "skipping non-file entry");
                continue;
            }
            if metadata.len() == 0 {
                debug!(path = %path.display(), "skipping empty file");
                continue;
            }
            if is_system(&metadata) {
                debug!(path = %path.display(), "skipping system file");
                continue;
            }

            if let Some(record) = self.record(&path, &metadata) {
                return Some(record);
            }
        }
    }
}

/// Scans a directory recursively and returns uploadable files.
///
/// Returns the file list and total size in bytes.
pub fn scan_files_for_upload(root_path: &Path) -> Result<(Vec<FileRecord>, u64), UploadError> {
    let files: Vec<FileRecord> = FileWalker::new(root_path)?.collect();
    let total_size = files.iter().map(|f| f.length).sum();
    Ok((files, total_size))
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

#[cfg(windows)]
fn is_system(metadata: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    metadata.file_attributes() & FILE_ATTRIBUTE_SYSTEM != 0
}

#[cfg(not(windows))]
fn is_system(_metadata: &Metadata) -> bool {
    false
}
