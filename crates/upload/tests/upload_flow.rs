//! End-to-end runs of the orchestrator against an in-memory drive that
//! assembles uploaded bytes.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use driveup_protocol::{
    ByteRange, ConflictBehavior, LookupScope, RemoteAddress, RemoteItem, UploadMetadata,
    UploadSession,
};
use driveup_upload::{
    ChunkOutcome, RemoteStore, SessionOutcome, StoreFuture, UploadError, UploadOptions,
    UploadOrchestrator,
};
use tempfile::TempDir;

struct PartialUpload {
    address: String,
    data: Vec<u8>,
    length: u64,
}

#[derive(Default)]
struct FakeDrive {
    items: Mutex<HashMap<String, Vec<u8>>>,
    sessions: Mutex<HashMap<String, PartialUpload>>,
    next_id: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    deletes: AtomicUsize,
}

impl FakeDrive {
    fn with_existing(paths: &[&str]) -> Self {
        let drive = Self::default();
        {
            let mut items = drive.items.lock().unwrap();
            for path in paths {
                items.insert(path.to_string(), b"original".to_vec());
            }
        }
        drive
    }

    fn item(&self, address: &str) -> Option<Vec<u8>> {
        self.items.lock().unwrap().get(address).cloned()
    }

    fn received(&self, url: &str) -> u64 {
        self.sessions.lock().unwrap()[url].data.len() as u64
    }
}

impl RemoteStore for FakeDrive {
    fn lookup_by_name<'a>(
        &'a self,
        _scope: LookupScope,
        _name: &'a str,
        _limit: usize,
    ) -> StoreFuture<'a, Vec<RemoteItem>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn create_upload_session<'a>(
        &'a self,
        address: &'a RemoteAddress,
        metadata: &'a UploadMetadata,
        conflict: ConflictBehavior,
    ) -> StoreFuture<'a, SessionOutcome> {
        Box::pin(async move {
            assert_eq!(conflict, ConflictBehavior::Fail);
            let key = address.to_string();
            if self.items.lock().unwrap().contains_key(&key) {
                return Ok(SessionOutcome::Conflict);
            }

            let url = format!("fake://{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            self.sessions.lock().unwrap().insert(
                url.clone(),
                PartialUpload {
                    address: key,
                    data: Vec::new(),
                    length: metadata.file_size,
                },
            );
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_live.fetch_max(live, Ordering::SeqCst);

            Ok(SessionOutcome::Created(UploadSession {
                upload_url: url,
                expires_on: None,
                next_expected_ranges: vec![ByteRange::new(0, metadata.file_size)],
                file_length: metadata.file_size,
            }))
        })
    }

    fn pending_chunks<'a>(
        &'a self,
        session: &'a UploadSession,
        chunk_size: u64,
    ) -> StoreFuture<'a, Vec<ByteRange>> {
        Box::pin(async move {
            let received = self.received(&session.upload_url);
            Ok(ByteRange::new(received, session.file_length)
                .split(chunk_size)
                .collect())
        })
    }

    fn submit_chunk<'a>(
        &'a self,
        session: &'a UploadSession,
        range: ByteRange,
        data: Vec<u8>,
    ) -> StoreFuture<'a, ChunkOutcome> {
        Box::pin(async move {
            let mut sessions = self.sessions.lock().unwrap();
            let upload = sessions
                .get_mut(&session.upload_url)
                .ok_or_else(|| UploadError::Remote("unknown session".into()))?;
            if range.start != upload.data.len() as u64 {
                return Err(UploadError::Api {
                    status: 416,
                    body: format!("expected offset {}", upload.data.len()),
                });
            }
            upload.data.extend_from_slice(&data);
            if (upload.data.len() as u64) < upload.length {
                return Ok(ChunkOutcome::Accepted);
            }

            let done = sessions
                .remove(&session.upload_url)
                .ok_or_else(|| UploadError::Remote("unknown session".into()))?;
            self.items.lock().unwrap().insert(done.address, done.data);
            self.live.fetch_sub(1, Ordering::SeqCst);
            Ok(ChunkOutcome::Completed)
        })
    }

    fn refresh_session_status<'a>(
        &'a self,
        session: &'a mut UploadSession,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let received = self.received(&session.upload_url);
            session.next_expected_ranges = vec![ByteRange::new(received, session.file_length)];
            Ok(())
        })
    }

    fn delete_session<'a>(&'a self, session: &'a UploadSession) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if self
                .sessions
                .lock()
                .unwrap()
                .remove(&session.upload_url)
                .is_some()
            {
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

fn write(dir: &TempDir, rel: &str, data: &[u8]) {
    let path = dir.path().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, data).unwrap();
}

fn options(concurrency: usize) -> UploadOptions {
    UploadOptions {
        concurrency,
        chunk_size: 7,
        ..UploadOptions::default()
    }
}

#[tokio::test]
async fn uploaded_items_match_local_bytes() {
    let dir = TempDir::new().unwrap();
    let big: Vec<u8> = (0..100u8).collect();
    write(&dir, "Ryan's Files/doc (1).docx", b"document body");
    write(&dir, "Break#Out/saved_game[1].bin", &big);
    write(&dir, "FW%3asomething", b"x");
    write(&dir, "skip-me.txt", b"");

    let drive = Arc::new(FakeDrive::default());
    let orchestrator = UploadOrchestrator::new(drive.clone(), options(3));
    let summary = orchestrator.run(dir.path(), "Backups/2024").await.unwrap();

    assert_eq!(summary.uploaded, 3);
    assert_eq!(summary.bytes, 13 + 100 + 1);
    assert_eq!(
        drive.item("me/drive/root:/Backups/2024/Ryan's%20Files/doc%20(1).docx:"),
        Some(b"document body".to_vec())
    );
    assert_eq!(
        drive.item("me/drive/root:/Backups/2024/Break%23Out/saved_game[1].bin:"),
        Some(big)
    );
    assert_eq!(
        drive.item("me/drive/root:/Backups/2024/FW%253asomething:"),
        Some(b"x".to_vec())
    );
    assert_eq!(drive.items.lock().unwrap().len(), 3);
    assert_eq!(drive.live.load(Ordering::SeqCst), 0);
    assert_eq!(drive.deletes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn existing_items_are_left_untouched() {
    let dir = TempDir::new().unwrap();
    write(&dir, "keep.txt", b"new contents");
    write(&dir, "fresh.txt", b"fresh");

    let drive = Arc::new(FakeDrive::with_existing(&["me/drive/root:/Docs/keep.txt:"]));
    let orchestrator = UploadOrchestrator::new(drive.clone(), options(2));
    let summary = orchestrator.run(dir.path(), "Docs").await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.uploaded, 1);
    assert!(summary.is_clean());
    assert_eq!(
        drive.item("me/drive/root:/Docs/keep.txt:"),
        Some(b"original".to_vec())
    );
    assert_eq!(
        drive.item("me/drive/root:/Docs/fresh.txt:"),
        Some(b"fresh".to_vec())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn open_sessions_never_exceed_concurrency() {
    let dir = TempDir::new().unwrap();
    for i in 0..24 {
        write(&dir, &format!("batch/file-{i:02}.dat"), &vec![i as u8; 50 + i]);
    }

    let drive = Arc::new(FakeDrive::default());
    let orchestrator = UploadOrchestrator::new(drive.clone(), options(4));
    let summary = orchestrator.run(dir.path(), "Bulk").await.unwrap();

    assert_eq!(summary.uploaded, 24);
    assert!(drive.peak_live.load(Ordering::SeqCst) <= 4);
    let names: HashSet<String> = drive.items.lock().unwrap().keys().cloned().collect();
    assert!(names.contains("me/drive/root:/Bulk/batch/file-07.dat:"));
    assert_eq!(names.len(), 24);
}
