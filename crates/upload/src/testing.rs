//! In-memory [`RemoteStore`] for unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use driveup_protocol::{
    ByteRange, ConflictBehavior, FileRecord, ItemParent, LookupScope, RemoteAddress, RemoteItem,
    RemoteItemReference, UploadMetadata, UploadSession,
};
use tokio_util::sync::CancellationToken;

use crate::error::UploadError;
use crate::store::{ChunkOutcome, RemoteStore, SessionOutcome, StoreFuture};

/// How one session-creation call, and the session it opens, behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    Succeed,
    Conflict,
    CreateFault,
    /// The first chunk submission reports a transient fault.
    ChunkFault,
    /// The session never reports any pending range.
    NoPending,
    /// Accepts every chunk without completing, then asks for all bytes again.
    ResendOnce,
    /// Session creation fails with a non-retryable API error.
    Fatal,
}

#[derive(Default)]
pub(crate) struct MockState {
    pub lookups: Vec<(LookupScope, String, usize)>,
    pub created: Vec<RemoteAddress>,
    pub conflicts: Vec<ConflictBehavior>,
    pub submits: Vec<ByteRange>,
    pub deletes: usize,
    pub refreshes: usize,
    pub live: usize,
    pub max_live: usize,
    sessions: HashMap<String, SessionState>,
}

struct SessionState {
    attempt: Attempt,
    passes: usize,
}

pub(crate) struct MockStore {
    shared: Vec<RemoteItem>,
    root_children: Vec<RemoteItem>,
    fail_lookups: bool,
    script: Mutex<VecDeque<Attempt>>,
    cancel_on_submit: Option<CancellationToken>,
    state: Mutex<MockState>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            shared: Vec::new(),
            root_children: Vec::new(),
            fail_lookups: false,
            script: Mutex::new(VecDeque::new()),
            cancel_on_submit: None,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_shared(mut self, items: Vec<RemoteItem>) -> Self {
        self.shared = items;
        self
    }

    pub fn with_root_children(mut self, items: Vec<RemoteItem>) -> Self {
        self.root_children = items;
        self
    }

    pub fn failing_lookups(mut self) -> Self {
        self.fail_lookups = true;
        self
    }

    /// Behavior of successive session creations; later ones succeed.
    pub fn with_attempts(self, attempts: &[Attempt]) -> Self {
        self.script.lock().unwrap().extend(attempts.iter().copied());
        self
    }

    pub fn cancelling_on_submit(mut self, token: CancellationToken) -> Self {
        self.cancel_on_submit = Some(token);
        self
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn lookups(&self) -> Vec<(LookupScope, String, usize)> {
        self.state().lookups.clone()
    }

    pub fn creates(&self) -> usize {
        self.state().created.len()
    }
}

impl RemoteStore for MockStore {
    fn lookup_by_name<'a>(
        &'a self,
        scope: LookupScope,
        name: &'a str,
        limit: usize,
    ) -> StoreFuture<'a, Vec<RemoteItem>> {
        Box::pin(async move {
            self.state()
                .lookups
                .push((scope, name.to_string(), limit));
            if self.fail_lookups {
                return Err(UploadError::Api {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            let items = match scope {
                LookupScope::SharedWithMe => &self.shared,
                LookupScope::DriveRoot => &self.root_children,
            };
            Ok(items
                .iter()
                .filter(|i| i.name == name)
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn create_upload_session<'a>(
        &'a self,
        address: &'a RemoteAddress,
        metadata: &'a UploadMetadata,
        conflict: ConflictBehavior,
    ) -> StoreFuture<'a, SessionOutcome> {
        Box::pin(async move {
            let attempt = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Attempt::Succeed);
            let mut state = self.state();
            state.created.push(address.clone());
            state.conflicts.push(conflict);

            match attempt {
                Attempt::Conflict => return Ok(SessionOutcome::Conflict),
                Attempt::CreateFault => {
                    return Ok(SessionOutcome::TransientFault("create fault".into()));
                }
                Attempt::Fatal => {
                    return Err(UploadError::Api {
                        status: 400,
                        body: "bad request".into(),
                    });
                }
                _ => {}
            }

            let url = format!("mock://session/{}", state.created.len());
            state.live += 1;
            state.max_live = state.max_live.max(state.live);
            state
                .sessions
                .insert(url.clone(), SessionState { attempt, passes: 0 });

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
            let state = self.state();
            if state.sessions[&session.upload_url].attempt == Attempt::NoPending {
                return Ok(Vec::new());
            }
            Ok(session.pending_chunks(chunk_size))
        })
    }

    fn submit_chunk<'a>(
        &'a self,
        session: &'a UploadSession,
        range: ByteRange,
        data: Vec<u8>,
    ) -> StoreFuture<'a, ChunkOutcome> {
        Box::pin(async move {
            assert_eq!(data.len() as u64, range.len());
            if let Some(token) = &self.cancel_on_submit {
                token.cancel();
            }

            let mut state = self.state();
            state.submits.push(range);
            let entry = state
                .sessions
                .get_mut(&session.upload_url)
                .expect("unknown session");

            let outcome = match entry.attempt {
                Attempt::ChunkFault if range.start == 0 => {
                    ChunkOutcome::TransientFault("null state".into())
                }
                Attempt::ResendOnce if entry.passes == 0 => ChunkOutcome::Accepted,
                _ if range.end == session.file_length => ChunkOutcome::Completed,
                _ => ChunkOutcome::Accepted,
            };
            if outcome == ChunkOutcome::Completed {
                state.live -= 1;
            }
            Ok(outcome)
        })
    }

    fn refresh_session_status<'a>(
        &'a self,
        session: &'a mut UploadSession,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state();
            state.refreshes += 1;
            let entry = state
                .sessions
                .get_mut(&session.upload_url)
                .expect("unknown session");
            entry.passes += 1;
            session.next_expected_ranges = match entry.attempt {
                Attempt::ResendOnce if entry.passes == 1 => {
                    vec![ByteRange::new(0, session.file_length)]
                }
                _ => Vec::new(),
            };
            Ok(())
        })
    }

    fn delete_session<'a>(&'a self, _session: &'a UploadSession) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state();
            state.deletes += 1;
            state.live = state.live.saturating_sub(1);
            Ok(())
        })
    }
}

pub(crate) fn folder(name: &str, id: &str) -> RemoteItem {
    RemoteItem {
        id: id.into(),
        name: name.into(),
        remote_item: None,
    }
}

pub(crate) fn shared_folder(name: &str, drive_id: &str, remote_id: &str) -> RemoteItem {
    RemoteItem {
        id: format!("local-{remote_id}"),
        name: name.into(),
        remote_item: Some(RemoteItemReference {
            id: remote_id.into(),
            parent_reference: Some(ItemParent {
                drive_id: Some(drive_id.into()),
            }),
        }),
    }
}

/// Writes `data` to `dir/name` and describes it as an enumerated file.
pub(crate) fn write_file(dir: &Path, name: &str, data: &[u8]) -> FileRecord {
    let full_path = dir.join(name);
    std::fs::write(&full_path, data).unwrap();
    let now = Utc::now();
    FileRecord {
        full_path,
        relative_path: name.to_string(),
        length: data.len() as u64,
        created: now,
        modified: now,
        accessed: now,
    }
}
