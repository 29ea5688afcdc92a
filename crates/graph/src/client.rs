//! Graph drive client.
//!
//! API requests carry the lease's bearer token and a `client-request-id`
//! for server-side correlation. Upload URLs are pre-authorized and are
//! called without a token.

use std::sync::Arc;

use reqwest::header::CONTENT_RANGE;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use uuid::Uuid;

use driveup_auth::{AuthError, CredentialLease};
use driveup_protocol::{
    ByteRange, ConflictBehavior, LookupScope, ProtocolError, RemoteAddress, RemoteItem,
    UploadMetadata, UploadSession,
};
use driveup_upload::{ChunkOutcome, RemoteStore, SessionOutcome, StoreFuture, UploadError};

use crate::types::{CreateSessionRequest, ItemCollection, SessionItem, UploadSessionBody};

const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const CLIENT_REQUEST_ID: &str = "client-request-id";

/// Errors from the Graph client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("upload session response is missing its upload URL")]
    MissingUploadUrl,
}

impl From<Error> for UploadError {
    fn from(e: Error) -> Self {
        match e {
            Error::Api { status, body } => UploadError::Api { status, body },
            Error::Auth(e) => UploadError::Auth(e),
            Error::Protocol(e) => UploadError::Protocol(e),
            other => UploadError::Remote(other.to_string()),
        }
    }
}

/// Graph drive client.
pub struct GraphClient {
    http: reqwest::Client,
    lease: Arc<CredentialLease>,
    base_url: String,
}

impl GraphClient {
    /// Creates a client that authenticates through `lease`.
    pub fn new(lease: Arc<CredentialLease>) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("driveup/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            lease,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Sets a custom API root, e.g. a national cloud or a test server.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Builds an authenticated API request.
    async fn api(&self, method: Method, path: &str) -> Result<RequestBuilder, Error> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let request = self
            .http
            .request(method, url)
            .header(CLIENT_REQUEST_ID, Uuid::new_v4().to_string());
        Ok(self.lease.attach(request).await?)
    }

    /// Lists items named `name` in `scope`.
    pub async fn lookup(
        &self,
        scope: LookupScope,
        name: &str,
        limit: usize,
    ) -> Result<Vec<RemoteItem>, Error> {
        let path = match scope {
            LookupScope::SharedWithMe => "me/drive/sharedWithMe",
            LookupScope::DriveRoot => "me/drive/root/children",
        };
        let params = [
            ("$filter", name_filter(name)),
            ("$top", limit.to_string()),
        ];

        let resp = self.api(Method::GET, path).await?.query(&params).send().await?;
        let resp = check_status(resp).await?;
        let list: ItemCollection = serde_json::from_slice(&resp.bytes().await?)?;
        debug!(?scope, name, found = list.value.len(), "lookup complete");
        Ok(list.value)
    }

    /// Opens a resumable upload session at `address`.
    pub async fn create_session(
        &self,
        address: &RemoteAddress,
        metadata: &UploadMetadata,
        conflict: ConflictBehavior,
    ) -> Result<SessionOutcome, Error> {
        let body = CreateSessionRequest {
            item: SessionItem {
                conflict_behavior: conflict,
                metadata,
            },
        };
        let request = self
            .api(Method::POST, &format!("{address}/createUploadSession"))
            .await?
            .json(&body);

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) if is_transient(&e) => return Ok(SessionOutcome::TransientFault(e.to_string())),
            Err(e) => return Err(e.into()),
        };

        let status = resp.status();
        if status == StatusCode::CONFLICT {
            debug!(%address, "item already exists");
            return Ok(SessionOutcome::Conflict);
        }
        if is_transient_status(status) {
            let body = resp.text().await.unwrap_or_default();
            return Ok(SessionOutcome::TransientFault(format!("{status}: {body}")));
        }

        let resp = check_status(resp).await?;
        let body: UploadSessionBody = serde_json::from_slice(&resp.bytes().await?)?;
        let upload_url = body.upload_url.clone().ok_or(Error::MissingUploadUrl)?;

        let mut session = UploadSession {
            upload_url,
            expires_on: None,
            next_expected_ranges: Vec::new(),
            file_length: metadata.file_size,
        };
        apply_status(&mut session, body)?;
        debug!(%address, expires_on = ?session.expires_on, "upload session created");
        Ok(SessionOutcome::Created(session))
    }

    /// Sends one chunk to the session's upload URL.
    pub async fn put_chunk(
        &self,
        session: &UploadSession,
        range: ByteRange,
        data: Vec<u8>,
    ) -> Result<ChunkOutcome, Error> {
        let request = self
            .http
            .put(&session.upload_url)
            .header(CONTENT_RANGE, range.content_range(session.file_length))
            .body(data);

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) if is_transient(&e) => return Ok(ChunkOutcome::TransientFault(e.to_string())),
            Err(e) => return Err(e.into()),
        };

        let status = resp.status();
        match status {
            StatusCode::OK | StatusCode::CREATED => Ok(ChunkOutcome::Completed),
            StatusCode::ACCEPTED => Ok(ChunkOutcome::Accepted),
            StatusCode::RANGE_NOT_SATISFIABLE => {
                warn!(range = %range.content_range(session.file_length), "range already received");
                Ok(ChunkOutcome::Accepted)
            }
            s if is_transient_status(s) => {
                let body = resp.text().await.unwrap_or_default();
                Ok(ChunkOutcome::TransientFault(format!("{s}: {body}")))
            }
            _ => Err(api_error(resp).await),
        }
    }

    /// Re-reads the ranges the server still expects.
    pub async fn session_status(&self, session: &mut UploadSession) -> Result<(), Error> {
        let resp = self.http.get(&session.upload_url).send().await?;
        let resp = check_status(resp).await?;
        let body: UploadSessionBody = serde_json::from_slice(&resp.bytes().await?)?;
        apply_status(session, body)
    }

    /// Cancels the session. A session the server already forgot is fine.
    pub async fn cancel_session(&self, session: &UploadSession) -> Result<(), Error> {
        let resp = self.http.delete(&session.upload_url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(resp).await?;
        Ok(())
    }
}

impl RemoteStore for GraphClient {
    fn lookup_by_name<'a>(
        &'a self,
        scope: LookupScope,
        name: &'a str,
        limit: usize,
    ) -> StoreFuture<'a, Vec<RemoteItem>> {
        Box::pin(async move { Ok(self.lookup(scope, name, limit).await?) })
    }

    fn create_upload_session<'a>(
        &'a self,
        address: &'a RemoteAddress,
        metadata: &'a UploadMetadata,
        conflict: ConflictBehavior,
    ) -> StoreFuture<'a, SessionOutcome> {
        Box::pin(async move { Ok(self.create_session(address, metadata, conflict).await?) })
    }

    fn pending_chunks<'a>(
        &'a self,
        session: &'a UploadSession,
        chunk_size: u64,
    ) -> StoreFuture<'a, Vec<ByteRange>> {
        Box::pin(async move { Ok(session.pending_chunks(chunk_size)) })
    }

    fn submit_chunk<'a>(
        &'a self,
        session: &'a UploadSession,
        range: ByteRange,
        data: Vec<u8>,
    ) -> StoreFuture<'a, ChunkOutcome> {
        Box::pin(async move { Ok(self.put_chunk(session, range, data).await?) })
    }

    fn refresh_session_status<'a>(
        &'a self,
        session: &'a mut UploadSession,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move { Ok(self.session_status(session).await?) })
    }

    fn delete_session<'a>(&'a self, session: &'a UploadSession) -> StoreFuture<'a, ()> {
        Box::pin(async move { Ok(self.cancel_session(session).await?) })
    }
}

/// OData filter matching an exact name. Quotes are doubled.
fn name_filter(name: &str) -> String {
    format!("name eq '{}'", name.replace('\'', "''"))
}

fn apply_status(session: &mut UploadSession, body: UploadSessionBody) -> Result<(), Error> {
    let ranges = body
        .next_expected_ranges
        .iter()
        .map(|r| ByteRange::parse(r, session.file_length))
        .collect::<Result<Vec<_>, _>>()?;
    session.next_expected_ranges = ranges;
    if body.expiration_date_time.is_some() {
        session.expires_on = body.expiration_date_time;
    }
    Ok(())
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

async fn check_status(resp: Response) -> Result<Response, Error> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(api_error(resp).await)
    }
}

async fn api_error(resp: Response) -> Error {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Error::Api { status, body }
}
