//! Background credential refresh.
//!
//! One task owns the provider and the refresh timer. It publishes every new
//! credential on a `watch` channel; readers only ever clone the latest
//! published value, so a refresh in flight never blocks them and they never
//! observe a half-written credential.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{AuthError, AuthProvider, Credential, SilentOutcome};

/// Shortest wait between refreshes, for tokens issued with tiny lifetimes.
const MIN_REFRESH_DELAY: Duration = Duration::from_secs(1);

/// First delay after a failed refresh; doubles up to [`MAX_RETRY_DELAY`].
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(2);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
enum LeaseState {
    /// Initial authentication has not finished.
    Authenticating,
    Valid(Arc<Credential>),
    Failed(String),
}

/// A single bearer credential kept valid in the background.
///
/// Share it behind an `Arc`. Dropping the lease (or calling
/// [`dispose`](Self::dispose)) stops the refresh task; no further timer is
/// armed afterwards.
pub struct CredentialLease {
    state: watch::Receiver<LeaseState>,
    cancel: CancellationToken,
}

impl CredentialLease {
    /// Starts authenticating immediately and returns the lease.
    ///
    /// Each credential is refreshed `margin` before it expires. Must be called
    /// from within a tokio runtime.
    pub fn start(
        provider: Arc<dyn AuthProvider>,
        margin: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, state) = watch::channel(LeaseState::Authenticating);
        tokio::spawn(refresh_loop(provider, margin, tx, cancel.clone()));
        Self { state, cancel }
    }

    /// Waits for the initial authentication to finish.
    pub async fn initial_authentication(&self) -> Result<(), AuthError> {
        self.credential().await.map(|_| ())
    }

    /// Returns the current credential.
    ///
    /// Blocks only until the first authentication completes. While a refresh
    /// is running the previous credential is returned.
    pub async fn credential(&self) -> Result<Arc<Credential>, AuthError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|s| !matches!(s, LeaseState::Authenticating))
            .await
            .map_err(|_| AuthError::Disposed)?
            .clone();

        match state {
            LeaseState::Valid(credential) => Ok(credential),
            LeaseState::Failed(reason) => Err(AuthError::Failed(reason)),
            LeaseState::Authenticating => Err(AuthError::Disposed),
        }
    }

    /// Sets the request's bearer credential from the current token.
    pub async fn attach(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, AuthError> {
        let credential = self.credential().await?;
        Ok(request.bearer_auth(&credential.access_token))
    }

    /// Stops background refresh. In-flight acquisition is abandoned.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }
}

impl Drop for CredentialLease {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn refresh_loop(
    provider: Arc<dyn AuthProvider>,
    margin: Duration,
    tx: watch::Sender<LeaseState>,
    cancel: CancellationToken,
) {
    let mut current: Option<Arc<Credential>> = None;
    let mut expires_at = Instant::now();
    let mut retry_delay = INITIAL_RETRY_DELAY;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            r = authenticate(provider.as_ref(), current.as_deref()) => r,
        };

        let wait = match result {
            Ok(credential) => {
                let credential = Arc::new(credential);
                info!(
                    expires_on = %credential.expires_on,
                    account = credential.account.as_deref().unwrap_or("-"),
                    "credential acquired"
                );
                tx.send_replace(LeaseState::Valid(Arc::clone(&credential)));
                retry_delay = INITIAL_RETRY_DELAY;
                let lifetime = remaining_lifetime(&credential);
                expires_at = Instant::now() + lifetime;
                current = Some(credential);
                refresh_delay(lifetime, margin)
            }
            Err(e) => {
                if current.is_none() {
                    error!(error = %e, "initial authentication failed");
                    tx.send_replace(LeaseState::Failed(e.to_string()));
                    break;
                }
                let left = expires_at.saturating_duration_since(Instant::now());
                let wait = if left.is_zero() {
                    error!(error = %e, "credential expired and refresh failed");
                    tx.send_replace(LeaseState::Failed(e.to_string()));
                    retry_delay
                } else {
                    warn!(error = %e, "credential refresh failed, keeping current token");
                    retry_delay.min(left)
                };
                retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
                wait
            }
        };

        debug!(delay_ms = wait.as_millis() as u64, "next credential refresh scheduled");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    debug!("credential refresh stopped");
}

/// Interactive flow for the first credential. Later refreshes go silent
/// first and fall back to the interactive flow only when the provider asks
/// for it.
async fn authenticate(
    provider: &dyn AuthProvider,
    previous: Option<&Credential>,
) -> Result<Credential, AuthError> {
    if let Some(previous) = previous {
        let account = previous.account.as_deref();
        match provider.acquire_silently(account).await? {
            SilentOutcome::Acquired(credential) => return Ok(credential),
            SilentOutcome::InteractionRequired => {
                info!(
                    account = account.unwrap_or("-"),
                    "silent refresh needs interaction"
                );
            }
        }
    }
    provider.acquire_interactively().await
}

/// Time left before `credential` expires, zero if it already has.
fn remaining_lifetime(credential: &Credential) -> Duration {
    (credential.expires_on - Utc::now())
        .to_std()
        .unwrap_or_default()
}

fn refresh_delay(lifetime: Duration, margin: Duration) -> Duration {
    lifetime.saturating_sub(margin).max(MIN_REFRESH_DELAY)
}
