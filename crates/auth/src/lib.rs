//! Bearer credential management.
//!
//! [`CredentialLease`] keeps one credential valid for the lifetime of a run,
//! refreshing it in the background shortly before it expires. Token
//! acquisition itself is delegated to an [`AuthProvider`].

mod lease;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub use lease::CredentialLease;

/// Errors produced while acquiring or using a credential.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("authentication provider error: {0}")]
    Provider(String),

    #[error("authentication failed: {0}")]
    Failed(String),

    #[error("credential lease disposed")]
    Disposed,
}

/// An access token and the instant it stops being valid.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub expires_on: DateTime<Utc>,
    /// Identity the token was issued to; used for silent refresh.
    #[serde(default)]
    pub account: Option<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .field("account", &self.account)
            .finish()
    }
}

/// Result of a silent acquisition attempt.
#[derive(Debug, Clone)]
pub enum SilentOutcome {
    Acquired(Credential),
    /// The provider needs the user to confirm interactively.
    InteractionRequired,
}

/// Source of credentials.
///
/// Implemented by the application on top of whatever identity tooling it
/// uses; the lease only decides when to call it.
pub trait AuthProvider: Send + Sync {
    /// Re-acquires a token without user interaction.
    ///
    /// `account` is the identity of the previous credential when the
    /// provider reported one; providers that track a single cached identity
    /// receive `None`.
    fn acquire_silently<'a>(
        &'a self,
        account: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<SilentOutcome, AuthError>> + Send + 'a>>;

    /// Runs the full, possibly interactive, acquisition flow.
    fn acquire_interactively(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Credential, AuthError>> + Send + '_>>;
}
