//! Token acquisition through an external helper command.
//!
//! The helper is run with `DRIVEUP_AUTH_MODE` set to `silent` or
//! `interactive`. On success it prints a JSON credential on stdout:
//!
//! ```json
//! {"access_token": "...", "expires_on": "2024-01-01T12:00:00Z", "account": "me@example.com"}
//! ```
//!
//! `expires_in` (seconds) may be given instead of `expires_on`. In silent
//! mode, exit status 10 means the user has to sign in interactively.

use std::future::Future;
use std::pin::Pin;
use std::process::{Output, Stdio};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use driveup_auth::{AuthError, AuthProvider, Credential, SilentOutcome};

const MODE_VAR: &str = "DRIVEUP_AUTH_MODE";
const ACCOUNT_VAR: &str = "DRIVEUP_ACCOUNT";
const INTERACTION_REQUIRED: i32 = 10;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<DateTime<Utc>>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    account: Option<String>,
}

/// [`AuthProvider`] backed by a helper program.
pub struct CommandTokenProvider {
    program: String,
    args: Vec<String>,
}

impl CommandTokenProvider {
    /// `command` is the program followed by its arguments.
    pub fn new(command: &[String]) -> anyhow::Result<Self> {
        let Some((program, args)) = command.split_first() else {
            anyhow::bail!("auth_command is not configured; set it in the configuration file");
        };
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn command(&self, mode: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).env(MODE_VAR, mode).kill_on_drop(true);
        cmd
    }

    async fn run_silent(&self, account: Option<&str>) -> Result<SilentOutcome, AuthError> {
        let mut cmd = self.command("silent");
        match account {
            Some(account) => cmd.env(ACCOUNT_VAR, account),
            None => cmd.env_remove(ACCOUNT_VAR),
        };
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        match output.status.code() {
            Some(0) => parse_credential(&output.stdout, Utc::now()).map(SilentOutcome::Acquired),
            Some(INTERACTION_REQUIRED) => {
                debug!(
                    account = account.unwrap_or("-"),
                    "helper reports interaction required"
                );
                Ok(SilentOutcome::InteractionRequired)
            }
            _ => Err(self.exit_error(&output)),
        }
    }

    async fn run_interactive(&self) -> Result<Credential, AuthError> {
        let output = self
            .command("interactive")
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(self.exit_error(&output));
        }
        parse_credential(&output.stdout, Utc::now())
    }

    fn spawn_error(&self, e: std::io::Error) -> AuthError {
        AuthError::Provider(format!("failed to run '{}': {e}", self.program))
    }

    fn exit_error(&self, output: &Output) -> AuthError {
        let stderr = String::from_utf8_lossy(&output.stderr);
        AuthError::Provider(format!(
            "'{}' exited with {}: {}",
            self.program,
            output.status,
            stderr.trim()
        ))
    }
}

impl AuthProvider for CommandTokenProvider {
    fn acquire_silently<'a>(
        &'a self,
        account: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<SilentOutcome, AuthError>> + Send + 'a>> {
        Box::pin(self.run_silent(account))
    }

    fn acquire_interactively(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Credential, AuthError>> + Send + '_>> {
        Box::pin(self.run_interactive())
    }
}

/// Parses the helper's stdout into a credential.
fn parse_credential(stdout: &[u8], now: DateTime<Utc>) -> Result<Credential, AuthError> {
    let resp: TokenResponse = serde_json::from_slice(stdout)
        .map_err(|e| AuthError::Provider(format!("invalid helper output: {e}")))?;

    let expires_on = match (resp.expires_on, resp.expires_in) {
        (Some(at), _) => at,
        (None, Some(secs)) => now + chrono::Duration::seconds(secs),
        (None, None) => {
            return Err(AuthError::Provider(
                "helper output has neither expires_on nor expires_in".into(),
            ));
        }
    };
    if resp.access_token.is_empty() {
        return Err(AuthError::Provider("helper returned an empty token".into()));
    }

    Ok(Credential {
        access_token: resp.access_token,
        expires_on,
        account: resp.account,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn parses_absolute_expiry() {
        let json = br#"{"access_token":"abc","expires_on":"2024-05-01T13:00:00Z","account":"me@example.com"}"#;
        let cred = parse_credential(json, now()).unwrap();
        assert_eq!(cred.access_token, "abc");
        assert_eq!(cred.expires_on, now() + chrono::Duration::hours(1));
        assert_eq!(cred.account.as_deref(), Some("me@example.com"));
    }

    #[test]
    fn parses_relative_expiry() {
        let cred = parse_credential(br#"{"access_token":"abc","expires_in":600}"#, now()).unwrap();
        assert_eq!(cred.expires_on, now() + chrono::Duration::minutes(10));
        assert!(cred.account.is_none());
    }

    #[test]
    fn rejects_missing_expiry_and_garbage() {
        assert!(parse_credential(br#"{"access_token":"abc"}"#, now()).is_err());
        assert!(parse_credential(br#"{"access_token":"","expires_in":5}"#, now()).is_err());
        assert!(parse_credential(b"not json", now()).is_err());
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandTokenProvider::new(&[]).is_err());
    }

    #[cfg(unix)]
    fn shell(script: &str) -> CommandTokenProvider {
        CommandTokenProvider::new(&["sh".to_string(), "-c".to_string(), script.to_string()])
            .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_passes_account_and_mode() {
        let provider = shell(
            r#"printf '{"access_token":"%s-%s","expires_in":60}' "$DRIVEUP_AUTH_MODE" "$DRIVEUP_ACCOUNT""#,
        );

        let outcome = provider.acquire_silently(Some("me@example.com")).await.unwrap();
        let SilentOutcome::Acquired(cred) = outcome else {
            panic!("expected a credential");
        };
        assert_eq!(cred.access_token, "silent-me@example.com");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_without_account_leaves_variable_unset() {
        let provider = shell(
            r#"printf '{"access_token":"%s-%s","expires_in":60}' "$DRIVEUP_AUTH_MODE" "${DRIVEUP_ACCOUNT-unset}""#,
        );

        let outcome = provider.acquire_silently(None).await.unwrap();
        let SilentOutcome::Acquired(cred) = outcome else {
            panic!("expected a credential");
        };
        assert_eq!(cred.access_token, "silent-unset");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_ten_requires_interaction() {
        let provider = shell("exit 10");
        let outcome = provider.acquire_silently(Some("me")).await.unwrap();
        assert!(matches!(outcome, SilentOutcome::InteractionRequired));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn other_failures_carry_stderr() {
        let provider = shell("echo 'no network' >&2; exit 3");
        let err = provider.acquire_silently(Some("me")).await.unwrap_err();
        assert!(matches!(err, AuthError::Provider(ref msg) if msg.contains("no network")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn interactive_reads_stdout() {
        let provider = shell(
            r#"printf '{"access_token":"%s","expires_in":60,"account":"a@b"}' "$DRIVEUP_AUTH_MODE""#,
        );
        let cred = provider.acquire_interactively().await.unwrap();
        assert_eq!(cred.access_token, "interactive");
        assert_eq!(cred.account.as_deref(), Some("a@b"));
    }

    #[tokio::test]
    async fn missing_program_is_provider_error() {
        let provider =
            CommandTokenProvider::new(&["/nonexistent/driveup-token-helper".to_string()]).unwrap();
        let err = provider.acquire_interactively().await.unwrap_err();
        assert!(matches!(err, AuthError::Provider(_)));
    }
}
