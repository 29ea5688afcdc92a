//! Uploader configuration.
//!
//! Configuration is stored as TOML:
//! - Linux/macOS: `~/.config/driveup/config.toml`
//! - Windows: `%APPDATA%/driveup/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use driveup_protocol::constants::{
    CHUNK_ALIGNMENT, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, MAX_SESSION_ATTEMPTS,
    REFRESH_MARGIN,
};
use driveup_upload::UploadOptions;

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Graph API root.
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,

    /// Files uploaded concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upload chunk size in KiB; a multiple of 320.
    #[serde(default = "default_chunk_size_kib")]
    pub chunk_size_kib: u64,

    /// Whole-session attempts per file on transient faults.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds before expiry a token is refreshed.
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,

    #[serde(default)]
    pub fail_fast: bool,

    /// Token helper program followed by its arguments.
    #[serde(default)]
    pub auth_command: Vec<String>,

    /// Minimum delay between progress redraws.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".into()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_chunk_size_kib() -> u64 {
    DEFAULT_CHUNK_SIZE / 1024
}

fn default_max_attempts() -> u32 {
    MAX_SESSION_ATTEMPTS
}

fn default_refresh_margin_secs() -> u64 {
    REFRESH_MARGIN.as_secs()
}

fn default_progress_interval_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            graph_base_url: default_graph_base_url(),
            concurrency: default_concurrency(),
            chunk_size_kib: default_chunk_size_kib(),
            max_attempts: default_max_attempts(),
            refresh_margin_secs: default_refresh_margin_secs(),
            fail_fast: false,
            auth_command: Vec::new(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path(),
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Rejects settings the uploader cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        let alignment_kib = CHUNK_ALIGNMENT / 1024;
        if self.chunk_size_kib == 0 || self.chunk_size_kib % alignment_kib != 0 {
            bail!(
                "chunk_size_kib must be a positive multiple of {alignment_kib}, got {}",
                self.chunk_size_kib
            );
        }
        if self.graph_base_url.trim().is_empty() {
            bail!("graph_base_url must not be empty");
        }
        Ok(())
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            concurrency: self.concurrency,
            chunk_size: self.chunk_size_kib * 1024,
            max_attempts: self.max_attempts,
            fail_fast: self.fail_fast,
        }
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("driveup").join("config.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("driveup")
            .join("config.toml")
    }
}
