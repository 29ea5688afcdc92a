use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Upload a local directory tree into a OneDrive folder.
///
/// Files that already exist at the destination are skipped. The destination
/// may start with the name of a folder shared with you.
#[derive(Parser, Debug)]
#[command(author, version)]
pub struct Cli {
    /// Local directory to upload.
    pub source: PathBuf,

    /// Remote folder path, e.g. `Backups/laptop` or `Shared Team/Inbox`.
    pub destination: String,

    #[arg(long, help = "Configuration file (defaults to the per-user config path)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Maximum number of files uploaded at once")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Stop starting new files after the first failure")]
    pub fail_fast: bool,

    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
