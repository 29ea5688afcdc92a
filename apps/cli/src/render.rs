//! Terminal progress output.
//!
//! Redraws the active part of the progress tree on stderr, at most once per
//! interval. Intermediate snapshots are dropped.

use std::io::{IsTerminal, Write};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use driveup_transfer::{ProgressLine, ProgressSnapshot};
use driveup_upload::UploadSummary;

/// Files listed below the root line before the rest are folded.
const MAX_FILE_LINES: usize = 8;

/// Recently finished files with a note (skipped, failed) kept on screen.
const MAX_NOTED_LINES: usize = 3;

/// Renders snapshots until `stop` is cancelled or the tree goes away.
///
/// Does nothing when stderr is not a terminal; logs carry the outcome there.
pub async fn run(
    mut updates: watch::Receiver<ProgressSnapshot>,
    interval: Duration,
    stop: CancellationToken,
) {
    if !std::io::stderr().is_terminal() {
        stop.cancelled().await;
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut drawn = 0;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let frame = render_frame(&updates.borrow_and_update());
        drawn = redraw(&frame, drawn);
    }

    let frame = render_frame(&updates.borrow());
    redraw(&frame, drawn);
}

/// Overwrites the previous frame of `previous` lines; returns the new height.
fn redraw(frame: &[String], previous: usize) -> usize {
    let mut err = std::io::stderr().lock();
    if previous > 0 {
        let _ = write!(err, "\x1b[{previous}A\x1b[J");
    }
    for line in frame {
        let _ = writeln!(err, "{line}");
    }
    let _ = err.flush();
    frame.len()
}

/// Lines to draw for `snapshot`: the root, the active files, then the
/// latest finished files that carry a note.
pub fn render_frame(snapshot: &ProgressSnapshot) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut hidden = 0;
    for line in &snapshot.lines {
        if line.depth > 0 && lines.len() > MAX_FILE_LINES {
            hidden += 1;
            continue;
        }
        lines.push(format_line(line));
    }
    if hidden > 0 {
        lines.push(format!("  … and {hidden} more"));
    }

    let noted: Vec<&ProgressLine> = snapshot
        .finished
        .iter()
        .rev()
        .filter(|l| l.annotation.is_some())
        .take(MAX_NOTED_LINES)
        .collect();
    lines.extend(noted.into_iter().rev().map(format_line));
    lines
}

/// One progress line, indented by depth.
pub fn format_line(line: &ProgressLine) -> String {
    let indent = "  ".repeat(line.depth);
    let mut text = format!(
        "{indent}{:>5.1}% {} ({} / {})",
        line.fraction() * 100.0,
        line.label,
        format_bytes(line.completed),
        format_bytes(line.total)
    );
    if let Some(note) = &line.annotation {
        text.push_str(&format!(" [{note}]"));
    }
    text
}

/// The line printed after the run.
pub fn format_summary(summary: &UploadSummary) -> String {
    let mut text = format!(
        "{} uploaded, {} skipped, {} failed ({})",
        summary.uploaded,
        summary.skipped,
        summary.failed,
        format_bytes(summary.bytes)
    );
    let interrupted = summary.cancelled + summary.not_started;
    if interrupted > 0 {
        text.push_str(&format!(", {interrupted} not finished"));
    }
    text
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
