//! Bounded-concurrency execution of independent units of work.

use std::fmt;
use std::future::Future;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Failure of a scheduler run: the first error plus any that came after it.
#[derive(Debug)]
pub struct RunError<E> {
    pub first: E,
    pub suppressed: Vec<E>,
}

impl<E> RunError<E> {
    /// Number of units that failed.
    pub fn failed(&self) -> usize {
        1 + self.suppressed.len()
    }
}

impl<E: fmt::Display> fmt::Display for RunError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first)?;
        if !self.suppressed.is_empty() {
            write!(f, " (and {} more failure(s))", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RunError<E> {}

/// How many units a run started and how many it never got to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub started: usize,
    pub not_started: usize,
}

/// Runs units with at most `limit` in flight at once.
///
/// Units are started in order as slots free up. Once the shared token is
/// cancelled no further unit starts; units already running are expected to
/// watch the same token and unwind on their own.
pub struct BoundedWorkScheduler {
    limit: usize,
    fail_fast: bool,
    cancel: CancellationToken,
}

impl BoundedWorkScheduler {
    /// Creates a scheduler running at most `limit` units (at least one).
    ///
    /// A failing unit does not cancel `cancel` unless
    /// [`fail_fast`](Self::fail_fast) is enabled: by default every queued
    /// unit still runs so all per-file outcomes are reported, and the first
    /// failure is returned after the drain.
    pub fn new(limit: usize, cancel: CancellationToken) -> Self {
        Self {
            limit: limit.max(1),
            fail_fast: false,
            cancel,
        }
    }

    /// Cancel the shared token on the first failure.
    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Runs every unit and waits for all started ones to finish.
    ///
    /// Returns the first failure after everything has drained, with later
    /// failures attached as suppressed. A panicking unit counts as failed.
    pub async fn run<I, F, E>(&self, units: I) -> Result<RunStats, RunError<E>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: From<JoinError> + Send + 'static,
    {
        let mut queue = units.into_iter();
        let mut running = JoinSet::new();
        let mut stats = RunStats::default();
        let mut first: Option<E> = None;
        let mut suppressed = Vec::new();

        loop {
            while running.len() < self.limit && !self.cancel.is_cancelled() {
                let Some(unit) = queue.next() else {
                    break;
                };
                running.spawn(unit);
                stats.started += 1;
            }

            let Some(joined) = running.join_next().await else {
                break;
            };

            let failure = match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(join_err) => Some(E::from(join_err)),
            };
            if let Some(e) = failure {
                if self.fail_fast && !self.cancel.is_cancelled() {
                    debug!("unit failed, cancelling remaining work");
                    self.cancel.cancel();
                }
                match first {
                    None => first = Some(e),
                    Some(_) => suppressed.push(e),
                }
            }
        }

        stats.not_started = queue.count();
        debug!(
            started = stats.started,
            not_started = stats.not_started,
            "scheduler drained"
        );

        match first {
            Some(first) => Err(RunError { first, suppressed }),
            None => Ok(stats),
        }
    }
}
