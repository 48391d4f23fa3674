//! Diagnostic reporting for the tailer.
//!
//! Problems on the data path (rejected lines, unreadable files, truncation,
//! watcher errors, a panicking callback) go through a [`DiagnosticsSink`]
//! supplied at construction, so hosts can route them anywhere and tests can
//! capture them. [`LogSink`] is the default and forwards to the `log` facade.
//!
//! Lifecycle chatter (start, stop, newly tracked files) is logged directly at
//! `debug` level. All of it uses the `activitytail` target.

use crate::activity::ParseFailure;
use std::path::Path;

/// Default number of consecutive parse failures reported individually.
pub const DEFAULT_ERROR_THRESHOLD: usize = 10;

/// Number of characters of an offending line included in a report.
pub const EXCERPT_CHARS: usize = 100;

pub(crate) const TARGET: &str = "activitytail";

/// Receiver for everything the engine reports.
///
/// Implementations must be cheap and must not call back into the engine.
pub trait DiagnosticsSink: Send + Sync {
    /// A single rejected line, with the first [`EXCERPT_CHARS`] characters of it.
    fn parse_failure(&self, path: &Path, failure: &ParseFailure, excerpt: &str);

    /// Emitted once per failure streak when the threshold is reached.
    fn parse_failures_suppressed(&self, threshold: usize);

    /// A file could not be read or stat'ed. Processing continues.
    fn io_error(&self, path: &Path, error: &std::io::Error);

    /// A tracked file shrank below its recorded offset.
    fn truncated(&self, path: &Path, previous_offset: u64, current_size: u64);

    /// The change source reported an error.
    fn watch_error(&self, message: &str);

    /// The activity callback panicked. The activity stays buffered and the
    /// worker keeps running.
    fn callback_panicked(&self, message: &str);
}

/// Sink that forwards to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn parse_failure(&self, path: &Path, failure: &ParseFailure, excerpt: &str) {
        log::warn!(target: TARGET, "{}: {failure}: {excerpt}", path.display());
    }

    fn parse_failures_suppressed(&self, threshold: usize) {
        log::warn!(
            target: TARGET,
            "{threshold} consecutive parse failures, further warnings suppressed"
        );
    }

    fn io_error(&self, path: &Path, error: &std::io::Error) {
        log::error!(target: TARGET, "{}: {error}", path.display());
    }

    fn truncated(&self, path: &Path, previous_offset: u64, current_size: u64) {
        log::info!(
            target: TARGET,
            "{}: truncated from {previous_offset} to {current_size} bytes, re-reading tail",
            path.display()
        );
    }

    fn watch_error(&self, message: &str) {
        log::error!(target: TARGET, "watcher: {message}");
    }

    fn callback_panicked(&self, message: &str) {
        log::error!(target: TARGET, "activity callback panicked: {message}");
    }
}

/// Error-storm suppression for parse failures.
///
/// Counts consecutive failures. The first `threshold` are reported; the
/// `threshold`-th is followed by one suppression notice; later ones are only
/// counted. A successful parse ends the streak.
#[derive(Debug, Clone)]
pub struct ParseErrorPolicy {
    threshold: usize,
    streak: usize,
    suppressed: u64,
}

impl ParseErrorPolicy {
    /// Report up to `threshold` failures per streak.
    pub fn new(threshold: usize) -> Self {
        ParseErrorPolicy {
            threshold,
            streak: 0,
            suppressed: 0,
        }
    }

    /// Record a failure, reporting to `sink` if the streak allows it.
    pub fn on_failure(
        &mut self,
        sink: &dyn DiagnosticsSink,
        path: &Path,
        line: &str,
        failure: &ParseFailure,
    ) {
        self.streak += 1;
        if self.streak <= self.threshold {
            sink.parse_failure(path, failure, &excerpt(line));
            if self.streak == self.threshold {
                sink.parse_failures_suppressed(self.threshold);
            }
        } else {
            self.suppressed += 1;
        }
    }

    /// End the current failure streak.
    pub fn on_success(&mut self) {
        self.streak = 0;
    }

    /// Length of the current failure streak.
    pub fn streak(&self) -> usize {
        self.streak
    }

    /// Total failures swallowed without a report, over the policy's lifetime.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

impl Default for ParseErrorPolicy {
    fn default() -> Self {
        ParseErrorPolicy::new(DEFAULT_ERROR_THRESHOLD)
    }
}

fn excerpt(line: &str) -> String {
    line.chars().take(EXCERPT_CHARS).collect()
}
