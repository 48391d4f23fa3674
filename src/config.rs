use crate::diagnostics::DEFAULT_ERROR_THRESHOLD;
use std::path::{Path, PathBuf};

/// Directory watched when none is given.
pub const DEFAULT_LOGS_DIR: &str = "../Agents/logs/conversation_logs";

/// Default number of activities kept in memory.
pub const DEFAULT_CAPACITY: usize = 50;

/// Lines read from the end of each file on cold start and after truncation.
pub const DEFAULT_WINDOW: usize = 20;

/// Settings for a [`TailEngine`](crate::TailEngine).
///
/// # Examples
///
/// ```
/// use activitytail::TailConfig;
///
/// let config = TailConfig::builder("/var/log/agents").capacity(100).build();
/// assert_eq!(config.capacity(), 100);
/// assert_eq!(config.window(), 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailConfig {
    dir: PathBuf,
    capacity: usize,
    window: usize,
    error_threshold: usize,
}

impl TailConfig {
    /// Defaults for everything except the directory.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        TailConfig {
            dir: dir.as_ref().to_path_buf(),
            capacity: DEFAULT_CAPACITY,
            window: DEFAULT_WINDOW,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }

    /// Start a builder with defaults for everything except the directory.
    pub fn builder(dir: impl AsRef<Path>) -> TailConfigBuilder {
        TailConfigBuilder {
            config: TailConfig::new(dir),
        }
    }

    /// Returns the directory whose `.log` files are followed.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the maximum number of buffered activities.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the trailing-window size in lines.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Returns how many consecutive parse failures are reported individually.
    pub fn error_threshold(&self) -> usize {
        self.error_threshold
    }
}

impl Default for TailConfig {
    fn default() -> Self {
        TailConfig::new(DEFAULT_LOGS_DIR)
    }
}

/// Builder for [`TailConfig`].
#[derive(Debug, Clone)]
pub struct TailConfigBuilder {
    config: TailConfig,
}

impl TailConfigBuilder {
    /// Maximum activities held in the buffer. Zero is clamped to one.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    /// Trailing-window size in lines.
    pub fn window(mut self, window: usize) -> Self {
        self.config.window = window;
        self
    }

    /// Consecutive parse failures reported before suppression kicks in.
    pub fn error_threshold(mut self, threshold: usize) -> Self {
        self.config.error_threshold = threshold;
        self
    }

    /// Finish the configuration.
    pub fn build(self) -> TailConfig {
        self.config
    }
}
