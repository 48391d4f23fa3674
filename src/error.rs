use std::io;
use std::path::PathBuf;

/// Errors surfaced by the tailer.
///
/// Only startup failures reach the caller of [`TailEngine::start`](crate::TailEngine::start).
/// Once live tailing runs, per-file errors go to the diagnostics sink instead.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    /// The configured log directory does not exist or is not a directory.
    #[error("logs directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Reading or stat'ing a path failed.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file-change subscription could not be established.
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// `start` was called on an engine that is already running.
    #[error("tail engine already started")]
    AlreadyStarted,
}

impl TailError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TailError::Io {
            path: path.into(),
            source,
        }
    }
}
