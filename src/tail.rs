use crate::activity::{parse_line, Activity};
use crate::cold_start::read_tail_window;
use crate::diagnostics::{DiagnosticsSink, ParseErrorPolicy, TARGET};
use crate::error::TailError;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read position within one watched file.
///
/// `offset` is always the file size observed at the last successful read.
/// Bytes after the last newline seen so far are kept in `pending` and
/// prefixed to the next read, so a line that is still being written is never
/// parsed early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTailState {
    path: PathBuf,
    offset: u64,
    pending: Vec<u8>,
}

impl FileTailState {
    /// State for a file that has not been read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileTailState {
            path: path.into(),
            offset: 0,
            pending: Vec::new(),
        }
    }

    pub(crate) fn at(path: impl Into<PathBuf>, offset: u64, pending: Vec<u8>) -> Self {
        FileTailState {
            path: path.into(),
            offset,
            pending,
        }
    }

    /// Returns the path of the tracked file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset up to which the file has been consumed.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes of an unterminated trailing line carried to the next read.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}

/// Split `bytes` into complete, non-blank lines and the unterminated rest.
///
/// Lines are decoded lossily and lose a trailing `\r`.
pub(crate) fn split_lines(bytes: &[u8]) -> (Vec<String>, &[u8]) {
    let end = match bytes.iter().rposition(|&b| b == b'\n') {
        Some(i) => i + 1,
        None => return (Vec::new(), bytes),
    };
    let lines = bytes[..end]
        .split(|&b| b == b'\n')
        .filter_map(|raw| {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw);
            if line.trim().is_empty() {
                None
            } else {
                Some(line.into_owned())
            }
        })
        .collect();
    (lines, &bytes[end..])
}

/// Incremental reader over every `.log` file in a directory.
///
/// Owns the per-file offsets and the parse-failure streak. Each call to
/// [`on_change`](Tailer::on_change) returns the activities parsed from bytes
/// that were not seen before, in file order. Calls must not overlap for the
/// same tailer; `&mut self` enforces that.
pub struct Tailer {
    files: HashMap<PathBuf, FileTailState>,
    policy: ParseErrorPolicy,
    window: usize,
    sink: Arc<dyn DiagnosticsSink>,
}

impl Tailer {
    /// Create a tailer that tracks no files yet.
    pub fn new(window: usize, error_threshold: usize, sink: Arc<dyn DiagnosticsSink>) -> Self {
        Tailer {
            files: HashMap::new(),
            policy: ParseErrorPolicy::new(error_threshold),
            window,
            sink,
        }
    }

    /// Lines read from the end of a file on cold start and after truncation.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Returns the sink that receives this tailer's reports.
    pub fn sink(&self) -> &dyn DiagnosticsSink {
        &*self.sink
    }

    /// Returns the parse-failure policy, including the current streak.
    pub fn policy(&self) -> &ParseErrorPolicy {
        &self.policy
    }

    /// Start tracking a file at a known position, replacing any prior state.
    pub fn track(&mut self, state: FileTailState) {
        self.files.insert(state.path.clone(), state);
    }

    /// Stop tracking a file. The next change for it is treated as a new file.
    pub fn forget(&mut self, path: &Path) -> Option<FileTailState> {
        self.files.remove(path)
    }

    /// Returns the recorded state for `path`, if it is tracked.
    pub fn state(&self, path: &Path) -> Option<&FileTailState> {
        self.files.get(path)
    }

    /// Returns the number of tracked files.
    pub fn tracked(&self) -> usize {
        self.files.len()
    }

    /// React to a change or creation notification for `path`.
    ///
    /// - Unknown file: tracked from offset 0 and read in full.
    /// - Smaller than the recorded offset: truncated or replaced. The trailing
    ///   window is re-read and the offset reset to the current size.
    /// - Same size: nothing to do.
    /// - Larger: only the bytes past the offset are read.
    ///
    /// Paths that are not regular files are ignored. On error the recorded
    /// state is left untouched, so the same bytes are retried on the next
    /// notification.
    pub fn on_change(&mut self, path: &Path) -> Result<Vec<Activity>, TailError> {
        let meta = fs::metadata(path).map_err(|e| TailError::io(path, e))?;
        if !meta.is_file() {
            return Ok(Vec::new());
        }
        let size = meta.len();

        let offset = match self.files.get(path) {
            Some(state) => state.offset,
            None => {
                log::debug!(target: TARGET, "tracking new file {}", path.display());
                self.files.insert(path.to_path_buf(), FileTailState::new(path));
                0
            }
        };

        if size < offset {
            self.sink.truncated(path, offset, size);
            return self.reread_window(path);
        }
        if size == offset {
            return Ok(Vec::new());
        }
        self.read_appended(path, offset, size)
    }

    /// Parse lines in order, feeding the failure policy.
    pub(crate) fn parse_lines(&mut self, path: &Path, lines: Vec<String>) -> Vec<Activity> {
        let mut activities = Vec::with_capacity(lines.len());
        for line in lines {
            match parse_line(&line) {
                Ok(activity) => {
                    self.policy.on_success();
                    activities.push(activity);
                }
                Err(failure) => {
                    self.policy.on_failure(&*self.sink, path, &line, &failure);
                }
            }
        }
        activities
    }

    fn read_appended(
        &mut self,
        path: &Path,
        offset: u64,
        size: u64,
    ) -> Result<Vec<Activity>, TailError> {
        let mut file = File::open(path).map_err(|e| TailError::io(path, e))?;
        file.seek(SeekFrom::Start(offset)).map_err(|e| TailError::io(path, e))?;

        // Bound the read by the size we stat'ed; anything written since is
        // picked up by the next notification.
        let mut fresh = Vec::new();
        file.take(size - offset)
            .read_to_end(&mut fresh)
            .map_err(|e| TailError::io(path, e))?;

        let state = self
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| FileTailState::new(path));
        let mut bytes = std::mem::take(&mut state.pending);
        bytes.extend_from_slice(&fresh);
        let (lines, rest) = split_lines(&bytes);
        state.pending = rest.to_vec();
        state.offset = offset + fresh.len() as u64;

        Ok(self.parse_lines(path, lines))
    }

    fn reread_window(&mut self, path: &Path) -> Result<Vec<Activity>, TailError> {
        let window = read_tail_window(path, self.window).map_err(|e| TailError::io(path, e))?;
        self.track(FileTailState::at(path, window.size, window.pending));
        Ok(self.parse_lines(path, window.lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_complete_lines() {
        let (lines, rest) = split_lines(b"a\nb\n");
        assert_eq!(lines, vec!["a", "b"]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_split_keeps_partial_tail() {
        let (lines, rest) = split_lines(b"a\nb\npart");
        assert_eq!(lines, vec!["a", "b"]);
        assert_eq!(rest, b"part");
    }

    #[test]
    fn test_split_without_newline_is_all_rest() {
        let (lines, rest) = split_lines(b"no newline yet");
        assert!(lines.is_empty());
        assert_eq!(rest, b"no newline yet");
    }

    #[test]
    fn test_split_skips_blank_and_strips_cr() {
        let (lines, rest) = split_lines(b"a\r\n\n   \n\r\nb\n");
        assert_eq!(lines, vec!["a", "b"]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_state_starts_at_zero() {
        let state = FileTailState::new("x.log");
        assert_eq!(state.path(), Path::new("x.log"));
        assert_eq!(state.offset(), 0);
        assert!(state.pending().is_empty());
    }
}
