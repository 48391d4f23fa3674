//! Initial load of recent history from the log files already on disk.

use crate::activity::Activity;
use crate::buffer::ActivityBuffer;
use crate::diagnostics::TARGET;
use crate::error::TailError;
use crate::tail::{split_lines, FileTailState, Tailer};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File name suffix of the files this crate follows.
pub const LOG_EXTENSION: &str = "log";

const SCAN_CHUNK: u64 = 8192;

/// Returns `true` if `path` names a `.log` file.
pub fn is_log_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(LOG_EXTENSION)
}

/// A `.log` file found in the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub len: u64,
}

/// The last lines of a file and where reading stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailWindow {
    /// Up to `window` complete, non-blank lines, oldest first.
    pub lines: Vec<String>,
    /// Unterminated bytes after the last newline.
    pub pending: Vec<u8>,
    /// File size at the time of the read.
    pub size: u64,
}

/// List the regular `.log` files directly inside `dir`, most recently
/// modified first.
///
/// # Errors
///
/// [`TailError::DirectoryNotFound`] if `dir` is missing or not a directory,
/// [`TailError::Io`] if it cannot be listed.
pub fn list_log_files(dir: &Path) -> Result<Vec<LogFile>, TailError> {
    if !dir.is_dir() {
        return Err(TailError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| TailError::io(dir, e))? {
        let entry = entry.map_err(|e| TailError::io(dir, e))?;
        let path = entry.path();
        if !is_log_file(&path) {
            continue;
        }
        // Entries can vanish between listing and stat.
        let Ok(meta) = fs::metadata(&path) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        files.push(LogFile {
            path,
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            len: meta.len(),
        });
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(files)
}

/// Read the last `window` non-blank complete lines of a file.
///
/// Scans backwards from the end in fixed-size chunks, so the cost depends on
/// the window, not on the file's total size.
pub fn read_tail_window(path: &Path, window: usize) -> io::Result<TailWindow> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    let mut start = size;
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let newline = buf.iter().position(|&b| b == b'\n');
        if start == 0 || newline.is_some() {
            // Before the first newline of a mid-file buffer is a partial line.
            let body = match (start, newline) {
                (0, _) => &buf[..],
                (_, Some(i)) => &buf[i + 1..],
                (_, None) => &buf[..0],
            };
            let (lines, rest) = split_lines(body);
            if start == 0 || lines.len() >= window {
                let skip = lines.len().saturating_sub(window);
                return Ok(TailWindow {
                    lines: lines.into_iter().skip(skip).collect(),
                    pending: rest.to_vec(),
                    size,
                });
            }
        }

        let chunk_start = start.saturating_sub(SCAN_CHUNK);
        let mut chunk = vec![0u8; (start - chunk_start) as usize];
        file.seek(SeekFrom::Start(chunk_start))?;
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&buf);
        buf = chunk;
        start = chunk_start;
    }
}

/// Load recent history from every `.log` file in `dir`.
///
/// Reads the trailing window of each file (most recently modified first),
/// sorts everything by timestamp, and keeps the newest `capacity` entries.
/// Each file is registered with `tailer` at its current size so live tailing
/// starts after what was loaded here. A file that cannot be read is reported
/// and left untracked; its next notification reads it from the start.
pub fn load(dir: &Path, capacity: usize, tailer: &mut Tailer) -> Result<ActivityBuffer, TailError> {
    let files = list_log_files(dir)?;
    let mut activities: Vec<Activity> = Vec::new();

    for file in &files {
        let window = match read_tail_window(&file.path, tailer.window()) {
            Ok(window) => window,
            Err(e) => {
                tailer.sink().io_error(&file.path, &e);
                continue;
            }
        };
        tailer.track(FileTailState::at(&file.path, window.size, window.pending));
        activities.extend(tailer.parse_lines(&file.path, window.lines));
    }

    // ISO-8601 strings order lexicographically; the sort is stable for ties.
    activities.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    log::debug!(
        target: TARGET,
        "cold start: {} activities from {} files in {}",
        activities.len(),
        files.len(),
        dir.display()
    );

    Ok(ActivityBuffer::from_ordered(capacity, activities))
}
