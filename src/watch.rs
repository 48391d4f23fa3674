//! File-change notification sources.
//!
//! The engine only needs "this `.log` file was added, changed or removed".
//! [`NotifySource`] gets that from the OS through `notify`; [`PollSource`]
//! rescans the directory on an interval for platforms or filesystems where
//! native notifications are unavailable (network mounts, some containers).

use crate::cold_start::is_log_file;
use crate::error::TailError;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

/// A change to a file in the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A `.log` file was created or written to.
    Changed(PathBuf),
    /// A `.log` file was deleted or renamed away.
    Removed(PathBuf),
    /// The source hit an error. Watching continues if the source can.
    Error(String),
}

/// Something that can report changes to `.log` files in a directory.
pub trait ChangeSource: Send + Sync {
    /// Start sending events for `dir` to `tx`.
    ///
    /// Events for files that already exist are not replayed. The
    /// subscription lasts until the returned guard is dropped.
    fn subscribe(&self, dir: &Path, tx: Sender<ChangeEvent>) -> Result<WatchGuard, TailError>;
}

/// Keeps a subscription alive. Dropping it releases the subscription.
pub struct WatchGuard {
    _inner: Box<dyn Send>,
}

impl WatchGuard {
    /// Wrap whatever resource must live as long as the subscription.
    pub fn new(inner: impl Send + 'static) -> Self {
        WatchGuard {
            _inner: Box::new(inner),
        }
    }
}

impl std::fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchGuard").finish_non_exhaustive()
    }
}

/// Native notifications via `notify`'s recommended watcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifySource;

impl ChangeSource for NotifySource {
    fn subscribe(&self, dir: &Path, tx: Sender<ChangeEvent>) -> Result<WatchGuard, TailError> {
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for change in translate(event) {
                        // Receiver gone means the engine is shutting down.
                        let _ = tx.send(change);
                    }
                }
                Err(e) => {
                    let _ = tx.send(ChangeEvent::Error(e.to_string()));
                }
            })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(WatchGuard::new(watcher))
    }
}

/// Map a raw `notify` event to the changes the engine cares about.
pub(crate) fn translate(event: notify::Event) -> Vec<ChangeEvent> {
    let mut paths = event.paths.into_iter();
    let changes: Vec<ChangeEvent> = match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let from = paths.next();
            let to = paths.next();
            from.map(ChangeEvent::Removed)
                .into_iter()
                .chain(to.map(ChangeEvent::Changed))
                .collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
            paths.map(ChangeEvent::Removed).collect()
        }
        EventKind::Create(_) | EventKind::Modify(_) => paths.map(ChangeEvent::Changed).collect(),
        _ => Vec::new(),
    };
    changes
        .into_iter()
        .filter(|change| match change {
            ChangeEvent::Changed(p) | ChangeEvent::Removed(p) => is_log_file(p),
            ChangeEvent::Error(_) => true,
        })
        .collect()
}

/// Directory polling, for when native notifications are unavailable.
#[derive(Debug, Clone, Copy)]
pub struct PollSource {
    interval: Duration,
}

impl PollSource {
    /// Poll the directory every `interval`.
    pub fn new(interval: Duration) -> Self {
        PollSource { interval }
    }

    /// Returns the time between directory scans.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for PollSource {
    fn default() -> Self {
        PollSource::new(Duration::from_millis(500))
    }
}

impl ChangeSource for PollSource {
    fn subscribe(&self, dir: &Path, tx: Sender<ChangeEvent>) -> Result<WatchGuard, TailError> {
        let watch_dir = dir.to_path_buf();
        let interval = self.interval;
        let mut seen = scan(dir);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("activitytail-poll".to_string())
            .spawn(move || {
                // Disconnection of `stop_tx` ends the loop.
                while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(interval) {
                    let current = scan(&watch_dir);
                    for change in diff(&seen, &current) {
                        if tx.send(change).is_err() {
                            return;
                        }
                    }
                    seen = current;
                }
            })
            .map_err(|e| TailError::io(dir, e))?;

        Ok(WatchGuard::new(PollGuard {
            stop: Some(stop_tx),
            handle: Some(handle),
        }))
    }
}

type Fingerprint = (u64, Option<SystemTime>);

fn scan(dir: &Path) -> HashMap<PathBuf, Fingerprint> {
    let Ok(entries) = fs::read_dir(dir) else {
        return HashMap::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_log_file(path))
        .filter_map(|path| {
            let meta = fs::metadata(&path).ok()?;
            meta.is_file().then(|| (path, (meta.len(), meta.modified().ok())))
        })
        .collect()
}

fn diff(
    before: &HashMap<PathBuf, Fingerprint>,
    after: &HashMap<PathBuf, Fingerprint>,
) -> Vec<ChangeEvent> {
    let mut changes: Vec<ChangeEvent> = after
        .iter()
        .filter(|(path, print)| before.get(*path) != Some(*print))
        .map(|(path, _)| ChangeEvent::Changed(path.clone()))
        .collect();
    changes.extend(
        before
            .keys()
            .filter(|path| !after.contains_key(*path))
            .map(|path| ChangeEvent::Removed(path.clone())),
    );
    changes
}

struct PollGuard {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
