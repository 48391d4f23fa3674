#![allow(dead_code)]

use activitytail::{ChangeEvent, ChangeSource, DiagnosticsSink, ParseFailure, TailError, WatchGuard};
use parking_lot::Mutex;
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// ISO-8601 timestamp `n` seconds after 2024-01-01T00:00:00Z (n < 3600).
pub fn ts(n: u32) -> String {
    format!("2024-01-01T00:{:02}:{:02}Z", n / 60, n % 60)
}

/// A well-formed log line for `agent` at `ts(n)`.
pub fn line(n: u32, agent: &str) -> String {
    json!({
        "timestamp": ts(n),
        "agent": agent,
        "action": format!("step_{n}"),
        "duration_ms": n,
    })
    .to_string()
}

pub fn write_lines(path: &Path, lines: &[String]) {
    let mut file = File::create(path).unwrap();
    for l in lines {
        writeln!(file, "{l}").unwrap();
    }
    file.sync_data().unwrap();
}

pub fn append_raw(path: &Path, bytes: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(bytes.as_bytes()).unwrap();
    file.sync_data().unwrap();
}

pub fn append_lines(path: &Path, lines: &[String]) {
    let joined: String = lines.iter().map(|l| format!("{l}\n")).collect();
    append_raw(path, &joined);
}

/// Everything a [`CapturingSink`] has been told.
#[derive(Debug, Clone, PartialEq)]
pub enum Diag {
    ParseFailure(String),
    Suppressed(usize),
    Io(PathBuf),
    Truncated { from: u64, to: u64 },
    Watch(String),
    CallbackPanic(String),
}

#[derive(Default)]
pub struct CapturingSink {
    pub events: Mutex<Vec<Diag>>,
}

impl CapturingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(CapturingSink::default())
    }

    pub fn events(&self) -> Vec<Diag> {
        self.events.lock().clone()
    }

    pub fn parse_failures(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|d| matches!(d, Diag::ParseFailure(_)))
            .count()
    }

    pub fn suppressions(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|d| matches!(d, Diag::Suppressed(_)))
            .count()
    }
}

impl DiagnosticsSink for CapturingSink {
    fn parse_failure(&self, _path: &Path, _failure: &ParseFailure, excerpt: &str) {
        self.events.lock().push(Diag::ParseFailure(excerpt.to_string()));
    }

    fn parse_failures_suppressed(&self, threshold: usize) {
        self.events.lock().push(Diag::Suppressed(threshold));
    }

    fn io_error(&self, path: &Path, _error: &std::io::Error) {
        self.events.lock().push(Diag::Io(path.to_path_buf()));
    }

    fn truncated(&self, _path: &Path, previous_offset: u64, current_size: u64) {
        self.events.lock().push(Diag::Truncated {
            from: previous_offset,
            to: current_size,
        });
    }

    fn watch_error(&self, message: &str) {
        self.events.lock().push(Diag::Watch(message.to_string()));
    }

    fn callback_panicked(&self, message: &str) {
        self.events.lock().push(Diag::CallbackPanic(message.to_string()));
    }
}

/// A change source driven by the test itself.
#[derive(Clone, Default)]
pub struct ManualSource {
    tx: Arc<Mutex<Option<Sender<ChangeEvent>>>>,
    released: Arc<AtomicBool>,
}

struct Release(Arc<AtomicBool>);

impl Drop for Release {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ManualSource {
    pub fn send(&self, event: ChangeEvent) {
        let tx = self.tx.lock();
        tx.as_ref().expect("not subscribed").send(event).unwrap();
    }

    pub fn changed(&self, path: &Path) {
        self.send(ChangeEvent::Changed(path.to_path_buf()));
    }

    pub fn is_subscribed(&self) -> bool {
        self.tx.lock().is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl ChangeSource for ManualSource {
    fn subscribe(&self, _dir: &Path, tx: Sender<ChangeEvent>) -> Result<WatchGuard, TailError> {
        *self.tx.lock() = Some(tx);
        self.released.store(false, Ordering::SeqCst);
        Ok(WatchGuard::new(Release(Arc::clone(&self.released))))
    }
}
