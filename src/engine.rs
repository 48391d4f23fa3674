use crate::activity::Activity;
use crate::buffer::ActivityBuffer;
use crate::cold_start;
use crate::config::TailConfig;
use crate::diagnostics::{DiagnosticsSink, LogSink, TARGET};
use crate::error::TailError;
use crate::tail::Tailer;
use crate::watch::{ChangeEvent, ChangeSource, NotifySource, WatchGuard};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the worker checks the stop flag while idle.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Tails a directory of `.log` files into a bounded activity buffer.
///
/// [`start`](TailEngine::start) loads recent history, subscribes to file
/// changes and spawns one worker thread that handles change events one at a
/// time. Every newly parsed activity is appended to the buffer and then
/// handed to the callback, in file order. [`snapshot`](TailEngine::snapshot)
/// can be called from any thread at any time.
///
/// # Examples
///
/// ```no_run
/// use activitytail::{TailConfig, TailEngine};
///
/// let mut engine = TailEngine::new(TailConfig::new("logs"));
/// engine.start(|activity| println!("{} {}", activity.agent, activity.action))?;
/// let recent = engine.snapshot();
/// engine.stop();
/// # Ok::<(), activitytail::TailError>(())
/// ```
pub struct TailEngine {
    config: TailConfig,
    sink: Arc<dyn DiagnosticsSink>,
    source: Box<dyn ChangeSource>,
    buffer: Arc<Mutex<ActivityBuffer>>,
    running: Option<Running>,
}

struct Running {
    // Dropped before the worker is joined, releasing the subscription.
    guard: Option<WatchGuard>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl TailEngine {
    /// An engine using native file notifications and the `log` facade.
    pub fn new(config: TailConfig) -> Self {
        let buffer = ActivityBuffer::new(config.capacity());
        TailEngine {
            config,
            sink: Arc::new(LogSink),
            source: Box::new(NotifySource),
            buffer: Arc::new(Mutex::new(buffer)),
            running: None,
        }
    }

    /// Replace the diagnostics sink.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the file-change source, e.g. with a [`PollSource`](crate::PollSource).
    pub fn with_source(mut self, source: impl ChangeSource + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Returns the configuration the engine was created with.
    pub fn config(&self) -> &TailConfig {
        &self.config
    }

    /// Returns `true` between a successful [`start`](TailEngine::start) and
    /// [`stop`](TailEngine::stop), as long as the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .and_then(|running| running.worker.as_ref())
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Load history and begin live tailing.
    ///
    /// The subscription is made before the cold-start read so that writes
    /// racing with it are queued rather than lost; they are processed only
    /// after the cold start has finished. Nothing is installed on failure.
    ///
    /// # Errors
    ///
    /// [`TailError::DirectoryNotFound`] if the directory is missing,
    /// [`TailError::Watch`] if the change source cannot subscribe,
    /// [`TailError::AlreadyStarted`] if the engine is already running.
    pub fn start<F>(&mut self, on_activity: F) -> Result<(), TailError>
    where
        F: FnMut(Activity) + Send + 'static,
    {
        if self.running.is_some() {
            return Err(TailError::AlreadyStarted);
        }
        let dir = self.config.dir();
        if !dir.is_dir() {
            return Err(TailError::DirectoryNotFound(dir.to_path_buf()));
        }

        let (tx, rx) = mpsc::channel();
        let guard = self.source.subscribe(dir, tx)?;

        let mut tailer = Tailer::new(
            self.config.window(),
            self.config.error_threshold(),
            Arc::clone(&self.sink),
        );
        let loaded = cold_start::load(dir, self.config.capacity(), &mut tailer)?;

        // Installed before the worker exists, so live events always land
        // after the cold-start content.
        *self.buffer.lock() = loaded;

        let stop = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            tailer,
            buffer: Arc::clone(&self.buffer),
            sink: Arc::clone(&self.sink),
            on_activity,
        };
        let worker_stop = Arc::clone(&stop);
        let spawned = thread::Builder::new()
            .name("activitytail-worker".to_string())
            .spawn(move || worker.run(rx, worker_stop));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                *self.buffer.lock() = ActivityBuffer::new(self.config.capacity());
                return Err(TailError::io(dir, e));
            }
        };

        self.running = Some(Running {
            guard: Some(guard),
            stop,
            worker: Some(handle),
        });
        log::debug!(target: TARGET, "tailing {}", dir.display());
        Ok(())
    }

    /// Owned copy of the buffered activities, oldest first.
    pub fn snapshot(&self) -> Vec<Activity> {
        self.buffer.lock().snapshot()
    }

    /// Release the file-change subscription and stop the worker.
    ///
    /// Idempotent, and safe on an engine that never started. Events still
    /// queued are discarded; the buffer keeps its contents.
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        running.stop.store(true, Ordering::SeqCst);
        drop(running.guard.take());
        if let Some(worker) = running.worker.take() {
            if worker.join().is_err() {
                log::error!(target: TARGET, "worker thread panicked");
            }
        }
        log::debug!(target: TARGET, "stopped tailing {}", self.config.dir().display());
    }
}

impl Drop for TailEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TailEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailEngine")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("buffered", &self.buffer.lock().len())
            .finish()
    }
}

struct Worker<F> {
    tailer: Tailer,
    buffer: Arc<Mutex<ActivityBuffer>>,
    sink: Arc<dyn DiagnosticsSink>,
    on_activity: F,
}

impl<F: FnMut(Activity)> Worker<F> {
    fn run(mut self, rx: Receiver<ChangeEvent>, stop: Arc<AtomicBool>) {
        while !stop.load(Ordering::SeqCst) {
            match rx.recv_timeout(STOP_CHECK_INTERVAL) {
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn handle(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Changed(path) => match self.tailer.on_change(&path) {
                Ok(activities) => {
                    for activity in activities {
                        self.buffer.lock().append(activity.clone());
                        self.deliver(activity);
                    }
                }
                Err(TailError::Io { path, source }) => self.sink.io_error(&path, &source),
                Err(e) => self.sink.watch_error(&e.to_string()),
            },
            ChangeEvent::Removed(path) => {
                if self.tailer.forget(&path).is_some() {
                    log::debug!(target: TARGET, "stopped tracking {}", path.display());
                }
            }
            ChangeEvent::Error(message) => self.sink.watch_error(&message),
        }
    }

    /// Hand one activity to the callback. A panic is reported and the worker
    /// carries on with the next activity.
    fn deliver(&mut self, activity: Activity) {
        let on_activity = &mut self.on_activity;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| on_activity(activity))) {
            self.sink.callback_panicked(panic_message(&*payload));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
