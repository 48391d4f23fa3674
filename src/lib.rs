mod activity;
mod buffer;
pub mod cold_start;
mod config;
pub mod diagnostics;
mod engine;
mod error;
mod tail;
pub mod watch;

pub use activity::{parse_line, Activity, FailureReason, ParseFailure, RawLogRecord, Status};
pub use buffer::ActivityBuffer;
pub use config::{TailConfig, TailConfigBuilder, DEFAULT_CAPACITY, DEFAULT_LOGS_DIR, DEFAULT_WINDOW};
pub use diagnostics::{DiagnosticsSink, LogSink, ParseErrorPolicy, DEFAULT_ERROR_THRESHOLD};
pub use engine::TailEngine;
pub use error::TailError;
pub use tail::{FileTailState, Tailer};
pub use watch::{ChangeEvent, ChangeSource, NotifySource, PollSource, WatchGuard};
