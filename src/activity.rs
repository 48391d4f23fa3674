use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Maximum number of characters kept from `input.task`.
pub const TASK_MAX_CHARS: usize = 60;

/// Outcome of a logged agent action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
}

/// One raw line as written by an agent process.
///
/// The four required fields are typed; `input` and `output` are opaque JSON
/// and only `input.task` is ever looked at.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLogRecord {
    pub timestamp: String,
    pub agent: String,
    pub action: String,
    pub duration_ms: f64,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// A normalized record derived from one log line.
///
/// Activities are immutable once parsed. Optional fields are omitted from
/// serialized output when absent.
///
/// # Examples
///
/// ```
/// use activitytail::{parse_line, Status};
///
/// let line = r#"{"timestamp":"2024-01-01T00:00:00Z","agent":"A","action":"x","duration_ms":5}"#;
/// let activity = parse_line(line).unwrap();
/// assert_eq!(activity.agent, "A");
/// assert_eq!(activity.status, Status::Success);
/// assert_eq!(activity.task, None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Activity {
    /// ISO-8601 timestamp exactly as logged.
    pub timestamp: String,
    pub agent: String,
    pub action: String,
    pub status: Status,
    pub duration_ms: f64,
    /// First 60 characters of `input.task`, if it was a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Activity {
    pub fn is_failure(&self) -> bool {
        self.status == Status::Failure
    }
}

impl From<RawLogRecord> for Activity {
    fn from(raw: RawLogRecord) -> Self {
        let error = match raw.error {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        };
        let task = raw
            .input
            .as_ref()
            .and_then(Value::as_object)
            .and_then(|input| input.get("task"))
            .and_then(Value::as_str)
            .map(|task| task.chars().take(TASK_MAX_CHARS).collect());

        Activity {
            timestamp: raw.timestamp,
            agent: raw.agent,
            action: raw.action,
            status: if error.is_some() {
                Status::Failure
            } else {
                Status::Success
            },
            duration_ms: raw.duration_ms,
            task,
            error,
        }
    }
}

/// Why a line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Not decodable as a JSON object.
    Malformed,
    /// Valid JSON, but a required field is missing or has the wrong type.
    Schema,
}

/// A rejected line. Never propagated as an error; the caller decides whether
/// to report it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub reason: FailureReason,
    pub detail: String,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            FailureReason::Malformed => write!(f, "malformed line: {}", self.detail),
            FailureReason::Schema => write!(f, "schema mismatch: {}", self.detail),
        }
    }
}

/// Parse one log line into an [`Activity`].
///
/// Pure: no I/O, no logging. Decoding happens in two steps so that "not JSON"
/// and "JSON of the wrong shape" are distinguishable.
pub fn parse_line(line: &str) -> Result<Activity, ParseFailure> {
    let object: Map<String, Value> = serde_json::from_str(line).map_err(|e| ParseFailure {
        reason: FailureReason::Malformed,
        detail: e.to_string(),
    })?;

    let raw: RawLogRecord =
        serde_json::from_value(Value::Object(object)).map_err(|e| ParseFailure {
            reason: FailureReason::Schema,
            detail: e.to_string(),
        })?;

    Ok(Activity::from(raw))
}
