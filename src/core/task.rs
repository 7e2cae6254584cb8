//! Task model: lifecycle status, control kinds and the queued message.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::DispatchError;

/// Output value reported when a task has no result.
pub const NO_OUTPUT: f64 = -1.0;

/// Fixed task id carried by terminate sentinels.
pub const TERMINATE_TASK_ID: &str = "abc-efg-xyz-123";

/// Lifecycle status of a task as recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Admitted and waiting for (or under) execution.
    #[serde(rename = "PROCESSING")]
    Processing,
    /// Finished with an output.
    #[serde(rename = "COMPLETED")]
    Completed,
    /// Finished with an error message.
    #[serde(rename = "ERROR")]
    Error,
    /// Read-time sentinel for an unknown task id. Never persisted.
    #[serde(rename = "NOT FOUND")]
    NotFound,
}

impl TaskStatus {
    /// Wire/storage literal for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::NotFound => "NOT FOUND",
        }
    }

    /// Whether the task has reached an outcome.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "ERROR" => Ok(Self::Error),
            "NOT FOUND" => Ok(Self::NotFound),
            other => Err(DispatchError::InvalidPayload(format!(
                "unknown task status `{other}`"
            ))),
        }
    }
}

/// Kind of message travelling through the admission queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    /// Run a model over the numeric input.
    Compute,
    /// Control message that jumps ahead of everything in its bucket.
    Kill,
    /// Control message that stops the worker consuming it.
    Terminate,
}

impl ApiKind {
    /// Priority key used by the priority-bucket policy; lower sorts first.
    ///
    /// Compute sorts by submission second, terminate by twice that, so a
    /// terminate never overtakes computes admitted up to the same instant.
    #[must_use]
    pub const fn priority_key(self, now_secs: i64) -> i64 {
        match self {
            Self::Kill => 0,
            Self::Compute => now_secs,
            Self::Terminate => now_secs.saturating_mul(2),
        }
    }

    /// Whether this is a control message rather than work.
    #[must_use]
    pub const fn is_control(self) -> bool {
        !matches!(self, Self::Compute)
    }
}

/// Message admitted into the queue and stored verbatim in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Task identifier.
    pub task_id: String,
    /// Message kind.
    pub api: ApiKind,
    /// Model name for compute messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Raw numeric input for compute messages. Kept untyped so a malformed
    /// value surfaces as a task error instead of a rejected payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<serde_json::Value>,
}

impl TaskMessage {
    /// Build a compute request.
    pub fn compute(task_id: impl Into<String>, model: impl Into<String>, number: f64) -> Self {
        Self {
            task_id: task_id.into(),
            api: ApiKind::Compute,
            model: Some(model.into()),
            number: Some(serde_json::Value::from(number)),
        }
    }

    /// Build a kill control message for `task_id`.
    pub fn kill(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            api: ApiKind::Kill,
            model: None,
            number: None,
        }
    }

    /// Build a terminate sentinel.
    #[must_use]
    pub fn terminate() -> Self {
        Self {
            task_id: TERMINATE_TASK_ID.to_string(),
            api: ApiKind::Terminate,
            model: None,
            number: None,
        }
    }

    /// Serialize to the JSON form stored in the ledger.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` if the message cannot be encoded.
    pub fn to_json(&self) -> Result<String, DispatchError> {
        serde_json::to_string(self).map_err(|e| DispatchError::InvalidPayload(e.to_string()))
    }

    /// Parse the JSON form stored in the ledger.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` if the text is not a valid message.
    pub fn from_json(raw: &str) -> Result<Self, DispatchError> {
        serde_json::from_str(raw).map_err(|e| DispatchError::InvalidPayload(e.to_string()))
    }

    /// Numeric input as the worker evaluates it: truncated toward zero.
    ///
    /// A JSON number is truncated; a string must be an integer literal.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` when the number is missing, not numeric, a
    /// non-integer string, or not finite.
    pub fn numeric_input(&self) -> Result<f64, DispatchError> {
        let value = match &self.number {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => {
                let literal = s.trim();
                literal
                    .parse::<i64>()
                    .ok()
                    .and_then(|_| literal.parse::<f64>().ok())
            }
            _ => None,
        };
        match value {
            Some(v) if v.is_finite() => Ok(v.trunc()),
            _ => Err(DispatchError::InvalidPayload(format!(
                "Invalid number - {}",
                self.number
                    .as_ref()
                    .map_or_else(|| "missing".to_string(), ToString::to_string)
            ))),
        }
    }
}

/// A message in transit plus its scheduling metadata.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Priority key; lower is served first within a bucket.
    pub priority: i64,
    /// Enqueue time in milliseconds since epoch.
    pub enqueued_at_ms: u128,
    /// The carried message.
    pub message: TaskMessage,
}

/// Status view of a ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    /// Current status.
    pub status: TaskStatus,
    /// Status literal or error text.
    pub message: String,
}

impl StatusRecord {
    /// Sentinel returned for an unknown task id.
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            status: TaskStatus::NotFound,
            message: TaskStatus::NotFound.as_str().to_string(),
        }
    }
}

/// Result view of a ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    /// Current status.
    pub status: TaskStatus,
    /// Output, or [`NO_OUTPUT`] when absent.
    pub output: f64,
    /// Status literal or error text.
    pub message: String,
}

impl ResultRecord {
    /// Sentinel returned for an unknown task id.
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            status: TaskStatus::NotFound,
            output: NO_OUTPUT,
            message: TaskStatus::NotFound.as_str().to_string(),
        }
    }
}
