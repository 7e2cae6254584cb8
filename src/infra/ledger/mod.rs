//! Task ledger backends: the durable record of every task and its outcome.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryLedger;
pub use sqlite::SqliteLedger;

use async_trait::async_trait;

use crate::core::{DispatchError, ResultRecord, StatusRecord, TaskStatus};
use crate::util::now_secs;

/// A `PROCESSING` row picked up by the recovery sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    /// Task identifier.
    pub task_id: String,
    /// Stored request payload.
    pub payload: String,
}

/// Persistent per-task record keyed by task id.
///
/// Every operation is independent: it acquires its own storage scope and
/// either commits fully or leaves the row untouched.
#[async_trait]
pub trait TaskLedger: Send + Sync {
    /// Create the table if it does not exist.
    async fn create(&self) -> Result<(), DispatchError>;

    /// Drop the table if it exists.
    async fn drop_schema(&self) -> Result<(), DispatchError>;

    /// Insert a `PROCESSING` row stamped `submitted_at`, or reset an existing
    /// row to `PROCESSING` with the new payload. A reset keeps the previous
    /// output and submission time.
    async fn upsert_at(
        &self,
        task_id: &str,
        payload: &str,
        submitted_at: i64,
    ) -> Result<(), DispatchError>;

    /// [`upsert_at`](Self::upsert_at) stamped with the current time.
    async fn upsert(&self, task_id: &str, payload: &str) -> Result<(), DispatchError> {
        self.upsert_at(task_id, payload, now_secs()).await
    }

    /// Record a terminal outcome. Returns `false` (after logging) when no
    /// row exists for `task_id`.
    async fn update_outcome(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: &str,
        output: f64,
    ) -> Result<bool, DispatchError>;

    /// Status and message, or the `NOT FOUND` sentinel.
    async fn read_status(&self, task_id: &str) -> Result<StatusRecord, DispatchError>;

    /// Status, output and message, or the `NOT FOUND` sentinel.
    async fn read_result(&self, task_id: &str) -> Result<ResultRecord, DispatchError>;

    /// `PROCESSING` rows submitted at or before `before`, in no particular
    /// order.
    async fn scan_pending(&self, before: i64) -> Result<Vec<PendingTask>, DispatchError>;

    /// Number of rows.
    async fn count(&self) -> Result<u64, DispatchError>;

    /// Release storage resources.
    async fn close(&self) {}
}
