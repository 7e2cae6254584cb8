//! In-memory ledger for tests and embedding without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::core::{DispatchError, ResultRecord, StatusRecord, TaskStatus, NO_OUTPUT};

use super::{PendingTask, TaskLedger};

/// One ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    /// Submission time, epoch seconds.
    pub submitted_at: i64,
    /// Stored request payload.
    pub payload: String,
    /// Current status.
    pub status: TaskStatus,
    /// Status literal or error text.
    pub status_message: String,
    /// Output once completed.
    pub output: Option<f64>,
}

/// Ledger kept in a hash map. Rows are replaced whole under a write lock, so
/// readers never see a partial row.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    rows: RwLock<HashMap<String, LedgerRow>>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one row.
    #[must_use]
    pub fn row(&self, task_id: &str) -> Option<LedgerRow> {
        self.rows.read().get(task_id).cloned()
    }
}

#[async_trait]
impl TaskLedger for InMemoryLedger {
    async fn create(&self) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn drop_schema(&self) -> Result<(), DispatchError> {
        self.rows.write().clear();
        Ok(())
    }

    async fn upsert_at(
        &self,
        task_id: &str,
        payload: &str,
        submitted_at: i64,
    ) -> Result<(), DispatchError> {
        let mut rows = self.rows.write();
        let row = rows.entry(task_id.to_string()).or_insert_with(|| LedgerRow {
            submitted_at,
            payload: String::new(),
            status: TaskStatus::Processing,
            status_message: String::new(),
            output: None,
        });
        row.payload = payload.to_string();
        row.status = TaskStatus::Processing;
        row.status_message = TaskStatus::Processing.as_str().to_string();
        Ok(())
    }

    async fn update_outcome(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: &str,
        output: f64,
    ) -> Result<bool, DispatchError> {
        let mut rows = self.rows.write();
        let Some(row) = rows.get_mut(task_id) else {
            warn!(task_id = task_id, "Outcome for unknown task dropped");
            return Ok(false);
        };
        row.status = status;
        row.status_message = message.to_string();
        row.output = Some(output);
        Ok(true)
    }

    async fn read_status(&self, task_id: &str) -> Result<StatusRecord, DispatchError> {
        Ok(self
            .rows
            .read()
            .get(task_id)
            .map_or_else(StatusRecord::not_found, |row| StatusRecord {
                status: row.status,
                message: row.status_message.clone(),
            }))
    }

    async fn read_result(&self, task_id: &str) -> Result<ResultRecord, DispatchError> {
        Ok(self
            .rows
            .read()
            .get(task_id)
            .map_or_else(ResultRecord::not_found, |row| ResultRecord {
                status: row.status,
                output: row.output.unwrap_or(NO_OUTPUT),
                message: row.status_message.clone(),
            }))
    }

    async fn scan_pending(&self, before: i64) -> Result<Vec<PendingTask>, DispatchError> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|(_, row)| row.status == TaskStatus::Processing && row.submitted_at <= before)
            .map(|(task_id, row)| PendingTask {
                task_id: task_id.clone(),
                payload: row.payload.clone(),
            })
            .collect())
    }

    async fn count(&self) -> Result<u64, DispatchError> {
        Ok(self.rows.read().len() as u64)
    }
}
