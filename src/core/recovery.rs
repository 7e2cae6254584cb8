//! Startup sweep that replays `PROCESSING` rows left by a previous run.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::core::{DispatchError, TaskMessage, TaskStatus, NO_OUTPUT};
use crate::infra::ledger::TaskLedger;
use crate::infra::queue::AdmissionQueue;

/// Outcome of one recovery sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Pending rows found.
    pub scanned: usize,
    /// Rows put back on the queue.
    pub requeued: usize,
    /// Rows closed as `ERROR` because their payload was unreadable.
    pub rejected: usize,
    /// Rows left `PROCESSING` because the queue stayed full.
    pub deferred: usize,
}

/// Re-enqueue every `PROCESSING` row submitted at or before `before`.
///
/// No ledger row is written for a replayed task; it is already
/// `PROCESSING`. Rows that do not fit are left for the next startup.
///
/// # Errors
///
/// Propagates ledger faults from the scan, and `Shutdown`/`Internal` from the
/// queue.
pub async fn recover_pending(
    ledger: &Arc<dyn TaskLedger>,
    queue: &Arc<dyn AdmissionQueue>,
    before: i64,
) -> Result<RecoveryReport, DispatchError> {
    let pending = ledger.scan_pending(before).await?;
    let mut report = RecoveryReport {
        scanned: pending.len(),
        ..RecoveryReport::default()
    };

    for task in pending {
        let message = match TaskMessage::from_json(&task.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "Unreadable pending payload");
                ledger
                    .update_outcome(&task.task_id, TaskStatus::Error, &e.to_string(), NO_OUTPUT)
                    .await?;
                report.rejected += 1;
                continue;
            }
        };

        let q = Arc::clone(queue);
        let admitted = tokio::task::spawn_blocking(move || q.enqueue(message))
            .await
            .map_err(|e| DispatchError::Internal(format!("recovery enqueue join: {e}")))?;
        match admitted {
            Ok(()) => report.requeued += 1,
            Err(DispatchError::QueueFull(_)) => {
                warn!(task_id = %task.task_id, "Queue full during recovery; task deferred");
                report.deferred += 1;
            }
            Err(e) => {
                error!(task_id = %task.task_id, error = %e, "Recovery aborted");
                return Err(e);
            }
        }
    }

    info!(
        scanned = report.scanned,
        requeued = report.requeued,
        rejected = report.rejected,
        deferred = report.deferred,
        "Recovery sweep finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::infra::ledger::InMemoryLedger;
    use crate::infra::queue::FifoQueue;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_replays_pending_rows_only() {
        let memory = Arc::new(InMemoryLedger::new());
        let ledger: Arc<dyn TaskLedger> = memory.clone();
        let queue: Arc<dyn AdmissionQueue> =
            Arc::new(FifoQueue::new(10, Duration::from_millis(20), 1));

        let stale = TaskMessage::compute("stale", "sum_math_cos", 0.5);
        ledger.upsert_at("stale", &stale.to_json().unwrap(), 10).await.unwrap();
        let fresh = TaskMessage::compute("fresh", "sum_math_cos", 0.5);
        ledger.upsert_at("fresh", &fresh.to_json().unwrap(), 500).await.unwrap();
        ledger.upsert_at("done", &stale.to_json().unwrap(), 10).await.unwrap();
        ledger
            .update_outcome("done", TaskStatus::Completed, "COMPLETED", 1.0)
            .await
            .unwrap();

        let report = recover_pending(&ledger, &queue, 100).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.requeued, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue(0).unwrap().task_id, "stale");
        assert_eq!(memory.row("stale").unwrap().status, TaskStatus::Processing);
        assert_eq!(ledger.count().await.unwrap(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unreadable_payload_is_closed() {
        let memory = Arc::new(InMemoryLedger::new());
        let ledger: Arc<dyn TaskLedger> = memory.clone();
        let queue: Arc<dyn AdmissionQueue> =
            Arc::new(FifoQueue::new(10, Duration::from_millis(20), 1));
        ledger.upsert_at("garbled", "{not json", 1).await.unwrap();

        let report = recover_pending(&ledger, &queue, 100).await.unwrap();
        assert_eq!(report.rejected, 1);
        assert!(queue.is_empty());
        let row = memory.row("garbled").unwrap();
        assert_eq!(row.status, TaskStatus::Error);
        assert_eq!(row.output, Some(NO_OUTPUT));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_queue_defers() {
        let ledger: Arc<dyn TaskLedger> = Arc::new(InMemoryLedger::new());
        let queue: Arc<dyn AdmissionQueue> =
            Arc::new(FifoQueue::new(1, Duration::from_millis(20), 1));
        for id in ["a", "b"] {
            let payload = TaskMessage::compute(id, "sum_math_cos", 1.0).to_json().unwrap();
            ledger.upsert_at(id, &payload, 1).await.unwrap();
        }

        let report = recover_pending(&ledger, &queue, 100).await.unwrap();
        assert_eq!(report.requeued, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(ledger.scan_pending(100).await.unwrap().len(), 2);
    }
}
