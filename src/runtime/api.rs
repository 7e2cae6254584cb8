//! Task API facade: the request/response surface consumed by an outer
//! transport layer, plus the service context that wires every component.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::builders::build_queue;
use crate::config::ServiceConfig;
use crate::core::{
    recover_pending, AppResult, DispatchError, ModelRegistry, PoolStats, RecoveryReport,
    TaskMessage, TaskProcessor, TaskStatus, WorkerPool, NO_OUTPUT,
};
use crate::infra::ledger::{SqliteLedger, TaskLedger};
use crate::infra::queue::AdmissionQueue;
use crate::util::now_secs;

/// Successful call.
pub const RETCODE_OK: i32 = 0;
/// Failed call; the message says why.
pub const RETCODE_FAILED: i32 = 1;

const STATUS_FAILED: &str = "FAILED";
const MSG_QUEUED: &str = "ok-queued";
const MSG_QUEUE_FULL: &str = "queue-full";

/// Evaluation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    /// Registered model name.
    pub model: String,
    /// Input number.
    pub number: f64,
}

impl EvaluateRequest {
    /// Build a request.
    pub fn new(model: impl Into<String>, number: f64) -> Self {
        Self {
            model: model.into(),
            number,
        }
    }
}

/// Response to `submit` and `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    /// Task identifier.
    pub task_id: String,
    /// `0` on success, `1` on failure.
    pub retcode: i32,
    /// Status label.
    pub status: String,
    /// Human readable message.
    pub message: String,
}

/// Response to `result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task identifier.
    pub task_id: String,
    /// `0` on success, `1` on failure.
    pub retcode: i32,
    /// Status label.
    pub status: String,
    /// Human readable message.
    pub message: String,
    /// Output, `-1.0` unless completed.
    pub output: f64,
}

/// Running dispatch service: ledger, queue and worker pool built once and
/// shared by handle.
pub struct TaskService {
    config: ServiceConfig,
    ledger: Arc<dyn TaskLedger>,
    queue: Arc<dyn AdmissionQueue>,
    pool: WorkerPool,
    recovery: RecoveryReport,
}

impl TaskService {
    /// Start the service with the SQLite ledger and the built-in models.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, an unreachable ledger, or a failed
    /// recovery sweep.
    pub async fn start(config: ServiceConfig) -> AppResult<Self> {
        config.validate().map_err(DispatchError::InvalidConfig)?;
        let ledger = SqliteLedger::from_config(&config).await?;
        Self::start_with(config, Arc::new(ledger), ModelRegistry::with_defaults()).await
    }

    /// Start the service on an explicit ledger and registry.
    ///
    /// Startup order: schema, queue, workers, then one recovery sweep that
    /// finishes before this returns.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start). Must be called inside a multi-threaded
    /// tokio runtime.
    pub async fn start_with(
        config: ServiceConfig,
        ledger: Arc<dyn TaskLedger>,
        registry: ModelRegistry,
    ) -> AppResult<Self> {
        config.validate().map_err(DispatchError::InvalidConfig)?;
        ledger.create().await?;

        let queue = build_queue(&config)?;
        let processor = TaskProcessor::new(Arc::new(registry), Arc::clone(&ledger), Handle::try_current()?);
        let pool = WorkerPool::new(
            config.parallelism,
            Arc::clone(&queue),
            processor,
            config.queue_block_timeout() + Duration::from_secs(2),
        );
        pool.start()?;

        let recovery = recover_pending(&ledger, &queue, now_secs()).await?;
        info!(
            service = %config.service,
            policy = ?config.policy,
            parallelism = config.parallelism,
            recovered = recovery.requeued,
            "Task service started"
        );
        Ok(Self {
            config,
            ledger,
            queue,
            pool,
            recovery,
        })
    }

    /// Submit under a fresh task id.
    pub async fn submit(&self, request: EvaluateRequest) -> TaskResponse {
        self.submit_with_id(Uuid::new_v4().to_string(), request).await
    }

    /// Submit under `task_id`. Resubmitting an id resets its row to
    /// `PROCESSING`.
    pub async fn submit_with_id(
        &self,
        task_id: impl Into<String>,
        request: EvaluateRequest,
    ) -> TaskResponse {
        let task_id = task_id.into();
        if self.queue.is_full_for(&task_id) {
            warn!(task_id = %task_id, "Queue is full, submission rejected");
            return response(task_id, RETCODE_FAILED, STATUS_FAILED, MSG_QUEUE_FULL);
        }

        let message = TaskMessage::compute(task_id.clone(), request.model, request.number);
        let persisted = match message.to_json() {
            Ok(payload) => self.ledger.upsert(&task_id, &payload).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            error!(task_id = %task_id, error = %e, "Failed to persist submission");
            return response(
                task_id,
                RETCODE_FAILED,
                TaskStatus::Error.as_str(),
                &format!("Failed to persist input message to database - {e}"),
            );
        }

        match self.enqueue(message).await {
            Ok(()) => response(task_id, RETCODE_OK, TaskStatus::Processing.as_str(), MSG_QUEUED),
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Enqueue failed after persisting");
                // Close the row so the recovery sweep does not replay it.
                if let Err(write) = self
                    .ledger
                    .update_outcome(&task_id, TaskStatus::Error, MSG_QUEUE_FULL, NO_OUTPUT)
                    .await
                {
                    error!(task_id = %task_id, error = %write, "Failed to close rejected task");
                }
                let message = match e {
                    DispatchError::QueueFull(_) => MSG_QUEUE_FULL.to_string(),
                    other => other.to_string(),
                };
                response(task_id, RETCODE_FAILED, STATUS_FAILED, &message)
            }
        }
    }

    /// Status of `task_id`. `NOT FOUND` and storage faults answer with
    /// retcode 1.
    pub async fn status(&self, task_id: &str) -> TaskResponse {
        match self.ledger.read_status(task_id).await {
            Ok(record) => {
                let retcode = if record.status == TaskStatus::NotFound {
                    RETCODE_FAILED
                } else {
                    RETCODE_OK
                };
                response(task_id.to_string(), retcode, record.status.as_str(), &record.message)
            }
            Err(e) => response(
                task_id.to_string(),
                RETCODE_FAILED,
                TaskStatus::Error.as_str(),
                &e.to_string(),
            ),
        }
    }

    /// Result of `task_id`. Anything but `COMPLETED` or `PROCESSING` answers
    /// with retcode 1.
    pub async fn result(&self, task_id: &str) -> TaskResult {
        match self.ledger.read_result(task_id).await {
            Ok(record) => {
                let retcode = match record.status {
                    TaskStatus::Error | TaskStatus::NotFound => RETCODE_FAILED,
                    TaskStatus::Processing | TaskStatus::Completed => RETCODE_OK,
                };
                TaskResult {
                    task_id: task_id.to_string(),
                    retcode,
                    status: record.status.as_str().to_string(),
                    message: record.message,
                    output: record.output,
                }
            }
            Err(e) => TaskResult {
                task_id: task_id.to_string(),
                retcode: RETCODE_FAILED,
                status: TaskStatus::Error.as_str().to_string(),
                message: e.to_string(),
                output: NO_OUTPUT,
            },
        }
    }

    /// Enqueue terminate sentinels so every worker stops after draining
    /// what is ahead of its sentinel. Returns how many were admitted.
    ///
    /// # Errors
    ///
    /// `QueueFull` if a sentinel could not be admitted in time.
    pub async fn terminate(&self) -> Result<usize, DispatchError> {
        let queue = Arc::clone(&self.queue);
        let sent = tokio::task::spawn_blocking(move || queue.broadcast_terminate())
            .await
            .map_err(|e| DispatchError::Internal(format!("terminate join: {e}")))??;
        info!(sentinels = sent, "Terminate broadcast");
        Ok(sent)
    }

    /// Stop the workers and close the ledger.
    pub async fn shutdown(&self) {
        tokio::task::block_in_place(|| self.pool.shutdown());
        self.ledger.close().await;
        info!(service = %self.config.service, "Task service stopped");
    }

    /// Worker pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Report of the startup recovery sweep.
    #[must_use]
    pub const fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Configuration the service was started with.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Ledger handle.
    #[must_use]
    pub fn ledger(&self) -> Arc<dyn TaskLedger> {
        Arc::clone(&self.ledger)
    }

    /// Admission queue handle.
    #[must_use]
    pub fn queue(&self) -> Arc<dyn AdmissionQueue> {
        Arc::clone(&self.queue)
    }

    async fn enqueue(&self, message: TaskMessage) -> Result<(), DispatchError> {
        let queue = Arc::clone(&self.queue);
        tokio::task::spawn_blocking(move || queue.enqueue(message))
            .await
            .map_err(|e| DispatchError::Internal(format!("enqueue join: {e}")))?
    }
}

fn response(task_id: String, retcode: i32, status: &str, message: &str) -> TaskResponse {
    TaskResponse {
        task_id,
        retcode,
        status: status.to_string(),
        message: message.to_string(),
    }
}
