//! Worker pool: a fixed set of dedicated OS threads draining the admission
//! queue.
//!
//! Each worker loops on a blocking dequeue with timeout. A timeout is an idle
//! recheck, never an error. A terminate sentinel ends the loop of the worker
//! that consumes it. A compute request is resolved through the registry and
//! its outcome written to the ledger; every computation fault becomes an
//! `ERROR` row, so one bad job cannot take a worker down.
//!
//! Ledger futures are driven on the service's tokio runtime through a
//! [`Handle`], so workers never own a runtime of their own.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::core::{ApiKind, DispatchError, ModelRegistry, TaskMessage, TaskStatus, NO_OUTPUT};
use crate::infra::ledger::TaskLedger;
use crate::infra::queue::AdmissionQueue;

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Workers whose thread has not exited.
    pub live_workers: usize,
    /// Jobs currently executing.
    pub active_tasks: u64,
    /// Jobs that ended `COMPLETED`.
    pub completed_tasks: u64,
    /// Jobs that ended `ERROR`.
    pub failed_tasks: u64,
    /// Kill and terminate messages consumed.
    pub control_messages: u64,
    /// Dequeue timeouts.
    pub idle_polls: u64,
    /// Messages waiting in the queue.
    pub queued_tasks: usize,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub control_messages: AtomicU64,
    pub idle_polls: AtomicU64,
}

/// What a worker did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Compute finished and `COMPLETED` was recorded.
    Completed,
    /// Compute faulted and `ERROR` was recorded.
    Failed,
    /// Kill request observed; no ledger action.
    Kill,
    /// Terminate sentinel; the worker stops.
    Terminate,
}

/// Runs one dequeued message against the registry and ledger.
pub struct TaskProcessor {
    registry: Arc<ModelRegistry>,
    ledger: Arc<dyn TaskLedger>,
    runtime: Handle,
}

impl TaskProcessor {
    /// Create a processor driving ledger writes on `runtime`.
    pub fn new(registry: Arc<ModelRegistry>, ledger: Arc<dyn TaskLedger>, runtime: Handle) -> Self {
        Self {
            registry,
            ledger,
            runtime,
        }
    }

    /// Handle one message. Must be called from outside the runtime's own
    /// worker threads.
    pub fn process(&self, worker_id: usize, message: &TaskMessage) -> Handled {
        match message.api {
            ApiKind::Terminate => Handled::Terminate,
            ApiKind::Kill => {
                info!(
                    worker_id = worker_id,
                    task_id = %message.task_id,
                    "Kill request received; running jobs are not preempted"
                );
                Handled::Kill
            }
            ApiKind::Compute => match self.compute(message) {
                Ok(output) => {
                    debug!(worker_id = worker_id, task_id = %message.task_id, output = output, "Task completed");
                    self.record(message, TaskStatus::Completed, TaskStatus::Completed.as_str(), output);
                    Handled::Completed
                }
                Err(e) => {
                    warn!(worker_id = worker_id, task_id = %message.task_id, error = %e, "Task failed");
                    self.record(message, TaskStatus::Error, &e.to_string(), NO_OUTPUT);
                    Handled::Failed
                }
            },
        }
    }

    fn compute(&self, message: &TaskMessage) -> Result<f64, DispatchError> {
        let input = message.numeric_input()?;
        let model = message
            .model
            .as_deref()
            .ok_or_else(|| DispatchError::InvalidPayload("compute request has no model".into()))?;
        self.registry.evaluate(model, input)
    }

    fn record(&self, message: &TaskMessage, status: TaskStatus, text: &str, output: f64) {
        let write = self
            .runtime
            .block_on(self.ledger.update_outcome(&message.task_id, status, text, output));
        if let Err(e) = write {
            // The job already consumed worker capacity; the outcome is dropped.
            error!(task_id = %message.task_id, error = %e, "Failed to record task outcome");
        }
    }
}

/// Fixed-size pool of dedicated worker threads.
pub struct WorkerPool {
    worker_count: usize,
    queue: Arc<dyn AdmissionQueue>,
    processor: Arc<TaskProcessor>,
    counters: Arc<PoolCounters>,
    shutdown: Arc<AtomicBool>,
    started: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    join_grace: Duration,
}

impl WorkerPool {
    /// Create a pool of `worker_count` workers. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(
        worker_count: usize,
        queue: Arc<dyn AdmissionQueue>,
        processor: TaskProcessor,
        join_grace: Duration,
    ) -> Self {
        Self {
            worker_count,
            queue,
            processor: Arc::new(processor),
            counters: Arc::new(PoolCounters::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            join_grace,
        }
    }

    /// Spawn the workers. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// `Shutdown` after [`shutdown`](Self::shutdown); `Internal` if a thread
    /// cannot be spawned.
    pub fn start(&self) -> Result<(), DispatchError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(DispatchError::Shutdown);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            info!("Worker pool has been started already");
            return Ok(());
        }

        let mut workers = self.workers.lock();
        for worker_id in 0..self.worker_count {
            let handle = spawn_worker(
                worker_id,
                Arc::clone(&self.queue),
                Arc::clone(&self.processor),
                Arc::clone(&self.counters),
                Arc::clone(&self.shutdown),
            )
            .map_err(|e| DispatchError::Internal(format!("failed to spawn worker {worker_id}: {e}")))?;
            workers.push(handle);
        }

        info!(
            worker_count = self.worker_count,
            policy = ?self.queue.policy(),
            "Worker pool started"
        );
        Ok(())
    }

    /// Whether [`start`](Self::start) has run.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Configured number of workers.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Workers whose thread is still running.
    #[must_use]
    pub fn live_workers(&self) -> usize {
        self.workers.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            worker_count: self.worker_count,
            live_workers: self.live_workers(),
            active_tasks: self.counters.active_tasks.load(Ordering::Relaxed),
            completed_tasks: self.counters.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.counters.failed_tasks.load(Ordering::Relaxed),
            control_messages: self.counters.control_messages.load(Ordering::Relaxed),
            idle_polls: self.counters.idle_polls.load(Ordering::Relaxed),
            queued_tasks: self.queue.len(),
        }
    }

    /// Stop the pool.
    ///
    /// Workers notice the flag at their next idle recheck or after their
    /// current job. Each is given the grace period to exit; stragglers are
    /// detached.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down worker pool");

        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let join_thread = thread::spawn(move || {
                let _ = tx.send(worker.join().is_ok());
            });
            match rx.recv_timeout(self.join_grace) {
                Ok(true) => debug!(worker_id = idx, "Worker joined successfully"),
                Ok(false) => warn!(worker_id = idx, "Worker panicked"),
                Err(_) => {
                    warn!(worker_id = idx, "Worker did not exit within timeout - detaching");
                    continue;
                }
            }
            let _ = join_thread.join();
        }
        info!(worker_count = worker_count, "Worker pool shut down complete");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Flag only; joining here could hang on a long job.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            debug!("WorkerPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

fn spawn_worker(
    worker_id: usize,
    queue: Arc<dyn AdmissionQueue>,
    processor: Arc<TaskProcessor>,
    counters: Arc<PoolCounters>,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("calc-worker-{worker_id}"))
        .spawn(move || {
            debug!(worker_id = worker_id, "Worker thread started");
            while !shutdown.load(Ordering::Acquire) {
                let Some(message) = queue.dequeue(worker_id) else {
                    counters.idle_polls.fetch_add(1, Ordering::Relaxed);
                    continue;
                };

                if message.api.is_control() {
                    counters.control_messages.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.active_tasks.fetch_add(1, Ordering::Relaxed);
                }

                let handled = processor.process(worker_id, &message);
                match handled {
                    Handled::Terminate => {
                        info!(worker_id = worker_id, "Terminate received, worker exiting");
                        break;
                    }
                    Handled::Kill => {}
                    Handled::Completed => {
                        counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
                        counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                    }
                    Handled::Failed => {
                        counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
                        counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            debug!(worker_id = worker_id, "Worker thread exiting");
        })
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::infra::ledger::InMemoryLedger;
    use crate::infra::queue::{FifoQueue, PriorityBucketQueue};

    fn wait_until(deadline: Duration, mut f: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        f()
    }

    fn pool_with(
        queue: Arc<dyn AdmissionQueue>,
        ledger: Arc<InMemoryLedger>,
        workers: usize,
    ) -> WorkerPool {
        let registry = ModelRegistry::with_defaults()
            .with_model("double", |x| Ok(x * 2.0))
            .with_model("panics", |_| panic!("arithmetic fault"));
        let processor = TaskProcessor::new(Arc::new(registry), ledger, Handle::current());
        WorkerPool::new(workers, queue, processor, Duration::from_secs(2))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_outcomes_are_recorded() {
        let ledger = Arc::new(InMemoryLedger::new());
        let queue: Arc<dyn AdmissionQueue> =
            Arc::new(FifoQueue::new(10, Duration::from_millis(50), 2));
        let pool = pool_with(Arc::clone(&queue), Arc::clone(&ledger), 2);
        pool.start().unwrap();

        for (id, model) in [("ok", "double"), ("bad", "missing"), ("boom", "panics")] {
            ledger.upsert(id, "{}").await.unwrap();
            queue.enqueue(TaskMessage::compute(id, model, 21.7)).unwrap();
        }

        assert!(wait_until(Duration::from_secs(5), || {
            ["ok", "bad", "boom"]
                .iter()
                .all(|id| ledger.row(id).is_some_and(|r| r.status.is_terminal()))
        }));

        let ok = ledger.row("ok").unwrap();
        assert_eq!(ok.status, TaskStatus::Completed);
        assert_eq!(ok.output, Some(42.0));

        let bad = ledger.row("bad").unwrap();
        assert_eq!(bad.status, TaskStatus::Error);
        assert!(bad.status_message.starts_with("Invalid model - missing"));
        assert_eq!(bad.output, Some(NO_OUTPUT));

        let boom = ledger.row("boom").unwrap();
        assert_eq!(boom.status, TaskStatus::Error);
        assert!(boom.status_message.contains("arithmetic fault"));

        let stats = pool.stats();
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.failed_tasks, 2);
        assert_eq!(stats.live_workers, 2);
        pool.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_is_idempotent() {
        let ledger = Arc::new(InMemoryLedger::new());
        let queue: Arc<dyn AdmissionQueue> =
            Arc::new(FifoQueue::new(4, Duration::from_millis(20), 2));
        let pool = pool_with(queue, ledger, 2);
        pool.start().unwrap();
        pool.start().unwrap();
        assert_eq!(pool.live_workers(), 2);
        pool.shutdown();
        assert!(matches!(pool.start(), Err(DispatchError::Shutdown)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_terminate_stops_every_worker() {
        let ledger = Arc::new(InMemoryLedger::new());
        let queue: Arc<dyn AdmissionQueue> =
            Arc::new(PriorityBucketQueue::new(3, 4, Duration::from_millis(20)));
        let pool = pool_with(Arc::clone(&queue), ledger, 3);
        pool.start().unwrap();

        assert_eq!(queue.broadcast_terminate().unwrap(), 3);
        assert!(wait_until(Duration::from_secs(5), || pool.live_workers() == 0));
        assert_eq!(pool.stats().control_messages, 3);
        pool.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_idle_workers_keep_polling() {
        let ledger = Arc::new(InMemoryLedger::new());
        let queue: Arc<dyn AdmissionQueue> =
            Arc::new(FifoQueue::new(4, Duration::from_millis(10), 1));
        let pool = pool_with(queue, ledger, 1);
        pool.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || pool.stats().idle_polls >= 3));
        assert_eq!(pool.live_workers(), 1);
        pool.shutdown();
        assert_eq!(pool.live_workers(), 0);
    }
}
