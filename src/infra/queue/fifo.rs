//! Policy A: one bounded FIFO buffer shared by every worker.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::QueuePolicy;
use crate::core::{DispatchError, QueueEntry, TaskMessage};
use crate::util::{now_ms, now_secs};

use super::AdmissionQueue;

/// Auxiliary size counter, mutated only under its own lock.
///
/// Signed so that a dequeue landing before the producer's increment only
/// dips it below zero for a moment instead of losing a count.
#[derive(Debug, Default)]
struct SizeCounter {
    value: Mutex<i64>,
}

impl SizeCounter {
    fn increment(&self) {
        *self.value.lock() += 1;
    }

    fn decrement(&self) {
        *self.value.lock() -= 1;
    }

    fn get(&self, capacity: usize) -> usize {
        usize::try_from(*self.value.lock()).unwrap_or(0).min(capacity)
    }
}

/// Bounded FIFO admission queue.
///
/// Size is read from the channel; the auxiliary counter is kept alongside
/// and answers when the channel cannot report a bounded length.
pub struct FifoQueue {
    tx: Sender<QueueEntry>,
    rx: Receiver<QueueEntry>,
    capacity: usize,
    timeout: Duration,
    consumers: usize,
    counter: SizeCounter,
}

impl FifoQueue {
    /// Create a queue holding at most `capacity` messages, blocking callers
    /// for up to `timeout`, drained by `consumers` workers.
    #[must_use]
    pub fn new(capacity: usize, timeout: Duration, consumers: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        info!(
            capacity = capacity,
            consumers = consumers,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "FIFO admission queue initialized"
        );
        Self {
            tx,
            rx,
            capacity,
            timeout,
            consumers,
            counter: SizeCounter::default(),
        }
    }

    /// Size according to the auxiliary counter.
    #[must_use]
    pub fn tracked_len(&self) -> usize {
        self.counter.get(self.capacity)
    }

    fn native_len(&self) -> Option<usize> {
        self.tx.capacity().map(|_| self.tx.len())
    }
}

impl AdmissionQueue for FifoQueue {
    fn policy(&self) -> QueuePolicy {
        QueuePolicy::Fifo
    }

    fn enqueue(&self, message: TaskMessage) -> Result<(), DispatchError> {
        let entry = QueueEntry {
            priority: message.api.priority_key(now_secs()),
            enqueued_at_ms: now_ms(),
            message,
        };
        match self.tx.send_timeout(entry, self.timeout) {
            Ok(()) => {
                self.counter.increment();
                Ok(())
            }
            Err(SendTimeoutError::Timeout(entry)) => {
                warn!(task_id = %entry.message.task_id, "Queue is full, please try again later");
                Err(DispatchError::QueueFull(format!(
                    "queue of {} stayed full for {:?}",
                    self.capacity, self.timeout
                )))
            }
            Err(SendTimeoutError::Disconnected(_)) => Err(DispatchError::Shutdown),
        }
    }

    fn dequeue(&self, _worker_id: usize) -> Option<TaskMessage> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(entry) => {
                self.counter.decrement();
                debug!(
                    task_id = %entry.message.task_id,
                    api = ?entry.message.api,
                    priority = entry.priority,
                    waited_ms = now_ms().saturating_sub(entry.enqueued_at_ms),
                    "Dequeued"
                );
                Some(entry.message)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                debug!("Queue is empty, rechecking");
                None
            }
        }
    }

    fn broadcast_terminate(&self) -> Result<usize, DispatchError> {
        for _ in 0..self.consumers {
            self.enqueue(TaskMessage::terminate())?;
        }
        Ok(self.consumers)
    }

    fn len(&self) -> usize {
        self.native_len()
            .unwrap_or_else(|| self.counter.get(self.capacity))
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
