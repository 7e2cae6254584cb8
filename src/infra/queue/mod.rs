//! Admission queue strategies.
//!
//! Both strategies share one contract so the worker pool and the recovery
//! sweep never need to know which one is configured:
//!
//! - `enqueue` may block the caller for up to the configured window and
//!   fails with `QueueFull` when no space frees up in time;
//! - `dequeue` blocks for up to the same window and returns `None` when no
//!   work arrived, which callers treat as "idle, poll again".

pub mod fifo;
pub mod priority;

pub use fifo::FifoQueue;
pub use priority::PriorityBucketQueue;

use crate::config::QueuePolicy;
use crate::core::{DispatchError, TaskMessage};

/// Bounded, blocking, multi-producer/multi-consumer admission queue.
pub trait AdmissionQueue: Send + Sync {
    /// Strategy implemented by this queue.
    fn policy(&self) -> QueuePolicy;

    /// Admit a message, blocking up to the configured window.
    ///
    /// # Errors
    ///
    /// `QueueFull` when the target buffer stayed full for the whole window.
    fn enqueue(&self, message: TaskMessage) -> Result<(), DispatchError>;

    /// Take the next message for `worker_id`, blocking up to the configured
    /// window. `None` means no work arrived in time.
    fn dequeue(&self, worker_id: usize) -> Option<TaskMessage>;

    /// Enqueue enough terminate sentinels for every consumer to see one.
    /// Returns how many were admitted.
    ///
    /// # Errors
    ///
    /// `QueueFull` if a sentinel could not be admitted.
    fn broadcast_terminate(&self) -> Result<usize, DispatchError>;

    /// Messages currently buffered.
    fn len(&self) -> usize;

    /// Total capacity.
    fn capacity(&self) -> usize;

    /// Whether nothing is buffered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue is at capacity.
    fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Whether a message for `task_id` would currently find no space.
    fn is_full_for(&self, _task_id: &str) -> bool {
        self.is_full()
    }
}
