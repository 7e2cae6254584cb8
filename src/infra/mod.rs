//! Infrastructure adapters for the admission queue and the task ledger.

pub mod ledger;
pub mod queue;

pub use ledger::{InMemoryLedger, PendingTask, SqliteLedger, TaskLedger};
pub use queue::{AdmissionQueue, FifoQueue, PriorityBucketQueue};
