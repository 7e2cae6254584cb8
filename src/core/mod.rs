//! Core dispatch abstractions: task model, registry, workers and recovery.

pub mod error;
pub mod recovery;
pub mod registry;
pub mod task;
pub mod worker_pool;

pub use error::{AppResult, DispatchError, ErrorKind};
pub use recovery::{recover_pending, RecoveryReport};
pub use registry::{sum_math_cos, ComputeFn, ModelRegistry};
pub use task::{
    ApiKind, QueueEntry, ResultRecord, StatusRecord, TaskMessage, TaskStatus, NO_OUTPUT,
    TERMINATE_TASK_ID,
};
pub use worker_pool::{Handled, PoolStats, TaskProcessor, WorkerPool};
