//! Build the admission queue selected by configuration.

use std::sync::Arc;

use tracing::debug;

use crate::config::{QueuePolicy, ServiceConfig};
use crate::core::DispatchError;
use crate::infra::queue::{AdmissionQueue, FifoQueue, PriorityBucketQueue};

/// Build the admission queue for `cfg`.
///
/// Under the priority policy `queue_size` bounds each bucket, and one
/// bucket exists per worker.
///
/// # Errors
///
/// `InvalidConfig` if `cfg` fails validation.
pub fn build_queue(cfg: &ServiceConfig) -> Result<Arc<dyn AdmissionQueue>, DispatchError> {
    cfg.validate()
        .map_err(|e| DispatchError::InvalidConfig(format!("config invalid: {e}")))?;

    let timeout = cfg.queue_block_timeout();
    let queue: Arc<dyn AdmissionQueue> = match cfg.policy {
        QueuePolicy::Fifo => Arc::new(FifoQueue::new(cfg.queue_size, timeout, cfg.parallelism)),
        QueuePolicy::Priority => Arc::new(PriorityBucketQueue::new(
            cfg.parallelism,
            cfg.queue_size,
            timeout,
        )),
    };
    debug!(
        policy = ?cfg.policy,
        capacity = queue.capacity(),
        parallelism = cfg.parallelism,
        "Admission queue built"
    );
    Ok(queue)
}
