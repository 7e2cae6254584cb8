//! Policy B: task ids sharded into independent bounded priority buckets.
//!
//! Each worker drains its own bucket. Within a bucket, entries leave in
//! ascending priority key, ties in insertion order. There is no ordering
//! across buckets.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::QueuePolicy;
use crate::core::{DispatchError, QueueEntry, TaskMessage};
use crate::util::{now_ms, now_secs};

use super::AdmissionQueue;

/// Heap wrapper: smallest priority key first, FIFO within a key.
struct BucketEntry {
    entry: QueueEntry,
    seq: u64,
}

impl PartialEq for BucketEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for BucketEntry {}

impl PartialOrd for BucketEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BucketEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for the max-heap
        other
            .entry
            .priority
            .cmp(&self.entry.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Bucket {
    heap: Mutex<BinaryHeap<BucketEntry>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl Bucket {
    fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::with_capacity(capacity.min(1024))),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }
}

/// Priority-partitioned admission queue.
pub struct PriorityBucketQueue {
    buckets: Vec<Bucket>,
    bucket_capacity: usize,
    timeout: Duration,
    seq: AtomicU64,
}

impl PriorityBucketQueue {
    /// Create `parallelism` buckets of `bucket_capacity` entries each.
    #[must_use]
    pub fn new(parallelism: usize, bucket_capacity: usize, timeout: Duration) -> Self {
        let parallelism = parallelism.max(1);
        info!(
            parallelism = parallelism,
            bucket_capacity = bucket_capacity,
            "Priority bucket admission queue initialized"
        );
        Self {
            buckets: (0..parallelism).map(|_| Bucket::new(bucket_capacity)).collect(),
            bucket_capacity,
            timeout,
            seq: AtomicU64::new(0),
        }
    }

    /// Bucket a task id is routed to. Stable across restarts.
    #[must_use]
    pub fn bucket_for(&self, task_id: &str) -> usize {
        let hash = xxh3_64(task_id.as_bytes());
        usize::try_from(hash % self.buckets.len() as u64).unwrap_or(0)
    }

    /// Number of buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Entries currently held by bucket `idx`.
    #[must_use]
    pub fn bucket_len(&self, idx: usize) -> usize {
        self.buckets.get(idx).map_or(0, |b| b.heap.lock().len())
    }

    /// Whether bucket `idx` is at capacity.
    #[must_use]
    pub fn is_bucket_full(&self, idx: usize) -> bool {
        self.bucket_len(idx) >= self.bucket_capacity
    }

    fn push_into(&self, idx: usize, message: TaskMessage) -> Result<(), DispatchError> {
        let bucket = &self.buckets[idx];
        let deadline = Instant::now() + self.timeout;
        let mut heap = bucket.heap.lock();
        while heap.len() >= self.bucket_capacity {
            if bucket.not_full.wait_until(&mut heap, deadline).timed_out()
                && heap.len() >= self.bucket_capacity
            {
                warn!(bucket = idx, task_id = %message.task_id, "Queue bucket is full");
                return Err(DispatchError::QueueFull(format!("queue[{idx}] is full")));
            }
        }
        let entry = QueueEntry {
            priority: message.api.priority_key(now_secs()),
            enqueued_at_ms: now_ms(),
            message,
        };
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        heap.push(BucketEntry { entry, seq });
        drop(heap);
        bucket.not_empty.notify_one();
        Ok(())
    }

    fn pop_from(&self, idx: usize) -> Option<TaskMessage> {
        let bucket = &self.buckets[idx];
        let deadline = Instant::now() + self.timeout;
        let mut heap = bucket.heap.lock();
        while heap.is_empty() {
            if bucket.not_empty.wait_until(&mut heap, deadline).timed_out() && heap.is_empty() {
                debug!(bucket = idx, "Queue bucket is empty, rechecking");
                return None;
            }
        }
        let item = heap.pop().map(|e| e.entry);
        drop(heap);
        bucket.not_full.notify_one();
        item.map(|entry| {
            debug!(
                bucket = idx,
                task_id = %entry.message.task_id,
                priority = entry.priority,
                waited_ms = now_ms().saturating_sub(entry.enqueued_at_ms),
                "Dequeued"
            );
            entry.message
        })
    }
}

impl AdmissionQueue for PriorityBucketQueue {
    fn policy(&self) -> QueuePolicy {
        QueuePolicy::Priority
    }

    fn enqueue(&self, message: TaskMessage) -> Result<(), DispatchError> {
        let idx = self.bucket_for(&message.task_id);
        self.push_into(idx, message)
    }

    fn dequeue(&self, worker_id: usize) -> Option<TaskMessage> {
        self.pop_from(worker_id % self.buckets.len())
    }

    fn broadcast_terminate(&self) -> Result<usize, DispatchError> {
        for idx in 0..self.buckets.len() {
            self.push_into(idx, TaskMessage::terminate())?;
        }
        Ok(self.buckets.len())
    }

    fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.heap.lock().len()).sum()
    }

    fn capacity(&self) -> usize {
        self.bucket_capacity * self.buckets.len()
    }

    fn is_full_for(&self, task_id: &str) -> bool {
        self.is_bucket_full(self.bucket_for(task_id))
    }
}
