//! Integration tests for the admission queue strategies.
//!
//! These tests validate:
//! - Back-pressure at capacity with no consumers
//! - Priority-class ordering within one bucket
//! - Many producers and consumers sharing one queue
//! - Blocked producers resuming once space frees up

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use calculator_dispatch::core::{ApiKind, DispatchError, TaskMessage, TERMINATE_TASK_ID};
use calculator_dispatch::infra::queue::{AdmissionQueue, FifoQueue, PriorityBucketQueue};

const SHORT: Duration = Duration::from_millis(30);

// ============================================================================
// BACK-PRESSURE
// ============================================================================

#[test]
fn test_overflow_is_rejected_within_window() {
    let queues: Vec<Arc<dyn AdmissionQueue>> = vec![
        Arc::new(FifoQueue::new(5, SHORT, 1)),
        Arc::new(PriorityBucketQueue::new(1, 5, SHORT)),
    ];
    for queue in queues {
        for i in 0..5 {
            assert!(!queue.is_full());
            queue
                .enqueue(TaskMessage::compute(format!("t{i}"), "sum_math_cos", 1.0))
                .unwrap();
        }
        assert!(queue.is_full());
        assert_eq!(queue.len(), queue.capacity());

        let started = Instant::now();
        let overflow = queue.enqueue(TaskMessage::compute("t5", "sum_math_cos", 1.0));
        assert!(matches!(overflow, Err(DispatchError::QueueFull(_))));
        assert!(started.elapsed() >= SHORT);
        assert!(overflow.unwrap_err().is_retryable());
    }
}

#[test]
fn test_blocked_producer_resumes_when_drained() {
    let queue = Arc::new(PriorityBucketQueue::new(1, 1, Duration::from_secs(2)));
    queue.enqueue(TaskMessage::compute("first", "m", 1.0)).unwrap();

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.enqueue(TaskMessage::compute("second", "m", 1.0)))
    };
    thread::sleep(Duration::from_millis(50));
    assert_eq!(queue.dequeue(0).unwrap().task_id, "first");
    producer.join().unwrap().unwrap();
    assert_eq!(queue.dequeue(0).unwrap().task_id, "second");
}

// ============================================================================
// ORDERING
// ============================================================================

#[test]
fn test_bucket_serves_kill_then_compute_then_terminate() {
    let queue = PriorityBucketQueue::new(1, 10, SHORT);
    queue.enqueue(TaskMessage::compute("a", "m", 1.0)).unwrap();
    queue.enqueue(TaskMessage::compute("b", "m", 2.0)).unwrap();
    queue.enqueue(TaskMessage::compute("c", "m", 3.0)).unwrap();
    queue.enqueue(TaskMessage::kill("a")).unwrap();
    queue.enqueue(TaskMessage::terminate()).unwrap();

    let order: Vec<(ApiKind, String)> = (0..5)
        .map(|_| {
            let m = queue.dequeue(0).unwrap();
            (m.api, m.task_id)
        })
        .collect();
    assert_eq!(
        order,
        vec![
            (ApiKind::Kill, "a".to_string()),
            (ApiKind::Compute, "a".to_string()),
            (ApiKind::Compute, "b".to_string()),
            (ApiKind::Compute, "c".to_string()),
            (ApiKind::Terminate, TERMINATE_TASK_ID.to_string()),
        ]
    );
}

#[test]
fn test_fifo_preserves_arrival_order() {
    let queue = FifoQueue::new(10, SHORT, 1);
    for i in 0..5 {
        queue.enqueue(TaskMessage::compute(format!("t{i}"), "m", 1.0)).unwrap();
    }
    queue.enqueue(TaskMessage::kill("t0")).unwrap();
    let ids: Vec<String> = (0..6).map(|_| queue.dequeue(0).unwrap().task_id).collect();
    assert_eq!(ids, vec!["t0", "t1", "t2", "t3", "t4", "t0"]);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

fn drain_concurrently(queue: Arc<dyn AdmissionQueue>, consumers: usize) -> HashSet<String> {
    let producers: Vec<_> = (0..4)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..50 {
                    queue
                        .enqueue(TaskMessage::compute(format!("p{p}-{i}"), "m", 1.0))
                        .unwrap();
                }
            })
        })
        .collect();
    let workers: Vec<_> = (0..consumers)
        .map(|w| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seen = Vec::new();
                loop {
                    match queue.dequeue(w) {
                        Some(m) if m.api == ApiKind::Terminate => break seen,
                        Some(m) => seen.push(m.task_id),
                        None => {}
                    }
                }
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    assert_eq!(queue.broadcast_terminate().unwrap(), consumers);

    let mut all = HashSet::new();
    for w in workers {
        for id in w.join().unwrap() {
            assert!(all.insert(id), "message delivered twice");
        }
    }
    all
}

#[test]
fn test_fifo_delivers_each_message_once() {
    let queue: Arc<dyn AdmissionQueue> = Arc::new(FifoQueue::new(8, Duration::from_secs(2), 3));
    assert_eq!(drain_concurrently(queue, 3).len(), 200);
}

#[test]
fn test_buckets_deliver_each_message_once() {
    let queue: Arc<dyn AdmissionQueue> =
        Arc::new(PriorityBucketQueue::new(3, 8, Duration::from_secs(2)));
    assert_eq!(drain_concurrently(queue, 3).len(), 200);
}
