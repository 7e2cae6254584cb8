//! # Calculator Dispatch
//!
//! A durable job queue and worker-pool dispatch layer for numeric
//! computation jobs.
//!
//! Every accepted job is written to a persistent task ledger before it is
//! handed to a bounded admission queue, and a fixed pool of dedicated worker
//! threads drains the queue, runs the requested model and records the outcome
//! back into the ledger. A recovery sweep at startup replays jobs that were
//! accepted but never finished, which makes execution at-least-once across
//! crashes.
//!
//! ## Key Features
//!
//! - **Back-pressure**: a full queue rejects submissions within a bounded
//!   blocking window instead of growing without limit
//! - **Two admission policies**: one shared FIFO buffer, or priority buckets
//!   (one per worker) where kill requests jump ahead of computations and
//!   terminate sentinels trail them
//! - **Durable ledger**: SQLite table keyed by task id, parameterized
//!   statements, one transaction per write
//! - **Contained faults**: unknown models, bad input and panicking compute
//!   functions all end as an `ERROR` row, never as a dead worker
//!
//! ## Usage
//!
//! ```rust,ignore
//! use calculator_dispatch::config::ServiceConfig;
//! use calculator_dispatch::runtime::{EvaluateRequest, TaskService};
//!
//! let service = TaskService::start(ServiceConfig::from_env()?).await?;
//!
//! let accepted = service.submit(EvaluateRequest::new("sum_math_cos", 0.5)).await;
//! let status = service.status(&accepted.task_id).await;
//! let result = service.result(&accepted.task_id).await;
//!
//! service.terminate().await?;
//! service.shutdown().await;
//! ```
//!
//! For complete scenarios, see `tests/service_test.rs`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct dispatch components from configuration.
pub mod builders;
/// Service configuration and profiles.
pub mod config;
/// Task model, computation registry, worker pool and recovery.
pub mod core;
/// Admission queues and task ledgers.
pub mod infra;
/// Service context and the task API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
