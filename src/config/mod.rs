//! Configuration models for the dispatch service.

pub mod service;

pub use service::{default_parallelism, is_sql_identifier, Profile, QueuePolicy, ServiceConfig};
