//! Builders that turn configuration into dispatch components.

pub mod queue_builder;

pub use queue_builder::build_queue;
