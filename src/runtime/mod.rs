//! Service runtime and the task API surface.

pub mod api;

pub use api::{
    EvaluateRequest, TaskResponse, TaskResult, TaskService, RETCODE_FAILED, RETCODE_OK,
};
