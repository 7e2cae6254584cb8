//! Tests for error types

use calculator_dispatch::core::{DispatchError, ErrorKind};

#[test]
fn test_queue_full_error() {
    let err = DispatchError::QueueFull("queue[0] is full".to_string());
    assert_eq!(format!("{err}"), "queue full: queue[0] is full");
    assert_eq!(err.kind(), ErrorKind::Backpressure);
    assert!(err.is_retryable());
}

#[test]
fn test_unknown_model_error() {
    let err = DispatchError::UnknownModel {
        name: "invalid".to_string(),
        available: "sum_math_cos".to_string(),
    };
    assert_eq!(
        format!("{err}"),
        "Invalid model - invalid; available models are [sum_math_cos]"
    );
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(!err.is_retryable());
}

#[test]
fn test_computation_error() {
    let err = DispatchError::Computation("overflow".to_string());
    assert_eq!(format!("{err}"), "computation error: overflow");
    assert!(!err.is_retryable());
}

#[test]
fn test_persistence_error_keeps_source() {
    let err = DispatchError::persistence("upsert", sqlx::Error::PoolClosed);
    assert!(format!("{err}").starts_with("DB issue (upsert) - "));
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_service_errors() {
    assert_eq!(format!("{}", DispatchError::Shutdown), "service has been shut down");
    assert_eq!(DispatchError::Shutdown.kind(), ErrorKind::Service);
    assert_eq!(
        DispatchError::InvalidConfig("x".into()).kind(),
        ErrorKind::Service
    );
}
