//! Tests for the task message model

use std::str::FromStr;

use calculator_dispatch::core::{TaskMessage, TaskStatus, TERMINATE_TASK_ID};

#[test]
fn test_status_labels() {
    for status in [
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Error,
        TaskStatus::NotFound,
    ] {
        assert_eq!(TaskStatus::from_str(status.as_str()).unwrap(), status);
    }
    assert!(TaskStatus::from_str("RUNNING").is_err());
    assert!(TaskStatus::Error.is_terminal());
    assert!(!TaskStatus::Processing.is_terminal());
}

#[test]
fn test_payload_shape() {
    let json = TaskMessage::compute("t1", "sum_math_cos", 0.5).to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["task_id"], "t1");
    assert_eq!(value["api"], "compute");
    assert_eq!(value["model"], "sum_math_cos");

    let terminate = TaskMessage::terminate();
    assert_eq!(terminate.task_id, TERMINATE_TASK_ID);
    let value: serde_json::Value = serde_json::from_str(&terminate.to_json().unwrap()).unwrap();
    assert!(value.get("model").is_none());
}

#[test]
fn test_numeric_input_truncates() {
    let msg = TaskMessage::from_json(r#"{"task_id":"a","api":"compute","model":"m","number":-2.9}"#)
        .unwrap();
    assert!((msg.numeric_input().unwrap() - -2.0).abs() < f64::EPSILON);

    let text = TaskMessage::from_json(r#"{"task_id":"a","api":"compute","model":"m","number":"12"}"#)
        .unwrap();
    assert!((text.numeric_input().unwrap() - 12.0).abs() < f64::EPSILON);

    let fractional =
        TaskMessage::from_json(r#"{"task_id":"a","api":"compute","model":"m","number":"7.5"}"#)
            .unwrap();
    assert!(fractional.numeric_input().is_err());

    let missing = TaskMessage::from_json(r#"{"task_id":"a","api":"compute","model":"m"}"#).unwrap();
    assert_eq!(
        missing.numeric_input().unwrap_err().to_string(),
        "invalid payload: Invalid number - missing"
    );
}
