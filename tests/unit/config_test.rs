//! Tests for configuration validation

use std::path::PathBuf;
use std::time::Duration;

use calculator_dispatch::config::{Profile, QueuePolicy, ServiceConfig};

#[test]
fn test_default_is_test_profile() {
    let cfg = ServiceConfig::default();
    assert_eq!(cfg.policy, QueuePolicy::Fifo);
    assert_eq!(cfg.parallelism, 1);
    assert_eq!(cfg.queue_size, 10);
    assert_eq!(cfg.table_name, "computation_dev");
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_builder_overrides() {
    let cfg = ServiceConfig::for_profile(Profile::Production)
        .with_policy(QueuePolicy::Priority)
        .with_parallelism(4)
        .with_queue_size(25)
        .with_queue_block_timeout(Duration::from_millis(750))
        .with_db_path("/tmp/ledgers")
        .with_db_name("jobs")
        .with_table_name("jobs_v2");
    assert_eq!(cfg.policy, QueuePolicy::Priority);
    assert_eq!(cfg.queue_block_timeout(), Duration::from_millis(750));
    assert_eq!(cfg.ledger_file(), PathBuf::from("/tmp/ledgers/jobs.db"));
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_zero_limits_rejected() {
    assert!(ServiceConfig::default().with_parallelism(0).validate().is_err());
    assert!(ServiceConfig::default().with_queue_size(0).validate().is_err());
    assert!(ServiceConfig::default()
        .with_queue_block_timeout(Duration::ZERO)
        .validate()
        .is_err());
}

#[test]
fn test_hostile_table_name_rejected() {
    let cfg = ServiceConfig::default().with_table_name("jobs; DROP TABLE jobs");
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("table_name"));
}

#[test]
fn test_from_json_str() {
    let json = r#"{
        "service": "calculator",
        "policy": "priority",
        "parallelism": 2,
        "queue_size": 5,
        "queue_block_timeout_ms": 100,
        "db_path": "/tmp",
        "db_name": "calc",
        "table_name": "computation"
    }"#;
    let cfg = ServiceConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.policy, QueuePolicy::Priority);
    assert_eq!(cfg.parallelism, 2);

    let invalid = json.replace("\"parallelism\": 2", "\"parallelism\": 0");
    assert!(ServiceConfig::from_json_str(&invalid).is_err());
    assert!(ServiceConfig::from_json_str("{").unwrap_err().starts_with("parse error"));
}
