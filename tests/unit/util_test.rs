//! Tests for utility functions

use calculator_dispatch::util::{init_tracing, now_secs};

#[test]
fn test_now_secs_does_not_go_backwards() {
    let first = now_secs();
    let second = now_secs();
    assert!(second >= first);
}

#[test]
fn test_init_tracing_is_repeatable() {
    init_tracing();
    init_tracing();
}
