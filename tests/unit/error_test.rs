//! Tests for error types

use std::time::Duration;

use tasklet::core::{MapFailure, QueueFull, SchedulerError};
use tasklet::TimeoutExpired;

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull("jobs".to_string());
    assert_eq!(format!("{}", err), "queue full: jobs");
}

#[test]
fn test_queue_empty_error() {
    let err = SchedulerError::QueueEmpty;
    assert_eq!(format!("{}", err), "queue empty");
}

#[test]
fn test_cancelled_error() {
    let err = SchedulerError::Cancelled { id: 7 };
    assert_eq!(format!("{}", err), "task 7 was cancelled");
    assert!(err.is_cancelled());
    assert!(!err.is_timeout());
}

#[test]
fn test_task_failed_keeps_reason() {
    let err = SchedulerError::task_failed(3, anyhow::anyhow!("disk on fire"));
    assert_eq!(format!("{}", err), "task 3 failed: disk on fire");
}

#[test]
fn test_timeout_converts_transparently() {
    let expired = TimeoutExpired {
        id: 11,
        duration: Duration::from_millis(5),
    };
    let err: SchedulerError = expired.into();
    assert!(err.is_timeout());
    assert_eq!(format!("{}", err), format!("{}", expired));
}

#[test]
fn test_map_failure_lists_indices() {
    let failure = MapFailure {
        total: 4,
        failures: vec![
            (1, SchedulerError::failed(anyhow::anyhow!("one"))),
            (3, SchedulerError::Cancelled { id: 9 }),
        ],
    };
    assert_eq!(failure.indices(), vec![1, 3]);
    let err: SchedulerError = failure.into();
    assert!(format!("{}", err).starts_with("2 of 4 map elements failed"));
}

#[test]
fn test_queue_full_returns_item() {
    let rejected = QueueFull("payload");
    assert_eq!(rejected.into_inner(), "payload");
    let err: SchedulerError = QueueFull(5_u8).into();
    assert!(matches!(err, SchedulerError::QueueFull(_)));
}
