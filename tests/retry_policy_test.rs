//! Integration tests for the retry and dead-letter policy
//!
//! The broker side needs a live redis, so these tests pin down the pure
//! pieces the policy is built from: the backoff ladder, the job envelope,
//! and the admission circuit breaker.

use collect::queue::broker::retry_delay;
use collect::queue::{CircuitBreaker, QueueJob};
use std::time::Duration;

#[test]
fn test_backoff_ladder_is_strictly_increasing_until_cap() {
    let base = Duration::from_secs(30);
    let cap = Duration::from_secs(3600);

    let delays: Vec<Duration> = (0..8).map(|attempt| retry_delay(base, cap, attempt)).collect();

    for window in delays.windows(2) {
        assert!(window[1] >= window[0]);
    }
    assert_eq!(delays[0], Duration::from_secs(30));
    assert_eq!(delays[1], Duration::from_secs(60));
    assert_eq!(delays[2], Duration::from_secs(120));
    assert_eq!(*delays.last().unwrap(), cap);
}

#[test]
fn test_three_retry_budget_matches_default_policy() {
    // With the default budget of 3, a job that keeps failing is retried
    // three times and the next failure dead-letters it
    let max_attempts = 3u32;
    let mut job = QueueJob::new("collect:inventory", serde_json::json!({"k": 1}));

    let mut retries = 0;
    while job.attempts < max_attempts {
        job.attempts += 1;
        retries += 1;
    }

    assert_eq!(retries, 3);
    assert_eq!(job.attempts, max_attempts);
}

#[test]
fn test_job_envelope_survives_requeue_cycles() {
    let mut job = QueueJob::new("collect:processing", serde_json::json!({"previous_id": 1}));
    job.attempts = 2;
    job.last_error = Some("db timeout".to_string());

    let encoded = serde_json::to_string(&job).unwrap();
    let decoded: QueueJob = serde_json::from_str(&encoded).unwrap();

    assert_eq!(decoded.id, job.id);
    assert_eq!(decoded.attempts, 2);
    assert_eq!(decoded.last_error.as_deref(), Some("db timeout"));
    assert_eq!(decoded.enqueued_at, job.enqueued_at);
}

#[test]
fn test_breaker_rejects_after_consecutive_failures() {
    let breaker = CircuitBreaker::new(10, Duration::from_secs(60));

    for _ in 0..9 {
        breaker.record_failure();
    }
    assert!(!breaker.is_open());

    breaker.record_failure();
    assert!(breaker.is_open());

    // A success anywhere in the run would have kept it closed
    let second = CircuitBreaker::new(10, Duration::from_secs(60));
    for _ in 0..9 {
        second.record_failure();
    }
    second.record_success();
    for _ in 0..9 {
        second.record_failure();
    }
    assert!(!second.is_open());
}
