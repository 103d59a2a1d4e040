//! Circuit breaker for broker access
//!
//! Opens after a configured run of consecutive failures and closes again once
//! the open window has elapsed. Success at any point resets the failure run.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Consecutive-failure circuit breaker
pub struct CircuitBreaker {
    threshold: u32,
    open_timeout: Duration,
    consecutive_failures: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `threshold` consecutive failures and
    /// stays open for `open_timeout`
    pub fn new(threshold: u32, open_timeout: Duration) -> Self {
        Self {
            threshold,
            open_timeout,
            consecutive_failures: AtomicU32::new(0),
            opened_at: Mutex::new(None),
        }
    }

    /// Whether calls are currently rejected
    pub fn is_open(&self) -> bool {
        let mut opened_at = self.opened_at.lock();
        match *opened_at {
            Some(instant) => {
                if instant.elapsed() >= self.open_timeout {
                    // Half-open: allow traffic again, keep the failure count
                    // primed so the next failure re-opens immediately
                    *opened_at = None;
                    self.consecutive_failures
                        .store(self.threshold.saturating_sub(1), Ordering::SeqCst);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    /// Record a successful broker call
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.opened_at.lock() = None;
    }

    /// Record a failed broker call, opening the circuit at the threshold
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.threshold {
            let mut opened_at = self.opened_at.lock();
            if opened_at.is_none() {
                *opened_at = Some(Instant::now());
            }
        }
    }

    /// Current consecutive-failure count
    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(!breaker.is_open());

        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());

        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn test_success_resets_run() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        assert_eq!(breaker.failure_count(), 2);
    }

    #[test]
    fn test_half_open_after_timeout() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(0));
        breaker.record_failure();
        breaker.record_failure();

        // Zero open window: the next check transitions to half-open
        assert!(!breaker.is_open());

        // The failure count stays primed so one more failure re-opens
        assert_eq!(breaker.failure_count(), 1);
    }
}
