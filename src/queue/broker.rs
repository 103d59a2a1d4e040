//! Redis queue primitive
//!
//! Each logical queue `Q` is three physical structures:
//! - `Q`: list, push to tail / pop from head
//! - `Q:delayed`: sorted set scored by ready-at epoch milliseconds
//! - `Q:dead`: list of jobs that exhausted their attempts
//!
//! All access goes through the circuit breaker; an open circuit rejects
//! operations immediately instead of piling timeouts onto a dead broker.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::breaker::CircuitBreaker;
use super::job::QueueJob;
use super::{dead_key, delayed_key};
use crate::config::QueueSettings;

/// Broker errors
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Circuit breaker open")]
    CircuitOpen,
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Poll cadence while a claim waits for work
const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A dead-lettered job with its failure context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadJob {
    /// Why the job was dead-lettered
    pub reason: String,

    /// When it was dead-lettered
    pub failed_at: DateTime<Utc>,

    /// The job as it last ran
    pub job: QueueJob,
}

/// Redis-backed queue broker
pub struct QueueBroker {
    redis: ConnectionManager,
    breaker: Arc<CircuitBreaker>,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
    promote_script: redis::Script,
}

impl QueueBroker {
    /// Connect to redis and prepare the promotion script
    pub async fn connect(settings: &QueueSettings) -> BrokerResult<Self> {
        let url = apply_database(&settings.redis_url, settings.redis_db);
        let client = redis::Client::open(url.as_str())?;
        let redis = ConnectionManager::new(client).await?;

        Ok(Self::with_connection(redis, settings))
    }

    /// Build a broker over an existing connection (used by tests)
    pub fn with_connection(redis: ConnectionManager, settings: &QueueSettings) -> Self {
        // Atomically move every due member of the delayed set to the tail of
        // the main queue. Single script keeps the move race-free against
        // concurrent enqueues and promoters.
        let promote_script = redis::Script::new(
            r#"
            local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
            for i, item in ipairs(due) do
                redis.call('RPUSH', KEYS[2], item)
                redis.call('ZREM', KEYS[1], item)
            end
            return #due
            "#,
        );

        Self {
            redis,
            breaker: Arc::new(CircuitBreaker::new(
                settings.circuit_breaker_threshold,
                settings.circuit_breaker_timeout,
            )),
            retry_base_delay: settings.retry_base_delay,
            retry_max_delay: settings.retry_max_delay,
            promote_script,
        }
    }

    /// The breaker guarding this broker
    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }

    /// Append a job to the tail of its queue
    pub async fn enqueue(&self, job: &QueueJob) -> BrokerResult<()> {
        self.ensure_closed()?;
        let encoded = serde_json::to_string(job)?;

        let result: Result<(), redis::RedisError> = redis::cmd("RPUSH")
            .arg(&job.queue_name)
            .arg(&encoded)
            .query_async(&mut self.redis.clone())
            .await;

        self.observe(result)?;
        Ok(())
    }

    /// Claim up to `batch` jobs, waiting up to `wait` for the first one.
    ///
    /// The wait is a bounded poll rather than a server-side block: a blocking
    /// pop would stall every other command multiplexed onto the shared
    /// connection and cannot be cancelled safely. Non-reliable claim:
    /// delivery is complete once popped, and the worker re-enqueues on
    /// failure via [`QueueBroker::schedule_retry`].
    pub async fn claim(
        &self,
        queue: &str,
        batch: usize,
        wait: Duration,
    ) -> BrokerResult<Vec<QueueJob>> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            self.ensure_closed()?;

            let popped: Result<Option<Vec<String>>, redis::RedisError> = redis::cmd("LPOP")
                .arg(queue)
                .arg(batch.max(1))
                .query_async(&mut self.redis.clone())
                .await;

            if let Some(raw_jobs) = self.observe(popped)? {
                if !raw_jobs.is_empty() {
                    let mut jobs = Vec::with_capacity(raw_jobs.len());
                    for raw in raw_jobs {
                        match serde_json::from_str::<QueueJob>(&raw) {
                            Ok(job) => jobs.push(job),
                            Err(e) => {
                                tracing::warn!(queue, error = %e, "dropping undecodable queue entry");
                            }
                        }
                    }
                    return Ok(jobs);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(CLAIM_POLL_INTERVAL.min(wait)).await;
        }
    }

    /// Schedule a failed job for a delayed retry with exponential backoff.
    ///
    /// Increments the attempt counter and returns the time the job becomes
    /// due again.
    pub async fn schedule_retry(
        &self,
        mut job: QueueJob,
        error: impl Into<String>,
    ) -> BrokerResult<DateTime<Utc>> {
        self.ensure_closed()?;

        job.attempts += 1;
        job.last_error = Some(error.into());

        let delay = retry_delay(self.retry_base_delay, self.retry_max_delay, job.attempts - 1);
        let ready_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        job.not_before = Some(ready_at);

        let encoded = serde_json::to_string(&job)?;
        let key = delayed_key(&job.queue_name);

        let result: Result<(), redis::RedisError> = redis::cmd("ZADD")
            .arg(&key)
            .arg(ready_at.timestamp_millis())
            .arg(&encoded)
            .query_async(&mut self.redis.clone())
            .await;

        self.observe(result)?;
        Ok(ready_at)
    }

    /// Append a job to the dead-letter tail of its queue
    pub async fn dead_letter(&self, job: QueueJob, reason: impl Into<String>) -> BrokerResult<()> {
        self.ensure_closed()?;

        let key = dead_key(&job.queue_name);
        let dead = DeadJob {
            reason: reason.into(),
            failed_at: Utc::now(),
            job,
        };
        let encoded = serde_json::to_string(&dead)?;

        let result: Result<(), redis::RedisError> = redis::cmd("RPUSH")
            .arg(&key)
            .arg(&encoded)
            .query_async(&mut self.redis.clone())
            .await;
        self.observe(result)?;

        // Cap the tail so a persistent failure cannot grow without bound
        let trimmed: Result<(), redis::RedisError> = redis::cmd("LTRIM")
            .arg(&key)
            .arg(-1000)
            .arg(-1)
            .query_async(&mut self.redis.clone())
            .await;
        self.observe(trimmed)?;

        Ok(())
    }

    /// Move every delayed job due at `now` back to its main queue.
    ///
    /// Returns the number of promoted jobs.
    pub async fn promote_due(&self, queue: &str, now: DateTime<Utc>) -> BrokerResult<u64> {
        self.ensure_closed()?;

        let result: Result<u64, redis::RedisError> = self
            .promote_script
            .key(delayed_key(queue))
            .key(queue)
            .arg(now.timestamp_millis())
            .invoke_async(&mut self.redis.clone())
            .await;

        self.observe(result)
    }

    /// Current depth of a main queue
    pub async fn depth(&self, queue: &str) -> BrokerResult<usize> {
        self.ensure_closed()?;

        let result: Result<usize, redis::RedisError> = redis::cmd("LLEN")
            .arg(queue)
            .query_async(&mut self.redis.clone())
            .await;

        self.observe(result)
    }

    /// Number of jobs waiting in the delayed set
    pub async fn delayed_len(&self, queue: &str) -> BrokerResult<usize> {
        self.ensure_closed()?;

        let result: Result<usize, redis::RedisError> = redis::cmd("ZCARD")
            .arg(delayed_key(queue))
            .query_async(&mut self.redis.clone())
            .await;

        self.observe(result)
    }

    /// Number of dead-lettered jobs
    pub async fn dead_len(&self, queue: &str) -> BrokerResult<usize> {
        self.ensure_closed()?;

        let result: Result<usize, redis::RedisError> = redis::cmd("LLEN")
            .arg(dead_key(queue))
            .query_async(&mut self.redis.clone())
            .await;

        self.observe(result)
    }

    /// Most recent dead-lettered jobs, newest last
    pub async fn dead_letter_jobs(&self, queue: &str, limit: isize) -> BrokerResult<Vec<DeadJob>> {
        self.ensure_closed()?;

        let result: Result<Vec<String>, redis::RedisError> = redis::cmd("LRANGE")
            .arg(dead_key(queue))
            .arg(-limit)
            .arg(-1)
            .query_async(&mut self.redis.clone())
            .await;

        let raw = self.observe(result)?;
        let mut jobs = Vec::with_capacity(raw.len());
        for entry in raw {
            if let Ok(dead) = serde_json::from_str::<DeadJob>(&entry) {
                jobs.push(dead);
            }
        }

        Ok(jobs)
    }

    /// Check connectivity with a ping round-trip
    pub async fn ping(&self) -> BrokerResult<()> {
        let result: Result<String, redis::RedisError> = redis::cmd("PING")
            .query_async(&mut self.redis.clone())
            .await;

        self.observe(result)?;
        Ok(())
    }

    fn ensure_closed(&self) -> BrokerResult<()> {
        if self.breaker.is_open() {
            return Err(BrokerError::CircuitOpen);
        }
        Ok(())
    }

    fn observe<T>(&self, result: Result<T, redis::RedisError>) -> BrokerResult<T> {
        match result {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(BrokerError::Redis(e))
            }
        }
    }
}

/// Exponential backoff: `base * 2^attempt`, clamped to `max`
pub fn retry_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.min(32));
    let delay = base.saturating_mul(factor.min(u32::MAX as u64) as u32);
    delay.min(max)
}

/// Apply the configured logical database to a redis URL that lacks one
fn apply_database(url: &str, db: i64) -> String {
    // A db is already present when the URL path is non-empty
    let after_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    if after_scheme.contains('/') {
        url.to_string()
    } else {
        format!("{}/{}", url, db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles_and_clamps() {
        let base = Duration::from_secs(30);
        let max = Duration::from_secs(3600);

        assert_eq!(retry_delay(base, max, 0), Duration::from_secs(30));
        assert_eq!(retry_delay(base, max, 1), Duration::from_secs(60));
        assert_eq!(retry_delay(base, max, 2), Duration::from_secs(120));
        assert_eq!(retry_delay(base, max, 10), max);
        assert_eq!(retry_delay(base, max, 32), max);
    }

    #[test]
    fn test_apply_database() {
        assert_eq!(
            apply_database("redis://127.0.0.1:6379", 1),
            "redis://127.0.0.1:6379/1"
        );
        assert_eq!(
            apply_database("redis://127.0.0.1:6379/0", 1),
            "redis://127.0.0.1:6379/0"
        );
    }

    #[test]
    fn test_dead_job_round_trip() {
        let dead = DeadJob {
            reason: "database timeout".to_string(),
            failed_at: Utc::now(),
            job: QueueJob::new("collect:inventory", serde_json::json!({"k": 1})),
        };

        let encoded = serde_json::to_string(&dead).unwrap();
        let decoded: DeadJob = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.reason, "database timeout");
        assert_eq!(decoded.job.queue_name, "collect:inventory");
    }
}
