//! Generic worker pool
//!
//! Each pool runs N independent workers over one queue; every worker loops
//! `claim -> process -> ack or retry`. Failures are classified: transient
//! errors go back through the delayed set with exponential backoff until the
//! attempt budget is spent, permanent errors dead-letter immediately. All
//! blocking points observe the shared shutdown signal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::queue::{QueueBroker, QueueJob};

/// How long a claim waits before re-checking the shutdown signal
const CLAIM_WAIT: Duration = Duration::from_secs(1);

/// Pause after a broker error before the next claim
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Job processing failure, classified for the retry policy
#[derive(Error, Debug)]
pub enum JobError {
    /// Worth retrying: the dependency may recover
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying cannot help: dead-letter with reason
    #[error("permanent: {0}")]
    Permanent(String),
}

/// Handler for jobs of one queue
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Process a single claimed job
    async fn handle(&self, job: &QueueJob) -> Result<(), JobError>;
}

/// Pool lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    /// Not started or fully stopped
    Stopped,
    /// Workers claiming and processing
    Running,
    /// Shutdown signalled, workers finishing their current jobs
    Draining,
}

/// Health snapshot of one pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolHealth {
    /// Pool name
    pub name: String,

    /// Lifecycle state
    pub state: PoolState,

    /// Configured worker count
    pub workers: usize,

    /// Whether every worker heartbeat is recent
    pub healthy: bool,

    /// Oldest worker heartbeat, when any worker has reported
    pub oldest_heartbeat: Option<DateTime<Utc>>,
}

/// A pool of identical workers over one queue
pub struct WorkerPool {
    name: String,
    queue: &'static str,
    handler: Arc<dyn JobHandler>,
    broker: Arc<QueueBroker>,
    size: usize,
    batch_size: usize,
    max_attempts: u32,
    job_timeout: Duration,
    heartbeat_interval: Duration,
    state: Arc<RwLock<PoolState>>,
    heartbeats: Arc<RwLock<HashMap<usize, DateTime<Utc>>>>,
}

impl WorkerPool {
    /// Create a pool; `max_attempts` is the total delivery budget per job and
    /// `job_timeout` the per-job processing deadline
    pub fn new(
        name: impl Into<String>,
        queue: &'static str,
        handler: Arc<dyn JobHandler>,
        broker: Arc<QueueBroker>,
        size: usize,
        batch_size: usize,
        max_attempts: u32,
        job_timeout: Duration,
        heartbeat_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            queue,
            handler,
            broker,
            size,
            batch_size,
            max_attempts,
            job_timeout,
            heartbeat_interval,
            state: Arc::new(RwLock::new(PoolState::Stopped)),
            heartbeats: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn every worker; returns their join handles
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        *self.state.write() = PoolState::Running;
        tracing::info!(pool = %self.name, workers = self.size, queue = self.queue, "starting worker pool");

        (0..self.size)
            .map(|worker_index| {
                let pool = Arc::clone(self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    pool.run_worker(worker_index, shutdown).await;
                })
            })
            .collect()
    }

    /// Mark the pool as draining (shutdown signalled)
    pub fn begin_drain(&self) {
        *self.state.write() = PoolState::Draining;
    }

    /// Mark the pool as stopped
    pub fn mark_stopped(&self) {
        *self.state.write() = PoolState::Stopped;
    }

    /// Health snapshot for the manager
    pub fn health(&self) -> PoolHealth {
        let state = *self.state.read();
        let heartbeats = self.heartbeats.read();

        let oldest = heartbeats.values().min().copied();
        let stale_cutoff = Utc::now()
            - chrono::Duration::from_std(self.heartbeat_interval * 2)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));

        let healthy = match state {
            PoolState::Running => {
                heartbeats.len() == self.size && heartbeats.values().all(|t| *t > stale_cutoff)
            }
            // A draining or stopped pool is not unhealthy, it is just done
            PoolState::Draining | PoolState::Stopped => true,
        };

        PoolHealth {
            name: self.name.clone(),
            state,
            workers: self.size,
            healthy,
            oldest_heartbeat: oldest,
        }
    }

    /// Sequential claim/process loop of one worker
    async fn run_worker(&self, worker_index: usize, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!(pool = %self.name, worker_index, "worker started");
        self.beat(worker_index);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let claimed = tokio::select! {
                _ = shutdown.changed() => break,
                claimed = self.broker.claim(self.queue, self.batch_size, CLAIM_WAIT) => claimed,
            };

            self.beat(worker_index);

            match claimed {
                Ok(jobs) => {
                    for job in jobs {
                        self.process(job).await;
                        self.beat(worker_index);
                    }
                }
                Err(crate::queue::BrokerError::CircuitOpen) => {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(pool = %self.name, error = %e, "claim failed");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::debug!(pool = %self.name, worker_index, "worker stopped");
    }

    /// Process one job, applying the retry/dead-letter policy
    async fn process(&self, job: QueueJob) {
        let job_id = job.id.clone();

        let result = match tokio::time::timeout(self.job_timeout, self.handler.handle(&job)).await
        {
            Ok(result) => result,
            Err(_) => Err(JobError::Transient(format!(
                "processing deadline of {:?} exceeded",
                self.job_timeout
            ))),
        };

        match result {
            Ok(()) => {
                tracing::debug!(pool = %self.name, job_id = %job_id, "job processed");
            }
            Err(JobError::Transient(reason)) => {
                // attempts counts retries already consumed; the budget allows
                // max_attempts of them before the job dead-letters
                if job.attempts >= self.max_attempts {
                    tracing::warn!(
                        pool = %self.name,
                        job_id = %job_id,
                        attempts = job.attempts,
                        reason = %reason,
                        "retry budget exhausted, dead-lettering"
                    );
                    if let Err(e) = self.broker.dead_letter(job, reason.as_str()).await {
                        tracing::error!(pool = %self.name, job_id = %job_id, error = %e, "dead-letter failed");
                    }
                } else {
                    match self.broker.schedule_retry(job, reason.as_str()).await {
                        Ok(ready_at) => {
                            tracing::debug!(
                                pool = %self.name,
                                job_id = %job_id,
                                ready_at = %ready_at,
                                reason = %reason,
                                "retry scheduled"
                            );
                        }
                        Err(e) => {
                            tracing::error!(pool = %self.name, job_id = %job_id, error = %e, "retry scheduling failed");
                        }
                    }
                }
            }
            Err(JobError::Permanent(reason)) => {
                tracing::error!(pool = %self.name, job_id = %job_id, reason = %reason, "permanent failure, dead-lettering");
                if let Err(e) = self.broker.dead_letter(job, reason.as_str()).await {
                    tracing::error!(pool = %self.name, job_id = %job_id, error = %e, "dead-letter failed");
                }
            }
        }
    }

    fn beat(&self, worker_index: usize) {
        self.heartbeats.write().insert(worker_index, Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_state_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&PoolState::Running).unwrap(), "\"running\"");
        assert_eq!(serde_json::to_string(&PoolState::Draining).unwrap(), "\"draining\"");
    }

    #[test]
    fn test_job_error_classification() {
        let transient = JobError::Transient("db timeout".to_string());
        assert!(transient.to_string().contains("transient"));

        let permanent = JobError::Permanent("missing record".to_string());
        assert!(permanent.to_string().contains("permanent"));
    }
}
