//! # Worker Pools and Lifecycle
//!
//! This module provides:
//! - A generic claim/process/retry worker pool
//! - The inventory, diff-processing, and notification pools
//! - The delayed-message promoter, retention sweeper, and monitor
//! - A manager owning the shared shutdown signal and drain sequencing

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub mod cleanup;
pub mod delayed;
pub mod inventory;
pub mod monitor;
pub mod notifications;
pub mod pool;
pub mod processing;

pub use inventory::{fingerprint, InventoryHandler};
pub use notifications::{
    Alert, LogTransport, NotificationHandler, NotificationTransport, WebhookTransport,
};
pub use pool::{JobError, JobHandler, PoolHealth, PoolState, WorkerPool};
pub use processing::ProcessingHandler;

use crate::config::Config;
use crate::db::Database;
use crate::diff::{DiffEngine, Severity};
use crate::queue::{QueueBroker, INVENTORY_QUEUE, NOTIFICATIONS_QUEUE, PROCESSING_QUEUE};

/// Manager errors
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Worker manager already started")]
    AlreadyStarted,
}

/// Aggregate health of every pool
#[derive(Debug, Clone, Serialize)]
pub struct WorkersHealth {
    /// Whether every running pool heartbeated recently
    pub healthy: bool,

    /// Per-pool detail
    pub pools: Vec<PoolHealth>,
}

/// Starts, watches, and drains the whole worker fleet
pub struct WorkerManager {
    pools: Vec<Arc<WorkerPool>>,
    db: Database,
    broker: Arc<QueueBroker>,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_timeout: Duration,
    monitor_settings: monitor::MonitorSettings,
    cleanup_settings: cleanup::CleanupSettings,
}

impl WorkerManager {
    /// Changes at or above this severity produce alert jobs
    pub const ALERT_THRESHOLD: Severity = Severity::High;

    /// Build the manager and its pools from the service configuration
    pub fn new(
        config: &Config,
        db: Database,
        broker: Arc<QueueBroker>,
        engine: Arc<DiffEngine>,
        transport: Arc<dyn NotificationTransport>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        let inventory_pool = WorkerPool::new(
            "inventory",
            INVENTORY_QUEUE,
            InventoryHandler::new(db.clone(), Arc::clone(&broker)),
            Arc::clone(&broker),
            config.workers.inventory_count,
            config.queue.batch_size,
            config.queue.retry_attempts,
            config.workers.batch_processor_timeout,
            config.workers.heartbeat_interval,
        );

        let processing_pool = WorkerPool::new(
            "processing",
            PROCESSING_QUEUE,
            ProcessingHandler::new(
                db.clone(),
                Arc::clone(&broker),
                engine,
                Self::ALERT_THRESHOLD,
                config.workers.batch_processor_size,
            ),
            Arc::clone(&broker),
            config.workers.processing_count,
            1,
            config.queue.retry_attempts,
            config.workers.batch_processor_timeout,
            config.workers.heartbeat_interval,
        );

        let notification_pool = WorkerPool::new(
            "notifications",
            NOTIFICATIONS_QUEUE,
            NotificationHandler::new(transport),
            Arc::clone(&broker),
            config.workers.notification_count,
            1,
            config.workers.notification_retry_attempts,
            config.workers.batch_processor_timeout,
            config.workers.heartbeat_interval,
        );

        Self {
            pools: vec![inventory_pool, processing_pool, notification_pool],
            db,
            broker,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            shutdown_timeout: config.workers.shutdown_timeout,
            monitor_settings: monitor::MonitorSettings {
                interval: config.workers.health_check_interval,
                depth_warning_threshold: config.queue.backpressure_threshold,
            },
            cleanup_settings: cleanup::CleanupSettings {
                interval: config.inventory.cleanup_interval,
                max_age: config.inventory.max_age,
            },
        }
    }

    /// Start every pool and background worker
    pub fn start(&self) -> Result<(), ManagerError> {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return Err(ManagerError::AlreadyStarted);
        }

        let shutdown = self.shutdown_tx.subscribe();

        for pool in &self.pools {
            handles.extend(pool.start(shutdown.clone()));
        }

        handles.push(delayed::spawn(Arc::clone(&self.broker), shutdown.clone()));
        handles.push(cleanup::spawn(
            self.db.clone(),
            self.cleanup_settings.clone(),
            shutdown.clone(),
        ));
        handles.push(monitor::spawn(
            self.db.clone(),
            Arc::clone(&self.broker),
            self.monitor_settings.clone(),
            shutdown,
        ));

        tracing::info!(pools = self.pools.len(), "worker manager started");
        Ok(())
    }

    /// Signal shutdown and wait for the fleet to drain.
    ///
    /// Ingestion must already be stopped by the caller so queues stop
    /// growing. Workers finish their current job within the shutdown
    /// timeout; stragglers are cancelled.
    pub async fn stop(&self) {
        for pool in &self.pools {
            pool.begin_drain();
        }
        let _ = self.shutdown_tx.send(true);

        let mut handles = {
            let mut guard = self.handles.lock();
            std::mem::take(&mut *guard)
        };

        let deadline = Instant::now() + self.shutdown_timeout;
        let mut forced = 0usize;

        for handle in &mut handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, &mut *handle).await {
                Ok(_) => {}
                Err(_) => {
                    handle.abort();
                    forced += 1;
                }
            }
        }

        for pool in &self.pools {
            pool.mark_stopped();
        }

        if forced > 0 {
            tracing::warn!(forced, "workers cancelled at shutdown timeout");
        } else {
            tracing::info!("worker manager drained cleanly");
        }
    }

    /// Whether every running pool heartbeated within its interval
    pub fn is_healthy(&self) -> bool {
        self.pools.iter().all(|pool| pool.health().healthy)
    }

    /// Aggregate health snapshot
    pub fn health(&self) -> WorkersHealth {
        let pools: Vec<PoolHealth> = self.pools.iter().map(|pool| pool.health()).collect();
        WorkersHealth {
            healthy: pools.iter().all(|p| p.healthy),
            pools,
        }
    }
}
