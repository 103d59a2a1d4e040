//! Retention sweeper
//!
//! Periodically purges snapshots past the retention window; their diffs go
//! with them via the cascade. The newest record of every system survives so
//! the next ingestion still has a predecessor to diff against.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::Database;

/// Retention sweep configuration
#[derive(Debug, Clone)]
pub struct CleanupSettings {
    /// Cadence of the sweep
    pub interval: Duration,

    /// Age past which snapshots are purged
    pub max_age: Duration,
}

/// Spawn the retention sweeper
pub fn spawn(
    db: Database,
    settings: CleanupSettings,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            interval_secs = settings.interval.as_secs(),
            max_age_secs = settings.max_age.as_secs(),
            "retention sweeper started"
        );
        let mut interval = tokio::time::interval(settings.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // The first tick fires immediately; skip it so a restart loop does
        // not hammer the delete
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            if *shutdown.borrow() {
                break;
            }

            match db.purge_expired_records(settings.max_age).await {
                Ok(0) => tracing::debug!("retention sweep: nothing to purge"),
                Ok(purged) => tracing::info!(purged, "retention sweep purged expired snapshots"),
                Err(e) => tracing::warn!(error = %e, "retention sweep failed"),
            }
        }

        tracing::info!("retention sweeper stopped");
    })
}
