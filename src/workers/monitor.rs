//! Queue depth and heartbeat liveness monitor
//!
//! Samples the depth of every queue as a gauge, warns when one crosses its
//! threshold, watches dead-letter growth, and transitions system liveness
//! statuses based on heartbeat age.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::Database;
use crate::queue::{QueueBroker, ALL_QUEUES};

/// Heartbeat age below which a system counts as active
pub const ACTIVE_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Sampling cadence
    pub interval: Duration,

    /// Queue depth that triggers a warning
    pub depth_warning_threshold: usize,
}

/// Spawn the monitor loop
pub fn spawn(
    db: Database,
    broker: Arc<QueueBroker>,
    settings: MonitorSettings,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            interval_secs = settings.interval.as_secs(),
            "queue/heartbeat monitor started"
        );
        let mut interval = tokio::time::interval(settings.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            if *shutdown.borrow() {
                break;
            }

            sample_queues(&broker, &settings).await;
            transition_heartbeats(&db).await;
        }

        tracing::info!("queue/heartbeat monitor stopped");
    })
}

async fn sample_queues(broker: &QueueBroker, settings: &MonitorSettings) {
    for queue in ALL_QUEUES {
        let depth = match broker.depth(queue).await {
            Ok(depth) => depth,
            Err(e) => {
                tracing::warn!(queue, error = %e, "depth sample failed");
                continue;
            }
        };
        let delayed = broker.delayed_len(queue).await.unwrap_or(0);
        let dead = broker.dead_len(queue).await.unwrap_or(0);

        tracing::info!(queue, depth, delayed, dead, "queue gauges");

        if depth > settings.depth_warning_threshold {
            tracing::warn!(
                queue,
                depth,
                threshold = settings.depth_warning_threshold,
                "queue depth over threshold"
            );
        }
        if dead > 0 {
            tracing::warn!(queue, dead, "dead-letter tail is non-empty");
        }
    }
}

async fn transition_heartbeats(db: &Database) {
    match db.transition_liveness(ACTIVE_WINDOW).await {
        Ok((0, 0)) => {}
        Ok((activated, deactivated)) => {
            tracing::info!(activated, deactivated, "system liveness transitions");
        }
        Err(e) => {
            tracing::warn!(error = %e, "liveness transition failed");
        }
    }
}
