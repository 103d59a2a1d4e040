//! Delayed-message promoter
//!
//! Single instance per process. Ticks well below the smallest retry delay
//! and moves due members of every delayed set back onto their main queue.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::queue::{QueueBroker, ALL_QUEUES};

/// Promotion tick
const PROMOTE_INTERVAL: Duration = Duration::from_millis(500);

/// Pause while the broker circuit is open
const CIRCUIT_BACKOFF: Duration = Duration::from_secs(5);

/// Spawn the promoter loop
pub fn spawn(broker: Arc<QueueBroker>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("delayed-message promoter started");
        let mut interval = tokio::time::interval(PROMOTE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            if *shutdown.borrow() {
                break;
            }

            let now = Utc::now();
            for queue in ALL_QUEUES {
                match broker.promote_due(queue, now).await {
                    Ok(0) => {}
                    Ok(promoted) => {
                        tracing::debug!(queue, promoted, "promoted delayed jobs");
                    }
                    Err(crate::queue::BrokerError::CircuitOpen) => {
                        tokio::select! {
                            _ = shutdown.changed() => return,
                            _ = tokio::time::sleep(CIRCUIT_BACKOFF) => {}
                        }
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(queue, error = %e, "promotion failed");
                    }
                }
            }
        }

        tracing::info!("delayed-message promoter stopped");
    })
}
