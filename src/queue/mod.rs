//! # Queue Broker
//!
//! Redis-backed job delivery for the ingestion pipeline:
//! - Ordered FIFO queue per logical stream (list)
//! - Delayed retries in a companion sorted set, scored by ready-at time
//! - Dead-letter tail per queue for jobs that exhausted their attempts
//! - Atomic promotion of due delayed jobs back onto the main queue
//! - Circuit breaker guarding all broker access

pub mod breaker;
pub mod broker;
pub mod job;

pub use breaker::CircuitBreaker;
pub use broker::{BrokerError, BrokerResult, DeadJob, QueueBroker};
pub use job::{DiffJobPayload, InventoryJobPayload, NotificationJobPayload, QueueJob};

/// Inventory ingestion queue
pub const INVENTORY_QUEUE: &str = "collect:inventory";

/// Diff computation queue
pub const PROCESSING_QUEUE: &str = "collect:processing";

/// Alert dispatch queue
pub const NOTIFICATIONS_QUEUE: &str = "collect:notifications";

/// Every logical queue served by this process
pub const ALL_QUEUES: [&str; 3] = [INVENTORY_QUEUE, PROCESSING_QUEUE, NOTIFICATIONS_QUEUE];

/// Key of the delayed sorted set companion to a queue
pub fn delayed_key(queue: &str) -> String {
    format!("{}:delayed", queue)
}

/// Key of the dead-letter list companion to a queue
pub fn dead_key(queue: &str) -> String {
    format!("{}:dead", queue)
}
