//! Job envelope and typed payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A job travelling through a logical queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    /// Job identifier
    pub id: String,

    /// Logical queue the job belongs to
    pub queue_name: String,

    /// Opaque payload
    pub payload: serde_json::Value,

    /// Delivery attempts consumed so far
    pub attempts: u32,

    /// First enqueue time
    pub enqueued_at: DateTime<Utc>,

    /// Earliest time the job may run again (set for delayed retries)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// Last failure message, carried for dead-letter context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueJob {
    /// Create a job on the given queue
    pub fn new(queue_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            queue_name: queue_name.into(),
            payload,
            attempts: 0,
            enqueued_at: Utc::now(),
            not_before: None,
            last_error: None,
        }
    }

    /// Decode the payload into a typed form
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Payload of an inventory ingestion job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryJobPayload {
    /// Target system
    pub system_id: Uuid,

    /// Time the payload was accepted at the API
    pub received_at: DateTime<Utc>,

    /// Raw inventory document
    pub payload: serde_json::Value,

    /// Request body size in bytes
    pub size: i64,
}

/// Payload of a diff computation job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffJobPayload {
    /// Target system
    pub system_id: Uuid,

    /// Predecessor snapshot
    pub previous_id: i64,

    /// Snapshot to diff against the predecessor
    pub current_id: i64,
}

/// Payload of an alert dispatch job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJobPayload {
    /// Target system
    pub system_id: Uuid,

    /// Diff row the alert refers to
    pub diff_id: i64,

    /// Change category
    pub category: String,

    /// Change severity
    pub severity: String,

    /// Human-oriented change summary
    pub summary: String,

    /// Aggregate counters for the diff run, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_round_trip() {
        let payload = DiffJobPayload {
            system_id: Uuid::new_v4(),
            previous_id: 41,
            current_id: 42,
        };
        let job = QueueJob::new(
            "collect:processing",
            serde_json::to_value(&payload).unwrap(),
        );

        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: QueueJob = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.queue_name, "collect:processing");
        assert_eq!(decoded.attempts, 0);

        let typed: DiffJobPayload = decoded.decode().unwrap();
        assert_eq!(typed.previous_id, 41);
        assert_eq!(typed.current_id, 42);
        assert_eq!(typed.system_id, payload.system_id);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let job = QueueJob::new("collect:inventory", serde_json::json!({}));
        let encoded = serde_json::to_string(&job).unwrap();
        assert!(!encoded.contains("not_before"));
        assert!(!encoded.contains("last_error"));
    }
}
