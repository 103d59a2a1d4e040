//! Inventory snapshot persister
//!
//! Fingerprints each payload over its canonical form, absorbs duplicates
//! without touching the database, and enqueues a diff job whenever a new
//! snapshot has a predecessor.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::pool::{JobError, JobHandler};
use crate::db::{Database, InsertOutcome};
use crate::diff::canonical_json;
use crate::queue::{
    DiffJobPayload, InventoryJobPayload, QueueBroker, QueueJob, PROCESSING_QUEUE,
};

/// Canonical fingerprint of an inventory payload
pub fn fingerprint(payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(payload).as_bytes());
    hex::encode(hasher.finalize())
}

/// Handler for `collect:inventory` jobs
pub struct InventoryHandler {
    db: Database,
    broker: Arc<QueueBroker>,
}

impl InventoryHandler {
    /// Create the handler
    pub fn new(db: Database, broker: Arc<QueueBroker>) -> Arc<Self> {
        Arc::new(Self { db, broker })
    }

    async fn enqueue_diff(
        &self,
        system_id: uuid::Uuid,
        previous_id: i64,
        current_id: i64,
    ) -> Result<(), JobError> {
        let payload = DiffJobPayload {
            system_id,
            previous_id,
            current_id,
        };
        let job = QueueJob::new(
            PROCESSING_QUEUE,
            serde_json::to_value(&payload)
                .map_err(|e| JobError::Permanent(format!("diff job encoding: {e}")))?,
        );

        self.broker
            .enqueue(&job)
            .await
            .map_err(|e| JobError::Transient(format!("diff job enqueue: {e}")))
    }
}

#[async_trait]
impl JobHandler for InventoryHandler {
    async fn handle(&self, job: &QueueJob) -> Result<(), JobError> {
        let payload: InventoryJobPayload = job
            .decode()
            .map_err(|e| JobError::Permanent(format!("undecodable inventory job: {e}")))?;

        let data_hash = fingerprint(&payload.payload);

        let outcome = self
            .db
            .insert_record_serialized(
                payload.system_id,
                &payload.payload,
                &data_hash,
                payload.received_at,
                payload.size,
            )
            .await
            .map_err(|e| JobError::Transient(format!("snapshot insert: {e}")))?;

        match outcome {
            InsertOutcome::Inserted {
                record_id,
                previous_id: Some(previous_id),
            } => {
                tracing::info!(
                    system_id = %payload.system_id,
                    record_id,
                    previous_id,
                    "snapshot stored, diff queued"
                );
                self.enqueue_diff(payload.system_id, previous_id, record_id)
                    .await
            }
            InsertOutcome::Inserted {
                record_id,
                previous_id: None,
            } => {
                tracing::info!(
                    system_id = %payload.system_id,
                    record_id,
                    "first snapshot stored"
                );
                Ok(())
            }
            InsertOutcome::Duplicate { record_id } => {
                // A retried job may have inserted on a previous delivery and
                // failed before the diff was queued; backfill in that case.
                let previous = self
                    .db
                    .record_before(payload.system_id, record_id)
                    .await
                    .map_err(|e| JobError::Transient(format!("predecessor lookup: {e}")))?;

                if let Some(previous_id) = previous {
                    let diffed = self
                        .db
                        .has_diffs_for_record(payload.system_id, record_id)
                        .await
                        .map_err(|e| JobError::Transient(format!("diff lookup: {e}")))?;

                    if !diffed {
                        tracing::debug!(
                            system_id = %payload.system_id,
                            record_id,
                            "duplicate with missing diff, re-queueing diff job"
                        );
                        return self
                            .enqueue_diff(payload.system_id, previous_id, record_id)
                            .await;
                    }
                }

                tracing::debug!(
                    system_id = %payload.system_id,
                    record_id,
                    "duplicate snapshot absorbed"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_stable_across_key_order() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_detects_value_changes() {
        let a = json!({"facts": {"distro": "A"}});
        let b = json!({"facts": {"distro": "B"}});
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let hash = fingerprint(&json!({}));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
