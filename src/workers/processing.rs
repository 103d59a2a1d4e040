//! Diff computation worker
//!
//! Loads the snapshot pair, runs the engine, persists surviving changes,
//! and emits notification jobs for changes at or above the alert threshold.

use async_trait::async_trait;
use std::sync::Arc;

use super::pool::{JobError, JobHandler};
use crate::db::{Database, NewInventoryDiff};
use crate::diff::{ComputedDiff, DiffEngine, Severity};
use crate::queue::{
    DiffJobPayload, NotificationJobPayload, QueueBroker, QueueJob, NOTIFICATIONS_QUEUE,
};

/// Handler for `collect:processing` jobs
pub struct ProcessingHandler {
    db: Database,
    broker: Arc<QueueBroker>,
    engine: Arc<DiffEngine>,
    alert_threshold: Severity,
    insert_chunk_size: usize,
}

impl ProcessingHandler {
    /// Create the handler; changes at or above `alert_threshold` produce
    /// notification jobs, and diff rows are written in chunks of
    /// `insert_chunk_size`
    pub fn new(
        db: Database,
        broker: Arc<QueueBroker>,
        engine: Arc<DiffEngine>,
        alert_threshold: Severity,
        insert_chunk_size: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            broker,
            engine,
            alert_threshold,
            insert_chunk_size: insert_chunk_size.max(1),
        })
    }
}

/// One-line human summary of a change
fn summarize_change(change: &ComputedDiff) -> String {
    match (&change.previous_value, &change.current_value) {
        (Some(from), Some(to)) => {
            format!("{} {}: {} -> {}", change.change_type.as_str(), change.field_path, from, to)
        }
        (None, Some(to)) => format!("{} {}: {}", change.change_type.as_str(), change.field_path, to),
        (Some(from), None) => {
            format!("{} {}: was {}", change.change_type.as_str(), change.field_path, from)
        }
        (None, None) => format!("{} {}", change.change_type.as_str(), change.field_path),
    }
}

#[async_trait]
impl JobHandler for ProcessingHandler {
    async fn handle(&self, job: &QueueJob) -> Result<(), JobError> {
        let payload: DiffJobPayload = job
            .decode()
            .map_err(|e| JobError::Permanent(format!("undecodable diff job: {e}")))?;

        // A redelivered job whose diffs already landed is complete
        let already = self
            .db
            .has_diffs_for_record(payload.system_id, payload.current_id)
            .await
            .map_err(|e| JobError::Transient(format!("diff lookup: {e}")))?;
        if already {
            tracing::debug!(
                system_id = %payload.system_id,
                current_id = payload.current_id,
                "diffs already recorded, skipping"
            );
            return Ok(());
        }

        let current = self
            .db
            .record(payload.current_id)
            .await
            .map_err(|e| JobError::Transient(format!("record load: {e}")))?
            .ok_or_else(|| {
                JobError::Permanent(format!("current record {} missing", payload.current_id))
            })?;

        let previous = self
            .db
            .record(payload.previous_id)
            .await
            .map_err(|e| JobError::Transient(format!("record load: {e}")))?
            .ok_or_else(|| {
                JobError::Permanent(format!("previous record {} missing", payload.previous_id))
            })?;

        let output = self
            .engine
            .compute(&previous.data, &current.data)
            .map_err(|e| JobError::Permanent(format!("diff computation: {e}")))?;

        if output.changes.is_empty() {
            tracing::debug!(
                system_id = %payload.system_id,
                current_id = payload.current_id,
                "no significant changes"
            );
            return Ok(());
        }

        let rows: Vec<NewInventoryDiff> = output
            .changes
            .iter()
            .map(|change| NewInventoryDiff {
                system_id: payload.system_id,
                previous_record_id: Some(payload.previous_id),
                current_record_id: payload.current_id,
                field_path: change.field_path.clone(),
                diff_type: change.change_type.as_str().to_string(),
                previous_value: change.previous_value.clone(),
                current_value: change.current_value.clone(),
                category: change.category.clone(),
                severity: change.severity.as_str().to_string(),
            })
            .collect();

        let ids = self
            .db
            .insert_diffs(&rows, self.insert_chunk_size)
            .await
            .map_err(|e| JobError::Transient(format!("diff insert: {e}")))?;

        tracing::info!(
            system_id = %payload.system_id,
            previous_id = payload.previous_id,
            current_id = payload.current_id,
            changes = ids.len(),
            truncated = output.truncated,
            "diff recorded"
        );

        let trend = serde_json::to_value(&output.summary).ok();
        for (diff_id, change) in ids.iter().zip(output.changes.iter()) {
            if change.severity < self.alert_threshold {
                continue;
            }

            let notification = NotificationJobPayload {
                system_id: payload.system_id,
                diff_id: *diff_id,
                category: change.category.clone(),
                severity: change.severity.as_str().to_string(),
                summary: summarize_change(change),
                trend: trend.clone(),
            };

            let job = QueueJob::new(
                NOTIFICATIONS_QUEUE,
                serde_json::to_value(&notification)
                    .map_err(|e| JobError::Permanent(format!("notification encoding: {e}")))?,
            );

            // Diff rows are already committed; a lost alert is preferable to
            // re-running the whole job and skipping on the already-recorded
            // check above
            if let Err(e) = self.broker.enqueue(&job).await {
                tracing::error!(
                    system_id = %payload.system_id,
                    diff_id,
                    error = %e,
                    "notification enqueue failed"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ChangeType;

    fn change(
        change_type: ChangeType,
        from: Option<&str>,
        to: Option<&str>,
    ) -> ComputedDiff {
        ComputedDiff {
            field_path: "facts.distro.version".to_string(),
            change_type,
            previous_value: from.map(str::to_string),
            current_value: to.map(str::to_string),
            category: "operating_system".to_string(),
            severity: Severity::High,
        }
    }

    #[test]
    fn test_summary_update() {
        let c = change(ChangeType::Update, Some("\"9.2\""), Some("\"9.3\""));
        assert_eq!(
            summarize_change(&c),
            "update facts.distro.version: \"9.2\" -> \"9.3\""
        );
    }

    #[test]
    fn test_summary_create_and_delete() {
        let created = change(ChangeType::Create, None, Some("\"9.3\""));
        assert_eq!(summarize_change(&created), "create facts.distro.version: \"9.3\"");

        let deleted = change(ChangeType::Delete, Some("\"9.2\""), None);
        assert_eq!(
            summarize_change(&deleted),
            "delete facts.distro.version: was \"9.2\""
        );
    }
}
