//! Inventory snapshot and diff storage
//!
//! Snapshot inserts are serialized per system with a transaction-scoped
//! advisory lock so the no-duplicate-hash invariant holds under concurrent
//! workers.

use chrono::{DateTime, Utc};
use sqlx::Row;
use std::time::Duration;
use uuid::Uuid;

use super::models::{InventoryDiffRow, InventoryRecordRow, NewInventoryDiff};
use super::{Database, DbResult};

/// Outcome of a serialized snapshot insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new record was written; `previous_id` is the immediately preceding
    /// record of the same system, when one existed
    Inserted {
        /// Identifier assigned to the new record
        record_id: i64,
        /// Immediately preceding record, if any
        previous_id: Option<i64>,
    },

    /// The payload fingerprint matched the latest stored record; nothing was
    /// written
    Duplicate {
        /// Record whose fingerprint matched
        record_id: i64,
    },
}

impl Database {
    /// Load the most recent snapshot for a system
    pub async fn latest_record(&self, system_id: Uuid) -> DbResult<Option<InventoryRecordRow>> {
        let row = sqlx::query_as::<_, InventoryRecordRow>(
            "SELECT id, system_id, data, data_hash, received_at, size_bytes \
             FROM inventory_records \
             WHERE system_id = $1 \
             ORDER BY id DESC \
             LIMIT 1",
        )
        .bind(system_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Load a snapshot by identifier
    pub async fn record(&self, record_id: i64) -> DbResult<Option<InventoryRecordRow>> {
        let row = sqlx::query_as::<_, InventoryRecordRow>(
            "SELECT id, system_id, data, data_hash, received_at, size_bytes \
             FROM inventory_records \
             WHERE id = $1",
        )
        .bind(record_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Insert a snapshot unless its fingerprint matches the latest record.
    ///
    /// The whole read-compare-insert runs in one transaction holding
    /// `pg_advisory_xact_lock` keyed on the system id, so concurrent workers
    /// processing the same system serialize here and a racing duplicate is
    /// absorbed instead of violating the invariant.
    pub async fn insert_record_serialized(
        &self,
        system_id: Uuid,
        data: &serde_json::Value,
        data_hash: &str,
        received_at: DateTime<Utc>,
        size_bytes: i64,
    ) -> DbResult<InsertOutcome> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(system_id)
            .execute(&mut *tx)
            .await?;

        let latest: Option<(i64, String)> = sqlx::query_as(
            "SELECT id, data_hash \
             FROM inventory_records \
             WHERE system_id = $1 \
             ORDER BY id DESC \
             LIMIT 1",
        )
        .bind(system_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((latest_id, latest_hash)) = &latest {
            if latest_hash == data_hash {
                tx.commit().await?;
                return Ok(InsertOutcome::Duplicate {
                    record_id: *latest_id,
                });
            }
        }

        let record_id: i64 = sqlx::query(
            "INSERT INTO inventory_records (system_id, data, data_hash, received_at, size_bytes) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(system_id)
        .bind(data)
        .bind(data_hash)
        .bind(received_at)
        .bind(size_bytes)
        .fetch_one(&mut *tx)
        .await?
        .get(0);

        tx.commit().await?;

        Ok(InsertOutcome::Inserted {
            record_id,
            previous_id: latest.map(|(id, _)| id),
        })
    }

    /// Identifier of the record immediately preceding `record_id` for a system
    pub async fn record_before(&self, system_id: Uuid, record_id: i64) -> DbResult<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM inventory_records \
             WHERE system_id = $1 AND id < $2 \
             ORDER BY id DESC \
             LIMIT 1",
        )
        .bind(system_id)
        .bind(record_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(id,)| id))
    }

    /// Whether any diff rows exist for a snapshot
    pub async fn has_diffs_for_record(
        &self,
        system_id: Uuid,
        current_record_id: i64,
    ) -> DbResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM inventory_diffs \
             WHERE system_id = $1 AND current_record_id = $2 \
             LIMIT 1",
        )
        .bind(system_id)
        .bind(current_record_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.is_some())
    }

    /// Bulk-insert diff rows, returning assigned ids in input order.
    ///
    /// All rows commit in one transaction so a retried job either finds the
    /// complete set or none of it; `chunk_size` only bounds how many rows go
    /// into a single statement.
    pub async fn insert_diffs(
        &self,
        diffs: &[NewInventoryDiff],
        chunk_size: usize,
    ) -> DbResult<Vec<i64>> {
        if diffs.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool().begin().await?;
        let mut ids = Vec::with_capacity(diffs.len());

        for chunk in diffs.chunks(chunk_size.max(1)) {
            let system_ids: Vec<Uuid> = chunk.iter().map(|d| d.system_id).collect();
            let previous_ids: Vec<Option<i64>> =
                chunk.iter().map(|d| d.previous_record_id).collect();
            let current_ids: Vec<i64> = chunk.iter().map(|d| d.current_record_id).collect();
            let field_paths: Vec<String> = chunk.iter().map(|d| d.field_path.clone()).collect();
            let diff_types: Vec<String> = chunk.iter().map(|d| d.diff_type.clone()).collect();
            let previous_values: Vec<Option<String>> =
                chunk.iter().map(|d| d.previous_value.clone()).collect();
            let current_values: Vec<Option<String>> =
                chunk.iter().map(|d| d.current_value.clone()).collect();
            let categories: Vec<String> = chunk.iter().map(|d| d.category.clone()).collect();
            let severities: Vec<String> = chunk.iter().map(|d| d.severity.clone()).collect();

            let rows = sqlx::query(
                "INSERT INTO inventory_diffs \
                     (system_id, previous_record_id, current_record_id, field_path, \
                      diff_type, previous_value, current_value, category, severity) \
                 SELECT * FROM UNNEST($1::uuid[], $2::bigint[], $3::bigint[], $4::text[], \
                                      $5::text[], $6::text[], $7::text[], $8::text[], $9::text[]) \
                 RETURNING id",
            )
            .bind(&system_ids)
            .bind(&previous_ids)
            .bind(&current_ids)
            .bind(&field_paths)
            .bind(&diff_types)
            .bind(&previous_values)
            .bind(&current_values)
            .bind(&categories)
            .bind(&severities)
            .fetch_all(&mut *tx)
            .await?;

            for row in rows {
                ids.push(row.get(0));
            }
        }

        tx.commit().await?;

        Ok(ids)
    }

    /// Diffs recorded against a given snapshot
    pub async fn diffs_for_record(
        &self,
        system_id: Uuid,
        current_record_id: i64,
    ) -> DbResult<Vec<InventoryDiffRow>> {
        let rows = sqlx::query_as::<_, InventoryDiffRow>(
            "SELECT id, system_id, previous_record_id, current_record_id, field_path, \
                    diff_type, previous_value, current_value, category, severity, computed_at \
             FROM inventory_diffs \
             WHERE system_id = $1 AND current_record_id = $2 \
             ORDER BY id",
        )
        .bind(system_id)
        .bind(current_record_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Purge snapshots older than `max_age`, cascading to their diffs.
    ///
    /// The newest record of every system is retained regardless of age so the
    /// next ingestion can still be diffed against it. Returns the number of
    /// purged records.
    pub async fn purge_expired_records(&self, max_age: Duration) -> DbResult<u64> {
        let age_secs = max_age.as_secs() as f64;

        let purged = sqlx::query(
            "DELETE FROM inventory_records \
             WHERE received_at < now() - make_interval(secs => $1) \
               AND id NOT IN ( \
                   SELECT MAX(id) FROM inventory_records GROUP BY system_id \
               )",
        )
        .bind(age_secs)
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(purged)
    }
}
