//! System lookups, heartbeat upserts, and liveness transitions

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use super::models::{SystemHeartbeatRow, SystemRow, SystemStatus};
use super::{Database, DbResult};

impl Database {
    /// Find a system by its credential pair.
    ///
    /// Soft-deleted rows are returned so callers can distinguish a deleted
    /// system from an unknown one.
    pub async fn find_system_for_auth(
        &self,
        system_key: &str,
        secret_public: &str,
    ) -> DbResult<Option<SystemRow>> {
        let row = sqlx::query_as::<_, SystemRow>(
            "SELECT system_id, system_key, system_secret_public, system_secret_hash, \
                    organization_id, registered_at, deleted_at \
             FROM systems \
             WHERE system_key = $1 AND system_secret_public = $2",
        )
        .bind(system_key)
        .bind(secret_public)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Load a system by its internal identifier
    pub async fn find_system(&self, system_id: Uuid) -> DbResult<Option<SystemRow>> {
        let row = sqlx::query_as::<_, SystemRow>(
            "SELECT system_id, system_key, system_secret_public, system_secret_hash, \
                    organization_id, registered_at, deleted_at \
             FROM systems \
             WHERE system_id = $1",
        )
        .bind(system_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Upsert a heartbeat, keeping the stored timestamp monotonic.
    ///
    /// Late or replayed heartbeats never move the timestamp backwards; the
    /// stored value is always the maximum seen so far. Returns the stored
    /// timestamp after the upsert.
    pub async fn upsert_heartbeat(
        &self,
        system_id: Uuid,
        seen_at: DateTime<Utc>,
    ) -> DbResult<DateTime<Utc>> {
        let (stored,): (DateTime<Utc>,) = sqlx::query_as(
            "INSERT INTO system_heartbeats (system_id, last_heartbeat, status) \
             VALUES ($1, $2, 'active') \
             ON CONFLICT (system_id) DO UPDATE \
                 SET last_heartbeat = GREATEST(system_heartbeats.last_heartbeat, EXCLUDED.last_heartbeat) \
             RETURNING last_heartbeat",
        )
        .bind(system_id)
        .bind(seen_at)
        .fetch_one(self.pool())
        .await?;

        Ok(stored)
    }

    /// Load the heartbeat row for a system
    pub async fn heartbeat(&self, system_id: Uuid) -> DbResult<Option<SystemHeartbeatRow>> {
        let row = sqlx::query_as::<_, SystemHeartbeatRow>(
            "SELECT system_id, last_heartbeat, status \
             FROM system_heartbeats \
             WHERE system_id = $1",
        )
        .bind(system_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Liveness status for a system: `unknown` until the first heartbeat
    pub async fn system_status(
        &self,
        system_id: Uuid,
        active_window: Duration,
    ) -> DbResult<SystemStatus> {
        let row = self.heartbeat(system_id).await?;

        Ok(match row {
            Some(hb) => {
                let age = Utc::now() - hb.last_heartbeat;
                if age < chrono::Duration::from_std(active_window).unwrap_or(chrono::Duration::zero())
                {
                    SystemStatus::Active
                } else {
                    SystemStatus::Inactive
                }
            }
            None => SystemStatus::Unknown,
        })
    }

    /// Transition stored liveness statuses based on heartbeat age.
    ///
    /// Returns `(activated, deactivated)` row counts. Systems that never
    /// reported have no heartbeat row and stay `unknown` implicitly.
    pub async fn transition_liveness(&self, active_window: Duration) -> DbResult<(u64, u64)> {
        let window_secs = active_window.as_secs() as f64;

        let activated = sqlx::query(
            "UPDATE system_heartbeats \
             SET status = 'active' \
             WHERE status <> 'active' \
               AND last_heartbeat > now() - make_interval(secs => $1)",
        )
        .bind(window_secs)
        .execute(self.pool())
        .await?
        .rows_affected();

        let deactivated = sqlx::query(
            "UPDATE system_heartbeats \
             SET status = 'inactive' \
             WHERE status <> 'inactive' \
               AND last_heartbeat <= now() - make_interval(secs => $1)",
        )
        .bind(window_secs)
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok((activated, deactivated))
    }
}
