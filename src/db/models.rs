//! Row types for the collect schema

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A managed system as provisioned by the management backend
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SystemRow {
    /// Internal system identifier
    pub system_id: Uuid,

    /// External system label, unique across the platform
    pub system_key: String,

    /// 20-hex lookup prefix of the secret
    pub system_secret_public: String,

    /// Argon2id PHC hash of the secret remainder
    pub system_secret_hash: String,

    /// Owning organization
    pub organization_id: Option<String>,

    /// First successful registration
    pub registered_at: Option<DateTime<Utc>>,

    /// Soft-deletion marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SystemRow {
    /// Whether the system has been soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A persisted inventory snapshot
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InventoryRecordRow {
    /// Monotonic record identifier
    pub id: i64,

    /// Owning system
    pub system_id: Uuid,

    /// Snapshot document
    pub data: serde_json::Value,

    /// Canonical fingerprint of `data`
    pub data_hash: String,

    /// Ingestion timestamp
    pub received_at: DateTime<Utc>,

    /// Payload size as received
    pub size_bytes: i64,
}

/// A persisted semantic change between two snapshots
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct InventoryDiffRow {
    /// Diff identifier
    pub id: i64,

    /// Owning system
    pub system_id: Uuid,

    /// Predecessor snapshot, when one existed at diff time
    pub previous_record_id: Option<i64>,

    /// Snapshot the change was observed in
    pub current_record_id: i64,

    /// Dotted field path
    pub field_path: String,

    /// One of `create`, `update`, `delete`
    pub diff_type: String,

    /// Rendered previous value
    pub previous_value: Option<String>,

    /// Rendered current value
    pub current_value: Option<String>,

    /// Assigned category
    pub category: String,

    /// Assigned severity
    pub severity: String,

    /// Diff computation timestamp
    pub computed_at: DateTime<Utc>,
}

/// Insert form of an inventory diff
#[derive(Debug, Clone)]
pub struct NewInventoryDiff {
    /// Owning system
    pub system_id: Uuid,

    /// Predecessor snapshot
    pub previous_record_id: Option<i64>,

    /// Snapshot the change was observed in
    pub current_record_id: i64,

    /// Dotted field path
    pub field_path: String,

    /// One of `create`, `update`, `delete`
    pub diff_type: String,

    /// Rendered previous value
    pub previous_value: Option<String>,

    /// Rendered current value
    pub current_value: Option<String>,

    /// Assigned category
    pub category: String,

    /// Assigned severity
    pub severity: String,
}

/// Last-seen heartbeat for a system
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SystemHeartbeatRow {
    /// Owning system
    pub system_id: Uuid,

    /// Most recent heartbeat timestamp (monotonically non-decreasing)
    pub last_heartbeat: DateTime<Utc>,

    /// Liveness status maintained by the monitor
    pub status: String,
}

/// Liveness status derived from heartbeat age
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    /// Heartbeat seen within the active window
    Active,
    /// Heartbeat older than the active window
    Inactive,
    /// Never reported
    Unknown,
}

impl SystemStatus {
    /// Stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Active => "active",
            SystemStatus::Inactive => "inactive",
            SystemStatus::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for SystemStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SystemStatus::Active),
            "inactive" => Ok(SystemStatus::Inactive),
            "unknown" => Ok(SystemStatus::Unknown),
            _ => Err(()),
        }
    }
}
