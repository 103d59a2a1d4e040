//! # Persistence Layer
//!
//! PostgreSQL access for the collect service:
//! - Async connection pooling over sqlx
//! - Embedded schema migrations
//! - System lookups for credential verification
//! - Inventory snapshot and diff storage
//! - Heartbeat upserts and liveness transitions

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

pub mod inventory;
pub mod models;
pub mod systems;

pub use inventory::InsertOutcome;
pub use models::{
    InventoryDiffRow, InventoryRecordRow, NewInventoryDiff, SystemHeartbeatRow, SystemRow,
    SystemStatus,
};

/// Database error types
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Query execution error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DatabaseError>;

/// Shared database handle
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL and run pending migrations
    pub async fn connect(database_url: &str) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(2)
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (used by tests)
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check connectivity with a trivial round-trip
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
