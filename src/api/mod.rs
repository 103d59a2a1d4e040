//! # HTTP Surface
//!
//! This module provides:
//! - Route assembly and middleware layering
//! - System authentication via HTTP Basic credentials
//! - Structured success and error envelopes
//! - Ingestion, heartbeat, info, rebranding, and health handlers

pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;

pub use handlers::AppState;
pub use responses::{ApiError, HealthResponse, HeartbeatAck, InventoryAccepted, QueueStatus};
pub use routes::create_router;
