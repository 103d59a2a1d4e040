//! # COLLECT - Inventory ingestion and change-detection service
//!
//! A backend service that receives inventory snapshots and heartbeats from
//! managed systems, persists them, and turns consecutive snapshots into
//! categorised, severity-ranked change records.
//!
//! ## Architecture
//!
//! - `config`: Environment-driven service configuration
//! - `api`: HTTP surface (ingestion, heartbeat, info, rebranding, health)
//! - `auth`: System credential verification and caching
//! - `db`: PostgreSQL persistence for systems, snapshots, diffs, heartbeats
//! - `queue`: Redis-backed FIFO queues with delayed retry and dead-letter tails
//! - `diff`: Semantic diff engine with categorisation and noise filtering
//! - `workers`: Worker pools, background maintenance, and lifecycle management

#![warn(missing_docs)]
#![warn(clippy::all)]

// Service configuration
pub mod config;

// HTTP surface
pub mod api;

// Credential verification
pub mod auth;

// Persistence layer
pub mod db;

// Queue broker
pub mod queue;

// Diff engine
pub mod diff;

// Worker pools and lifecycle
pub mod workers;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
