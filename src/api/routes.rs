//! # API Routes
//!
//! Route table for the collect service:
//!
//! - `GET  /health` - component health, unauthenticated
//! - `POST /systems/inventory` - enqueue an inventory snapshot
//! - `POST /systems/heartbeat` - record a heartbeat
//! - `GET  /systems/info` - system descriptor
//! - `GET  /systems/rebranding[/{product_id}/{asset}]` - branding passthrough
//!
//! Every `/systems` route requires HTTP Basic system credentials.

use axum::{
    extract::DefaultBodyLimit,
    middleware::{self, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_check, heartbeat, ingest_inventory, rebranding_asset, rebranding_catalogue, system_info,
    AppState,
};
use super::middleware::{request_id_middleware, system_auth_middleware};

/// Permissive CORS for read-only passthroughs
fn cors_layer() -> CorsLayer {
    CorsLayer::new().allow_origin(Any).allow_methods(Any)
}

/// Assemble the complete router
pub fn create_router(state: Arc<AppState>) -> Router {
    let systems = Router::new()
        .route("/inventory", post(ingest_inventory))
        .route("/heartbeat", post(heartbeat))
        .route("/info", get(system_info))
        .route("/rebranding", get(rebranding_catalogue))
        .route("/rebranding/:product_id/:asset", get(rebranding_asset))
        .layer(from_fn_with_state(Arc::clone(&state), system_auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/systems", systems)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .layer(TimeoutLayer::new(state.config.api.request_timeout))
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size))
        .with_state(state)
}
