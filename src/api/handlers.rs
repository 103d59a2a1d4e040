//! # API Handlers
//!
//! Handlers for the collect HTTP surface. Ingestion only validates, checks
//! admission, and enqueues; everything heavy runs in the worker pools.

use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use super::responses::{
    ApiError, HealthResponse, HeartbeatAck, InventoryAccepted, QueueStatus, SystemDescriptor,
};
use crate::auth::{CredentialVerifier, SystemIdentity};
use crate::config::Config;
use crate::db::Database;
use crate::queue::{BrokerError, InventoryJobPayload, QueueBroker, QueueJob, INVENTORY_QUEUE};
use crate::workers::monitor::ACTIVE_WINDOW;
use crate::workers::WorkerManager;

/// Shared application state
pub struct AppState {
    /// Database handle
    pub db: Database,

    /// Queue broker
    pub broker: Arc<QueueBroker>,

    /// Credential verifier
    pub verifier: Arc<CredentialVerifier>,

    /// Worker manager, for health aggregation
    pub manager: Arc<WorkerManager>,

    /// Service configuration
    pub config: Config,
}

/// `GET /health`
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let database = state.db.ping().await.is_ok();
    let redis = state.broker.ping().await.is_ok();
    let workers = state.manager.health();

    let healthy = database && redis && workers.healthy;
    let body = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        workers,
        database,
        redis,
        version: crate::VERSION,
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(body)).into_response()
}

/// `POST /systems/inventory`
pub async fn ingest_inventory(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<SystemIdentity>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let size = body.len();
    if size > state.config.api.max_request_size {
        return Err(ApiError::payload_too_large(state.config.api.max_request_size));
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("malformed-json", "body is not valid JSON"))?;

    if !payload.is_object() {
        return Err(ApiError::bad_request(
            "invalid-payload",
            "inventory must be a JSON object",
        ));
    }

    // Admission control: reject before enqueue when the queue is backed up
    let threshold = state.config.queue.backpressure_threshold;
    let depth = state
        .broker
        .depth(INVENTORY_QUEUE)
        .await
        .map_err(broker_unavailable)?;

    if depth >= threshold {
        return Err(ApiError::service_unavailable("backpressure", "ingestion queue is full")
            .with_data(serde_json::json!({ "depth": depth, "threshold": threshold }))
            .with_retry_after(30));
    }

    let received_at = Utc::now();
    let job_payload = InventoryJobPayload {
        system_id: identity.system_id,
        received_at,
        payload,
        size: size as i64,
    };
    let job = QueueJob::new(
        INVENTORY_QUEUE,
        serde_json::to_value(&job_payload)
            .map_err(|_| ApiError::bad_request("invalid-payload", "payload not serializable"))?,
    );

    state.broker.enqueue(&job).await.map_err(broker_unavailable)?;

    tracing::debug!(
        system_id = %identity.system_id,
        size,
        depth = depth + 1,
        "inventory accepted"
    );

    let accepted = InventoryAccepted {
        system_id: identity.system_id,
        queue_status: QueueStatus {
            queue: INVENTORY_QUEUE.to_string(),
            depth: depth + 1,
            threshold,
        },
        data_size: size,
        timestamp: received_at,
    };

    Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
}

/// `POST /systems/heartbeat`
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<SystemIdentity>,
) -> Result<Json<HeartbeatAck>, ApiError> {
    let stored = state
        .db
        .upsert_heartbeat(identity.system_id, Utc::now())
        .await
        .map_err(|e| {
            tracing::error!(system_id = %identity.system_id, error = %e, "heartbeat upsert failed");
            ApiError::service_unavailable("dependency-unavailable", "storage unavailable")
        })?;

    Ok(Json(HeartbeatAck {
        system_key: identity.system_key,
        acknowledged: true,
        last_heartbeat: stored,
    }))
}

/// `GET /systems/info`
pub async fn system_info(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<SystemIdentity>,
) -> Result<Json<SystemDescriptor>, ApiError> {
    let system = state
        .db
        .find_system(identity.system_id)
        .await
        .map_err(|_| ApiError::service_unavailable("dependency-unavailable", "storage unavailable"))?
        .ok_or_else(|| ApiError::not_found("system not found"))?;

    let heartbeat = state
        .db
        .heartbeat(identity.system_id)
        .await
        .map_err(|_| ApiError::service_unavailable("dependency-unavailable", "storage unavailable"))?;

    let status = state
        .db
        .system_status(identity.system_id, ACTIVE_WINDOW)
        .await
        .map_err(|_| ApiError::service_unavailable("dependency-unavailable", "storage unavailable"))?;

    Ok(Json(SystemDescriptor {
        system_id: system.system_id,
        system_key: system.system_key,
        organization_id: system.organization_id,
        registered_at: system.registered_at,
        status: status.as_str().to_string(),
        last_heartbeat: heartbeat.map(|h| h.last_heartbeat),
    }))
}

/// `GET /systems/rebranding`
pub async fn rebranding_catalogue(
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let path = std::path::Path::new(&state.config.api.rebranding_dir).join("catalogue.json");

    let raw = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::not_found("no rebranding catalogue"))?;
    let catalogue: serde_json::Value = serde_json::from_slice(&raw)
        .map_err(|_| ApiError::not_found("no rebranding catalogue"))?;

    Ok(cacheable(Json(catalogue).into_response()))
}

/// `GET /systems/rebranding/{product_id}/{asset}`
pub async fn rebranding_asset(
    State(state): State<Arc<AppState>>,
    Path((product_id, asset)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    if !is_safe_segment(&product_id) || !is_safe_segment(&asset) {
        return Err(ApiError::not_found("unknown asset"));
    }

    let path = std::path::Path::new(&state.config.api.rebranding_dir)
        .join(&product_id)
        .join(&asset);

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::not_found("unknown asset"))?;

    let mut response = bytes.into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&asset)),
    );

    Ok(cacheable(response))
}

/// Path segments may not escape the asset directory
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains('/')
        && !segment.contains('\\')
}

/// Content type from the asset extension
fn content_type_for(asset: &str) -> &'static str {
    match asset.rsplit('.').next() {
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("ico") => "image/x-icon",
        Some("css") => "text/css",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Rebranding responses are static: let systems cache them
fn cacheable(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
    response
}

fn broker_unavailable(error: BrokerError) -> ApiError {
    match error {
        BrokerError::CircuitOpen => {
            ApiError::service_unavailable("dependency-unavailable", "queue broker unavailable")
                .with_retry_after(60)
        }
        other => {
            tracing::error!(error = %other, "broker failure on ingestion path");
            ApiError::service_unavailable("dependency-unavailable", "queue broker unavailable")
                .with_retry_after(10)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_segments() {
        assert!(is_safe_segment("nethserver"));
        assert!(is_safe_segment("logo.png"));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment("."));
        assert!(!is_safe_segment(""));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment("a\\b"));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("logo.png"), "image/png");
        assert_eq!(content_type_for("logo.svg"), "image/svg+xml");
        assert_eq!(content_type_for("theme.css"), "text/css");
        assert_eq!(content_type_for("blob"), "application/octet-stream");
    }
}
