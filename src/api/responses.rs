//! # API Response Types
//!
//! Structured envelopes for the collect HTTP surface:
//! - Machine-parseable errors `{code, message, data?}`
//! - Typed success bodies for ingestion, heartbeat, info, and health

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Error envelope
// ============================================================================

/// Structured API error
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Stable machine-parseable code
    pub code: &'static str,

    /// Language-neutral message
    pub message: String,

    /// Optional structured detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(skip)]
    status: StatusCode,

    #[serde(skip)]
    retry_after: Option<u64>,
}

impl ApiError {
    /// 400: malformed request
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            status: StatusCode::BAD_REQUEST,
            retry_after: None,
        }
    }

    /// 401: unknown key or secret mismatch
    pub fn unauthorized() -> Self {
        Self {
            code: "denied",
            message: "invalid credentials".to_string(),
            data: None,
            status: StatusCode::UNAUTHORIZED,
            retry_after: None,
        }
    }

    /// 403: system exists but is deleted
    pub fn forbidden_deleted() -> Self {
        Self {
            code: "deleted",
            message: "system has been deleted".to_string(),
            data: None,
            status: StatusCode::FORBIDDEN,
            retry_after: None,
        }
    }

    /// 404: unknown resource
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: "not-found",
            message: message.into(),
            data: None,
            status: StatusCode::NOT_FOUND,
            retry_after: None,
        }
    }

    /// 413: body over the configured limit
    pub fn payload_too_large(limit: usize) -> Self {
        Self {
            code: "payload-too-large",
            message: "request body exceeds limit".to_string(),
            data: Some(serde_json::json!({ "limit_bytes": limit })),
            status: StatusCode::PAYLOAD_TOO_LARGE,
            retry_after: None,
        }
    }

    /// 503: dependency down or admission control rejected the request
    pub fn service_unavailable(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            status: StatusCode::SERVICE_UNAVAILABLE,
            retry_after: None,
        }
    }

    /// Attach a `Retry-After` hint in seconds
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Attach structured detail
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        let retry_after = self.retry_after;

        let mut response = (status, Json(self)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"collect\""),
            );
        }
        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

// ============================================================================
// Success bodies
// ============================================================================

/// Queue admission status returned with an accepted inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Queue the job landed on
    pub queue: String,

    /// Depth observed at admission
    pub depth: usize,

    /// Configured backpressure threshold
    pub threshold: usize,
}

/// 202 body for an accepted inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryAccepted {
    /// Target system
    pub system_id: Uuid,

    /// Queue admission status
    pub queue_status: QueueStatus,

    /// Accepted payload size in bytes
    pub data_size: usize,

    /// Acceptance timestamp
    pub timestamp: DateTime<Utc>,
}

/// 200 body for an acknowledged heartbeat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatAck {
    /// Reporting system
    pub system_key: String,

    /// Always true on success
    pub acknowledged: bool,

    /// Stored (monotonic) heartbeat timestamp
    pub last_heartbeat: DateTime<Utc>,
}

/// 200 body for the system descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemDescriptor {
    /// Internal identifier
    pub system_id: Uuid,

    /// External label
    pub system_key: String,

    /// Owning organization
    pub organization_id: Option<String>,

    /// Registration time
    pub registered_at: Option<DateTime<Utc>>,

    /// Liveness status
    pub status: String,

    /// Last stored heartbeat
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Component states reported by `/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`
    pub status: &'static str,

    /// Worker fleet health
    pub workers: crate::workers::WorkersHealth,

    /// Database reachability
    pub database: bool,

    /// Queue broker reachability
    pub redis: bool,

    /// Service version
    pub version: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_shape() {
        let error = ApiError::bad_request("bad-format", "malformed credential")
            .with_data(serde_json::json!({"field": "password"}));

        let encoded = serde_json::to_value(&error).unwrap();
        assert_eq!(encoded["code"], "bad-format");
        assert_eq!(encoded["message"], "malformed credential");
        assert_eq!(encoded["data"]["field"], "password");
        assert!(encoded.get("status").is_none());
    }

    #[test]
    fn test_error_data_omitted_when_absent() {
        let encoded = serde_json::to_value(ApiError::unauthorized()).unwrap();
        assert!(encoded.get("data").is_none());
    }

    #[test]
    fn test_retry_after_header() {
        let response = ApiError::service_unavailable("backpressure", "queue full")
            .with_retry_after(30)
            .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "30"
        );
    }

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = ApiError::unauthorized().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }
}
