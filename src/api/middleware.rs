//! # API Middleware
//!
//! This module provides:
//! - HTTP Basic credential extraction and system verification
//! - Request ID tracking
//!
//! Verified requests carry a `SystemIdentity` in their extensions for the
//! handlers to consume.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use std::sync::Arc;
use uuid::Uuid;

use super::handlers::AppState;
use super::responses::ApiError;
use crate::auth::AuthError;

/// Request ID header name
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Attach a request ID to every request and response
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    response
}

/// Basic credentials as presented by a system
#[derive(Debug, Clone)]
pub struct BasicCredentials {
    /// Username: the system key
    pub system_key: String,

    /// Password: the system secret
    pub secret: String,
}

/// Parse an `Authorization: Basic ...` header value
pub fn parse_basic(header_value: &str) -> Option<BasicCredentials> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (key, secret) = decoded.split_once(':')?;

    if key.is_empty() {
        return None;
    }

    Some(BasicCredentials {
        system_key: key.to_string(),
        secret: secret.to_string(),
    })
}

/// Verify the Basic credential and stash the system identity.
///
/// Maps verification failures onto the documented status codes: malformed
/// credential 400, unknown or mismatching 401, deleted system 403, and
/// dependency failure 503.
pub async fn system_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let credentials = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic);

    let credentials = match credentials {
        Some(c) => c,
        None => return ApiError::unauthorized().into_response(),
    };

    match state
        .verifier
        .verify(&credentials.system_key, &credentials.secret)
        .await
    {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(AuthError::BadFormat) => {
            ApiError::bad_request("bad-format", "malformed system secret").into_response()
        }
        Err(AuthError::Denied) => ApiError::unauthorized().into_response(),
        Err(AuthError::Deleted) => ApiError::forbidden_deleted().into_response(),
        Err(AuthError::Unavailable(reason)) => {
            tracing::error!(error = %reason, "credential verification dependency failure");
            ApiError::service_unavailable("dependency-unavailable", "verification unavailable")
                .with_retry_after(10)
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(user: &str, pass: &str) -> String {
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"))
        )
    }

    #[test]
    fn test_parse_basic() {
        let creds = parse_basic(&encode("sys-1", "my_0123456789abcdef0123.rest")).unwrap();
        assert_eq!(creds.system_key, "sys-1");
        assert_eq!(creds.secret, "my_0123456789abcdef0123.rest");
    }

    #[test]
    fn test_parse_basic_keeps_colons_in_secret() {
        let creds = parse_basic(&encode("sys-1", "se:cr:et")).unwrap();
        assert_eq!(creds.secret, "se:cr:et");
    }

    #[test]
    fn test_parse_basic_rejects_malformed() {
        assert!(parse_basic("Bearer abc").is_none());
        assert!(parse_basic("Basic not-base64!!").is_none());
        let no_colon = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("no-colon-here")
        );
        assert!(parse_basic(&no_colon).is_none());
        assert!(parse_basic(&encode("", "secret")).is_none());
    }
}
