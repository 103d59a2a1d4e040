//! Alert rendering and dispatch
//!
//! Notification jobs are rendered into an alert via a small per-category
//! template table and handed to an outbound transport. The webhook transport
//! POSTs the alert as JSON; the log transport records it and is the default
//! when no webhook is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::pool::{JobError, JobHandler};
use crate::queue::{NotificationJobPayload, QueueJob};

/// A rendered alert ready for dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Affected system
    pub system_id: Uuid,

    /// Diff row the alert refers to
    pub diff_id: i64,

    /// Change category
    pub category: String,

    /// Change severity
    pub severity: String,

    /// Short headline
    pub title: String,

    /// Rendered body
    pub body: String,

    /// When the alert was rendered
    pub created_at: DateTime<Utc>,
}

/// Outbound alert transport
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Deliver one alert
    async fn send(&self, alert: &Alert) -> Result<(), String>;

    /// Transport name for logging
    fn name(&self) -> &'static str;
}

/// Transport that records alerts in the service log
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, alert: &Alert) -> Result<(), String> {
        tracing::info!(
            system_id = %alert.system_id,
            diff_id = alert.diff_id,
            severity = %alert.severity,
            title = %alert.title,
            "alert"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Transport that POSTs alerts to a webhook as JSON
pub struct WebhookTransport {
    client: reqwest::Client,
    url: String,
}

impl WebhookTransport {
    /// Create a webhook transport for the given endpoint
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { client, url }
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    async fn send(&self, alert: &Alert) -> Result<(), String> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| format!("webhook request: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("webhook returned {}", response.status()));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Title template per category; `{severity}` is substituted on render
fn title_for(category: &str, severity: &str) -> String {
    let label = match category {
        "operating_system" => "Operating system change",
        "modules" => "Module change",
        "hardware" => "Hardware change",
        "network" => "Network change",
        other if other.starts_with("features_") => "Feature change",
        _ => "Inventory change",
    };

    format!("[{}] {}", severity.to_uppercase(), label)
}

/// Handler for `collect:notifications` jobs
pub struct NotificationHandler {
    transport: Arc<dyn NotificationTransport>,
}

impl NotificationHandler {
    /// Create the handler
    pub fn new(transport: Arc<dyn NotificationTransport>) -> Arc<Self> {
        Arc::new(Self { transport })
    }

    /// Render a job payload into an alert
    pub fn render(payload: &NotificationJobPayload) -> Alert {
        let mut body = payload.summary.clone();
        if let Some(trend) = &payload.trend {
            if let Some(total) = trend.get("total").and_then(|v| v.as_u64()) {
                body.push_str(&format!(" ({total} changes in this run)"));
            }
        }

        Alert {
            system_id: payload.system_id,
            diff_id: payload.diff_id,
            category: payload.category.clone(),
            severity: payload.severity.clone(),
            title: title_for(&payload.category, &payload.severity),
            body,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl JobHandler for NotificationHandler {
    async fn handle(&self, job: &QueueJob) -> Result<(), JobError> {
        let payload: NotificationJobPayload = job
            .decode()
            .map_err(|e| JobError::Permanent(format!("undecodable notification job: {e}")))?;

        let alert = Self::render(&payload);

        self.transport
            .send(&alert)
            .await
            .map_err(|e| JobError::Transient(format!("{} dispatch: {e}", self.transport.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> NotificationJobPayload {
        NotificationJobPayload {
            system_id: Uuid::new_v4(),
            diff_id: 7,
            category: "operating_system".to_string(),
            severity: "high".to_string(),
            summary: "update facts.distro.version: \"9.2\" -> \"9.3\"".to_string(),
            trend: Some(json!({"total": 3})),
        }
    }

    #[test]
    fn test_render_title_and_body() {
        let alert = NotificationHandler::render(&payload());
        assert_eq!(alert.title, "[HIGH] Operating system change");
        assert!(alert.body.contains("9.3"));
        assert!(alert.body.contains("3 changes in this run"));
    }

    #[test]
    fn test_render_without_trend() {
        let mut p = payload();
        p.trend = None;
        let alert = NotificationHandler::render(&p);
        assert_eq!(alert.body, p.summary);
    }

    #[test]
    fn test_feature_category_title() {
        let mut p = payload();
        p.category = "features_backup".to_string();
        p.severity = "critical".to_string();
        let alert = NotificationHandler::render(&p);
        assert_eq!(alert.title, "[CRITICAL] Feature change");
    }

    #[tokio::test]
    async fn test_log_transport_always_succeeds() {
        let alert = NotificationHandler::render(&payload());
        assert!(LogTransport.send(&alert).await.is_ok());
    }
}
