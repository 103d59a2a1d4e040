//! Service configuration loaded from the environment
//!
//! This module provides:
//! - Typed configuration for every recognised environment option
//! - Defaults matching the documented deployment profile
//! - Duration parsing for `30s` / `5m` / `6h` style values

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// HTTP API settings
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Bind address for the HTTP listener
    pub listen_address: SocketAddr,

    /// Maximum accepted request body size in bytes
    pub max_request_size: usize,

    /// Per-request deadline
    pub request_timeout: Duration,

    /// Directory holding rebranding catalogues and assets
    pub rebranding_dir: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:8081".parse().unwrap(),
            max_request_size: 10 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            rebranding_dir: "rebranding".to_string(),
        }
    }
}

/// Queue broker settings
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Redis connection URL
    pub redis_url: String,

    /// Redis logical database index
    pub redis_db: i64,

    /// Claim batch size for the inventory pool
    pub batch_size: usize,

    /// Maximum delivery attempts before dead-lettering
    pub retry_attempts: u32,

    /// Base delay for exponential retry backoff
    pub retry_base_delay: Duration,

    /// Ceiling for the retry backoff
    pub retry_max_delay: Duration,

    /// Queue depth above which ingestion is rejected
    pub backpressure_threshold: usize,

    /// Consecutive broker failures before the circuit opens
    pub circuit_breaker_threshold: u32,

    /// How long an open circuit stays open
    pub circuit_breaker_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_db: 1,
            batch_size: 10,
            retry_attempts: 3,
            retry_base_delay: Duration::from_secs(30),
            retry_max_delay: Duration::from_secs(3600),
            backpressure_threshold: 1000,
            circuit_breaker_threshold: 10,
            circuit_breaker_timeout: Duration::from_secs(60),
        }
    }
}

/// Worker pool settings
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Inventory pool size
    pub inventory_count: usize,

    /// Diff processing pool size
    pub processing_count: usize,

    /// Notification pool size
    pub notification_count: usize,

    /// Maximum delivery attempts for notification jobs
    pub notification_retry_attempts: u32,

    /// Drain window granted to workers during shutdown
    pub shutdown_timeout: Duration,

    /// Expected cadence of per-worker heartbeats
    pub heartbeat_interval: Duration,

    /// Cadence of the queue/heartbeat monitor
    pub health_check_interval: Duration,

    /// Row-chunk size for bulk writes inside a job
    pub batch_processor_size: usize,

    /// Per-job processing deadline; an expired job is retried
    pub batch_processor_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            inventory_count: 5,
            processing_count: 3,
            notification_count: 2,
            notification_retry_attempts: 3,
            shutdown_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(60),
            batch_processor_size: 100,
            batch_processor_timeout: Duration::from_secs(30),
        }
    }
}

/// Inventory retention and diff settings
#[derive(Debug, Clone)]
pub struct InventorySettings {
    /// Age past which snapshots are purged
    pub max_age: Duration,

    /// Cadence of the retention sweep
    pub cleanup_interval: Duration,

    /// Maximum path depth considered by the diff engine
    pub diff_depth: usize,

    /// Maximum rendered field-path length
    pub diff_max_field_path: usize,

    /// Per-run cap on emitted changes
    pub diff_max_changes: usize,

    /// Optional path to a diff rule file (JSON)
    pub rules_path: Option<String>,
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(2160 * 3600),
            cleanup_interval: Duration::from_secs(6 * 3600),
            diff_depth: 10,
            diff_max_field_path: 255,
            diff_max_changes: 1000,
            rules_path: None,
        }
    }
}

/// Credential verification settings
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Minimum accepted secret length
    pub secret_min_length: usize,

    /// TTL for cached successful verifications
    pub cache_ttl: Duration,

    /// TTL for cached denials
    pub negative_cache_ttl: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            secret_min_length: 32,
            cache_ttl: Duration::from_secs(300),
            negative_cache_ttl: Duration::from_secs(30),
        }
    }
}

/// Notification dispatch settings
#[derive(Debug, Clone, Default)]
pub struct NotificationSettings {
    /// Webhook endpoint for outbound alerts; log-only dispatch when unset
    pub webhook_url: Option<String>,
}

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// HTTP API settings
    pub api: ApiSettings,

    /// Queue broker settings
    pub queue: QueueSettings,

    /// Worker pool settings
    pub workers: WorkerSettings,

    /// Inventory retention and diff settings
    pub inventory: InventorySettings,

    /// Credential verification settings
    pub auth: AuthSettings,

    /// Notification dispatch settings
    pub notifications: NotificationSettings,
}

impl Config {
    /// Load configuration from the environment
    pub fn from_env() -> ConfigResult<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let mut api = ApiSettings::default();
        if let Some(v) = env_var("LISTEN_ADDRESS") {
            api.listen_address = parse_value("LISTEN_ADDRESS", &v)?;
        }
        if let Some(v) = env_var("API_MAX_REQUEST_SIZE") {
            api.max_request_size = parse_value("API_MAX_REQUEST_SIZE", &v)?;
        }
        if let Some(v) = env_var("API_REQUEST_TIMEOUT") {
            api.request_timeout = parse_duration_var("API_REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = env_var("REBRANDING_ASSETS_DIR") {
            api.rebranding_dir = v;
        }

        let mut queue = QueueSettings::default();
        if let Some(v) = env_var("REDIS_URL") {
            queue.redis_url = v;
        }
        if let Some(v) = env_var("REDIS_DB") {
            queue.redis_db = parse_value("REDIS_DB", &v)?;
        }
        if let Some(v) = env_var("QUEUE_BATCH_SIZE") {
            queue.batch_size = parse_value("QUEUE_BATCH_SIZE", &v)?;
        }
        if let Some(v) = env_var("QUEUE_RETRY_ATTEMPTS") {
            queue.retry_attempts = parse_value("QUEUE_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = env_var("QUEUE_RETRY_BASE_DELAY") {
            queue.retry_base_delay = parse_duration_var("QUEUE_RETRY_BASE_DELAY", &v)?;
        }
        if let Some(v) = env_var("QUEUE_RETRY_MAX_DELAY") {
            queue.retry_max_delay = parse_duration_var("QUEUE_RETRY_MAX_DELAY", &v)?;
        }
        if let Some(v) = env_var("BACKPRESSURE_THRESHOLD") {
            queue.backpressure_threshold = parse_value("BACKPRESSURE_THRESHOLD", &v)?;
        }
        if let Some(v) = env_var("CIRCUIT_BREAKER_THRESHOLD") {
            queue.circuit_breaker_threshold = parse_value("CIRCUIT_BREAKER_THRESHOLD", &v)?;
        }
        if let Some(v) = env_var("CIRCUIT_BREAKER_TIMEOUT") {
            queue.circuit_breaker_timeout = parse_duration_var("CIRCUIT_BREAKER_TIMEOUT", &v)?;
        }

        let mut workers = WorkerSettings::default();
        if let Some(v) = env_var("WORKER_INVENTORY_COUNT") {
            workers.inventory_count = parse_value("WORKER_INVENTORY_COUNT", &v)?;
        }
        if let Some(v) = env_var("WORKER_PROCESSING_COUNT") {
            workers.processing_count = parse_value("WORKER_PROCESSING_COUNT", &v)?;
        }
        if let Some(v) = env_var("WORKER_NOTIFICATION_COUNT") {
            workers.notification_count = parse_value("WORKER_NOTIFICATION_COUNT", &v)?;
        }
        if let Some(v) = env_var("NOTIFICATION_RETRY_ATTEMPTS") {
            workers.notification_retry_attempts = parse_value("NOTIFICATION_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = env_var("WORKER_SHUTDOWN_TIMEOUT") {
            workers.shutdown_timeout = parse_duration_var("WORKER_SHUTDOWN_TIMEOUT", &v)?;
        }
        if let Some(v) = env_var("WORKER_HEARTBEAT_INTERVAL") {
            workers.heartbeat_interval = parse_duration_var("WORKER_HEARTBEAT_INTERVAL", &v)?;
        }
        if let Some(v) = env_var("HEALTH_CHECK_INTERVAL") {
            workers.health_check_interval = parse_duration_var("HEALTH_CHECK_INTERVAL", &v)?;
        }
        if let Some(v) = env_var("BATCH_PROCESSOR_SIZE") {
            workers.batch_processor_size = parse_value("BATCH_PROCESSOR_SIZE", &v)?;
        }
        if let Some(v) = env_var("BATCH_PROCESSOR_TIMEOUT") {
            workers.batch_processor_timeout = parse_duration_var("BATCH_PROCESSOR_TIMEOUT", &v)?;
        }

        let mut inventory = InventorySettings::default();
        if let Some(v) = env_var("INVENTORY_MAX_AGE") {
            inventory.max_age = parse_duration_var("INVENTORY_MAX_AGE", &v)?;
        }
        if let Some(v) = env_var("INVENTORY_CLEANUP_INTERVAL") {
            inventory.cleanup_interval = parse_duration_var("INVENTORY_CLEANUP_INTERVAL", &v)?;
        }
        if let Some(v) = env_var("INVENTORY_DIFF_DEPTH") {
            inventory.diff_depth = parse_value("INVENTORY_DIFF_DEPTH", &v)?;
        }
        if let Some(v) = env_var("INVENTORY_DIFF_MAX_FIELD_PATH") {
            inventory.diff_max_field_path = parse_value("INVENTORY_DIFF_MAX_FIELD_PATH", &v)?;
        }
        if let Some(v) = env_var("INVENTORY_DIFF_MAX_CHANGES") {
            inventory.diff_max_changes = parse_value("INVENTORY_DIFF_MAX_CHANGES", &v)?;
        }
        if let Some(v) = env_var("INVENTORY_DIFF_RULES") {
            inventory.rules_path = Some(v);
        }

        let mut auth = AuthSettings::default();
        if let Some(v) = env_var("SYSTEM_SECRET_MIN_LENGTH") {
            auth.secret_min_length = parse_value("SYSTEM_SECRET_MIN_LENGTH", &v)?;
        }
        if let Some(v) = env_var("SYSTEM_AUTH_CACHE_TTL") {
            auth.cache_ttl = parse_duration_var("SYSTEM_AUTH_CACHE_TTL", &v)?;
        }
        if let Some(v) = env_var("SYSTEM_AUTH_NEGATIVE_CACHE_TTL") {
            auth.negative_cache_ttl = parse_duration_var("SYSTEM_AUTH_NEGATIVE_CACHE_TTL", &v)?;
        }

        let notifications = NotificationSettings {
            webhook_url: env_var("NOTIFICATION_WEBHOOK_URL"),
        };

        Ok(Self {
            database_url,
            api,
            queue,
            workers,
            inventory,
            auth,
            notifications,
        })
    }
}

/// Read an environment variable, treating empty values as unset
fn env_var(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Parse a value with FromStr, mapping failures to a config error
fn parse_value<T: std::str::FromStr>(var: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Parse a duration with an `s`/`m`/`h`/`d` suffix (bare numbers are seconds)
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (number, multiplier) = match value.chars().last() {
        Some('s') => (&value[..value.len() - 1], 1),
        Some('m') => (&value[..value.len() - 1], 60),
        Some('h') => (&value[..value.len() - 1], 3600),
        Some('d') => (&value[..value.len() - 1], 86400),
        Some(c) if c.is_ascii_digit() => (value, 1),
        _ => return None,
    };

    let number: u64 = number.trim().parse().ok()?;
    Some(Duration::from_secs(number * multiplier))
}

fn parse_duration_var(var: &str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_suffixes() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("6h"), Some(Duration::from_secs(21600)));
        assert_eq!(parse_duration("2160h"), Some(Duration::from_secs(7_776_000)));
        assert_eq!(parse_duration("2d"), Some(Duration::from_secs(172_800)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("10x"), None);
        assert_eq!(parse_duration("s"), None);
    }

    #[test]
    fn test_defaults_match_deployment_profile() {
        let queue = QueueSettings::default();
        assert_eq!(queue.batch_size, 10);
        assert_eq!(queue.retry_attempts, 3);
        assert_eq!(queue.backpressure_threshold, 1000);
        assert_eq!(queue.circuit_breaker_threshold, 10);

        let workers = WorkerSettings::default();
        assert_eq!(workers.inventory_count, 5);
        assert_eq!(workers.processing_count, 3);
        assert_eq!(workers.notification_count, 2);

        let api = ApiSettings::default();
        assert_eq!(api.max_request_size, 10_485_760);
        assert_eq!(api.listen_address.port(), 8081);

        let auth = AuthSettings::default();
        assert_eq!(auth.cache_ttl, Duration::from_secs(300));
        assert_eq!(auth.negative_cache_ttl, Duration::from_secs(30));
    }
}
