//! Sync configuration.

use serde::Deserialize;

/// Configuration supplied by the host as JSON.
///
/// Unknown keys are ignored and missing keys take their defaults, so hosts
/// can ship config ahead of the engine understanding it. Malformed JSON
/// yields the full default configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Base URL for pull requests.
    pub pull_endpoint_url: String,
    /// Socket endpoint, accepted for forward compatibility; unused here.
    pub socketio_url: String,
    /// Which host database connection sync applies into.
    pub connection_tag: i32,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: i64,
    /// Maximum transport/server retries per run.
    pub max_retries: i32,
    /// Maximum auth refresh attempts per run.
    pub max_auth_retries: i32,
    /// First retry delay in milliseconds.
    pub retry_initial_ms: i64,
    /// Retry delay ceiling in milliseconds.
    pub retry_max_ms: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pull_endpoint_url: String::new(),
            socketio_url: String::new(),
            connection_tag: 0,
            timeout_ms: 30_000,
            max_retries: 3,
            max_auth_retries: 3,
            retry_initial_ms: 1_000,
            retry_max_ms: 30_000,
        }
    }
}

impl SyncConfig {
    /// Parses host-supplied JSON, clamping values into their valid ranges.
    pub fn from_json(json: &str) -> Self {
        let mut config: SyncConfig = serde_json::from_str(json).unwrap_or_default();
        config.max_retries = config.max_retries.max(0);
        config.max_auth_retries = config.max_auth_retries.max(0);
        config.retry_initial_ms = config.retry_initial_ms.max(0);
        config.retry_max_ms = config.retry_max_ms.max(config.retry_initial_ms);
        config
    }
}
