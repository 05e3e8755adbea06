//! Configuration schema for the request pipeline.
//!
//! This module defines the configuration structure and validation logic for all
//! user-configurable settings that affect how requests are sent and recorded.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main configuration structure.
///
/// All settings can be supplied as JSON under the "rest-workbench" key.
/// Missing settings fall back to sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Request timeout in milliseconds.
    ///
    /// Maximum time to wait for a complete response (including connection,
    /// headers, and body download). Defaults to 30000ms (30 seconds).
    ///
    /// Must be greater than 0.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Whether to automatically follow HTTP redirects.
    #[serde(default = "default_follow_redirects")]
    pub follow_redirects: bool,

    /// Maximum number of redirects to follow when `follow_redirects` is set.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Whether to validate SSL/TLS certificates.
    ///
    /// **Warning:** Disabling SSL validation can expose you to security risks.
    #[serde(default = "default_validate_ssl")]
    pub validate_ssl: bool,

    /// Maximum number of entries kept in history.
    ///
    /// Must be > 0.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Whether completed sends are appended to history at all.
    #[serde(default = "default_save_history")]
    pub save_history: bool,

    /// Whether sensitive headers are stripped before a history entry is stored.
    #[serde(default = "default_sanitize_history")]
    pub sanitize_history: bool,

    /// Headers added to every request unless the request sets them itself.
    #[serde(default = "default_headers")]
    pub default_headers: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            follow_redirects: default_follow_redirects(),
            max_redirects: default_max_redirects(),
            validate_ssl: default_validate_ssl(),
            history_limit: default_history_limit(),
            save_history: default_save_history(),
            sanitize_history: default_sanitize_history(),
            default_headers: default_headers(),
        }
    }
}

impl ClientConfig {
    /// Validates the configuration and returns errors if any settings are invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }

        if self.history_limit == 0 {
            return Err("historyLimit must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Returns the timeout as a `std::time::Duration`.
    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout)
    }
}

fn default_timeout() -> u64 {
    30000
}

fn default_follow_redirects() -> bool {
    true
}

fn default_max_redirects() -> u32 {
    10
}

fn default_validate_ssl() -> bool {
    true
}

fn default_history_limit() -> usize {
    1000
}

fn default_save_history() -> bool {
    true
}

fn default_sanitize_history() -> bool {
    true
}

fn default_headers() -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert(
        "User-Agent".to_string(),
        format!("rest-workbench/{}", env!("CARGO_PKG_VERSION")),
    );
    headers
}
