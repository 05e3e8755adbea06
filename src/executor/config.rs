//! Execution settings for a single send.

use crate::config::{get_config, ClientConfig};
use serde::{Deserialize, Serialize};

/// Configuration for sending requests.
///
/// Derived from the global [`ClientConfig`] unless built explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
    /// Request timeout in milliseconds, covering connect, headers and body.
    pub timeout_ms: u64,
}

impl ExecutionConfig {
    /// Creates a new ExecutionConfig with the given timeout.
    ///
    /// # Arguments
    ///
    /// * `timeout_ms` - Timeout in milliseconds
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    /// Takes the execution settings from a client configuration.
    pub fn from_client_config(config: &ClientConfig) -> Self {
        Self {
            timeout_ms: config.timeout,
        }
    }

    /// Returns the timeout as a `std::time::Duration`.
    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ExecutionConfig {
    /// Reads the timeout from the global configuration.
    fn default() -> Self {
        Self::from_client_config(&get_config())
    }
}
