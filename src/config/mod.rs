//! Configuration management for the request pipeline.
//!
//! Configuration is loaded from a JSON settings value under the "rest-workbench"
//! key, merged with defaults, validated, and kept in a process-wide singleton.

pub mod schema;

pub use schema::ClientConfig;

use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::RwLock;

/// Settings key under which the configuration lives.
pub const SETTINGS_KEY: &str = "rest-workbench";

/// Global configuration instance.
static CONFIG: Lazy<RwLock<ClientConfig>> = Lazy::new(|| RwLock::new(ClientConfig::default()));

/// Loads configuration from a settings JSON value.
///
/// Reads the "rest-workbench" settings, falls back to defaults when they cannot
/// be deserialized, validates the result and updates the global configuration.
///
/// # Example
///
/// ```no_run
/// use rest_workbench::config::load_config;
/// use serde_json::json;
///
/// let settings = json!({
///     "rest-workbench": {
///         "timeout": 60000,
///         "validateSsl": false
///     }
/// });
///
/// let config = load_config(Some(settings)).unwrap();
/// assert_eq!(config.timeout, 60000);
/// ```
pub fn load_config(settings_json: Option<Value>) -> Result<ClientConfig, String> {
    let mut config = ClientConfig::default();

    if let Some(section) = settings_json.as_ref().and_then(|s| s.get(SETTINGS_KEY)) {
        match serde_json::from_value::<ClientConfig>(section.clone()) {
            Ok(user_config) => config = user_config,
            Err(e) => {
                log::warn!(
                    "Failed to parse {} settings: {}. Using defaults.",
                    SETTINGS_KEY,
                    e
                );
            }
        }
    }

    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {}", e))?;

    if let Ok(mut global_config) = CONFIG.write() {
        *global_config = config.clone();
    }

    Ok(config)
}

/// Gets a clone of the current global configuration.
pub fn get_config() -> ClientConfig {
    CONFIG
        .read()
        .map(|c| c.clone())
        .unwrap_or_else(|_| ClientConfig::default())
}

/// Updates the global configuration in place.
///
/// If the updated configuration fails validation it is reverted to defaults.
pub fn update_config<F>(updater: F)
where
    F: FnOnce(&mut ClientConfig),
{
    if let Ok(mut config) = CONFIG.write() {
        updater(&mut config);

        if let Err(e) = config.validate() {
            log::warn!("Configuration validation failed after update: {}", e);
            *config = ClientConfig::default();
        }
    }
}

/// Resets the configuration to defaults.
pub fn reset_config() {
    if let Ok(mut config) = CONFIG.write() {
        *config = ClientConfig::default();
    }
}
