//! Shared helpers for the integration tests.

pub mod batch_tests;
pub mod interpolation_props;
pub mod pipeline_tests;
pub mod sandbox_tests;
pub mod storage_tests;

use rest_workbench::config::ClientConfig;
use rest_workbench::pipeline::{Orchestrator, Session};
use rest_workbench::variables::VariableScope;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize test environment (run once)
pub fn init_test_env() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Client settings with a short timeout and history disabled.
pub fn test_config(timeout_ms: u64) -> ClientConfig {
    ClientConfig {
        timeout: timeout_ms,
        save_history: false,
        ..ClientConfig::default()
    }
}

/// Orchestrator over the real HTTP transport.
pub fn orchestrator(config: &ClientConfig) -> Orchestrator {
    init_test_env();
    Orchestrator::from_config(config).expect("Failed to build HTTP client")
}

/// Session with environment `dev` active and the given variables in it.
pub fn dev_session(variables: &[(&str, &str)]) -> Session {
    let mut session = Session::new();
    session.store.set_active_environment(Some("dev".to_string()));
    for (name, value) in variables {
        session
            .store
            .set(VariableScope::Environment, *name, *value, "")
            .expect("Failed to set environment variable");
    }
    session
}
