// crates/runcoord-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for runcoord-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use runcoord_config::ConfigError;
use runcoord_config::RuncoordConfig;

/// Smallest valid configuration text.
pub const MINIMAL_TOML: &str = "[store]\npath = \"/var/lib/runcoord/status.properties\"\n";

/// Parses a TOML string into a `RuncoordConfig` without validating it.
pub fn config_from_toml(toml_str: &str) -> Result<RuncoordConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a minimal config with all defaults applied.
pub fn minimal_config() -> Result<RuncoordConfig, toml::de::Error> {
    config_from_toml(MINIMAL_TOML)
}

/// Checks that validation failed with a message containing `needle`.
pub fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> Result<(), String> {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}
