//! Canonical test configurations.

use crate::config::ReconnectionConfig;

/// Reconnection config with millisecond delays so retry tests finish fast.
pub fn reconnection() -> ReconnectionConfig {
    ReconnectionConfig {
        initial_delay_ms: 5,
        max_delay_ms: 20,
        backoff_multiplier: 2.0,
        max_consecutive_failures: 5,
        circuit_breaker_cooldown_ms: 50,
    }
}

/// Minimal valid TOML config pointing at `ws_url`.
pub fn toml(ws_url: &str) -> String {
    format!(
        r#"
[connection]
ws_url = "{ws_url}"

[logging]
level = "debug"
format = "pretty"
"#
    )
}
