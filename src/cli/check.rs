//! Configuration validation.

use std::path::Path;

use super::{load_config, output};
use crate::config::WS_URL_ENV;

/// Validate configuration without connecting.
pub fn execute_config(path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => output::note(&format!("Checking configuration: {}", path.display())),
        None => output::note("Checking default configuration"),
    }

    let config = load_config(path)?;
    output::success("Configuration is valid");

    output::section("Summary");
    output::field("Relay", &config.connection.ws_url);
    if std::env::var(WS_URL_ENV).is_ok() {
        output::note(&format!("relay URL overridden by {WS_URL_ENV}"));
    }
    output::field(
        "Backoff",
        format!(
            "{}ms → {}ms (x{})",
            config.reconnection.initial_delay_ms,
            config.reconnection.max_delay_ms,
            config.reconnection.backoff_multiplier
        ),
    );
    output::field(
        "Circuit",
        format!(
            "{} failures, {}s cooldown",
            config.reconnection.max_consecutive_failures,
            config.reconnection.circuit_breaker_cooldown_ms / 1000
        ),
    );
    output::field(
        "Logging",
        format!("{} ({})", config.logging.level, config.logging.format),
    );
    output::field("Report", format!("every {}s", config.watch.report_interval_secs));

    if config.watch.symbols.is_empty() {
        output::warning("No ticker symbols configured; positions reprice on snapshots only");
    } else {
        let symbols: Vec<&str> = config.watch.symbols.iter().map(|s| s.as_str()).collect();
        output::field("Symbols", symbols.join(", "));
    }
    Ok(())
}
