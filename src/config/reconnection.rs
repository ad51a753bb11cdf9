//! Retry policy for the connection supervisor.

use std::time::Duration;

use serde::Deserialize;

const INITIAL_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 60_000;
const BACKOFF_MULTIPLIER: f64 = 2.0;
const MAX_CONSECUTIVE_FAILURES: u32 = 10;
const CIRCUIT_BREAKER_COOLDOWN_MS: u64 = 300_000;

/// How the supervisor paces reconnect attempts after the stream drops.
///
/// Each failed attempt grows the wait by `backoff_multiplier`, capped at
/// `max_delay_ms`. After `max_consecutive_failures` in a row the supervisor
/// stops dialing for `circuit_breaker_cooldown_ms`. Any field left out of the
/// `[reconnection]` table keeps its default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectionConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_consecutive_failures: u32,
    pub circuit_breaker_cooldown_ms: u64,
}

impl ReconnectionConfig {
    /// Wait before the first retry after a drop.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Pause once the failure streak opens the circuit.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_cooldown_ms)
    }
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: INITIAL_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            backoff_multiplier: BACKOFF_MULTIPLIER,
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
            circuit_breaker_cooldown_ms: CIRCUIT_BREAKER_COOLDOWN_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_table_keeps_defaults() {
        let config: ReconnectionConfig = toml::from_str("max_delay_ms = 5000").unwrap();

        assert_eq!(config.max_delay_ms, 5_000);
        assert_eq!(config.initial_delay(), Duration::from_secs(1));
        assert_eq!(config.cooldown(), Duration::from_secs(300));
        assert_eq!(config.max_consecutive_failures, 10);
    }
}
