//! Lenient numeric decoding for exchange payloads.
//!
//! Futures exchanges send most quantities as decimal strings (`"60000.10"`),
//! some as JSON numbers, and occasionally `null`. Everything reaching the
//! risk formulas must be finite, so anything unparseable or non-finite
//! decodes to `0.0`.

use serde::{Deserialize, Deserializer};

/// Replace NaN and infinities with zero.
#[must_use]
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
}

/// `deserialize_with` adapter accepting numbers, numeric strings, or null.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawNumber>::deserialize(deserializer)?;
    let value = match raw {
        Some(RawNumber::Number(n)) => n,
        Some(RawNumber::Text(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        None => 0.0,
    };
    Ok(finite_or_zero(value))
}
