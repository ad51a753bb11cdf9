//! Instrument symbol newtype.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Exchange instrument symbol (e.g. `BTCUSDT`).
///
/// Symbols are normalised to trimmed upper-case on construction so that
/// `btcusdt` and `BTCUSDT` address the same ticker stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a new `Symbol`, normalising case and whitespace.
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_ascii_uppercase())
    }

    /// Get the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_is_normalised() {
        assert_eq!(Symbol::new(" btcusdt ").as_str(), "BTCUSDT");
        assert_eq!(Symbol::from("ethUSDT"), Symbol::from("ETHUSDT"));
    }

    #[test]
    fn test_symbol_deserialize_normalises() {
        let symbol: Symbol = serde_json::from_str("\"solusdt\"").unwrap();
        assert_eq!(symbol.as_str(), "SOLUSDT");
    }
}
