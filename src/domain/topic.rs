//! Subscribable stream topics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Symbol;
use crate::error::Error;

const TICKER_PREFIX: &str = "ticker:";

/// A named, reference-counted stream of exchange updates.
///
/// The wire form is the envelope `type` string: `positions`, `orders`,
/// `balance`, or `ticker:<SYMBOL>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    Positions,
    Orders,
    Balance,
    Ticker(Symbol),
}

impl Topic {
    /// Ticker topic for the given symbol.
    pub fn ticker(symbol: impl Into<Symbol>) -> Self {
        Self::Ticker(symbol.into())
    }

    /// The symbol for ticker topics.
    #[must_use]
    pub const fn symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Ticker(symbol) => Some(symbol),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_ticker(&self) -> bool {
        matches!(self, Self::Ticker(_))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positions => f.write_str("positions"),
            Self::Orders => f.write_str("orders"),
            Self::Balance => f.write_str("balance"),
            Self::Ticker(symbol) => write!(f, "{TICKER_PREFIX}{symbol}"),
        }
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positions" => Ok(Self::Positions),
            "orders" => Ok(Self::Orders),
            "balance" => Ok(Self::Balance),
            other => {
                let raw = other
                    .strip_prefix(TICKER_PREFIX)
                    .ok_or_else(|| Error::Parse(format!("unknown topic '{other}'")))?;
                let symbol = Symbol::new(raw);
                if symbol.is_empty() {
                    return Err(Error::Parse(format!("ticker topic '{other}' has no symbol")));
                }
                Ok(Self::Ticker(symbol))
            }
        }
    }
}

impl TryFrom<String> for Topic {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}
