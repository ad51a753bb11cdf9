//! Position and account snapshots as delivered by the exchange streams.
//!
//! Snapshots are replaced wholesale whenever a matching envelope arrives;
//! there is no field-level merge.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::numeric::lenient_f64;
use super::Symbol;
use crate::error::Error;

/// Margin mode for a position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", rename_all = "lowercase")]
pub enum MarginType {
    /// Whole-account margin pool.
    #[default]
    Cross,
    /// Ring-fenced allocation per position.
    Isolated,
}

impl FromStr for MarginType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("cross") || s.eq_ignore_ascii_case("crossed") {
            Ok(Self::Cross)
        } else if s.eq_ignore_ascii_case("isolated") {
            Ok(Self::Isolated)
        } else {
            Err(Error::Parse(format!("unknown margin type '{s}'")))
        }
    }
}

impl TryFrom<String> for MarginType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for MarginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cross => f.write_str("cross"),
            Self::Isolated => f.write_str("isolated"),
        }
    }
}

/// Position side as reported in hedge mode; one-way mode reports `Both`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", rename_all = "UPPERCASE")]
pub enum PositionSide {
    #[default]
    Both,
    Long,
    Short,
}

impl FromStr for PositionSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("both") {
            Ok(Self::Both)
        } else if s.eq_ignore_ascii_case("long") {
            Ok(Self::Long)
        } else if s.eq_ignore_ascii_case("short") {
            Ok(Self::Short)
        } else {
            Err(Error::Parse(format!("unknown position side '{s}'")))
        }
    }
}

impl TryFrom<String> for PositionSide {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Latest exchange view of one futures position.
///
/// `position_amount` is signed: positive for long, negative for short,
/// zero when flat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSnapshot {
    pub symbol: Symbol,
    #[serde(default, alias = "positionAmt", deserialize_with = "lenient_f64")]
    pub position_amount: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub entry_price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub mark_price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub leverage: f64,
    #[serde(default)]
    pub margin_type: MarginType,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub isolated_margin: f64,
    #[serde(default, alias = "unRealizedProfit", deserialize_with = "lenient_f64")]
    pub unrealized_profit: f64,
    #[serde(default)]
    pub position_side: PositionSide,
}

impl PositionSnapshot {
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.position_amount == 0.0
    }

    #[must_use]
    pub fn is_long(&self) -> bool {
        self.position_amount > 0.0
    }

    #[must_use]
    pub fn is_short(&self) -> bool {
        self.position_amount < 0.0
    }

    /// Absolute position size.
    #[must_use]
    pub fn size(&self) -> f64 {
        self.position_amount.abs()
    }

    #[must_use]
    pub fn is_isolated(&self) -> bool {
        self.margin_type == MarginType::Isolated
    }
}

/// Per-asset wallet breakdown. Informational only; the risk formulas use
/// the account-level totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBalance {
    pub asset: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub wallet_balance: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub margin_balance: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub available_balance: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub unrealized_profit: f64,
}

/// Account-level margin pool backing cross positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_wallet_balance: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_margin_balance: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub available_balance: f64,
    #[serde(default)]
    pub assets: Vec<AssetBalance>,
}

impl AccountSnapshot {
    /// Balance backing cross positions: margin balance when reported,
    /// otherwise the wallet balance.
    #[must_use]
    pub fn cross_balance(&self) -> f64 {
        if self.total_margin_balance != 0.0 {
            self.total_margin_balance
        } else {
            self.total_wallet_balance
        }
    }

    #[must_use]
    pub fn asset(&self, asset: &str) -> Option<&AssetBalance> {
        self.assets
            .iter()
            .find(|a| a.asset.eq_ignore_ascii_case(asset))
    }
}

/// Latest price tick for a symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerSnapshot {
    #[serde(default)]
    pub symbol: Symbol,
    #[serde(
        default,
        alias = "price",
        alias = "lastPrice",
        deserialize_with = "lenient_f64"
    )]
    pub mark_price: f64,
}
