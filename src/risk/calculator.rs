//! Leveraged position risk metrics.
//!
//! Every formula here is total: degenerate inputs (flat position, zero
//! leverage, empty margin pool, non-finite intermediates) produce `0.0`
//! rather than an error, so a transient bad tick never takes down a live view.

use serde::Serialize;

use super::classifier::{classify_risk, RiskLevel};
use crate::domain::numeric::finite_or_zero;
use crate::domain::{AccountSnapshot, PositionSnapshot};

/// Flat maintenance margin rate (0.4%).
///
/// Stand-in for the exchange's notional-tiered schedule; exchange-exact
/// liquidation prices need a per-symbol bracket table instead.
pub const MAINTENANCE_MARGIN_RATE: f64 = 0.004;

/// Derived risk metrics for one position. Never cached; always computed
/// from the snapshot handed to [`compute_risk_metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub notional_value: f64,
    pub initial_margin: f64,
    pub maintenance_margin: f64,
    pub liquidation_price: f64,
    pub margin_ratio_percent: f64,
    pub roi_percent: f64,
    pub roe_percent: f64,
    pub distance_to_liquidation_percent: f64,
}

impl RiskMetrics {
    /// Severity bucket for this bundle's margin ratio.
    #[must_use]
    pub fn level(&self) -> RiskLevel {
        classify_risk(self.margin_ratio_percent)
    }
}

/// Margin pool backing `position`: its isolated margin when isolated,
/// otherwise the account's cross balance. Never negative.
#[must_use]
pub fn margin_pool(position: &PositionSnapshot, account: &AccountSnapshot) -> f64 {
    let pool = if position.is_isolated() {
        position.isolated_margin
    } else {
        account.cross_balance()
    };
    finite_or_zero(pool).max(0.0)
}

/// Division that yields zero instead of dividing by a non-positive denominator.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    finite_or_zero(numerator / denominator)
}

/// Compute the full metrics bundle for `position` against `account_balance`,
/// the margin pool backing it (see [`margin_pool`]).
#[must_use]
pub fn compute_risk_metrics(position: &PositionSnapshot, account_balance: f64) -> RiskMetrics {
    let amount = finite_or_zero(position.position_amount);
    let size = amount.abs();
    let entry = finite_or_zero(position.entry_price);
    let mark = finite_or_zero(position.mark_price);
    let leverage = finite_or_zero(position.leverage);
    let isolated_margin = finite_or_zero(position.isolated_margin);
    let unrealized = finite_or_zero(position.unrealized_profit);
    let balance = finite_or_zero(account_balance);
    let flat = amount == 0.0;

    let notional_value = finite_or_zero(size * mark);

    // Isolated positions carry their own margin allocation.
    let initial_margin = if position.is_isolated() && isolated_margin > 0.0 {
        isolated_margin
    } else {
        ratio(notional_value, leverage)
    };

    let margin_basis = if position.is_isolated() {
        isolated_margin
    } else {
        notional_value
    };
    let maintenance_margin = finite_or_zero(margin_basis * MAINTENANCE_MARGIN_RATE);

    let liquidation_price = liquidation_price(position, size, entry, mark, leverage, balance);

    let margin_ratio_percent = if flat || balance <= 0.0 {
        0.0
    } else {
        finite_or_zero(ratio(maintenance_margin, balance) * 100.0)
    };

    let roi_percent = if flat {
        0.0
    } else {
        finite_or_zero(ratio(unrealized, size * entry) * 100.0)
    };

    let roe_percent = if flat {
        0.0
    } else {
        finite_or_zero(ratio(unrealized, initial_margin) * 100.0)
    };

    let distance_to_liquidation_percent = if flat || liquidation_price == 0.0 || mark == 0.0 {
        0.0
    } else {
        let cushion = if amount > 0.0 {
            mark - liquidation_price
        } else {
            liquidation_price - mark
        };
        finite_or_zero(cushion / mark * 100.0).max(0.0)
    };

    RiskMetrics {
        notional_value,
        initial_margin,
        maintenance_margin,
        liquidation_price,
        margin_ratio_percent,
        roi_percent,
        roe_percent,
        distance_to_liquidation_percent,
    }
}

/// Mark price at which the margin pool equals maintenance margin.
///
/// Long and short breakeven conditions reduce to the same expression, so
/// there is no side branch.
fn liquidation_price(
    position: &PositionSnapshot,
    size: f64,
    entry: f64,
    mark: f64,
    leverage: f64,
    balance: f64,
) -> f64 {
    if size == 0.0 || leverage <= 0.0 || entry <= 0.0 {
        return 0.0;
    }

    let price = if mark > 0.0 { mark } else { entry };
    let pool = balance.max(0.0);
    let maintenance = if position.is_isolated() {
        finite_or_zero(position.isolated_margin) * MAINTENANCE_MARGIN_RATE
    } else {
        size * price * MAINTENANCE_MARGIN_RATE
    };

    finite_or_zero((size * entry + maintenance - pool) / size).max(0.0)
}
