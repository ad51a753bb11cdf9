//! Builders for domain primitives used across tests.

use serde_json::json;

use crate::domain::{
    AccountSnapshot, MarginType, MessageEnvelope, PositionSnapshot, Symbol, TickerSnapshot, Topic,
};

/// Cross-margin position with `unrealized_profit` derived from the prices.
pub fn position(symbol: &str, amount: f64, entry: f64, mark: f64, leverage: f64) -> PositionSnapshot {
    PositionSnapshot {
        symbol: Symbol::new(symbol),
        position_amount: amount,
        entry_price: entry,
        mark_price: mark,
        leverage,
        unrealized_profit: amount * (mark - entry),
        ..PositionSnapshot::default()
    }
}

/// Isolated-margin variant of [`position`].
pub fn isolated_position(
    symbol: &str,
    amount: f64,
    entry: f64,
    mark: f64,
    leverage: f64,
    isolated_margin: f64,
) -> PositionSnapshot {
    PositionSnapshot {
        margin_type: MarginType::Isolated,
        isolated_margin,
        ..position(symbol, amount, entry, mark, leverage)
    }
}

/// Account whose wallet and margin balances both equal `balance`.
pub fn account(balance: f64) -> AccountSnapshot {
    AccountSnapshot {
        total_wallet_balance: balance,
        total_margin_balance: balance,
        available_balance: balance,
        assets: Vec::new(),
    }
}

pub fn ticker(symbol: &str, mark: f64) -> TickerSnapshot {
    TickerSnapshot {
        symbol: Symbol::new(symbol),
        mark_price: mark,
    }
}

/// `positions` envelope carrying `positions` as a JSON array.
pub fn positions_envelope(positions: &[PositionSnapshot]) -> MessageEnvelope {
    MessageEnvelope::new(&Topic::Positions, json!(positions))
}

pub fn balance_envelope(account: &AccountSnapshot) -> MessageEnvelope {
    MessageEnvelope::new(&Topic::Balance, json!(account))
}

pub fn ticker_envelope(symbol: &str, mark: f64) -> MessageEnvelope {
    MessageEnvelope::new(&Topic::ticker(symbol), json!(ticker(symbol, mark)))
}
