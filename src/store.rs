//! Latest-snapshot store fed by the event router.
//!
//! [`SnapshotStore`] is the standard consumer of the position, balance,
//! order and ticker streams. It keeps only the most recent snapshot per key
//! and derives risk on demand; nothing here is cached between reads.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::domain::{AccountSnapshot, MessageEnvelope, PositionSnapshot, Symbol, TickerSnapshot, Topic};
use crate::error::HandlerError;
use crate::risk::{compute_risk_metrics, margin_pool, RiskLevel, RiskMetrics};
use crate::stream::{EventRouter, HandlerId};

/// `positions` payloads carry either the full list or a single update.
#[derive(Deserialize)]
#[serde(untagged)]
enum PositionsPayload {
    Many(Vec<PositionSnapshot>),
    One(PositionSnapshot),
}

#[derive(Debug, Clone)]
struct Stamped<T> {
    value: T,
    seq: u64,
}

#[derive(Debug, Default)]
struct Snapshots {
    positions: HashMap<Symbol, Stamped<PositionSnapshot>>,
    account: Option<AccountSnapshot>,
    tickers: HashMap<Symbol, Stamped<TickerSnapshot>>,
    orders: Option<Value>,
    seq: u64,
}

impl Snapshots {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// Risk view for one open position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    pub symbol: Symbol,
    /// Position as priced for this view (mark may come from the ticker).
    pub position: PositionSnapshot,
    pub metrics: RiskMetrics,
    pub level: RiskLevel,
}

/// Thread-safe latest-value store for stream snapshots.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: RwLock<Snapshots>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register handlers for positions, balance and orders on `router`.
    pub fn attach(self: &Arc<Self>, router: &EventRouter) -> Vec<HandlerId> {
        let positions = Arc::clone(self);
        let balance = Arc::clone(self);
        let orders = Arc::clone(self);
        vec![
            router.register(Topic::Positions, move |e: &MessageEnvelope| {
                positions.apply_positions(e)
            }),
            router.register(Topic::Balance, move |e: &MessageEnvelope| {
                balance.apply_balance(e)
            }),
            router.register(Topic::Orders, move |e: &MessageEnvelope| orders.apply_orders(e)),
        ]
    }

    /// Register a handler for `symbol`'s ticker stream.
    pub fn track_ticker(self: &Arc<Self>, router: &EventRouter, symbol: impl Into<Symbol>) -> HandlerId {
        let symbol = symbol.into();
        let store = Arc::clone(self);
        let owner = symbol.clone();
        router.register(Topic::Ticker(symbol), move |e: &MessageEnvelope| {
            store.apply_ticker(&owner, e)
        })
    }

    /// Store a `positions` payload.
    ///
    /// A list replaces the whole book; a single object replaces that symbol.
    /// Flat positions are dropped.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when the payload is missing or malformed;
    /// stored state is left unchanged.
    pub fn apply_positions(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        let payload: PositionsPayload = envelope.decode()?;
        let mut snaps = self.inner.write();
        let seq = snaps.next_seq();

        match payload {
            PositionsPayload::Many(positions) => {
                snaps.positions = positions
                    .into_iter()
                    .filter(|p| !p.is_flat() && !p.symbol.is_empty())
                    .map(|p| (p.symbol.clone(), Stamped { value: p, seq }))
                    .collect();
                trace!(open = snaps.positions.len(), "Replaced position book");
            }
            PositionsPayload::One(position) => {
                if position.symbol.is_empty() {
                    return Err(HandlerError::Rejected("position without symbol".into()));
                }
                if position.is_flat() {
                    debug!(symbol = %position.symbol, "Position closed");
                    snaps.positions.remove(&position.symbol);
                } else {
                    snaps
                        .positions
                        .insert(position.symbol.clone(), Stamped { value: position, seq });
                }
            }
        }
        Ok(())
    }

    /// Store a `balance` payload.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when the payload is missing or malformed.
    pub fn apply_balance(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        let account: AccountSnapshot = envelope.decode()?;
        let mut snaps = self.inner.write();
        snaps.next_seq();
        snaps.account = Some(account);
        Ok(())
    }

    /// Store an `orders` payload as-is.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::MissingData`] when the envelope has no payload.
    pub fn apply_orders(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        let orders: Value = envelope.decode()?;
        let mut snaps = self.inner.write();
        snaps.next_seq();
        snaps.orders = Some(orders);
        Ok(())
    }

    fn apply_ticker(&self, symbol: &Symbol, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        let mut ticker: TickerSnapshot = envelope.decode()?;
        if ticker.symbol.is_empty() {
            ticker.symbol = symbol.clone();
        }
        let mut snaps = self.inner.write();
        let seq = snaps.next_seq();
        snaps
            .tickers
            .insert(symbol.clone(), Stamped { value: ticker, seq });
        Ok(())
    }

    #[must_use]
    pub fn position(&self, symbol: &Symbol) -> Option<PositionSnapshot> {
        self.inner
            .read()
            .positions
            .get(symbol)
            .map(|s| s.value.clone())
    }

    /// Open positions ordered by symbol.
    #[must_use]
    pub fn positions(&self) -> Vec<PositionSnapshot> {
        let mut positions: Vec<_> = self
            .inner
            .read()
            .positions
            .values()
            .map(|s| s.value.clone())
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    #[must_use]
    pub fn account(&self) -> Option<AccountSnapshot> {
        self.inner.read().account.clone()
    }

    #[must_use]
    pub fn ticker(&self, symbol: &Symbol) -> Option<TickerSnapshot> {
        self.inner.read().tickers.get(symbol).map(|s| s.value.clone())
    }

    #[must_use]
    pub fn orders(&self) -> Option<Value> {
        self.inner.read().orders.clone()
    }

    /// Risk for the open position in `symbol`, or `None` if there is none.
    ///
    /// A ticker received after the position snapshot overrides its mark
    /// price, and unrealized PnL is re-derived from it. Cross positions are
    /// measured against the latest account balance (zero if none arrived).
    #[must_use]
    pub fn risk_for(&self, symbol: &Symbol) -> Option<PositionRisk> {
        let snaps = self.inner.read();
        let stamped = snaps.positions.get(symbol)?;
        let mut position = stamped.value.clone();

        if let Some(ticker) = snaps.tickers.get(symbol) {
            if ticker.seq > stamped.seq && ticker.value.mark_price > 0.0 {
                position.mark_price = ticker.value.mark_price;
                position.unrealized_profit =
                    position.position_amount * (position.mark_price - position.entry_price);
            }
        }

        let account = snaps.account.clone().unwrap_or_default();
        drop(snaps);

        let metrics = compute_risk_metrics(&position, margin_pool(&position, &account));
        Some(PositionRisk {
            symbol: symbol.clone(),
            level: metrics.level(),
            metrics,
            position,
        })
    }

    /// Risk for every open position, ordered by symbol.
    #[must_use]
    pub fn risk_report(&self) -> Vec<PositionRisk> {
        let mut symbols: Vec<Symbol> = self.inner.read().positions.keys().cloned().collect();
        symbols.sort();
        symbols.iter().filter_map(|s| self.risk_for(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::testkit::domain::{
        account, balance_envelope, isolated_position, position, positions_envelope, ticker_envelope,
    };

    fn attached() -> (Arc<SnapshotStore>, EventRouter) {
        let store = Arc::new(SnapshotStore::new());
        let router = EventRouter::new();
        store.attach(&router);
        (store, router)
    }

    #[test]
    fn test_positions_list_replaces_book() {
        let (store, router) = attached();

        router.dispatch(&positions_envelope(&[
            position("BTCUSDT", 0.1, 50_000.0, 51_000.0, 10.0),
            position("ETHUSDT", -2.0, 3_000.0, 2_900.0, 5.0),
        ]));
        assert_eq!(store.positions().len(), 2);

        router.dispatch(&positions_envelope(&[position("ETHUSDT", -1.0, 3_000.0, 2_900.0, 5.0)]));
        let positions = store.positions();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].position_amount, -1.0);
        assert!(store.position(&Symbol::new("BTCUSDT")).is_none());
    }

    #[test]
    fn test_single_position_update_and_close() {
        let (store, router) = attached();
        let btc = Symbol::new("BTCUSDT");

        router.dispatch(&MessageEnvelope::new(
            &Topic::Positions,
            json!({"symbol": "BTCUSDT", "positionAmt": "0.5", "entryPrice": "60000", "leverage": "20"}),
        ));
        assert_eq!(store.position(&btc).unwrap().position_amount, 0.5);

        router.dispatch(&MessageEnvelope::new(
            &Topic::Positions,
            json!({"symbol": "BTCUSDT", "positionAmt": "0"}),
        ));
        assert!(store.position(&btc).is_none());
    }

    #[test]
    fn test_malformed_payload_keeps_previous_state() {
        let (store, router) = attached();
        router.dispatch(&balance_envelope(&account(1_000.0)));

        let report = router.dispatch(&MessageEnvelope::new(&Topic::Balance, json!("garbage")));
        assert_eq!(report.failed, 1);
        assert_eq!(store.account().unwrap().total_wallet_balance, 1_000.0);

        let report = router.dispatch(&MessageEnvelope {
            kind: "positions".into(),
            data: None,
            message: None,
            timestamp: None,
        });
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_orders_stored_verbatim() {
        let (store, router) = attached();
        let orders = json!([{"orderId": 1, "status": "NEW"}]);

        router.dispatch(&MessageEnvelope::new(&Topic::Orders, orders.clone()));
        assert_eq!(store.orders(), Some(orders));
    }

    #[test]
    fn test_risk_for_cross_position_uses_account_balance() {
        let (store, router) = attached();
        router.dispatch(&balance_envelope(&account(1_000.0)));
        router.dispatch(&positions_envelope(&[position("BTCUSDT", 0.1, 50_000.0, 51_000.0, 10.0)]));

        let risk = store.risk_for(&Symbol::new("BTCUSDT")).unwrap();
        assert!((risk.metrics.margin_ratio_percent - 2.04).abs() < 1e-9);
        assert_eq!(risk.level, RiskLevel::Safe);
        assert!((risk.metrics.liquidation_price - 40_204.0).abs() < 1e-6);
    }

    #[test]
    fn test_risk_for_isolated_position_uses_its_margin() {
        let (store, router) = attached();
        router.dispatch(&balance_envelope(&account(1_000_000.0)));
        router.dispatch(&positions_envelope(&[isolated_position(
            "ETHUSDT", 2.0, 2_000.0, 2_100.0, 5.0, 800.0,
        )]));

        let risk = store.risk_for(&Symbol::new("ETHUSDT")).unwrap();
        assert!((risk.metrics.initial_margin - 800.0).abs() < 1e-9);
        assert!((risk.metrics.margin_ratio_percent - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_newer_ticker_reprices_position() {
        let store = Arc::new(SnapshotStore::new());
        let router = EventRouter::new();
        store.attach(&router);
        store.track_ticker(&router, "btcusdt");

        router.dispatch(&balance_envelope(&account(1_000.0)));
        router.dispatch(&positions_envelope(&[position("BTCUSDT", 0.1, 50_000.0, 51_000.0, 10.0)]));
        router.dispatch(&ticker_envelope("BTCUSDT", 52_000.0));

        let risk = store.risk_for(&Symbol::new("BTCUSDT")).unwrap();
        assert_eq!(risk.position.mark_price, 52_000.0);
        assert!((risk.position.unrealized_profit - 200.0).abs() < 1e-9);
        assert!((risk.metrics.notional_value - 5_200.0).abs() < 1e-9);
    }

    #[test]
    fn test_older_ticker_does_not_override_position_mark() {
        let store = Arc::new(SnapshotStore::new());
        let router = EventRouter::new();
        store.attach(&router);
        store.track_ticker(&router, "BTCUSDT");

        router.dispatch(&ticker_envelope("BTCUSDT", 52_000.0));
        router.dispatch(&positions_envelope(&[position("BTCUSDT", 0.1, 50_000.0, 51_000.0, 10.0)]));

        let risk = store.risk_for(&Symbol::new("BTCUSDT")).unwrap();
        assert_eq!(risk.position.mark_price, 51_000.0);
        assert_eq!(store.ticker(&Symbol::new("BTCUSDT")).unwrap().mark_price, 52_000.0);
    }

    #[test]
    fn test_ticker_without_symbol_takes_topic_symbol() {
        let store = Arc::new(SnapshotStore::new());
        let router = EventRouter::new();
        store.track_ticker(&router, "SOLUSDT");

        router.dispatch(&MessageEnvelope::new(&Topic::ticker("SOLUSDT"), json!({"price": "150.5"})));

        let ticker = store.ticker(&Symbol::new("SOLUSDT")).unwrap();
        assert_eq!(ticker.symbol.as_str(), "SOLUSDT");
        assert_eq!(ticker.mark_price, 150.5);
    }

    #[test]
    fn test_risk_report_is_sorted_and_skips_unknown() {
        let (store, router) = attached();
        router.dispatch(&positions_envelope(&[
            position("SOLUSDT", 10.0, 100.0, 110.0, 3.0),
            position("ADAUSDT", 100.0, 0.5, 0.4, 2.0),
        ]));

        let report = store.risk_report();
        let symbols: Vec<_> = report.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, ["ADAUSDT", "SOLUSDT"]);
        assert!(store.risk_for(&Symbol::new("XRPUSDT")).is_none());
    }

    #[test]
    fn test_risk_without_balance_is_degenerate_not_panicking() {
        let (store, router) = attached();
        router.dispatch(&positions_envelope(&[position("BTCUSDT", 0.1, 50_000.0, 51_000.0, 10.0)]));

        let risk = store.risk_for(&Symbol::new("BTCUSDT")).unwrap();
        assert_eq!(risk.metrics.margin_ratio_percent, 0.0);
        assert!((risk.metrics.liquidation_price - 50_204.0).abs() < 1e-6);
        assert_eq!(risk.level, RiskLevel::Safe);
    }
}
