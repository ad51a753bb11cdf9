//! Perpwatch - Real-time futures position risk engine.
//!
//! Streams position, order, balance and ticker updates from an exchange
//! relay over one connection, fans them out to any number of consumers, and
//! derives leveraged-position risk (liquidation price, margin ratio, ROI/ROE,
//! distance to liquidation) with a five-level severity classification.
//!
//! # Modules
//!
//! - [`stream`] - Connection lifecycle, subscription reference counting and
//!   envelope routing
//! - [`risk`] - Pure risk formulas and classification
//! - [`store`] - Latest-snapshot store with pull-style risk views
//! - [`domain`] - Topics, envelopes and exchange snapshots
//! - [`config`] - Configuration loading from TOML files
//! - [`error`] - Error types for the crate
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use perpwatch::store::SnapshotStore;
//! use perpwatch::stream::{ConnectionManager, EventRouter, SubscriptionRegistry, WebSocketTransport};
//!
//! # async fn run() -> perpwatch::error::Result<()> {
//! let router = Arc::new(EventRouter::new());
//! let registry = Arc::new(SubscriptionRegistry::new());
//! let store = Arc::new(SnapshotStore::new());
//! store.attach(&router);
//! registry.subscribe_to_positions();
//! registry.subscribe_to_balance();
//!
//! let manager = ConnectionManager::new(
//!     WebSocketTransport::new("wss://relay.example.com/ws"),
//!     router,
//!     registry,
//! );
//! manager.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod risk;
pub mod store;
pub mod stream;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
