//! Exchange-agnostic stream and position types.
//!
//! - [`Topic`] - typed subscription key (`positions`, `orders`, `balance`, `ticker:<SYMBOL>`)
//! - [`MessageEnvelope`] - inbound frame routed by topic
//! - [`PositionSnapshot`], [`AccountSnapshot`], [`TickerSnapshot`] - latest exchange state

mod envelope;
pub mod numeric;
mod position;
mod symbol;
mod topic;

pub use envelope::MessageEnvelope;
pub use position::{
    AccountSnapshot, AssetBalance, MarginType, PositionSide, PositionSnapshot, TickerSnapshot,
};
pub use symbol::Symbol;
pub use topic::Topic;
