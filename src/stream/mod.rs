//! Streaming layer: transport, subscription bookkeeping and event routing.
//!
//! Data flows one way: [`Transport`] frames are read by the single receive
//! loop owned by [`ConnectionManager`], decoded into envelopes and fanned out
//! by the [`EventRouter`]. Subscription intent flows the other way: consumers
//! bump reference counts on the [`SubscriptionRegistry`], which issues wire
//! commands on the live session.

mod connection;
mod registry;
mod router;
mod supervisor;
mod transport;
mod websocket;

pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, DisconnectReason};
pub use registry::SubscriptionRegistry;
pub use router::{DispatchReport, EventRouter, Handler, HandlerId};
pub use supervisor::{Supervisor, SupervisorCommand, SupervisorHandle};
pub use transport::{SubscriptionCommand, Transport};
pub use websocket::WebSocketTransport;
