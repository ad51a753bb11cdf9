//! Transport abstraction under the connection manager.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Topic;
use crate::error::Result;

/// Outbound subscription command, one per reference-count transition.
///
/// Wire form: `{"action":"subscribe","topic":"ticker:BTCUSDT"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", content = "topic", rename_all = "lowercase")]
pub enum SubscriptionCommand {
    Subscribe(Topic),
    Unsubscribe(Topic),
}

impl SubscriptionCommand {
    #[must_use]
    pub const fn topic(&self) -> &Topic {
        match self {
            Self::Subscribe(topic) | Self::Unsubscribe(topic) => topic,
        }
    }

    #[must_use]
    pub const fn is_subscribe(&self) -> bool {
        matches!(self, Self::Subscribe(_))
    }
}

/// One logical bidirectional connection to the exchange relay.
///
/// Implementations own framing and keepalive; the connection manager only
/// sees text frames in and subscription commands out. `next_frame` must be
/// cancel-safe because the receive loop races it against outbound commands.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Open the underlying connection.
    async fn connect(&mut self) -> Result<()>;

    /// Send a subscription command.
    async fn send(&mut self, command: &SubscriptionCommand) -> Result<()>;

    /// Receive the next inbound text frame.
    ///
    /// Returns `None` once the peer has closed the session.
    async fn next_frame(&mut self) -> Option<Result<String>>;

    /// Close the connection. Closing an already-closed transport is not an error.
    async fn close(&mut self) -> Result<()>;

    /// Transport name for logging.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn connect(&mut self) -> Result<()> {
        (**self).connect().await
    }

    async fn send(&mut self, command: &SubscriptionCommand) -> Result<()> {
        (**self).send(command).await
    }

    async fn next_frame(&mut self) -> Option<Result<String>> {
        (**self).next_frame().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
