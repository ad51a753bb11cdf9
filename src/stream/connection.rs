//! Connection lifecycle and the single receive loop.
//!
//! [`ConnectionManager::connect`] opens the transport, attaches the
//! subscription registry to the new session and spawns exactly one receive
//! loop. The loop parses text frames into envelopes and routes them through
//! the [`EventRouter`] one at a time, in arrival order, interleaved with
//! outbound subscription commands.
//!
//! Reconnection is deliberately not handled here: every drop surfaces as a
//! [`ConnectionEvent::Disconnected`] and the caller (see
//! [`Supervisor`](super::Supervisor)) decides what to do.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::registry::SubscriptionRegistry;
use super::router::EventRouter;
use super::transport::{SubscriptionCommand, Transport};
use crate::domain::MessageEnvelope;
use crate::error::{Error, Result};

const EVENT_CAPACITY: usize = 64;

/// Current lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called.
    Requested,
    /// The peer closed the session.
    Closed,
    /// The transport failed.
    Error(String),
}

impl DisconnectReason {
    #[must_use]
    pub const fn is_requested(&self) -> bool {
        matches!(self, Self::Requested)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("requested"),
            Self::Closed => f.write_str("closed by peer"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Signal fired on every state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected { reason: DisconnectReason },
}

type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// State shared between the manager and its receive loop.
struct Shared {
    state: Mutex<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    on_error: Mutex<Option<ErrorCallback>>,
}

impl Shared {
    fn transition(&self, next: ConnectionState, event: ConnectionEvent) {
        {
            let mut state = self.state.lock();
            if *state == next {
                return;
            }
            *state = next;
        }
        info!(event = ?event, "Connection state changed");
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn report(&self, err: &Error) {
        error!(error = %err, "Transport error");
        let callback = self.on_error.lock().clone();
        if let Some(callback) = callback {
            callback(err);
        }
    }
}

struct Session<T> {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<T>,
}

struct Slot<T> {
    transport: Option<T>,
    session: Option<Session<T>>,
}

/// Owns one logical transport connection and its receive loop.
pub struct ConnectionManager<T: Transport> {
    slot: tokio::sync::Mutex<Slot<T>>,
    router: Arc<EventRouter>,
    registry: Arc<SubscriptionRegistry>,
    shared: Arc<Shared>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, router: Arc<EventRouter>, registry: Arc<SubscriptionRegistry>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            slot: tokio::sync::Mutex::new(Slot {
                transport: Some(transport),
                session: None,
            }),
            router,
            registry,
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                events,
                on_error: Mutex::new(None),
            }),
        }
    }

    /// Install the callback invoked once per transport failure.
    pub fn set_error_callback(&self, callback: impl Fn(&Error) + Send + Sync + 'static) {
        *self.shared.on_error.lock() = Some(Arc::new(callback));
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to connection state transitions.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    #[must_use]
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Open the transport and start the receive loop.
    ///
    /// Calling this while a session is live is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if it cannot connect; the error is also
    /// passed to the error callback and the manager stays disconnected.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;

        if let Some(session) = slot.session.take() {
            // A loop that already reported Disconnected is about to return.
            if self.is_connected() && !session.task.is_finished() {
                slot.session = Some(session);
                debug!("Already connected");
                return Ok(());
            }
            slot.transport = Some(reclaim(session.task).await?);
        }

        let mut transport = slot
            .transport
            .take()
            .ok_or_else(|| Error::Transport("transport unavailable".into()))?;

        info!(transport = transport.name(), "Connecting");
        if let Err(e) = transport.connect().await {
            slot.transport = Some(transport);
            self.shared.report(&e);
            return Err(e);
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        self.shared
            .transition(ConnectionState::Connected, ConnectionEvent::Connected);
        self.registry.attach(commands_tx);

        let task = tokio::spawn(receive_loop(
            transport,
            Arc::clone(&self.router),
            Arc::clone(&self.registry),
            Arc::clone(&self.shared),
            commands_rx,
            shutdown_rx,
        ));
        slot.session = Some(Session {
            shutdown: shutdown_tx,
            task,
        });
        Ok(())
    }

    /// Stop the receive loop and close the transport.
    ///
    /// Idempotent. When this returns, no dispatch is in flight. Subscription
    /// reference counts are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error only if the receive loop task itself failed.
    pub async fn disconnect(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        let Some(session) = slot.session.take() else {
            return Ok(());
        };

        // The loop may already have exited on its own.
        let _ = session.shutdown.send(());
        slot.transport = Some(reclaim(session.task).await?);
        Ok(())
    }
}

async fn reclaim<T>(task: JoinHandle<T>) -> Result<T> {
    task.await.map_err(|e| {
        error!(error = %e, "Receive loop task failed");
        Error::Transport(format!("receive loop failed: {e}"))
    })
}

async fn receive_loop<T: Transport>(
    mut transport: T,
    router: Arc<EventRouter>,
    registry: Arc<SubscriptionRegistry>,
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<SubscriptionCommand>,
    mut shutdown: oneshot::Receiver<()>,
) -> T {
    debug!("Receive loop started");

    let reason = loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break DisconnectReason::Requested,

            Some(command) = commands.recv() => {
                if let Err(e) = transport.send(&command).await {
                    shared.report(&e);
                    break DisconnectReason::Error(e.to_string());
                }
                debug!(command = ?command, "Sent subscription command");
            }

            frame = transport.next_frame() => match frame {
                Some(Ok(text)) => route_frame(&router, &text),
                Some(Err(e)) => {
                    shared.report(&e);
                    break DisconnectReason::Error(e.to_string());
                }
                None => break DisconnectReason::Closed,
            },
        }
    };

    // Observers see Disconnected before the close handshake, which may stall
    // on a dead socket. `connect()` waits for this task to hand back the
    // transport.
    registry.detach();
    shared.transition(
        ConnectionState::Disconnected,
        ConnectionEvent::Disconnected { reason },
    );
    if let Err(e) = transport.close().await {
        debug!(error = %e, "Error closing transport");
    }
    debug!("Receive loop stopped");
    transport
}

/// Upper bound on how much of an unparsed frame is written to the log.
const MAX_LOGGED_FRAME: usize = 512;

fn truncated(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn route_frame(router: &EventRouter, text: &str) {
    match serde_json::from_str::<MessageEnvelope>(text) {
        Ok(envelope) => {
            let report = router.dispatch(&envelope);
            debug!(
                kind = %envelope.kind,
                delivered = report.delivered,
                failed = report.failed,
                "Routed envelope"
            );
        }
        Err(e) => {
            warn!(error = %e, len = text.len(), "Failed to parse envelope");
            debug!(raw = %truncated(text, MAX_LOGGED_FRAME), "Unparsed frame");
        }
    }
}
