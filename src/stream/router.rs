//! Topic-keyed fan-out of inbound envelopes.
//!
//! Dispatch iterates a snapshot of the handler set taken when the envelope
//! arrives, so handlers may register or remove handlers (themselves included)
//! mid-dispatch. A failing or panicking handler is logged and skipped; the
//! remaining handlers still receive the envelope.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::domain::{MessageEnvelope, Topic};
use crate::error::HandlerError;

/// Consumer of envelopes for one topic.
///
/// Handlers run synchronously on the receive loop; anything slow should be
/// handed off to its own task.
pub trait Handler: Send + Sync {
    fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&MessageEnvelope) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        self(envelope)
    }
}

/// Registration token returned by [`EventRouter::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Outcome of routing one envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

impl DispatchReport {
    /// True when no handler was registered for the envelope's topic.
    #[must_use]
    pub const fn is_unrouted(&self) -> bool {
        self.delivered == 0 && self.failed == 0
    }
}

type Registration = (HandlerId, Arc<dyn Handler>);

/// Publish/subscribe dispatcher for inbound envelopes.
///
/// Instances are independent; there is no global registry.
pub struct EventRouter {
    handlers: RwLock<HashMap<Topic, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl EventRouter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `handler` for `topic`. Any number of handlers may share a topic.
    pub fn register(&self, topic: Topic, handler: impl Handler + 'static) -> HandlerId {
        self.register_arc(topic, Arc::new(handler))
    }

    /// Register an already shared handler.
    pub fn register_arc(&self, topic: Topic, handler: Arc<dyn Handler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(topic = %topic, handler = %id, "Registering handler");
        self.handlers
            .write()
            .entry(topic)
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered for `topic`.
    pub fn remove(&self, topic: &Topic, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(registrations) = handlers.get_mut(topic) else {
            return false;
        };

        let before = registrations.len();
        registrations.retain(|(existing, _)| *existing != id);
        let removed = registrations.len() != before;

        if registrations.is_empty() {
            handlers.remove(topic);
        }
        if removed {
            debug!(topic = %topic, handler = %id, "Removed handler");
        }
        removed
    }

    /// Number of handlers currently registered for `topic`.
    #[must_use]
    pub fn handler_count(&self, topic: &Topic) -> usize {
        self.handlers.read().get(topic).map_or(0, Vec::len)
    }

    /// Topics with at least one handler.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<_> = self.handlers.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Deliver `envelope` to every handler registered for its `type`.
    ///
    /// Envelopes whose `type` is not a known topic are dropped.
    pub fn dispatch(&self, envelope: &MessageEnvelope) -> DispatchReport {
        let Some(topic) = envelope.topic() else {
            debug!(kind = %envelope.kind, "Dropping envelope with unknown type");
            return DispatchReport::default();
        };

        // Snapshot under the lock, deliver outside it.
        let snapshot: Vec<Registration> = match self.handlers.read().get(&topic) {
            Some(registrations) => registrations.clone(),
            None => {
                debug!(topic = %topic, "No handlers registered");
                return DispatchReport::default();
            }
        };

        let mut report = DispatchReport::default();
        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(envelope))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(topic = %topic, handler = %id, error = %e, "Handler failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    warn!(
                        topic = %topic,
                        handler = %id,
                        panic = %panic_message(panic.as_ref()),
                        "Handler panicked"
                    );
                }
            }
        }
        report
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
