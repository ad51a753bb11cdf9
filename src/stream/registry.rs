//! Reference-counted subscription tracking.
//!
//! Many consumers may want the same stream. The registry counts them per
//! topic and emits exactly one wire command per 0→1 (subscribe) and 1→0
//! (unsubscribe) transition. Counts and the outbound session live behind
//! one mutex, so a transition and its command are never reordered.
//!
//! While no session is attached (disconnected), commands are queued. When a
//! session attaches, the registry replays the desired set (one subscribe per
//! active topic). The replay supersedes the queue: queued subscribes for
//! still-active topics are covered by it, and queued unsubscribes target a
//! session that no longer exists.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::transport::SubscriptionCommand;
use crate::domain::{Symbol, Topic};

#[derive(Debug, Default)]
struct RegistryState {
    counts: BTreeMap<Topic, usize>,
    session: Option<mpsc::UnboundedSender<SubscriptionCommand>>,
    pending: Vec<SubscriptionCommand>,
}

impl RegistryState {
    fn emit(&mut self, command: SubscriptionCommand) {
        if let Some(session) = &self.session {
            match session.send(command) {
                Ok(()) => return,
                Err(mpsc::error::SendError(command)) => {
                    debug!(command = ?command, "Session closed, queueing command");
                    self.session = None;
                    self.pending.push(command);
                    return;
                }
            }
        }
        trace!(command = ?command, "No live session, queueing command");
        self.pending.push(command);
    }
}

/// Desired-topic tracker issuing subscribe/unsubscribe commands on
/// reference-count transitions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_to_positions(&self) -> usize {
        self.subscribe(Topic::Positions)
    }

    pub fn subscribe_to_orders(&self) -> usize {
        self.subscribe(Topic::Orders)
    }

    pub fn subscribe_to_balance(&self) -> usize {
        self.subscribe(Topic::Balance)
    }

    pub fn subscribe_to_ticker(&self, symbol: impl Into<Symbol>) -> usize {
        self.subscribe(Topic::ticker(symbol))
    }

    pub fn unsubscribe_from_positions(&self) -> usize {
        self.unsubscribe(&Topic::Positions)
    }

    pub fn unsubscribe_from_orders(&self) -> usize {
        self.unsubscribe(&Topic::Orders)
    }

    pub fn unsubscribe_from_balance(&self) -> usize {
        self.unsubscribe(&Topic::Balance)
    }

    pub fn unsubscribe_from_ticker(&self, symbol: impl Into<Symbol>) -> usize {
        self.unsubscribe(&Topic::ticker(symbol))
    }

    /// Add one reference to `topic`, returning the new count. The subscribe
    /// command is issued only on the 0→1 transition.
    ///
    /// A ticker topic with a blank symbol is rejected: nothing is counted or
    /// sent and the return value is 0.
    pub fn subscribe(&self, topic: Topic) -> usize {
        if is_blank_ticker(&topic) {
            warn!("Ignoring ticker subscription with blank symbol");
            return 0;
        }
        let mut state = self.inner.lock();
        let count = state.counts.entry(topic.clone()).or_insert(0);
        *count += 1;
        let count = *count;

        if count == 1 {
            info!(topic = %topic, "Subscribing");
            state.emit(SubscriptionCommand::Subscribe(topic));
        } else {
            debug!(topic = %topic, refs = count, "Topic already active");
        }
        count
    }

    /// Drop one reference to `topic`, returning the new count. The
    /// unsubscribe command is issued only on the 1→0 transition; calling this
    /// on an inactive topic is a no-op.
    pub fn unsubscribe(&self, topic: &Topic) -> usize {
        if is_blank_ticker(topic) {
            warn!("Ignoring ticker unsubscribe with blank symbol");
            return 0;
        }
        let mut state = self.inner.lock();
        let Some(count) = state.counts.get_mut(topic) else {
            debug!(topic = %topic, "Unsubscribe for inactive topic ignored");
            return 0;
        };

        *count -= 1;
        let count = *count;
        if count == 0 {
            state.counts.remove(topic);
            info!(topic = %topic, "Unsubscribing");
            state.emit(SubscriptionCommand::Unsubscribe(topic.clone()));
        } else {
            debug!(topic = %topic, refs = count, "Topic still referenced");
        }
        count
    }

    /// Current reference count for `topic`.
    #[must_use]
    pub fn ref_count(&self, topic: &Topic) -> usize {
        self.inner.lock().counts.get(topic).copied().unwrap_or(0)
    }

    /// Topics with a non-zero reference count, in stable order.
    #[must_use]
    pub fn active_topics(&self) -> Vec<Topic> {
        self.inner.lock().counts.keys().cloned().collect()
    }

    /// Commands issued while no session was attached.
    #[must_use]
    pub fn pending_commands(&self) -> Vec<SubscriptionCommand> {
        self.inner.lock().pending.clone()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner
            .lock()
            .session
            .as_ref()
            .is_some_and(|session| !session.is_closed())
    }

    /// Route future commands to a freshly opened session and replay the
    /// desired set onto it. Returns the number of topics replayed.
    pub fn attach(&self, session: mpsc::UnboundedSender<SubscriptionCommand>) -> usize {
        let mut state = self.inner.lock();
        let queued = std::mem::take(&mut state.pending);
        if !queued.is_empty() {
            debug!(queued = queued.len(), "Superseding queued commands with replay");
        }

        let topics: Vec<Topic> = state.counts.keys().cloned().collect();
        state.session = Some(session);
        for topic in &topics {
            state.emit(SubscriptionCommand::Subscribe(topic.clone()));
        }
        if !topics.is_empty() {
            info!(topics = topics.len(), "Replayed subscriptions");
        }
        topics.len()
    }

    /// Stop routing to the current session. Reference counts are kept so the
    /// next [`attach`](Self::attach) restores the same set.
    pub fn detach(&self) {
        if self.inner.lock().session.take().is_some() {
            debug!("Subscription session detached");
        }
    }
}

fn is_blank_ticker(topic: &Topic) -> bool {
    topic.symbol().is_some_and(Symbol::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached() -> (
        SubscriptionRegistry,
        mpsc::UnboundedReceiver<SubscriptionCommand>,
    ) {
        let registry = SubscriptionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.attach(tx);
        (registry, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SubscriptionCommand>) -> Vec<SubscriptionCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    #[test]
    fn test_subscribe_is_reference_counted() {
        let (registry, mut rx) = attached();

        assert_eq!(registry.subscribe_to_positions(), 1);
        assert_eq!(registry.subscribe_to_positions(), 2);
        assert_eq!(registry.subscribe_to_positions(), 3);
        assert_eq!(registry.unsubscribe_from_positions(), 2);

        assert_eq!(
            drain(&mut rx),
            vec![SubscriptionCommand::Subscribe(Topic::Positions)]
        );
        assert_eq!(registry.ref_count(&Topic::Positions), 2);
    }

    #[test]
    fn test_unsubscribe_sent_on_last_reference() {
        let (registry, mut rx) = attached();

        registry.subscribe_to_ticker("btcusdt");
        registry.subscribe_to_ticker("BTCUSDT");
        registry.unsubscribe_from_ticker("BTCUSDT");
        registry.unsubscribe_from_ticker("BTCUSDT");

        assert_eq!(
            drain(&mut rx),
            vec![
                SubscriptionCommand::Subscribe(Topic::ticker("BTCUSDT")),
                SubscriptionCommand::Unsubscribe(Topic::ticker("BTCUSDT")),
            ]
        );
        assert!(registry.active_topics().is_empty());
    }

    #[test]
    fn test_blank_ticker_symbol_is_rejected() {
        let (registry, mut rx) = attached();

        assert_eq!(registry.subscribe_to_ticker("   "), 0);
        assert_eq!(registry.subscribe(Topic::ticker("")), 0);
        assert_eq!(registry.unsubscribe_from_ticker(" "), 0);

        assert!(drain(&mut rx).is_empty());
        assert!(registry.active_topics().is_empty());

        let detached = SubscriptionRegistry::new();
        detached.subscribe_to_ticker("\t");
        assert!(detached.pending_commands().is_empty());
    }

    #[test]
    fn test_unsubscribe_inactive_is_noop() {
        let (registry, mut rx) = attached();

        assert_eq!(registry.unsubscribe_from_ticker("ETHUSDT"), 0);
        assert_eq!(registry.unsubscribe_from_orders(), 0);

        registry.subscribe_to_orders();
        registry.unsubscribe_from_orders();
        assert_eq!(registry.unsubscribe_from_orders(), 0);

        assert_eq!(drain(&mut rx).len(), 2);
        assert_eq!(registry.ref_count(&Topic::Orders), 0);
    }

    #[test]
    fn test_ticker_counts_are_per_symbol() {
        let (registry, mut rx) = attached();

        registry.subscribe_to_ticker("BTCUSDT");
        registry.subscribe_to_ticker("ETHUSDT");
        registry.unsubscribe_from_ticker("BTCUSDT");

        assert_eq!(registry.ref_count(&Topic::ticker("ETHUSDT")), 1);
        assert_eq!(registry.ref_count(&Topic::ticker("BTCUSDT")), 0);
        assert_eq!(drain(&mut rx).len(), 3);
    }

    #[test]
    fn test_commands_queue_while_detached() {
        let registry = SubscriptionRegistry::new();

        registry.subscribe_to_balance();
        registry.subscribe_to_balance();
        registry.subscribe_to_orders();
        registry.unsubscribe_from_orders();

        assert_eq!(
            registry.pending_commands(),
            vec![
                SubscriptionCommand::Subscribe(Topic::Balance),
                SubscriptionCommand::Subscribe(Topic::Orders),
                SubscriptionCommand::Unsubscribe(Topic::Orders),
            ]
        );
        assert!(!registry.is_attached());
    }

    #[test]
    fn test_attach_replays_desired_set_once() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe_to_balance();
        registry.subscribe_to_balance();
        registry.subscribe_to_ticker("SOLUSDT");
        registry.subscribe_to_orders();
        registry.unsubscribe_from_orders();

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(registry.attach(tx), 2);

        assert_eq!(
            drain(&mut rx),
            vec![
                SubscriptionCommand::Subscribe(Topic::Balance),
                SubscriptionCommand::Subscribe(Topic::ticker("SOLUSDT")),
            ]
        );
        assert!(registry.pending_commands().is_empty());
        assert!(registry.is_attached());
    }

    #[test]
    fn test_detach_keeps_counts_and_reattach_restores() {
        let (registry, mut first) = attached();
        registry.subscribe_to_positions();
        registry.subscribe_to_positions();
        drain(&mut first);

        registry.detach();
        assert_eq!(registry.ref_count(&Topic::Positions), 2);
        assert!(!registry.is_attached());

        let (tx, mut second) = mpsc::unbounded_channel();
        registry.attach(tx);
        assert_eq!(
            drain(&mut second),
            vec![SubscriptionCommand::Subscribe(Topic::Positions)]
        );
        assert!(drain(&mut first).is_empty());
    }

    #[test]
    fn test_closed_session_falls_back_to_queue() {
        let (registry, rx) = attached();
        drop(rx);

        registry.subscribe_to_orders();

        assert_eq!(
            registry.pending_commands(),
            vec![SubscriptionCommand::Subscribe(Topic::Orders)]
        );
        assert!(!registry.is_attached());
    }

    #[test]
    fn test_concurrent_reference_counting_loses_no_updates() {
        use std::sync::Arc;

        let (registry, mut rx) = attached();
        let registry = Arc::new(registry);
        registry.subscribe_to_balance();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        registry.subscribe_to_balance();
                        registry.unsubscribe_from_balance();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(registry.ref_count(&Topic::Balance), 1);
        assert_eq!(
            drain(&mut rx),
            vec![SubscriptionCommand::Subscribe(Topic::Balance)]
        );
    }
}
