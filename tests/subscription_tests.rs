//! Router fan-out and subscription reference counting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use perpwatch::domain::{MessageEnvelope, Topic};
use perpwatch::error::HandlerError;
use perpwatch::stream::{EventRouter, SubscriptionCommand, SubscriptionRegistry};
use serde_json::json;
use tokio::sync::mpsc;

type HandlerResult = Result<(), HandlerError>;

#[test]
fn every_handler_sees_every_envelope_despite_failures() {
    let router = EventRouter::new();
    let received = Arc::new(AtomicUsize::new(0));

    for i in 0..4 {
        let received = Arc::clone(&received);
        router.register(Topic::Positions, move |_: &MessageEnvelope| -> HandlerResult {
            received.fetch_add(1, Ordering::SeqCst);
            match i {
                1 => Err(HandlerError::Rejected("consumer offline".into())),
                2 => panic!("consumer bug"),
                _ => Ok(()),
            }
        });
    }

    for _ in 0..10 {
        let report = router.dispatch(&MessageEnvelope::new(&Topic::Positions, json!([])));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 2);
    }
    assert_eq!(received.load(Ordering::SeqCst), 40);
}

#[test]
fn removing_one_handler_leaves_others_registered() {
    let router = EventRouter::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let seen = Arc::clone(&seen);
        router.register(Topic::Balance, move |_: &MessageEnvelope| -> HandlerResult {
            seen.lock().push("first");
            Ok(())
        })
    };
    {
        let seen = Arc::clone(&seen);
        router.register(Topic::Balance, move |_: &MessageEnvelope| -> HandlerResult {
            seen.lock().push("second");
            Ok(())
        });
    }

    assert!(router.remove(&Topic::Balance, first));
    assert!(!router.remove(&Topic::Balance, first));
    router.dispatch(&MessageEnvelope::new(&Topic::Balance, json!({})));

    assert_eq!(*seen.lock(), ["second"]);
}

#[test]
fn ticker_envelopes_route_per_symbol() {
    let router = EventRouter::new();
    let btc = Arc::new(AtomicUsize::new(0));
    let eth = Arc::new(AtomicUsize::new(0));
    {
        let btc = Arc::clone(&btc);
        router.register(Topic::ticker("BTCUSDT"), move |_: &MessageEnvelope| -> HandlerResult {
            btc.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    {
        let eth = Arc::clone(&eth);
        router.register(Topic::ticker("ETHUSDT"), move |_: &MessageEnvelope| -> HandlerResult {
            eth.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    router.dispatch(&MessageEnvelope::new(&Topic::ticker("BTCUSDT"), json!({"price": 1})));
    router.dispatch(&MessageEnvelope::new(&Topic::ticker("BTCUSDT"), json!({"price": 2})));
    router.dispatch(&MessageEnvelope::new(&Topic::ticker("ETHUSDT"), json!({"price": 3})));
    let report = router.dispatch(&MessageEnvelope::new(&Topic::ticker("SOLUSDT"), json!({})));

    assert_eq!(btc.load(Ordering::SeqCst), 2);
    assert_eq!(eth.load(Ordering::SeqCst), 1);
    assert!(report.is_unrouted());
}

#[test]
fn separate_routers_do_not_share_handlers() {
    let a = EventRouter::new();
    let b = EventRouter::new();
    a.register(Topic::Orders, |_: &MessageEnvelope| -> HandlerResult { Ok(()) });

    assert_eq!(a.handler_count(&Topic::Orders), 1);
    assert_eq!(b.handler_count(&Topic::Orders), 0);
}

#[test]
fn three_consumers_produce_one_wire_subscription() {
    let registry = SubscriptionRegistry::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    registry.attach(tx);

    for _ in 0..3 {
        registry.subscribe_to_positions();
    }
    registry.unsubscribe_from_positions();
    registry.unsubscribe_from_positions();

    assert_eq!(
        rx.try_recv().unwrap(),
        SubscriptionCommand::Subscribe(Topic::Positions)
    );
    assert!(rx.try_recv().is_err());

    registry.unsubscribe_from_positions();
    assert_eq!(
        rx.try_recv().unwrap(),
        SubscriptionCommand::Unsubscribe(Topic::Positions)
    );

    // Extra unsubscribes are no-ops.
    assert_eq!(registry.unsubscribe_from_positions(), 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn queued_commands_are_superseded_by_replay_on_attach() {
    let registry = SubscriptionRegistry::new();
    registry.subscribe_to_ticker("BTCUSDT");
    registry.subscribe_to_ticker("ETHUSDT");
    registry.unsubscribe_from_ticker("ETHUSDT");
    assert_eq!(registry.pending_commands().len(), 3);

    let (tx, mut rx) = mpsc::unbounded_channel();
    assert_eq!(registry.attach(tx), 1);

    assert_eq!(
        rx.try_recv().unwrap(),
        SubscriptionCommand::Subscribe(Topic::ticker("BTCUSDT"))
    );
    assert!(rx.try_recv().is_err());
    assert!(registry.pending_commands().is_empty());
}
