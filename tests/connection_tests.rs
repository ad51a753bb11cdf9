//! End-to-end streaming: transport → receive loop → router → store.

use std::sync::Arc;
use std::time::Duration;

use perpwatch::domain::{MessageEnvelope, Symbol, Topic};
use perpwatch::risk::RiskLevel;
use perpwatch::store::SnapshotStore;
use perpwatch::stream::{
    ConnectionEvent, ConnectionManager, DisconnectReason, EventRouter, SubscriptionCommand,
    SubscriptionRegistry, Supervisor,
};
use perpwatch::testkit;
use perpwatch::testkit::domain::{account, balance_envelope, position, positions_envelope};
use perpwatch::testkit::transport::{RemoteControl, ScriptedTransport};
use serde_json::json;
use tokio_test::assert_ok;

struct Engine {
    manager: Arc<ConnectionManager<ScriptedTransport>>,
    store: Arc<SnapshotStore>,
    remote: RemoteControl,
}

fn engine() -> Engine {
    let (transport, remote) = ScriptedTransport::new();
    let router = Arc::new(EventRouter::new());
    let registry = Arc::new(SubscriptionRegistry::new());
    let store = Arc::new(SnapshotStore::new());
    store.attach(&router);
    let manager = Arc::new(ConnectionManager::new(transport, router, registry));
    Engine {
        manager,
        store,
        remote,
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn stream_updates_reach_store_and_drive_risk() {
    let Engine {
        manager,
        store,
        remote,
    } = engine();
    manager.registry().subscribe_to_positions();
    manager.registry().subscribe_to_balance();

    assert_ok!(manager.connect().await);
    eventually(|| remote.sent().len() == 2).await;

    remote.push_envelope(&balance_envelope(&account(1_000.0)));
    remote.push_envelope(&positions_envelope(&[position(
        "BTCUSDT", 0.5, 60_000.0, 60_000.0, 20.0,
    )]));

    let btc = Symbol::new("BTCUSDT");
    eventually(|| store.risk_for(&btc).is_some()).await;
    let risk = store.risk_for(&btc).unwrap();
    // MM = 0.5 × 60000 × 0.004 = 120 against a 1000 pool.
    assert!((risk.metrics.margin_ratio_percent - 12.0).abs() < 1e-9);
    assert_eq!(risk.level, RiskLevel::Safe);

    // Balance drains: same position, much thinner pool.
    remote.push_envelope(&balance_envelope(&account(180.0)));
    eventually(|| store.account().map(|a| a.total_wallet_balance) == Some(180.0)).await;
    let risk = store.risk_for(&btc).unwrap();
    assert_eq!(risk.level, RiskLevel::High);

    assert_ok!(manager.disconnect().await);
}

#[tokio::test]
async fn unknown_and_malformed_frames_do_not_stop_the_stream() {
    let Engine {
        manager,
        store,
        remote,
    } = engine();

    assert_ok!(manager.connect().await);
    remote.push_text("not json at all");
    remote.push_envelope(&MessageEnvelope::new(&Topic::Balance, json!("not an account")));
    remote.push_text(r#"{"type":"liquidations","data":[]}"#);
    remote.push_envelope(&balance_envelope(&account(42.0)));

    eventually(|| store.account().is_some()).await;
    assert_eq!(store.account().unwrap().total_wallet_balance, 42.0);
    assert!(manager.is_connected());

    assert_ok!(manager.disconnect().await);
}

#[tokio::test]
async fn disconnect_is_signalled_with_reason() {
    let Engine {
        manager, remote, ..
    } = engine();
    let mut events = manager.events();

    assert_ok!(manager.connect().await);
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);

    remote.fail("reset by peer");
    match events.recv().await.unwrap() {
        ConnectionEvent::Disconnected {
            reason: DisconnectReason::Error(message),
        } => assert!(message.contains("reset by peer")),
        other => panic!("unexpected event: {other:?}"),
    }

    // Explicit disconnect afterwards is still fine.
    assert_ok!(manager.disconnect().await);
}

#[tokio::test]
async fn supervisor_restores_subscriptions_after_drop() {
    let Engine {
        manager,
        store,
        remote,
    } = engine();
    manager.registry().subscribe_to_positions();
    manager.registry().subscribe_to_ticker("ETHUSDT");

    let (supervisor, task) = Supervisor::spawn(Arc::clone(&manager), testkit::config::reconnection());
    supervisor.connect().await.unwrap();
    eventually(|| remote.sent().len() == 2).await;

    remote.close();
    eventually(|| remote.connect_count() == 2 && remote.sent().len() == 4).await;
    assert_eq!(
        remote.sent()[2..],
        [
            SubscriptionCommand::Subscribe(Topic::Positions),
            SubscriptionCommand::Subscribe(Topic::ticker("ETHUSDT")),
        ]
    );

    // Data flows again on the new session.
    remote.push_envelope(&positions_envelope(&[position(
        "ETHUSDT", 1.0, 2_000.0, 2_000.0, 5.0,
    )]));
    eventually(|| store.position(&Symbol::new("ETHUSDT")).is_some()).await;

    supervisor.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn subscriptions_made_while_disconnected_are_sent_on_connect() {
    let Engine {
        manager, remote, ..
    } = engine();

    manager.registry().subscribe_to_orders();
    manager.registry().subscribe_to_orders();
    assert!(remote.sent().is_empty());
    assert_eq!(manager.registry().pending_commands().len(), 1);

    assert_ok!(manager.connect().await);
    eventually(|| !remote.sent().is_empty()).await;
    assert_eq!(
        remote.sent(),
        vec![SubscriptionCommand::Subscribe(Topic::Orders)]
    );

    assert_ok!(manager.disconnect().await);
}
