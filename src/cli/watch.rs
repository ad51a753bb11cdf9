//! Live position monitoring.

use std::sync::Arc;

use tracing::{info, warn};

use super::{load_config, output, risk, WatchArgs};
use crate::domain::Symbol;
use crate::risk::RiskLevel;
use crate::store::SnapshotStore;
use crate::stream::{
    ConnectionManager, EventRouter, SubscriptionRegistry, Supervisor, WebSocketTransport,
};

/// Stream account data and print a risk table every report interval until
/// interrupted.
pub async fn execute(args: &WatchArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if !args.symbols.is_empty() {
        config.watch.symbols = args.symbols.iter().map(Symbol::new).collect();
    }
    config.init_logging();

    let router = Arc::new(EventRouter::new());
    let registry = Arc::new(SubscriptionRegistry::new());
    let store = Arc::new(SnapshotStore::new());
    store.attach(&router);

    registry.subscribe_to_positions();
    registry.subscribe_to_balance();
    registry.subscribe_to_orders();
    for symbol in &config.watch.symbols {
        store.track_ticker(&router, symbol.clone());
        registry.subscribe_to_ticker(symbol.clone());
    }

    let transport = WebSocketTransport::new(config.connection.ws_url.clone());
    let manager = Arc::new(ConnectionManager::new(
        transport,
        Arc::clone(&router),
        Arc::clone(&registry),
    ));
    manager.set_error_callback(|e| output::warning(&format!("connection error: {e}")));

    info!(
        url = %config.connection.ws_url,
        symbols = config.watch.symbols.len(),
        "perpwatch watching"
    );
    let (supervisor, task) = Supervisor::spawn(Arc::clone(&manager), config.reconnection.clone());
    supervisor.connect().await?;

    let mut interval = tokio::time::interval(config.watch.report_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => report(&store, manager.is_connected()),
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    supervisor.shutdown().await?;
    task.await?;
    info!("perpwatch stopped");
    Ok(())
}

fn report(store: &SnapshotStore, connected: bool) {
    let report = store.risk_report();
    if report.is_empty() {
        if !connected {
            output::note("waiting for connection");
        } else if store.account().is_none() {
            output::note("waiting for account snapshot");
        }
        return;
    }

    for entry in &report {
        if entry.level >= RiskLevel::High {
            warn!(
                symbol = %entry.symbol,
                level = %entry.level,
                margin_ratio = entry.metrics.margin_ratio_percent,
                liquidation_price = entry.metrics.liquidation_price,
                "Position near liquidation"
            );
        }
    }

    output::section(&format!(
        "Positions ({})",
        chrono::Utc::now().format("%H:%M:%S")
    ));
    output::lines(&risk::render_report(&report));
}
