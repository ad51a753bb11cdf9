//! Reconnection policy on top of [`ConnectionManager`].
//!
//! The manager never reconnects on its own. The supervisor watches its
//! connection events and, while a connection is wanted, schedules new
//! attempts with exponential backoff and a circuit breaker. Subscriptions are
//! restored by the registry replay that every successful connect performs.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::connection::{ConnectionEvent, ConnectionManager};
use super::transport::Transport;
use crate::config::ReconnectionConfig;
use crate::error::{Error, Result};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    /// Normal operation, connections allowed.
    Closed,
    /// Too many failures, blocking connections temporarily.
    Open { until: Instant },
}

/// Exponential backoff with jitter and a failure circuit breaker.
#[derive(Debug)]
struct Backoff {
    config: ReconnectionConfig,
    consecutive_failures: u32,
    current_delay_ms: u64,
    circuit_state: CircuitState,
}

impl Backoff {
    fn new(config: ReconnectionConfig) -> Self {
        let initial_delay = config.initial_delay_ms;
        Self {
            config,
            consecutive_failures: 0,
            current_delay_ms: initial_delay,
            circuit_state: CircuitState::Closed,
        }
    }

    fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay_ms = self.config.initial_delay_ms;
        self.circuit_state = CircuitState::Closed;
    }

    fn next_delay(&mut self) -> Duration {
        let base_delay = Duration::from_millis(self.current_delay_ms);
        let delay = base_delay + Duration::from_millis(jitter_ms(base_delay));

        let next_delay = (self.current_delay_ms as f64 * self.config.backoff_multiplier) as u64;
        self.current_delay_ms = next_delay.min(self.config.max_delay_ms);

        delay
    }

    fn circuit_allows_connection(&mut self) -> bool {
        match self.circuit_state {
            CircuitState::Closed => true,
            CircuitState::Open { until } => {
                if Instant::now() >= until {
                    info!("Circuit breaker cooldown expired, allowing reconnection");
                    self.reset();
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;

        if self.consecutive_failures >= self.config.max_consecutive_failures
            && self.circuit_state == CircuitState::Closed
        {
            let cooldown = self.config.cooldown();
            self.circuit_state = CircuitState::Open {
                until: Instant::now() + cooldown,
            };
            error!(
                failures = self.consecutive_failures,
                cooldown_secs = cooldown.as_secs(),
                "Circuit breaker tripped, pausing reconnection attempts"
            );
        }
    }

    /// When the next attempt may run.
    fn schedule(&mut self) -> Instant {
        if !self.circuit_allows_connection() {
            if let CircuitState::Open { until } = self.circuit_state {
                warn!(
                    remaining_secs = until.saturating_duration_since(Instant::now()).as_secs(),
                    "Circuit breaker open, waiting for cooldown"
                );
                return until;
            }
        }

        let delay = self.next_delay();
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.consecutive_failures + 1,
            "Reconnecting after delay"
        );
        Instant::now() + delay
    }
}

fn jitter_ms(base_delay: Duration) -> u64 {
    let jitter_range_ms = (base_delay.as_millis() as u64) / 5;
    if jitter_range_ms == 0 {
        return 0;
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % (jitter_range_ms + 1)
}

/// Control messages for a running supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCommand {
    /// Want a connection; keep retrying until one is up.
    Connect,
    /// Drop the connection and stop retrying.
    Disconnect,
    /// Disconnect and end the supervisor task.
    Shutdown,
}

/// Cloneable handle for driving a [`Supervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<SupervisorCommand>,
}

impl SupervisorHandle {
    pub async fn connect(&self) -> Result<()> {
        self.send(SupervisorCommand::Connect).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.send(SupervisorCommand::Disconnect).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SupervisorCommand::Shutdown).await
    }

    async fn send(&self, command: SupervisorCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::Transport("supervisor stopped".into()))
    }
}

/// Background task keeping a [`ConnectionManager`] connected.
pub struct Supervisor<T: Transport> {
    manager: Arc<ConnectionManager<T>>,
    backoff: Backoff,
    wanted: bool,
    retry_at: Option<Instant>,
}

impl<T: Transport> Supervisor<T> {
    /// Spawn the supervisor. It stays idle until told to connect.
    pub fn spawn(
        manager: Arc<ConnectionManager<T>>,
        config: ReconnectionConfig,
    ) -> (SupervisorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let events = manager.events();
        let supervisor = Self {
            manager,
            backoff: Backoff::new(config),
            wanted: false,
            retry_at: None,
        };
        let task = tokio::spawn(supervisor.run(rx, events));
        (SupervisorHandle { commands: tx }, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SupervisorCommand>,
        mut events: broadcast::Receiver<ConnectionEvent>,
    ) {
        debug!("Supervisor started");
        loop {
            let retry_at = self.retry_at;
            let retry = async move {
                match retry_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                command = commands.recv() => match command {
                    Some(SupervisorCommand::Connect) => {
                        self.wanted = true;
                        self.retry_at = None;
                        self.attempt().await;
                    }
                    Some(SupervisorCommand::Disconnect) => {
                        self.wanted = false;
                        self.retry_at = None;
                        self.backoff.reset();
                        self.disconnect().await;
                    }
                    Some(SupervisorCommand::Shutdown) | None => {
                        self.wanted = false;
                        self.disconnect().await;
                        break;
                    }
                },

                event = events.recv() => match event {
                    Ok(ConnectionEvent::Disconnected { reason }) => {
                        if self.wanted && !reason.is_requested() && self.retry_at.is_none() {
                            warn!(reason = %reason, "Connection lost, will reconnect");
                            self.backoff.record_failure();
                            self.retry_at = Some(self.backoff.schedule());
                        }
                    }
                    Ok(ConnectionEvent::Connected) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Supervisor lagged behind connection events");
                        if self.wanted && !self.manager.is_connected() && self.retry_at.is_none() {
                            self.retry_at = Some(self.backoff.schedule());
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                () = retry => {
                    self.retry_at = None;
                    self.attempt().await;
                }
            }
        }
        debug!("Supervisor stopped");
    }

    async fn attempt(&mut self) {
        match self.manager.connect().await {
            Ok(()) => self.backoff.reset(),
            Err(e) => {
                warn!(error = %e, "Connection attempt failed, will retry");
                self.backoff.record_failure();
                self.retry_at = Some(self.backoff.schedule());
            }
        }
    }

    async fn disconnect(&self) {
        if let Err(e) = self.manager.disconnect().await {
            error!(error = %e, "Disconnect failed");
        }
    }
}
