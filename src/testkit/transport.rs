//! In-memory [`Transport`] for exercising the connection layer.
//!
//! [`ScriptedTransport::new`] returns the transport and a [`RemoteControl`]
//! that plays the exchange side: it pushes frames, fails or closes the
//! session, and records every command the client sent. No network I/O.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::MessageEnvelope;
use crate::error::{Error, Result};
use crate::stream::{SubscriptionCommand, Transport};

enum Frame {
    Text(String),
    Fail(String),
    Close,
}

#[derive(Default)]
struct Counters {
    connects: AtomicU32,
    closes: AtomicU32,
    sent: Mutex<Vec<SubscriptionCommand>>,
}

/// A transport fed from a channel owned by its [`RemoteControl`].
///
/// Each `connect()` pops the next scripted result (defaults to `Ok(())` when
/// exhausted). `next_frame()` waits for the remote and is cancel-safe.
pub struct ScriptedTransport {
    frames: mpsc::UnboundedReceiver<Frame>,
    connect_results: VecDeque<Result<()>>,
    close_delay: Duration,
    counters: Arc<Counters>,
}

/// Exchange-side handle for a [`ScriptedTransport`].
#[derive(Clone)]
pub struct RemoteControl {
    frames: mpsc::UnboundedSender<Frame>,
    counters: Arc<Counters>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, RemoteControl) {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        (
            Self {
                frames: rx,
                connect_results: VecDeque::new(),
                close_delay: Duration::ZERO,
                counters: Arc::clone(&counters),
            },
            RemoteControl {
                frames: tx,
                counters,
            },
        )
    }

    pub fn with_connect_results(mut self, results: Vec<Result<()>>) -> Self {
        self.connect_results = results.into();
        self
    }

    /// Make `close()` take `delay`, like a close handshake on a dead socket.
    /// The close is counted once the delay has elapsed.
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }
}

impl RemoteControl {
    /// Deliver a raw text frame.
    pub fn push_text(&self, text: &str) {
        let _ = self.frames.send(Frame::Text(text.to_string()));
    }

    /// Deliver an envelope as a JSON text frame.
    pub fn push_envelope(&self, envelope: &MessageEnvelope) {
        let text = serde_json::to_string(envelope).expect("envelope serializes");
        let _ = self.frames.send(Frame::Text(text));
    }

    /// Make the next read fail with a transport error.
    pub fn fail(&self, reason: &str) {
        let _ = self.frames.send(Frame::Fail(reason.to_string()));
    }

    /// End the session as if the peer closed it.
    pub fn close(&self) {
        let _ = self.frames.send(Frame::Close);
    }

    /// Commands received from the client, in order.
    pub fn sent(&self) -> Vec<SubscriptionCommand> {
        self.counters.sent.lock().clone()
    }

    /// How many times `connect()` was called, failures included.
    pub fn connect_count(&self) -> u32 {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// How many times `close()` was called.
    pub fn close_count(&self) -> u32 {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self) -> Result<()> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        self.connect_results.pop_front().unwrap_or(Ok(()))
    }

    async fn send(&mut self, command: &SubscriptionCommand) -> Result<()> {
        self.counters.sent.lock().push(command.clone());
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<String>> {
        match self.frames.recv().await? {
            Frame::Text(text) => Some(Ok(text)),
            Frame::Fail(reason) => Some(Err(Error::Transport(reason))),
            Frame::Close => None,
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
