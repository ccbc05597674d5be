#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Scantyx Live integration tests.
//!
//! Provides a scripted [`MockConnector`] whose sessions are driven from the
//! test through [`SessionHandle`]s, plus helpers for waiting on client state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use scantyx_live::{
    CloseFrame, ConnectionState, Connector, Payload, SocketClient, SocketError, Transport,
    TransportEvent,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

// ── MockConnector ───────────────────────────────────────────────────

/// What the connector does with the next connection attempt.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// Open a session.
    Accept,
    /// Fail the attempt immediately.
    Refuse,
    /// Never complete the attempt.
    Hang,
}

#[derive(Default)]
struct ConnectorState {
    script: VecDeque<Outcome>,
    attempts: Vec<(Url, Instant)>,
    sessions: Vec<SessionHandle>,
}

/// Connector that follows a script of [`Outcome`]s (accepting once the script
/// runs out) and records every attempt.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<StdMutex<ConnectorState>>,
}

impl MockConnector {
    pub fn new(script: Vec<Outcome>) -> Self {
        let connector = Self::default();
        connector.state.lock().unwrap().script = VecDeque::from(script);
        connector
    }

    /// Number of connection attempts made so far.
    pub fn attempt_count(&self) -> usize {
        self.state.lock().unwrap().attempts.len()
    }

    /// URLs of all connection attempts, in order.
    pub fn attempted_urls(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.attempts.iter().map(|(url, _)| url.to_string()).collect()
    }

    /// Gaps between consecutive connection attempts.
    pub fn attempt_gaps(&self) -> Vec<Duration> {
        let state = self.state.lock().unwrap();
        state
            .attempts
            .windows(2)
            .map(|pair| pair[1].1 - pair[0].1)
            .collect()
    }

    /// Number of sessions opened so far.
    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    /// Handle to the `index`-th opened session.
    pub fn session(&self, index: usize) -> SessionHandle {
        self.state.lock().unwrap().sessions[index].clone()
    }

    /// Handle to the most recently opened session.
    pub fn last_session(&self) -> SessionHandle {
        self.state.lock().unwrap().sessions.last().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, url: &Url) -> Result<MockTransport, SocketError> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.attempts.push((url.clone(), Instant::now()));
            state.script.pop_front().unwrap_or(Outcome::Accept)
        };

        match outcome {
            Outcome::Accept => {
                let (transport, handle) = MockTransport::pair(url.clone());
                self.state.lock().unwrap().sessions.push(handle);
                Ok(transport)
            }
            Outcome::Refuse => Err(SocketError::Connect("connection refused".into())),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

// ── MockTransport ───────────────────────────────────────────────────

/// Channel-backed session. Events pushed through the matching
/// [`SessionHandle`] are returned by `recv()` in order.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<TransportEvent>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    recv_after_close: Arc<AtomicBool>,
}

impl MockTransport {
    fn pair(url: Url) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let recv_after_close = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: rx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
            recv_after_close: Arc::clone(&recv_after_close),
        };
        let handle = SessionHandle {
            url,
            tx,
            sent,
            closed,
            recv_after_close,
        };
        (transport, handle)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), SocketError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SocketError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        if self.closed.load(Ordering::SeqCst) {
            self.recv_after_close.store(true, Ordering::SeqCst);
        }
        match self.incoming.recv().await {
            Some(event) => event,
            // The handle lives in the connector for the whole test.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Server side of a [`MockTransport`].
#[derive(Clone)]
pub struct SessionHandle {
    pub url: Url,
    tx: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    recv_after_close: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Deliver a text frame to the client.
    pub fn push_text(&self, text: &str) {
        let _ = self.tx.send(TransportEvent::Text(text.to_string()));
    }

    /// Deliver a transport error to the client.
    pub fn push_error(&self, reason: &str) {
        let _ = self
            .tx
            .send(TransportEvent::Error(SocketError::TransportReceive(
                reason.to_string(),
            )));
    }

    /// End the session with the given close code.
    pub fn close_with(&self, code: u16) {
        let _ = self
            .tx
            .send(TransportEvent::Closed(CloseFrame::with_code(code, "")));
    }

    /// End the session abnormally (code 1006).
    pub fn drop_link(&self) {
        let _ = self
            .tx
            .send(TransportEvent::Closed(CloseFrame::abnormal("link lost")));
    }

    /// Messages the client transmitted on this session.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Whether the client closed this session.
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether the client read from this session after closing it.
    pub fn read_after_close(&self) -> bool {
        self.recv_after_close.load(Ordering::SeqCst)
    }
}

// ── Client helpers ──────────────────────────────────────────────────

/// Start a client whose handler forwards every payload into a channel.
pub fn start_client(
    connector: MockConnector,
    config: scantyx_live::SocketConfig,
) -> (SocketClient, mpsc::UnboundedReceiver<Payload>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let client = SocketClient::start(connector, config, move |payload| {
        let _ = tx.send(payload);
    });
    (client, rx)
}

/// Wait until the client's state satisfies `pred`, returning that state.
pub async fn wait_for_state(
    client: &SocketClient,
    mut pred: impl FnMut(&ConnectionState) -> bool,
) -> ConnectionState {
    let mut rx = client.watch_state();
    let waited = tokio::time::timeout(Duration::from_secs(3_600), rx.wait_for(|s| pred(s))).await;
    let state = *waited
        .expect("timed out waiting for state")
        .expect("driver stopped");
    state
}

/// Wait until the client reports an open session.
pub async fn wait_connected(client: &SocketClient) {
    let mut rx = client.watch_connected();
    tokio::time::timeout(Duration::from_secs(3_600), rx.wait_for(|c| *c))
        .await
        .expect("timed out waiting for connection")
        .expect("driver stopped");
}

/// Let the driver process queued commands and events.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
