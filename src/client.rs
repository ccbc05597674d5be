//! Resilient client for a single server-push subscription.
//!
//! [`SocketClient`] is a thin handle that talks to a background driver task
//! over an unbounded MPSC channel. The driver exclusively owns the live
//! session, the single pending reconnect timer and the retry counter, so every
//! state transition happens inside one `tokio::select!` loop.
//!
//! Inbound text frames are parsed as JSON objects and handed to the current
//! message handler. When the link drops with anything other than a normal
//! closure, the driver reconnects with capped exponential backoff until the
//! retry budget is spent.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = SocketConfig::new().with_origin("https://tickets.example")?;
//! let client = SocketClient::start(WebSocketConnector::new(), config, |msg| {
//!     if msg.get("type").and_then(|t| t.as_str()) == Some("REVIEW_ADDED") {
//!         refetch_reviews();
//!     }
//! });
//!
//! client.connect("/ws/events/42/reviews")?;
//! client.send(&serde_json::json!({ "type": "PING" }))?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::backoff::{Backoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES};
use crate::endpoint::{Endpoint, PageOrigin};
use crate::error::{Result, SocketError};
use crate::transport::{CloseFrame, Connector, Transport, TransportEvent};

/// Default bound on a single connection attempt.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on closing a superseded session.
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout for the graceful shutdown. Longer than the close timeout so
/// a hung close is given up on before the driver is aborted.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// A parsed inbound message: one JSON object.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Callback invoked with every parsed inbound message.
pub type MessageHandler = Arc<dyn Fn(Payload) + Send + Sync>;

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`SocketClient`].
///
/// # Example
///
/// ```
/// use scantyx_live::client::SocketConfig;
/// use std::time::Duration;
///
/// let config = SocketConfig::new()
///     .with_origin("https://tickets.example")
///     .unwrap()
///     .with_max_retries(3)
///     .with_base_delay(Duration::from_millis(500));
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Origin that path endpoints are resolved against. Without one only
    /// absolute endpoints resolve.
    pub origin: Option<PageOrigin>,
    /// Automatic reconnect attempts before giving up. Defaults to **5**.
    pub max_retries: u32,
    /// Delay before the first reconnect attempt. Defaults to **3 s**.
    pub base_delay: Duration,
    /// Ceiling for any reconnect delay. Defaults to **30 s**.
    pub max_delay: Duration,
    /// Bound on a single connection attempt; a timed-out attempt counts as a
    /// failed one. Defaults to **10 s**.
    pub connect_timeout: Duration,
    /// Bound on closing a session the client is tearing down. Defaults to **1 s**.
    pub close_timeout: Duration,
    /// Time [`SocketClient::shutdown`] waits for the driver before aborting it.
    /// Keep it above `close_timeout`. Defaults to **2 s**.
    pub shutdown_timeout: Duration,
}

impl SocketConfig {
    /// Create a configuration with default values and no page origin.
    pub fn new() -> Self {
        Self {
            origin: None,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the page origin from a URL such as `https://tickets.example`.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::InvalidOrigin`] if the origin cannot be parsed.
    pub fn with_origin(self, origin: &str) -> Result<Self> {
        Ok(self.with_page_origin(PageOrigin::parse(origin)?))
    }

    /// Set an already-parsed page origin.
    #[must_use]
    pub fn with_page_origin(mut self, origin: PageOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Set the automatic reconnect budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first reconnect attempt.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the ceiling for reconnect delays.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the bound on a single connection attempt.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the bound on closing a superseded session.
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Connection state ────────────────────────────────────────────────

/// Where the client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No endpoint, or the last session ended with a normal closure.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// A session is open.
    Open,
    /// The link dropped and a reconnect is pending.
    ReconnectScheduled {
        /// Attempt number of the pending reconnect, starting at 1.
        attempt: u32,
        /// Delay before the reconnect fires.
        delay: Duration,
    },
    /// The retry budget is spent. Only [`SocketClient::reconnect`] or a new
    /// endpoint leaves this state.
    Exhausted,
}

impl ConnectionState {
    /// Returns `true` while the client is working towards, or holding, a session.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Open | Self::ReconnectScheduled { .. }
        )
    }
}

// ── Client handle ───────────────────────────────────────────────────

enum Command {
    Connect(Option<Endpoint>),
    Send(String),
    Reconnect,
}

/// Handle to a resilient push-channel subscription.
///
/// Created via [`SocketClient::start`], which spawns the background driver.
/// All methods return immediately; their effects are observed through
/// [`is_connected`](Self::is_connected), [`state`](Self::state) and the
/// message handler.
pub struct SocketClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    handler: Arc<Mutex<MessageHandler>>,
    connected_rx: watch::Receiver<bool>,
    state_rx: watch::Receiver<ConnectionState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl SocketClient {
    /// Spawn the driver and return a handle. The client starts
    /// [`Idle`](ConnectionState::Idle); call [`connect`](Self::connect) to
    /// subscribe.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<C, F>(connector: C, config: SocketConfig, handler: F) -> Self
    where
        C: Connector,
        F: Fn(Payload) + Send + Sync + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (connected_tx, connected_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let handler: MessageHandler = Arc::new(handler);
        let handler = Arc::new(Mutex::new(handler));

        let driver = Driver {
            connector: Arc::new(connector),
            origin: config.origin,
            backoff: Backoff::new(config.base_delay, config.max_delay, config.max_retries),
            connect_timeout: config.connect_timeout,
            close_timeout: config.close_timeout,
            endpoint: None,
            target: None,
            session: None,
            attempt: None,
            timer: None,
            handler: Arc::clone(&handler),
            connected_tx,
            state_tx,
        };
        let task = tokio::spawn(driver.run(cmd_rx, shutdown_rx));

        Self {
            cmd_tx,
            handler,
            connected_rx,
            state_rx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Subscribe to `endpoint`.
    ///
    /// An empty descriptor tears down any active session and leaves the client
    /// idle. The same resolved URL as the active subscription is a no-op.
    /// Anything else tears down the current session and connects afresh.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Shutdown`] if the client has been shut down.
    pub fn connect(&self, endpoint: &str) -> Result<()> {
        self.command(Command::Connect(Endpoint::new(endpoint)))
    }

    /// Tear down any active session and forget the endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Shutdown`] if the client has been shut down.
    pub fn disconnect(&self) -> Result<()> {
        self.command(Command::Connect(None))
    }

    /// Serialize `message` to JSON and transmit it on the open session.
    ///
    /// Delivery is at most once: nothing is buffered while disconnected and a
    /// failed write is not retried.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::NotConnected`] if no session is open,
    /// [`SocketError::Serialization`] if `message` cannot be encoded, or
    /// [`SocketError::Shutdown`] if the client has been shut down.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        if !self.is_connected() {
            warn!("send while not connected, message dropped");
            return Err(SocketError::NotConnected);
        }
        let json = serde_json::to_string(message)?;
        self.command(Command::Send(json))
    }

    /// Reset the retry counter and reconnect immediately, whatever the
    /// current backoff state.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Shutdown`] if the client has been shut down.
    pub fn reconnect(&self) -> Result<()> {
        self.command(Command::Reconnect)
    }

    /// Replace the message handler. Messages dispatched after this call use
    /// `handler`.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(handler);
        *self.handler.lock() = handler;
    }

    /// Returns `true` while a session is open.
    pub fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    /// Subscribe to changes of the connected flag.
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected_rx.clone()
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to lifecycle state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Shut down the client: cancel any pending reconnect, close the session
    /// and stop the driver. No reconnect follows.
    pub async fn shutdown(&mut self) {
        debug!("SocketClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("socket driver terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("socket driver did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("socket driver aborted: {join_err}");
                    }
                }
            }
        }
    }

    fn command(&self, cmd: Command) -> Result<()> {
        if self.shutdown_tx.is_none() {
            return Err(SocketError::Shutdown);
        }
        self.cmd_tx.send(cmd).map_err(|_| SocketError::Shutdown)
    }
}

impl std::fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketClient")
            .field("state", &self.state())
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        // The driver tears down on its own, detached; `close_timeout` bounds
        // the close.
        if let Some(tx) = self.shutdown_tx.take() {
            debug!("SocketClient dropped, signalling driver shutdown");
            let _ = tx.send(());
        }
    }
}

// ── Driver ──────────────────────────────────────────────────────────

type Attempt<T> = Pin<Box<dyn Future<Output = Result<(Url, T)>> + Send>>;

struct Session<T> {
    id: Uuid,
    url: Url,
    transport: T,
}

/// Owns the session, timer and retry state of one client.
struct Driver<C: Connector> {
    connector: Arc<C>,
    origin: Option<PageOrigin>,
    backoff: Backoff,
    connect_timeout: Duration,
    close_timeout: Duration,
    endpoint: Option<Endpoint>,
    /// URL of the most recent attempt against `endpoint`.
    target: Option<Url>,
    session: Option<Session<C::Transport>>,
    attempt: Option<Attempt<C::Transport>>,
    timer: Option<Pin<Box<Sleep>>>,
    handler: Arc<Mutex<MessageHandler>>,
    connected_tx: watch::Sender<bool>,
    state_tx: watch::Sender<ConnectionState>,
}

impl<C: Connector> Driver<C> {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!("socket driver started");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    break;
                }

                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("command channel closed, stopping driver");
                        break;
                    };
                    self.handle_command(cmd).await;
                }

                result = next_attempt_result(&mut self.attempt) => {
                    self.attempt = None;
                    self.on_attempt_finished(result);
                }

                () = next_timer_tick(&mut self.timer) => {
                    self.timer = None;
                    debug!(attempt = self.backoff.attempts(), "reconnect timer fired");
                    self.start_attempt();
                }

                event = next_transport_event(&mut self.session) => {
                    self.on_transport_event(event);
                }
            }
        }

        self.teardown().await;
        self.set_state(ConnectionState::Idle);
        debug!("socket driver exited");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(None) => {
                debug!("endpoint cleared");
                self.teardown().await;
                self.endpoint = None;
                self.target = None;
                self.backoff.reset();
                self.set_state(ConnectionState::Idle);
            }
            Command::Connect(Some(endpoint)) => {
                if self.is_current(&endpoint) {
                    debug!(endpoint = %endpoint, "already subscribed, ignoring connect");
                    return;
                }
                debug!(endpoint = %endpoint, "endpoint changed");
                self.teardown().await;
                self.endpoint = Some(endpoint);
                self.target = None;
                self.backoff.reset();
                self.start_attempt();
            }
            Command::Reconnect => {
                if self.endpoint.is_none() {
                    debug!("reconnect requested without an endpoint, ignoring");
                    return;
                }
                debug!("explicit reconnect requested");
                self.teardown().await;
                self.backoff.reset();
                self.start_attempt();
            }
            Command::Send(json) => {
                let Some(session) = self.session.as_mut() else {
                    warn!("session closed before send, message dropped");
                    return;
                };
                if let Err(e) = session.transport.send(json).await {
                    warn!(session = %session.id, error = %e, "send failed, message dropped");
                }
            }
        }
    }

    /// Whether `endpoint` names the subscription the driver already holds or
    /// is working towards.
    fn is_current(&self, endpoint: &Endpoint) -> bool {
        let state = *self.state_tx.borrow();
        if !state.is_active() && state != ConnectionState::Exhausted {
            return false;
        }
        if self.endpoint.as_ref() == Some(endpoint) {
            return true;
        }
        match (endpoint.resolve(self.origin.as_ref()), self.target.as_ref()) {
            (Ok(url), Some(target)) => url == *target,
            _ => false,
        }
    }

    fn start_attempt(&mut self) {
        let Some(endpoint) = self.endpoint.as_ref() else {
            self.set_state(ConnectionState::Idle);
            return;
        };

        let url = match endpoint.resolve(self.origin.as_ref()) {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "cannot resolve endpoint");
                self.connection_lost();
                return;
            }
        };

        debug!(url = %url, attempt = self.backoff.attempts(), "opening session");
        self.target = Some(url.clone());
        self.set_state(ConnectionState::Connecting);

        let connector = Arc::clone(&self.connector);
        let connect_timeout = self.connect_timeout;
        self.attempt = Some(Box::pin(async move {
            let transport = tokio::time::timeout(connect_timeout, connector.connect(&url))
                .await
                .map_err(|_| SocketError::Timeout)??;
            Ok::<_, SocketError>((url, transport))
        }));
    }

    fn on_attempt_finished(&mut self, result: Result<(Url, C::Transport)>) {
        match result {
            Ok((url, transport)) => {
                let id = Uuid::new_v4();
                info!(session = %id, url = %url, "session open");
                self.session = Some(Session { id, url, transport });
                self.backoff.reset();
                self.set_connected(true);
                self.set_state(ConnectionState::Open);
            }
            Err(e) => {
                error!(error = %e, "connection attempt failed");
                self.connection_lost();
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Text(text) => self.dispatch(&text),
            TransportEvent::Error(e) => {
                let session = self.session.as_ref().map(|s| s.id);
                warn!(session = ?session, error = %e, "transport error");
            }
            TransportEvent::Closed(close) => {
                let session = self.session.take();
                self.set_connected(false);
                self.on_closed(session.map(|s| s.id), &close);
            }
        }
    }

    fn on_closed(&mut self, session: Option<Uuid>, close: &CloseFrame) {
        if close.is_normal() {
            debug!(session = ?session, code = close.code, "session closed normally");
            self.set_state(ConnectionState::Idle);
            return;
        }
        warn!(
            session = ?session,
            code = close.code,
            reason = %close.reason,
            "session closed unexpectedly"
        );
        self.connection_lost();
    }

    /// Single place where reconnects are scheduled.
    fn connection_lost(&mut self) {
        self.timer = None;
        self.set_connected(false);

        match self.backoff.next_delay() {
            Some(delay) => {
                let attempt = self.backoff.attempts();
                debug!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "scheduling reconnect"
                );
                self.timer = Some(Box::pin(tokio::time::sleep(delay)));
                self.set_state(ConnectionState::ReconnectScheduled { attempt, delay });
            }
            None => {
                warn!(
                    attempts = self.backoff.attempts(),
                    "reconnect budget exhausted, giving up"
                );
                self.set_state(ConnectionState::Exhausted);
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<Payload>(text) {
            Ok(payload) => {
                let handler = Arc::clone(&*self.handler.lock());
                handler(payload);
            }
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping unparsable message");
            }
        }
    }

    /// Cancel the timer and any in-flight attempt, then detach and close the
    /// session. Nothing from the superseded session is read afterwards.
    async fn teardown(&mut self) {
        self.timer = None;
        self.attempt = None;
        self.set_connected(false);

        let Some(mut session) = self.session.take() else {
            return;
        };
        debug!(session = %session.id, url = %session.url, "closing session");
        match tokio::time::timeout(self.close_timeout, session.transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(session = %session.id, error = %e, "close failed"),
            Err(_) => warn!(session = %session.id, "close timed out"),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected_tx.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}

async fn next_attempt_result<T>(attempt: &mut Option<Attempt<T>>) -> Result<(Url, T)> {
    match attempt {
        Some(fut) => fut.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_timer_tick(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_transport_event<T: Transport>(session: &mut Option<Session<T>>) -> TransportEvent {
    match session {
        Some(session) => session.transport.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SocketConfig::new();
        assert!(config.origin.is_none());
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay, Duration::from_millis(3_000));
        assert_eq!(config.max_delay, Duration::from_millis(30_000));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.close_timeout, Duration::from_secs(1));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
        assert!(config.shutdown_timeout > config.close_timeout);
    }

    #[test]
    fn config_builder_methods() {
        let config = SocketConfig::new()
            .with_origin("http://localhost:5173")
            .unwrap()
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(40))
            .with_connect_timeout(Duration::from_secs(2))
            .with_close_timeout(Duration::from_millis(20))
            .with_shutdown_timeout(Duration::from_secs(5));
        assert!(!config.origin.as_ref().unwrap().is_secure());
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_delay, Duration::from_millis(10));
        assert_eq!(config.max_delay, Duration::from_millis(40));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.close_timeout, Duration::from_millis(20));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn config_rejects_bad_origin() {
        let err = SocketConfig::new().with_origin("mailto:ops@example.com").unwrap_err();
        assert!(matches!(err, SocketError::InvalidOrigin { .. }));
    }

    #[test]
    fn active_states() {
        assert!(!ConnectionState::Idle.is_active());
        assert!(!ConnectionState::Exhausted.is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Open.is_active());
        assert!(ConnectionState::ReconnectScheduled {
            attempt: 1,
            delay: Duration::from_secs(3),
        }
        .is_active());
    }

    #[test]
    fn socket_client_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SocketClient>();
    }
}
