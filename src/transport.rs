//! Transport abstraction for live push channels.
//!
//! Two seams separate the client from the wire:
//!
//! - [`Transport`] is one live session: a bidirectional channel of JSON text
//!   messages that reports errors and closes as distinct [`TransportEvent`]s.
//! - [`Connector`] opens a new [`Transport`] for a resolved URL. The client
//!   calls it once per connection attempt, including every automatic reconnect.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use scantyx_live::error::SocketError;
//! use scantyx_live::transport::{Connector, Transport, TransportEvent};
//! use url::Url;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), SocketError> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> TransportEvent {
//!         // Text, a non-fatal error, or the close that ends the session
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SocketError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&self, url: &Url) -> Result<MyTransport, SocketError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;
use url::Url;

use crate::error::SocketError;

/// Close code for a normal, intentional closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when a connection ends without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close information reported when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// WebSocket-style close code.
    pub code: u16,
    /// Optional human-readable reason supplied by the peer.
    pub reason: String,
}

impl CloseFrame {
    /// A normal closure (code 1000).
    pub fn normal() -> Self {
        Self {
            code: CLOSE_NORMAL,
            reason: String::new(),
        }
    }

    /// An abnormal closure (code 1006), used when the stream vanished.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: reason.into(),
        }
    }

    /// Build a close frame with an explicit code.
    pub fn with_code(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Returns `true` if this close was an intentional, normal closure.
    pub fn is_normal(&self) -> bool {
        self.code == CLOSE_NORMAL
    }
}

/// One event read from a live session.
#[derive(Debug)]
pub enum TransportEvent {
    /// A complete text message.
    Text(String),
    /// A transport-level error. The session stays up until a
    /// [`Closed`](TransportEvent::Closed) event follows.
    Error(SocketError),
    /// The session ended. No further events follow.
    Closed(CloseFrame),
}

/// A bidirectional text message transport: one live session.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations are
/// naturally cancel-safe.
///
/// # After Close
///
/// Once [`recv`](Transport::recv) has returned
/// [`TransportEvent::Closed`], the client never polls it again.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::TransportSend`] if the message could not be sent,
    /// or [`SocketError::TransportClosed`] if the session was already closed.
    async fn send(&mut self, message: String) -> Result<(), SocketError>;

    /// Receive the next event from the server.
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> TransportEvent;

    /// Close the session with a normal closure.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), SocketError>;
}

/// Opens new sessions for resolved socket URLs.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The session type produced by this connector.
    type Transport: Transport;

    /// Open a new session to `url`.
    ///
    /// # Errors
    ///
    /// Any error is treated by the client as a failed connection attempt and
    /// fed into the reconnection backoff.
    async fn connect(&self, url: &Url) -> Result<Self::Transport, SocketError>;
}
