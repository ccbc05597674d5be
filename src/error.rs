//! Error types for the live socket client.

use thiserror::Error;

/// Errors that can occur when using the live socket client.
///
/// None of these escape the background driver as panics: failures while
/// connecting or reading are logged and folded into the reconnection state
/// machine. Only caller-facing operations such as
/// [`SocketClient::send`](crate::SocketClient::send) return them directly.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The endpoint descriptor could not be resolved to a socket URL.
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// The descriptor as supplied by the caller.
        endpoint: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The page origin used for resolving relative endpoints is unusable.
    #[error("invalid page origin {origin:?}: {reason}")]
    InvalidOrigin {
        /// The origin as supplied by the caller.
        origin: String,
        /// Why the origin was rejected.
        reason: String,
    },

    /// Opening a new transport session failed.
    #[error("connect error: {0}")]
    Connect(String),

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was already closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an open session, but none is open.
    #[error("not connected to server")]
    NotConnected,

    /// The client has been shut down and no longer accepts commands.
    #[error("client has been shut down")]
    Shutdown,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for live socket operations.
pub type Result<T> = std::result::Result<T, SocketError>;
