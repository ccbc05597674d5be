//! # Scantyx Live
//!
//! Resilient push-channel client for the Scantyx ticketing platform.
//!
//! A [`SocketClient`] holds one logical subscription to a server-push channel
//! (for example, live review updates for an event page). It resolves a logical
//! [`Endpoint`] against the page origin, opens the transport, hands every
//! inbound JSON object to a caller-supplied handler, and reconnects with capped
//! exponential backoff when the link drops unexpectedly.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **WebSocket built-in**: default `transport-websocket` feature provides
//!   `WebSocketConnector`
//! - **Observable**: connection flag and lifecycle state via `tokio::sync::watch`
//! - **Panic-free**: failures are logged and folded into the reconnection state machine
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn example() -> Result<(), scantyx_live::SocketError> {
//! use scantyx_live::{SocketClient, SocketConfig, WebSocketConnector};
//!
//! let config = SocketConfig::new().with_origin("https://tickets.example")?;
//! let client = SocketClient::start(WebSocketConnector::new(), config, |msg| {
//!     println!("live update: {msg:?}");
//! });
//! client.connect("/ws/events/42/reviews")?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use backoff::Backoff;
pub use client::{ConnectionState, MessageHandler, Payload, SocketClient, SocketConfig};
pub use endpoint::{Endpoint, PageOrigin};
pub use error::SocketError;
pub use transport::{CloseFrame, Connector, Transport, TransportEvent};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
