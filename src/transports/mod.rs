//! Transport implementations for live push channels.
//!
//! This module provides concrete [`Transport`](crate::Transport) and
//! [`Connector`](crate::Connector) implementations behind feature gates:
//!
//! | Feature                | Transport              | Connector              |
//! |------------------------|------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] | [`WebSocketConnector`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), scantyx_live::SocketError> {
//! use scantyx_live::{Transport, TransportEvent, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:4000/ws/reviews").await?;
//! ws.send(r#"{"type":"PING"}"#.to_string()).await?;
//!
//! if let TransportEvent::Text(msg) = ws.recv().await {
//!     println!("server said: {msg}");
//! }
//!
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
