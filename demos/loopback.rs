//! # Loopback Demo
//!
//! Shows how to plug a custom [`Connector`] into [`SocketClient`] with an
//! in-process channel "server". The fake server drops the first session
//! abnormally, so the client's automatic reconnect is visible in the logs.
//!
//! ## Running
//!
//! ```sh
//! RUST_LOG=debug cargo run --example loopback
//! ```

use std::time::Duration;

use async_trait::async_trait;
use scantyx_live::{
    CloseFrame, Connector, SocketClient, SocketConfig, SocketError, Transport, TransportEvent,
};
use tokio::sync::mpsc;
use url::Url;

// ─────────────────────────────────────────────────────────────────────
// Step 1: a channel-backed transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of one loopback session.
struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Server half of one loopback session.
struct LoopbackSession {
    url: Url,
    rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), SocketError> {
        self.tx
            .send(message)
            .map_err(|e| SocketError::TransportSend(e.to_string()))
    }

    /// Cancel-safe because `UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> TransportEvent {
        match self.rx.recv().await {
            Some(event) => event,
            None => TransportEvent::Closed(CloseFrame::abnormal("server went away")),
        }
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: a connector that hands new sessions to the fake server
// ─────────────────────────────────────────────────────────────────────

struct LoopbackConnector {
    accepted: mpsc::UnboundedSender<LoopbackSession>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn connect(&self, url: &Url) -> Result<LoopbackTransport, SocketError> {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        self.accepted
            .send(LoopbackSession {
                url: url.clone(),
                rx: server_rx,
                tx: server_tx,
            })
            .map_err(|_| SocketError::Connect("loopback server stopped".into()))?;
        Ok(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: wire the client to the fake server
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
    let connector = LoopbackConnector {
        accepted: accepted_tx,
    };
    let config = SocketConfig::new()
        .with_origin("https://tickets.example")?
        .with_base_delay(Duration::from_millis(200));

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let mut client = SocketClient::start(connector, config, move |msg| {
        tracing::info!("client received {}", serde_json::Value::Object(msg.clone()));
        let _ = seen_tx.send(msg);
    });
    client.connect("/ws/events/42/reviews")?;

    // ── First session: one update, then the link drops ──────────────
    let Some(first) = accepted_rx.recv().await else {
        return Err("connector never called".into());
    };
    tracing::info!("server accepted {}", first.url);
    first
        .tx
        .send(TransportEvent::Text(r#"{"type":"REVIEW_ADDED","reviewId":1}"#.into()))?;
    seen_rx.recv().await;
    first
        .tx
        .send(TransportEvent::Closed(CloseFrame::abnormal("simulated outage")))?;

    // ── Second session: opened by the automatic reconnect ───────────
    let Some(mut second) = accepted_rx.recv().await else {
        return Err("client did not reconnect".into());
    };
    tracing::info!("server accepted reconnect to {}", second.url);

    let mut connected = client.watch_connected();
    connected.wait_for(|c| *c).await?;
    client.send(&serde_json::json!({ "type": "PING" }))?;
    if let Some(ping) = second.rx.recv().await {
        tracing::info!("server received {ping}");
        second.tx.send(TransportEvent::Text(r#"{"type":"PONG"}"#.into()))?;
        seen_rx.recv().await;
    }

    client.shutdown().await;
    tracing::info!("done");
    Ok(())
}
