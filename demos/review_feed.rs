//! # Review Feed Demo
//!
//! Subscribes to the live review channel of one event page and re-fetches the
//! review list whenever the server announces a change.
//!
//! ## Running
//!
//! ```sh
//! # Start the Scantyx API on localhost:4000, then:
//! cargo run --example review_feed
//!
//! # Override the page origin or the event:
//! SCANTYX_ORIGIN=https://tickets.example SCANTYX_EVENT=42 cargo run --example review_feed
//! ```

use scantyx_live::{ConnectionState, SocketClient, SocketConfig, WebSocketConnector};

/// Default page origin when `SCANTYX_ORIGIN` is not set.
const DEFAULT_ORIGIN: &str = "http://localhost:4000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let origin = std::env::var("SCANTYX_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());
    let event_id = std::env::var("SCANTYX_EVENT").unwrap_or_else(|_| "1".to_string());
    let config = SocketConfig::new().with_origin(&origin)?;

    // ── Subscribe ───────────────────────────────────────────────────
    let (refetch_tx, mut refetch_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let mut client = SocketClient::start(WebSocketConnector::new(), config, move |msg| {
        let kind = msg.get("type").and_then(|t| t.as_str()).unwrap_or_default();
        match kind {
            "REVIEW_ADDED" | "REVIEW_UPDATED" | "REVIEW_DELETED" => {
                let _ = refetch_tx.send(kind.to_string());
            }
            other => tracing::debug!("ignoring {other:?} message"),
        }
    });
    client.connect(&format!("/ws/events/{event_id}/reviews"))?;

    let mut state_rx = client.watch_state();

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            Some(kind) = refetch_rx.recv() => {
                tracing::info!("{kind}: re-fetching reviews for event {event_id}");
            }

            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                match state {
                    ConnectionState::Open => tracing::info!("live updates on"),
                    ConnectionState::ReconnectScheduled { attempt, delay } => {
                        tracing::warn!("link lost, retry #{attempt} in {delay:?}");
                    }
                    ConnectionState::Exhausted => {
                        tracing::error!("live updates unavailable; retrying from scratch");
                        client.reconnect()?;
                    }
                    ConnectionState::Idle | ConnectionState::Connecting => {}
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
