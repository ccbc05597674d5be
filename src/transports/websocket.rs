//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! This module provides [`WebSocketTransport`], a [`Transport`] over a single
//! WebSocket connection, and [`WebSocketConnector`], the [`Connector`] the
//! client uses to open one per connection attempt. Both `ws://` and `wss://`
//! URLs are supported; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is enabled
//! (it is enabled by default).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use crate::error::SocketError;
use crate::transport::{CloseFrame, Connector, Transport, TransportEvent};

/// Type alias for the underlying WebSocket stream.
///
/// Made public so that callers can construct a [`WebSocketTransport`] from an
/// existing stream via [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] implementation backed by a WebSocket connection.
///
/// # Close reporting
///
/// A close frame from the server is reported with its code and reason. A
/// stream that ends without a close frame, or that fails with an error, is
/// reported as an abnormal closure (code 1006) on the following
/// [`recv`](Transport::recv).
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method is cancel-safe.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
    failed: Option<String>,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Io`] if the connection cannot be established.
    /// When the underlying error is an I/O error its
    /// [`ErrorKind`](std::io::ErrorKind) is preserved; all other errors are
    /// mapped to [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, SocketError> {
        tracing::debug!(url = %url, "connecting to WebSocket server");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            SocketError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "WebSocket connection established");

        Ok(Self::from_stream(stream))
    }

    /// Create a [`WebSocketTransport`] from an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
            failed: None,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), SocketError> {
        if self.closed {
            return Err(SocketError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| SocketError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> TransportEvent {
        if let Some(reason) = self.failed.take() {
            self.closed = true;
            return TransportEvent::Closed(CloseFrame::abnormal(reason));
        }

        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    // tungstenite errors are terminal for the stream; report the
                    // error now and the abnormal close on the next call.
                    let reason = e.to_string();
                    self.failed = Some(reason.clone());
                    return TransportEvent::Error(SocketError::TransportReceive(reason));
                }
                None => {
                    self.closed = true;
                    return TransportEvent::Closed(CloseFrame::abnormal("stream ended"));
                }
            };

            match msg {
                Message::Text(text) => return TransportEvent::Text(text.to_string()),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    self.closed = true;
                    let close = match frame {
                        Some(frame) => {
                            CloseFrame::with_code(u16::from(frame.code), frame.reason.as_str())
                        }
                        // A close frame without a payload carries no status code.
                        None => CloseFrame::with_code(1005, ""),
                    };
                    return TransportEvent::Closed(close);
                }
                Message::Ping(_) => {
                    tracing::trace!("received WebSocket ping (auto-pong handled by tungstenite)");
                }
                Message::Pong(_) => {
                    tracing::trace!("received WebSocket pong (ignored)");
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| SocketError::TransportSend(e.to_string()))
    }
}

/// [`Connector`] that opens a [`WebSocketTransport`] per connection attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, url: &Url) -> Result<WebSocketTransport, SocketError> {
        WebSocketTransport::connect(url.as_str()).await
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
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
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, SocketError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, SocketError::Io(_)));
    }

    // ── Mock-server helpers ─────────────────────────────────────────────

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn recv_receives_text_in_order() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":"REVIEW_ADDED"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"REVIEW_DELETED"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();

        let TransportEvent::Text(first) = transport.recv().await else {
            panic!("expected text");
        };
        assert_eq!(first, r#"{"type":"REVIEW_ADDED"}"#);

        let TransportEvent::Text(second) = transport.recv().await else {
            panic!("expected text");
        };
        assert_eq!(second, r#"{"type":"REVIEW_DELETED"}"#);
    }

    #[tokio::test]
    async fn normal_close_frame_reports_code_1000() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(Some(WsCloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            }))
            .await
            .unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        match transport.recv().await {
            TransportEvent::Closed(close) => {
                assert!(close.is_normal());
                assert_eq!(close.reason, "bye");
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn going_away_close_is_not_normal() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(Some(WsCloseFrame {
                code: CloseCode::Away,
                reason: "restarting".into(),
            }))
            .await
            .unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        match transport.recv().await {
            TransportEvent::Closed(close) => {
                assert!(!close.is_normal());
                assert_eq!(close.code, 1001);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_connection_reports_abnormal_close() {
        let url = start_mock_server(|ws| async move {
            drop(ws);
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();

        // Depending on timing tungstenite reports either a reset error first
        // or an ended stream; both must end in a non-normal close.
        let close = loop {
            match transport.recv().await {
                TransportEvent::Closed(close) => break close,
                TransportEvent::Error(_) => continue,
                TransportEvent::Text(text) => panic!("unexpected text {text:?}"),
            }
        };
        assert!(!close.is_normal());
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();

        let TransportEvent::Text(msg) = transport.recv().await else {
            panic!("expected text");
        };
        assert_eq!(msg, "after_binary");
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, SocketError::TransportClosed));
    }

    #[tokio::test]
    async fn double_close_is_idempotent() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn connector_opens_echo_session() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let url = Url::parse(&url).unwrap();
        let mut transport = WebSocketConnector::new().connect(&url).await.unwrap();
        transport.send(r#"{"type":"PING"}"#.to_string()).await.unwrap();

        let TransportEvent::Text(msg) = transport.recv().await else {
            panic!("expected text");
        };
        assert_eq!(msg, r#"{"type":"PING"}"#);
    }
}
