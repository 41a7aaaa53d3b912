//! WebSocket Transport
//!
//! Direct socket to the chat hub endpoint. Envelopes travel as text frames;
//! the split sink/stream halves keep `send` and `recv` independently
//! awaitable from the connection manager's select loop.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client transport
pub struct WebSocketTransport {
    /// Hub endpoint, e.g. `ws://127.0.0.1:8080/chatHub`
    url: String,
    /// Write half, present while connected
    sink: Option<SplitSink<WsStream, Message>>,
    /// Read half, present while connected
    stream: Option<SplitStream<WsStream>>,
}

impl WebSocketTransport {
    /// Create a transport for the given hub URL (not yet connected)
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sink: None,
            stream: None,
        }
    }

    /// The hub endpoint this transport dials
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn drop_halves(&mut self) {
        self.sink = None;
        self.stream = None;
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        // A stale half from a dead connection must not survive a redial.
        self.drop_halves();

        let (ws, _response) = connect_async(&self.url).await.map_err(|e| {
            TransportError::ConnectionFailed(format!("failed to connect to {}: {}", self.url, e))
        })?;

        let (sink, stream) = ws.split();
        self.sink = Some(sink);
        self.stream = Some(stream);

        tracing::info!(url = %self.url, "connected to chat hub");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                tracing::debug!(error = %e, "close frame not delivered");
            }
        }
        self.stream = None;

        tracing::info!("disconnected from chat hub");
        Ok(())
    }

    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let sink = self.sink.as_mut().ok_or_else(|| {
            TransportError::InvalidState("transport not connected".to_string())
        })?;

        sink.send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<String, TransportError> {
        loop {
            let next = match self.stream.as_mut() {
                Some(stream) => stream.next().await,
                None => {
                    return Err(TransportError::InvalidState(
                        "transport not connected".to_string(),
                    ))
                }
            };

            match next {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(text),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping non-UTF-8 binary frame");
                    }
                },
                // Protocol-level frames carry no envelope
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    self.drop_halves();
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "websocket read error");
                    self.drop_halves();
                    return Err(TransportError::ConnectionClosed);
                }
                None => {
                    self.drop_halves();
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.sink.is_some() && self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_refused_reports_connection_failed() {
        // Port 9 (discard) is virtually never listening locally.
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:9/chatHub");
        let result = transport.connect().await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn send_before_connect_is_invalid_state() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:9/chatHub");
        let result = transport.send("{}").await;
        assert!(matches!(result, Err(TransportError::InvalidState(_))));
    }
}
