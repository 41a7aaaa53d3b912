//! In-Process Transport
//!
//! Channel-backed transport pair for embedded mode and tests. The client
//! side implements [`Transport`]; the [`InProcessPeer`] plays the hub:
//! feed it frames, observe what the client sent, close it to simulate the
//! hub dropping the connection.
//!
//! Once the peer closes the channel the pair cannot be reconnected; tests
//! that exercise reconnection script their own transport instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Transport, TransportError};

/// Client half of the in-process pair
pub struct InProcessTransport {
    /// Frames the client sends, readable from the peer
    outbound_tx: mpsc::UnboundedSender<String>,
    /// Frames the peer pushed to the client
    inbound_rx: mpsc::UnboundedReceiver<String>,
    /// Shared connection flag
    connected: Arc<AtomicBool>,
}

/// Hub half of the in-process pair
pub struct InProcessPeer {
    /// Push a frame to the client
    inbound_tx: Option<mpsc::UnboundedSender<String>>,
    /// Frames the client sent
    outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Shared connection flag
    connected: Arc<AtomicBool>,
}

impl InProcessTransport {
    /// Create a connected transport/peer pair
    #[must_use]
    pub fn new_pair() -> (Self, InProcessPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let transport = Self {
            outbound_tx,
            inbound_rx,
            connected: Arc::clone(&connected),
        };
        let peer = InProcessPeer {
            inbound_tx: Some(inbound_tx),
            outbound_rx,
            connected,
        };
        (transport, peer)
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.outbound_tx.is_closed() {
            return Err(TransportError::ConnectionFailed(
                "peer has gone away".to_string(),
            ));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidState(
                "transport not connected".to_string(),
            ));
        }
        self.outbound_tx
            .send(frame.to_string())
            .map_err(|_| TransportError::SendFailed("channel closed".to_string()))
    }

    async fn recv(&mut self) -> Result<String, TransportError> {
        match self.inbound_rx.recv().await {
            Some(frame) => Ok(frame),
            None => {
                self.connected.store(false, Ordering::SeqCst);
                Err(TransportError::ConnectionClosed)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl InProcessPeer {
    /// Push an inbound frame to the client
    ///
    /// Returns false if the client side has been dropped.
    pub fn push_frame(&self, frame: impl Into<String>) -> bool {
        match &self.inbound_tx {
            Some(tx) => tx.send(frame.into()).is_ok(),
            None => false,
        }
    }

    /// Wait for the next frame the client sent
    pub async fn next_sent(&mut self) -> Option<String> {
        self.outbound_rx.recv().await
    }

    /// Non-blocking variant of [`next_sent`](Self::next_sent)
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.outbound_rx.try_recv().ok()
    }

    /// Simulate the hub dropping the connection
    pub fn close(&mut self) {
        self.inbound_tx = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip_both_directions() {
        let (mut transport, mut peer) = InProcessTransport::new_pair();
        assert!(transport.is_connected());

        transport.send(r#"{"command":"ping"}"#).await.unwrap();
        assert_eq!(peer.next_sent().await.unwrap(), r#"{"command":"ping"}"#);

        assert!(peer.push_frame(r#"{"message":"hi"}"#));
        assert_eq!(transport.recv().await.unwrap(), r#"{"message":"hi"}"#);
    }

    #[tokio::test]
    async fn peer_close_surfaces_connection_closed() {
        let (mut transport, mut peer) = InProcessTransport::new_pair();
        peer.close();

        let result = transport.recv().await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn send_after_disconnect_fails() {
        let (mut transport, _peer) = InProcessTransport::new_pair();
        transport.disconnect().await.unwrap();

        let result = transport.send("{}").await;
        assert!(matches!(result, Err(TransportError::InvalidState(_))));

        transport.connect().await.unwrap();
        assert!(transport.is_connected());
    }
}
