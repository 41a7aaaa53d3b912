//! Transport Layer
//!
//! Abstraction over the physical connection to the chat hub:
//!
//! - [`WebSocketTransport`]: direct socket to the hub endpoint (feature
//!   `websocket`, on by default)
//! - [`InProcessTransport`]: channel pair for embedded use and tests
//!
//! The connection manager is written against the narrow [`Transport`] trait
//! so concrete transports are swappable; a host process proxying the socket
//! on the client's behalf is just another implementation of the same
//! contract. Frames are the raw JSON envelope text; the transport never
//! interprets them.

use async_trait::async_trait;
use thiserror::Error;

pub mod in_process;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use in_process::{InProcessPeer, InProcessTransport};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

/// Errors surfaced by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish the connection
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A frame could not be delivered
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The peer closed the connection
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation not valid in the current transport state
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// A bidirectional frame pipe to the chat hub
///
/// `recv` returning [`TransportError::ConnectionClosed`] is the close
/// callback; any other `recv`/`send` error is the error callback. Both are
/// recoverable from the connection manager's point of view.
#[async_trait]
pub trait Transport: Send {
    /// Establish the connection
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear the connection down gracefully
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Deliver one outbound frame
    async fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Wait for the next inbound frame
    async fn recv(&mut self) -> Result<String, TransportError>;

    /// Whether the transport currently believes it is connected
    fn is_connected(&self) -> bool;
}
