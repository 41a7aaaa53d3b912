//! Overlay Core - Headless Chat-Overlay Client for overlay-chat
//!
//! This crate provides the connection, protocol, and session logic of the
//! overlay chat client, completely independent of any UI framework. It can
//! drive a terminal shell, a desktop overlay, or run headless for
//! testing/automation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      UI Surfaces                          │
//! │   ┌──────────┐   ┌───────────┐   ┌────────────────────┐  │
//! │   │  Shell   │   │  Overlay  │   │      Headless      │  │
//! │   │ (stdin)  │   │  window   │   │                    │  │
//! │   └────┬─────┘   └─────┬─────┘   └─────────┬──────────┘  │
//! │        └───────────────┴───────────────────┘             │
//! │                        │                                 │
//! │               ChatClient (facade)                        │
//! └────────────────────────┼─────────────────────────────────┘
//!                          │
//! ┌────────────────────────┼─────────────────────────────────┐
//! │                   OVERLAY CORE                           │
//! │  ┌──────────────┐  ┌────────────┐  ┌──────────────────┐  │
//! │  │  Connection  │  │ Dispatcher │  │    ChatStore     │  │
//! │  │   Manager    │──│            │──│   (+ persist)    │  │
//! │  └──────┬───────┘  └────────────┘  └──────────────────┘  │
//! │         │ Transport trait                                │
//! │  ┌──────┴──────────┐  ┌─────────────────────┐            │
//! │  │ WebSocket       │  │ In-process (tests)  │            │
//! │  └─────────────────┘  └─────────────────────┘            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatClient`]: The facade a UI talks to
//! - [`ConnectionManager`]: Reconnect/backoff/keep-alive state machine
//! - [`ChatStore`]: Sessions, messages, waiting flag
//! - [`OutboundCommand`] / [`InboundCommand`]: The tagged wire protocol
//! - [`Transport`]: Pluggable frame transport
//!
//! # Quick Start
//!
//! ```ignore
//! use overlay_core::{ChatClient, ClientConfig, WebSocketTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::load();
//!     let transport = WebSocketTransport::new(&config.hub_url);
//!     let mut client = ChatClient::new(transport, config);
//!
//!     client.connect().await?;
//!     client.send_prompt("summarize the open sheet", "").await?;
//!
//!     loop {
//!         let outcome = client.next_event().await?;
//!         // Render the outcome / the updated store
//!         let _ = outcome;
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`client`]: High-level client facade and chat-id negotiation
//! - [`config`]: TOML + environment configuration
//! - [`connection`]: Connect/reconnect state machine, keep-alive, pending slot
//! - [`dispatch`]: Inbound frame routing and display fallbacks
//! - [`protocol`]: Tagged command envelopes, both directions
//! - [`session`]: Chat sessions and the message store
//! - [`store`]: Pluggable session persistence
//! - [`transport`]: Frame transports (WebSocket, in-process)
//!
//! # No UI Dependencies
//!
//! This crate has **zero** dependencies on any rendering or windowing
//! framework. It's pure client logic that can be used anywhere.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;

// Re-exports for convenience
pub use client::{ChatClient, ClientError, REQUEST_TYPE_SINGLE};
pub use config::{default_config_path, ClientConfig, ConfigError};
pub use connection::{
    ConnectionError, ConnectionEvent, ConnectionManager, ConnectionState, PING_FRAME,
};
pub use dispatch::{dispatch, DispatchOutcome};
pub use protocol::{ContentBlock, InboundCommand, OutboundCommand, ProgramContext, Workflow};
pub use session::{ChatMessage, ChatSession, ChatStore};
pub use store::{JsonFileStore, MemoryStore, SessionStore, StoreError};
pub use transport::{InProcessPeer, InProcessTransport, Transport, TransportError};

// WebSocket transport is feature-gated
#[cfg(feature = "websocket")]
pub use transport::WebSocketTransport;
