//! Wire Protocol
//!
//! JSON envelopes exchanged with the chat hub over a persistent connection.
//! Every envelope carries a `command` tag plus command-specific fields.
//!
//! - [`outbound`]: commands the client sends (`OutboundCommand`)
//! - [`inbound`]: events the hub pushes back (`InboundCommand`)
//!
//! Inbound parsing is deliberately lenient: only the commands the client
//! knows how to act on deserialize into [`InboundCommand`]; everything else
//! stays a raw [`serde_json::Value`] and flows through the dispatcher's
//! fallback rules so no data is ever silently lost.

pub mod inbound;
pub mod outbound;

pub use inbound::{ContentBlock, InboundCommand, Workflow};
pub use outbound::{OutboundCommand, ProgramContext};
