//! Hub → Client events
//!
//! Typed forms of the inbound envelopes the client knows how to act on.
//! Deserialization is lenient (missing fields default) so minor hub-side
//! shape drift degrades gracefully; a command the enum does not know fails
//! typed parsing entirely and is handled by the dispatcher's raw fallback.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::outbound::ProgramContext;

/// One typed content block inside a `display_text` envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Block kind: `text_plain`, `text_block`, `text_to_apply`,
    /// `table_block`, `code_block`, `xml_block`, `image`, or anything newer
    #[serde(rename = "type")]
    pub block_type: String,
    /// Block payload; a string for text kinds, an object for tables etc.
    #[serde(default)]
    pub content: Value,
    /// Optional block title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ContentBlock {
    /// Block kinds the client renders natively
    pub const KNOWN_TYPES: [&'static str; 7] = [
        "text_plain",
        "text_block",
        "text_to_apply",
        "table_block",
        "code_block",
        "xml_block",
        "image",
    ];

    /// Whether this block kind is one the client renders natively
    #[must_use]
    pub fn is_known_type(&self) -> bool {
        Self::KNOWN_TYPES.contains(&self.block_type.as_str())
    }

    /// Whether the block carries HTML-ish markup rather than plain text
    #[must_use]
    pub fn is_html(&self) -> bool {
        matches!(
            self.block_type.as_str(),
            "text_block" | "text_to_apply" | "xml_block"
        )
    }
}

/// A workflow suggestion from `response_top_workflows`
///
/// The hub's exact shape is loosely specified; unrecognized fields are kept
/// in `extra` so nothing is lost between receive and render.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow identifier
    #[serde(default)]
    pub id: Option<i64>,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// File type the workflow applies to
    #[serde(default)]
    pub file_type: Option<String>,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// Any fields this client version does not know about
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Inbound envelopes the client acts on, tagged by `command`
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum InboundCommand {
    /// Answer to a single prompt (or a heartbeat echo when `message` is
    /// "pong")
    ResponseSingleGeneratedResponse {
        /// "success" or an error status
        #[serde(default)]
        status: String,
        /// Response text, error description, or "pong"
        #[serde(default)]
        message: String,
    },

    /// The hub's authoritative chat id assignment
    GenerateChatId {
        /// Assigned chat identifier
        chat_id: i64,
    },

    /// Structured content push; may be ambient (`chat_id == -1`) or bound to
    /// an existing chat
    DisplayText {
        /// Target chat; `-1` means ambient content that restarts the active
        /// session
        #[serde(default)]
        chat_id: i64,
        /// Typed content blocks, one chat message each
        #[serde(default)]
        texts: Vec<ContentBlock>,
        /// Program the content was captured from
        #[serde(default)]
        current_program: Option<ProgramContext>,
        /// Program the content should be applied to
        #[serde(default)]
        target_program: Option<ProgramContext>,
    },

    /// Workflow suggestions answering `request_top_workflows`
    ResponseTopWorkflows {
        /// Suggested workflows, best first
        #[serde(default)]
        workflows: Vec<Workflow>,
    },

    /// Program-context update with no renderable content
    ProgramContext {
        /// Program the user is currently working in
        #[serde(default)]
        current_program: Option<ProgramContext>,
        /// Program responses should be applied to
        #[serde(default)]
        target_program: Option<ProgramContext>,
    },

    /// Out-of-band generated response (older hub generation)
    NewGeneratedResponse {
        /// Response body
        #[serde(default)]
        content: Option<String>,
        /// Optional response title
        #[serde(default)]
        title: Option<String>,
    },

    /// Plain success response (older hub generation)
    ResponseSuccess {
        /// Response text
        #[serde(default)]
        response: String,
    },

    /// Plain failure response (older hub generation)
    ResponseFailure {
        /// Error description
        #[serde(default)]
        error: String,
    },
}

impl InboundCommand {
    /// Try to interpret a raw JSON value as a known inbound command
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}
