//! Client → Hub commands
//!
//! All outbound traffic is a JSON object tagged by `command`, carrying at
//! minimum the chat id (the heartbeat is the one bodiless exception).

use serde::{Deserialize, Serialize};

/// Context describing a program the chat is attached to (the document or
/// application the assistant is being asked about).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgramContext {
    /// Host-assigned program identifier
    pub id: i64,
    /// Program kind, e.g. "excel", "word"
    #[serde(rename = "type")]
    pub program_type: String,
    /// Free-form content snapshot of the program
    #[serde(default)]
    pub context: String,
}

/// Commands sent from the client to the chat hub
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum OutboundCommand {
    /// Ask the hub to assign (or confirm) a chat identifier
    GenerateChatId {
        /// Provisional client-side chat id proposed to the hub
        chat_id: i64,
        /// ISO-8601 timestamp of when the id was generated
        generated_timestamp: String,
    },

    /// Submit a user prompt for a generated response
    SendUserPrompt {
        /// Chat the prompt belongs to
        chat_id: i64,
        /// The user's prompt text
        prompt: String,
        /// Request class understood by the hub (1 = single response)
        request_type: u32,
        /// Optional human-readable description of the request
        #[serde(default)]
        description: String,
        /// Program the user is currently working in
        #[serde(skip_serializing_if = "Option::is_none")]
        current_program: Option<ProgramContext>,
        /// Program the response should be applied to
        #[serde(skip_serializing_if = "Option::is_none")]
        target_program: Option<ProgramContext>,
    },

    /// Apply the last generated response to the target program
    ApplyResponse {
        /// Chat whose response should be applied
        chat_id: i64,
    },

    /// Cancel the last generated response
    CancelResponse {
        /// Chat whose response should be cancelled
        chat_id: i64,
    },

    /// Request the top workflow suggestions for a file type
    RequestTopWorkflows {
        /// Chat the workflows are requested for
        chat_id: i64,
        /// File type to suggest workflows for
        file_type: String,
    },

    /// Select one of the suggested workflows
    SelectWorkflow {
        /// Chat the selection belongs to
        chat_id: i64,
        /// File type the workflow operates on
        file_type: String,
        /// Program the workflow should target
        #[serde(skip_serializing_if = "Option::is_none")]
        target_program: Option<ProgramContext>,
    },

    /// Keep-alive heartbeat; no body required
    Ping,
}

impl OutboundCommand {
    /// The chat id this command is bound to, if it carries one
    #[must_use]
    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Self::GenerateChatId { chat_id, .. }
            | Self::SendUserPrompt { chat_id, .. }
            | Self::ApplyResponse { chat_id }
            | Self::CancelResponse { chat_id }
            | Self::RequestTopWorkflows { chat_id, .. }
            | Self::SelectWorkflow { chat_id, .. } => Some(*chat_id),
            Self::Ping => None,
        }
    }
}
