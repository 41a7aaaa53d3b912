//! Chat Sessions
//!
//! The mutable transcript the dispatcher writes into: sessions, their
//! append-only message lists, the active chat id, and the waiting flag the
//! UI uses for its loading indicator.
//!
//! Messages are append-only; the single allowed mutation after creation is
//! clearing the transient `is_new` flag once the UI has animated the
//! message in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{ContentBlock, ProgramContext, Workflow};
use crate::store::SessionStore;

/// One message in a chat transcript
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display text (may be empty for purely structured content)
    pub text: String,
    /// Whether the user wrote this message
    pub is_user: bool,
    /// Chat the message belongs to
    pub chat_id: i64,
    /// When the message was appended
    pub timestamp: DateTime<Utc>,
    /// Content-type tag for the renderer (`table_block`, `error`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Structured payload for non-plain content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Whether `text` carries markup rather than plain text
    #[serde(default)]
    pub is_html: bool,
    /// Optional message title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Cleared by the UI once the entry animation finished
    #[serde(default)]
    pub is_new: bool,
}

impl ChatMessage {
    /// A message written by the user
    #[must_use]
    pub fn user(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: true,
            chat_id,
            timestamp: Utc::now(),
            content_type: None,
            content: None,
            is_html: false,
            title: None,
            is_new: true,
        }
    }

    /// An assistant message
    #[must_use]
    pub fn assistant(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: false,
            chat_id,
            timestamp: Utc::now(),
            content_type: None,
            content: None,
            is_html: false,
            title: None,
            is_new: true,
        }
    }

    /// An error-flavored assistant message
    #[must_use]
    pub fn error(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            content_type: Some("error".to_string()),
            ..Self::assistant(chat_id, text)
        }
    }

    /// Normalize one `display_text` content block into a message
    ///
    /// An unrecognized block type still produces a message with a visible
    /// placeholder; blocks are never dropped.
    #[must_use]
    pub fn from_block(chat_id: i64, block: &ContentBlock) -> Self {
        let text = if block.is_known_type() {
            block
                .content
                .as_str()
                .map(str::to_string)
                .unwrap_or_default()
        } else {
            format!("[unknown type: {}]", block.block_type)
        };

        Self {
            text,
            is_user: false,
            chat_id,
            timestamp: Utc::now(),
            content_type: Some(block.block_type.clone()),
            content: Some(block.content.clone()),
            is_html: block.is_html(),
            title: block.title.clone(),
            is_new: true,
        }
    }
}

/// One conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Chat identifier (>= 1)
    pub id: i64,
    /// Display title, derived from the first user message
    pub title: String,
    /// Transcript, in arrival order
    pub messages: Vec<ChatMessage>,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session last changed
    pub last_updated: DateTime<Utc>,
}

impl ChatSession {
    /// Create an empty session
    #[must_use]
    pub fn new(id: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: format!("Chat {id}"),
            messages: Vec::new(),
            created_at: now,
            last_updated: now,
        }
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

/// The chat-session store the dispatcher mutates
///
/// Owns the session list, the active chat id, the provisional-id counter
/// for server-authoritative id negotiation, the waiting flag, workflow
/// suggestions, and the last received program contexts. Optionally backed
/// by a [`SessionStore`] that is read at startup and written on every
/// append.
pub struct ChatStore {
    sessions: Vec<ChatSession>,
    active_chat_id: Option<i64>,
    /// Next locally proposed chat id; the hub may override it
    next_local_id: i64,
    waiting: bool,
    workflows: Vec<Workflow>,
    current_program: Option<ProgramContext>,
    target_program: Option<ProgramContext>,
    persistence: Option<Box<dyn SessionStore>>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    /// In-memory store with no persistence backend
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
            active_chat_id: None,
            next_local_id: 1,
            waiting: false,
            workflows: Vec::new(),
            current_program: None,
            target_program: None,
            persistence: None,
        }
    }

    /// Store backed by a persistence backend; reads the persisted chat
    /// list immediately
    #[must_use]
    pub fn with_persistence(backend: Box<dyn SessionStore>) -> Self {
        let mut store = Self::new();
        match backend.get_all_chats() {
            Ok(sessions) => {
                store.next_local_id = sessions.iter().map(|s| s.id).max().unwrap_or(0) + 1;
                store.sessions = sessions;
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not read persisted chats, starting empty");
            }
        }
        store.persistence = Some(backend);
        store
    }

    /// All sessions, oldest first
    #[must_use]
    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    /// Look up a session by chat id
    #[must_use]
    pub fn session(&self, chat_id: i64) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == chat_id)
    }

    /// The active chat id, if a session is active
    #[must_use]
    pub fn active_chat_id(&self) -> Option<i64> {
        self.active_chat_id
    }

    /// Whether the client is waiting for a response
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Set or clear the waiting-for-response flag
    pub fn set_waiting(&mut self, waiting: bool) {
        self.waiting = waiting;
    }

    /// Current workflow suggestions
    #[must_use]
    pub fn workflows(&self) -> &[Workflow] {
        &self.workflows
    }

    /// Replace the workflow suggestions
    pub fn set_workflows(&mut self, workflows: Vec<Workflow>) {
        self.workflows = workflows;
    }

    /// Last received program contexts (current, target)
    #[must_use]
    pub fn program_context(&self) -> (Option<&ProgramContext>, Option<&ProgramContext>) {
        (self.current_program.as_ref(), self.target_program.as_ref())
    }

    /// Update the program contexts; `None` values leave the slot untouched
    pub fn set_program_context(
        &mut self,
        current: Option<ProgramContext>,
        target: Option<ProgramContext>,
    ) {
        if current.is_some() {
            self.current_program = current;
        }
        if target.is_some() {
            self.target_program = target;
        }
    }

    /// Start a new session with a provisional client-assigned id and make
    /// it active
    pub fn begin_session(&mut self) -> i64 {
        let id = self.next_local_id;
        self.next_local_id += 1;
        self.sessions.push(ChatSession::new(id));
        self.active_chat_id = Some(id);
        id
    }

    /// Make an existing session active
    pub fn activate(&mut self, chat_id: i64) -> bool {
        if self.session(chat_id).is_some() {
            self.active_chat_id = Some(chat_id);
            true
        } else {
            false
        }
    }

    /// Apply the hub's authoritative chat id
    ///
    /// If no session is active a new one is created under the server id; if
    /// the active session carries a differing provisional id it is re-keyed
    /// in place. Returns the active chat id afterwards.
    pub fn assign_chat_id(&mut self, server_id: i64) -> i64 {
        match self.active_chat_id {
            None => {
                self.sessions.push(ChatSession::new(server_id));
                self.active_chat_id = Some(server_id);
            }
            Some(active) if active != server_id => {
                tracing::debug!(
                    provisional = active,
                    assigned = server_id,
                    "hub overrode provisional chat id"
                );
                if let Some(session) = self.sessions.iter_mut().find(|s| s.id == active) {
                    session.id = server_id;
                    for msg in &mut session.messages {
                        msg.chat_id = server_id;
                    }
                } else {
                    self.sessions.push(ChatSession::new(server_id));
                }
                self.active_chat_id = Some(server_id);
                if server_id >= self.next_local_id {
                    self.next_local_id = server_id + 1;
                }
            }
            Some(_) => {}
        }
        server_id
    }

    /// Append an already-built message to its chat (created on demand)
    pub fn append_message(&mut self, message: ChatMessage) -> ChatMessage {
        self.append(message)
    }

    /// Append a user message to the given chat
    pub fn append_user(&mut self, chat_id: i64, text: impl Into<String>) -> ChatMessage {
        self.append(ChatMessage::user(chat_id, text))
    }

    /// Append an assistant message to the active chat (created on demand)
    pub fn append_assistant(&mut self, text: impl Into<String>) -> ChatMessage {
        let chat_id = self.active_or_new();
        self.append(ChatMessage::assistant(chat_id, text))
    }

    /// Append an error-flavored assistant message to the active chat
    pub fn append_error(&mut self, text: impl Into<String>) -> ChatMessage {
        let chat_id = self.active_or_new();
        self.append(ChatMessage::error(chat_id, text))
    }

    /// Append one normalized content block to the given chat
    pub fn append_block(&mut self, chat_id: i64, block: &ContentBlock) -> ChatMessage {
        self.append(ChatMessage::from_block(chat_id, block))
    }

    /// Clear and restart the active session (ambient `display_text`)
    ///
    /// The session keeps its id but loses its transcript; with no active
    /// session a fresh one is started. Returns the restarted chat id.
    pub fn reset_active(&mut self) -> i64 {
        match self.active_chat_id {
            Some(id) => {
                if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
                    session.messages.clear();
                    session.touch();
                }
                id
            }
            None => self.begin_session(),
        }
    }

    /// Delete a session; clears the active id if it pointed there
    pub fn delete_session(&mut self, chat_id: i64) {
        self.sessions.retain(|s| s.id != chat_id);
        if self.active_chat_id == Some(chat_id) {
            self.active_chat_id = None;
        }
        if let Some(backend) = &mut self.persistence {
            if let Err(e) = backend.delete_chat(chat_id) {
                tracing::warn!(error = %e, chat_id, "failed to delete persisted chat");
            }
        }
    }

    /// Clear the `is_new` flag on every message of a chat (UI finished its
    /// entry animation)
    pub fn acknowledge(&mut self, chat_id: i64) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == chat_id) {
            for msg in &mut session.messages {
                msg.is_new = false;
            }
        }
    }

    fn active_or_new(&mut self) -> i64 {
        match self.active_chat_id {
            Some(id) => id,
            None => self.begin_session(),
        }
    }

    fn append(&mut self, message: ChatMessage) -> ChatMessage {
        let chat_id = message.chat_id;
        let idx = match self.sessions.iter().position(|s| s.id == chat_id) {
            Some(idx) => idx,
            None => {
                self.sessions.push(ChatSession::new(chat_id));
                if chat_id >= self.next_local_id {
                    self.next_local_id = chat_id + 1;
                }
                self.sessions.len() - 1
            }
        };
        let session = &mut self.sessions[idx];

        if message.is_user && session.messages.iter().all(|m| !m.is_user) {
            session.title = derive_title(&message.text);
        }
        session.messages.push(message.clone());
        session.touch();

        if let Some(backend) = &mut self.persistence {
            if let Err(e) = backend.save_message(chat_id, &message) {
                tracing::warn!(error = %e, chat_id, "failed to persist message");
            }
        }
        message
    }
}

fn derive_title(text: &str) -> String {
    const MAX: usize = 40;
    let line = text.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return "New chat".to_string();
    }
    match line.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &line[..idx]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn begin_session_assigns_monotonic_ids() {
        let mut store = ChatStore::new();
        assert_eq!(store.begin_session(), 1);
        assert_eq!(store.begin_session(), 2);
        assert_eq!(store.active_chat_id(), Some(2));
    }

    #[test]
    fn assign_chat_id_rekeys_provisional_session() {
        let mut store = ChatStore::new();
        let provisional = store.begin_session();
        store.append_user(provisional, "hello");

        let assigned = store.assign_chat_id(42);
        assert_eq!(assigned, 42);
        assert_eq!(store.active_chat_id(), Some(42));

        let session = store.session(42).unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].chat_id, 42);
        assert!(store.session(provisional).is_none());
    }

    #[test]
    fn assign_chat_id_without_session_creates_one() {
        let mut store = ChatStore::new();
        store.assign_chat_id(7);
        assert_eq!(store.active_chat_id(), Some(7));
        assert!(store.session(7).is_some());
    }

    #[test]
    fn reset_active_clears_transcript_in_place() {
        let mut store = ChatStore::new();
        let id = store.begin_session();
        store.append_user(id, "first");
        store.append_assistant("reply");

        let reset_id = store.reset_active();
        assert_eq!(reset_id, id);
        assert!(store.session(id).unwrap().messages.is_empty());
    }

    #[test]
    fn title_comes_from_first_user_message() {
        let mut store = ChatStore::new();
        let id = store.begin_session();
        store.append_assistant("welcome");
        store.append_user(id, "sum column B of the budget sheet");

        assert_eq!(
            store.session(id).unwrap().title,
            "sum column B of the budget sheet"
        );
    }

    #[test]
    fn unknown_block_type_gets_visible_placeholder() {
        let block = ContentBlock {
            block_type: "hologram".into(),
            content: serde_json::json!({"x": 1}),
            title: None,
        };
        let msg = ChatMessage::from_block(3, &block);
        assert_eq!(msg.text, "[unknown type: hologram]");
        assert_eq!(msg.content_type.as_deref(), Some("hologram"));
        assert!(msg.content.is_some());
    }

    #[test]
    fn acknowledge_clears_is_new_only() {
        let mut store = ChatStore::new();
        let id = store.begin_session();
        store.append_user(id, "hi");
        store.acknowledge(id);
        let session = store.session(id).unwrap();
        assert!(!session.messages[0].is_new);
        assert_eq!(session.messages[0].text, "hi");
    }

    #[test]
    fn delete_session_clears_active_id() {
        let mut store = ChatStore::new();
        let id = store.begin_session();
        store.delete_session(id);
        assert!(store.session(id).is_none());
        assert_eq!(store.active_chat_id(), None);
    }
}
