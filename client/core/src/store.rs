//! Session Persistence
//!
//! Pluggable storage behind the chat store: an in-memory backend for tests
//! and an on-disk backend that keeps one JSON file per chat under the
//! platform data directory.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::session::{ChatMessage, ChatSession};

/// Errors from a persistence backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem access failed
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// A persisted chat file could not be parsed
    #[error("corrupt chat file {path}: {source}")]
    Corrupt {
        /// File that failed to parse
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// A session could not be serialized
    #[error("could not serialize chat: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Storage backend for chat sessions
///
/// Implementations are synchronous; callers invoke them from non-async
/// store mutation paths.
pub trait SessionStore: Send {
    /// All persisted sessions, ordered by id
    fn get_all_chats(&self) -> Result<Vec<ChatSession>, StoreError>;

    /// Record one appended message
    fn save_message(&mut self, chat_id: i64, message: &ChatMessage) -> Result<(), StoreError>;

    /// Remove a chat and its transcript
    fn delete_chat(&mut self, chat_id: i64) -> Result<(), StoreError>;
}

/// Volatile backend for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    chats: HashMap<i64, ChatSession>,
}

impl MemoryStore {
    /// Create an empty in-memory backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get_all_chats(&self) -> Result<Vec<ChatSession>, StoreError> {
        let mut chats: Vec<ChatSession> = self.chats.values().cloned().collect();
        chats.sort_by_key(|s| s.id);
        Ok(chats)
    }

    fn save_message(&mut self, chat_id: i64, message: &ChatMessage) -> Result<(), StoreError> {
        let session = self
            .chats
            .entry(chat_id)
            .or_insert_with(|| ChatSession::new(chat_id));
        session.messages.push(message.clone());
        session.last_updated = message.timestamp;
        Ok(())
    }

    fn delete_chat(&mut self, chat_id: i64) -> Result<(), StoreError> {
        self.chats.remove(&chat_id);
        Ok(())
    }
}

/// On-disk backend keeping one pretty-printed JSON file per chat
///
/// Files live directly under the backend's directory as `chat-<id>.json`.
/// Writes go through a temp file and rename so a crash never leaves a
/// half-written chat behind.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Open the default per-user store under the platform data directory
    pub fn open_default() -> Result<Self, StoreError> {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::open(base.join("overlay-chat").join("chats"))
    }

    fn chat_path(&self, chat_id: i64) -> PathBuf {
        self.dir.join(format!("chat-{chat_id}.json"))
    }

    fn read_chat(path: &Path) -> Result<ChatSession, StoreError> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_chat(&self, session: &ChatSession) -> Result<(), StoreError> {
        let path = self.chat_path(session.id);
        let json = serde_json::to_vec_pretty(session).map_err(StoreError::Serialize)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl SessionStore for JsonFileStore {
    fn get_all_chats(&self) -> Result<Vec<ChatSession>, StoreError> {
        let mut chats = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_chat(&path) {
                Ok(session) => chats.push(session),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable chat file");
                }
            }
        }
        chats.sort_by_key(|s| s.id);
        Ok(chats)
    }

    fn save_message(&mut self, chat_id: i64, message: &ChatMessage) -> Result<(), StoreError> {
        let path = self.chat_path(chat_id);
        let mut session = if path.exists() {
            Self::read_chat(&path)?
        } else {
            ChatSession::new(chat_id)
        };
        session.messages.push(message.clone());
        session.last_updated = message.timestamp;
        self.write_chat(&session)
    }

    fn delete_chat(&mut self, chat_id: i64) -> Result<(), StoreError> {
        let path = self.chat_path(chat_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn memory_store_round_trips_messages() {
        let mut store = MemoryStore::new();
        store
            .save_message(1, &ChatMessage::user(1, "hello"))
            .unwrap();
        store
            .save_message(1, &ChatMessage::assistant(1, "hi there"))
            .unwrap();

        let chats = store.get_all_chats().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].messages.len(), 2);
        assert_eq!(chats[0].messages[1].text, "hi there");
    }

    #[test]
    fn json_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = JsonFileStore::open(dir.path()).unwrap();
            store
                .save_message(5, &ChatMessage::user(5, "persist me"))
                .unwrap();
        }
        let store = JsonFileStore::open(dir.path()).unwrap();
        let chats = store.get_all_chats().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, 5);
        assert_eq!(chats[0].messages[0].text, "persist me");
    }

    #[test]
    fn json_store_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path()).unwrap();
        store
            .save_message(1, &ChatMessage::user(1, "good"))
            .unwrap();
        std::fs::write(dir.path().join("chat-2.json"), "not json").unwrap();

        let chats = store.get_all_chats().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, 1);
    }

    #[test]
    fn delete_missing_chat_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path()).unwrap();
        store.delete_chat(99).unwrap();
    }
}
