//! Chat Client Facade
//!
//! Ties the connection manager, dispatcher, and chat store together into
//! the surface a UI talks to: send a prompt, pump events, read the store.
//!
//! Chat ids are server-authoritative. The first prompt of a session is
//! queued while the client proposes a provisional id with
//! `generate_chat_id`; once the hub answers, the queued prompt is released
//! under the assigned id and later prompts go straight out.

use chrono::Utc;

use crate::config::ClientConfig;
use crate::connection::{ConnectionError, ConnectionEvent, ConnectionManager, ConnectionState};
use crate::dispatch::{dispatch, DispatchOutcome};
use crate::protocol::{OutboundCommand, ProgramContext};
use crate::session::ChatStore;
use crate::transport::Transport;

/// Request class for a single generated response
pub const REQUEST_TYPE_SINGLE: u32 = 1;

/// Errors surfaced by the client facade
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection-layer failure
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// An outbound command could not be encoded
    #[error("could not encode command: {0}")]
    Encode(#[from] serde_json::Error),

    /// The operation needs a hub-confirmed chat
    #[error("no active chat; send a prompt first")]
    NoActiveChat,
}

/// A prompt held back until the hub confirms the chat id
struct QueuedPrompt {
    prompt: String,
    description: String,
}

/// High-level chat client over any [`Transport`]
pub struct ChatClient<T: Transport> {
    connection: ConnectionManager<T>,
    store: ChatStore,
    /// Chat id confirmed by the hub, if negotiation completed
    server_chat_id: Option<i64>,
    queued: Option<QueuedPrompt>,
}

impl<T: Transport> ChatClient<T> {
    /// Client with a fresh in-memory store
    #[must_use]
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self::with_store(transport, config, ChatStore::new())
    }

    /// Client over an existing store (e.g. one loaded from disk)
    #[must_use]
    pub fn with_store(transport: T, config: ClientConfig, store: ChatStore) -> Self {
        Self {
            connection: ConnectionManager::new(transport, config),
            store,
            server_chat_id: None,
            queued: None,
        }
    }

    /// Read access to the chat store
    #[must_use]
    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// Mutable access to the chat store
    pub fn store_mut(&mut self) -> &mut ChatStore {
        &mut self.store
    }

    /// Current connection phase
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Take the connection lifecycle event receiver (first call only)
    pub fn connection_events(
        &mut self,
    ) -> Option<tokio::sync::mpsc::UnboundedReceiver<ConnectionEvent>> {
        self.connection.take_events()
    }

    /// Establish the hub connection
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        self.connection.connect().await?;
        Ok(())
    }

    /// Tear down the connection; safe to call repeatedly
    pub async fn close(&mut self) {
        self.connection.close().await;
    }

    /// Start a new chat; the next prompt renegotiates the chat id
    pub fn new_chat(&mut self) -> i64 {
        self.server_chat_id = None;
        self.queued = None;
        self.store.begin_session()
    }

    /// Submit a user prompt
    ///
    /// The prompt appears in the transcript immediately and the waiting
    /// flag is raised. With a confirmed chat id the prompt goes straight to
    /// the hub; otherwise it is queued behind a `generate_chat_id`
    /// round-trip.
    pub async fn send_prompt(
        &mut self,
        prompt: &str,
        description: &str,
    ) -> Result<(), ClientError> {
        let chat_id = match self.store.active_chat_id() {
            Some(id) => id,
            None => self.store.begin_session(),
        };
        self.store.append_user(chat_id, prompt);
        self.store.set_waiting(true);

        match self.server_chat_id {
            Some(id) => {
                let (current, target) = self.program_context_owned();
                let cmd = OutboundCommand::SendUserPrompt {
                    chat_id: id,
                    prompt: prompt.to_string(),
                    request_type: REQUEST_TYPE_SINGLE,
                    description: description.to_string(),
                    current_program: current,
                    target_program: target,
                };
                self.send_command(&cmd).await
            }
            None => {
                if self.queued.is_some() {
                    tracing::debug!("replacing queued prompt awaiting chat id");
                }
                self.queued = Some(QueuedPrompt {
                    prompt: prompt.to_string(),
                    description: description.to_string(),
                });
                let cmd = OutboundCommand::GenerateChatId {
                    chat_id,
                    generated_timestamp: Utc::now().to_rfc3339(),
                };
                self.send_command(&cmd).await
            }
        }
    }

    /// Apply the last generated response to the target program
    pub async fn apply_response(&mut self) -> Result<(), ClientError> {
        let chat_id = self.confirmed_chat_id()?;
        self.send_command(&OutboundCommand::ApplyResponse { chat_id })
            .await
    }

    /// Cancel the last generated response
    pub async fn cancel_response(&mut self) -> Result<(), ClientError> {
        let chat_id = self.confirmed_chat_id()?;
        self.send_command(&OutboundCommand::CancelResponse { chat_id })
            .await
    }

    /// Request workflow suggestions for a file type
    pub async fn request_top_workflows(&mut self, file_type: &str) -> Result<(), ClientError> {
        let chat_id = self.confirmed_chat_id()?;
        self.send_command(&OutboundCommand::RequestTopWorkflows {
            chat_id,
            file_type: file_type.to_string(),
        })
        .await
    }

    /// Select one of the suggested workflows
    pub async fn select_workflow(&mut self, file_type: &str) -> Result<(), ClientError> {
        let chat_id = self.confirmed_chat_id()?;
        let (_, target) = self.program_context_owned();
        self.send_command(&OutboundCommand::SelectWorkflow {
            chat_id,
            file_type: file_type.to_string(),
            target_program: target,
        })
        .await
    }

    /// Pump one inbound frame through the dispatcher
    ///
    /// Releases the queued prompt when the hub confirms the chat id.
    /// Cancel-safe with respect to the connection layer, so this may be
    /// raced in a `select!`.
    pub async fn next_event(&mut self) -> Result<DispatchOutcome, ClientError> {
        let frame = self.connection.next_inbound().await?;
        let outcome = dispatch(&mut self.store, &frame);

        if let DispatchOutcome::ChatIdAssigned(id) = outcome {
            self.server_chat_id = Some(id);
            if let Some(q) = self.queued.take() {
                let (current, target) = self.program_context_owned();
                let cmd = OutboundCommand::SendUserPrompt {
                    chat_id: id,
                    prompt: q.prompt,
                    request_type: REQUEST_TYPE_SINGLE,
                    description: q.description,
                    current_program: current,
                    target_program: target,
                };
                self.send_command(&cmd).await?;
            }
        }

        Ok(outcome)
    }

    fn confirmed_chat_id(&self) -> Result<i64, ClientError> {
        self.server_chat_id.ok_or(ClientError::NoActiveChat)
    }

    fn program_context_owned(&self) -> (Option<ProgramContext>, Option<ProgramContext>) {
        let (current, target) = self.store.program_context();
        (current.cloned(), target.cloned())
    }

    async fn send_command(&mut self, command: &OutboundCommand) -> Result<(), ClientError> {
        let frame = serde_json::to_string(command)?;
        self.connection.send(&frame).await?;
        Ok(())
    }
}
