//! Inbound Message Dispatch
//!
//! Routes one raw hub frame into the chat store. Every frame ends up
//! somewhere visible: typed commands mutate the store per their meaning,
//! and the fallback ladder (string field, bare text, pretty-printed JSON)
//! catches everything the typed layer does not recognize. The only frames
//! consumed without display are keep-alive echoes and empty frames.

use serde_json::Value;

use crate::protocol::InboundCommand;
use crate::session::{ChatMessage, ChatStore};

/// What one dispatched frame did to the store
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    /// One message was appended
    MessageAppended(ChatMessage),
    /// A `display_text` envelope appended zero or more messages to a chat
    MessagesAppended {
        /// Chat that received the blocks (after any ambient reset)
        chat_id: i64,
        /// Appended messages, in block order
        messages: Vec<ChatMessage>,
    },
    /// The hub assigned the authoritative chat id
    ChatIdAssigned(i64),
    /// Workflow suggestions were replaced
    WorkflowsUpdated(usize),
    /// Program context changed with nothing to render
    ContextUpdated,
    /// Keep-alive echo, consumed silently
    Pong,
    /// Empty frame, nothing to do
    Ignored,
}

/// Route one raw frame into the store
pub fn dispatch(store: &mut ChatStore, raw: &str) -> DispatchOutcome {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => {
            let text = raw.trim();
            if text.is_empty() {
                return DispatchOutcome::Ignored;
            }
            if is_heartbeat_echo(text) {
                store.set_waiting(false);
                return DispatchOutcome::Pong;
            }
            tracing::debug!(len = text.len(), "non-JSON frame, displaying as text");
            store.set_waiting(false);
            return DispatchOutcome::MessageAppended(store.append_assistant(text));
        }
    };

    match InboundCommand::from_value(&value) {
        Some(command) => dispatch_command(store, command),
        None => dispatch_untyped(store, value),
    }
}

fn dispatch_command(store: &mut ChatStore, command: InboundCommand) -> DispatchOutcome {
    match command {
        InboundCommand::ResponseSingleGeneratedResponse { status, message } => {
            if message == "pong" {
                store.set_waiting(false);
                return DispatchOutcome::Pong;
            }
            store.set_waiting(false);
            let msg = if status.eq_ignore_ascii_case("error")
                || status.eq_ignore_ascii_case("failure")
            {
                store.append_error(message)
            } else {
                store.append_assistant(message)
            };
            DispatchOutcome::MessageAppended(msg)
        }

        InboundCommand::GenerateChatId { chat_id } => {
            DispatchOutcome::ChatIdAssigned(store.assign_chat_id(chat_id))
        }

        InboundCommand::DisplayText {
            chat_id,
            texts,
            current_program,
            target_program,
        } => {
            store.set_program_context(current_program, target_program);
            store.set_waiting(false);

            // chat_id -1 is ambient content: restart the active session and
            // deliver the blocks there. Session ids start at 1, so any other
            // out-of-range id is treated the same way rather than minting a
            // session the store could never have issued.
            let target = if chat_id < 1 {
                store.reset_active()
            } else {
                chat_id
            };

            let messages: Vec<ChatMessage> = texts
                .iter()
                .map(|block| store.append_block(target, block))
                .collect();
            store.activate(target);

            DispatchOutcome::MessagesAppended {
                chat_id: target,
                messages,
            }
        }

        InboundCommand::ResponseTopWorkflows { workflows } => {
            let count = workflows.len();
            store.set_workflows(workflows);
            DispatchOutcome::WorkflowsUpdated(count)
        }

        InboundCommand::ProgramContext {
            current_program,
            target_program,
        } => {
            store.set_program_context(current_program, target_program);
            DispatchOutcome::ContextUpdated
        }

        InboundCommand::NewGeneratedResponse { content, title } => {
            store.set_waiting(false);
            let chat_id = match store.active_chat_id() {
                Some(id) => id,
                None => store.begin_session(),
            };
            let mut msg = ChatMessage::assistant(chat_id, content.unwrap_or_default());
            msg.content_type = Some("generated_response".to_string());
            msg.is_html = true;
            msg.title = title;
            DispatchOutcome::MessageAppended(store.append_message(msg))
        }

        InboundCommand::ResponseSuccess { response } => {
            store.set_waiting(false);
            DispatchOutcome::MessageAppended(store.append_assistant(response))
        }

        InboundCommand::ResponseFailure { error } => {
            store.set_waiting(false);
            DispatchOutcome::MessageAppended(store.append_error(error))
        }
    }
}

/// Fallback ladder for frames the typed layer does not recognize
fn dispatch_untyped(store: &mut ChatStore, value: Value) -> DispatchOutcome {
    store.set_waiting(false);

    // A quoted JSON string is displayed as its text; heartbeat echoes are
    // consumed silently.
    if let Value::String(text) = &value {
        let text = text.trim();
        if text.is_empty() {
            return DispatchOutcome::Ignored;
        }
        if is_heartbeat_echo(text) {
            return DispatchOutcome::Pong;
        }
        return DispatchOutcome::MessageAppended(store.append_assistant(text));
    }

    // An unknown command that still carries a non-empty `message` string is
    // displayed as that string; an empty one falls through so the rest of
    // the payload stays visible.
    if let Some(text) = value.get("message").and_then(Value::as_str) {
        if is_heartbeat_echo(text) {
            return DispatchOutcome::Pong;
        }
        if !text.is_empty() {
            let command = value.get("command").and_then(Value::as_str).unwrap_or("?");
            tracing::debug!(command, "unknown command with message field");
            return DispatchOutcome::MessageAppended(store.append_assistant(text));
        }
    }

    // Last resort: show the whole payload pretty-printed so nothing is lost.
    let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
    tracing::debug!("unrecognized frame, displaying pretty-printed JSON");
    DispatchOutcome::MessageAppended(store.append_assistant(pretty))
}

fn is_heartbeat_echo(text: &str) -> bool {
    matches!(text, "ping" | "pong")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pong_is_consumed_silently_and_clears_waiting() {
        let mut store = ChatStore::new();
        store.begin_session();
        store.set_waiting(true);

        let outcome = dispatch(
            &mut store,
            r#"{"command":"response_single_generated_response","status":"success","message":"pong"}"#,
        );
        assert_eq!(outcome, DispatchOutcome::Pong);
        assert!(!store.is_waiting());
        assert!(store.sessions()[0].messages.is_empty());
    }

    #[test]
    fn response_text_is_appended_and_clears_waiting() {
        let mut store = ChatStore::new();
        store.begin_session();
        store.set_waiting(true);

        let outcome = dispatch(
            &mut store,
            r#"{"command":"response_single_generated_response","status":"success","message":"sum is 42"}"#,
        );
        match outcome {
            DispatchOutcome::MessageAppended(msg) => {
                assert_eq!(msg.text, "sum is 42");
                assert!(!msg.is_user);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!store.is_waiting());
    }

    #[test]
    fn error_status_produces_error_message() {
        let mut store = ChatStore::new();
        let outcome = dispatch(
            &mut store,
            r#"{"command":"response_single_generated_response","status":"error","message":"model overloaded"}"#,
        );
        match outcome {
            DispatchOutcome::MessageAppended(msg) => {
                assert_eq!(msg.content_type.as_deref(), Some("error"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn ambient_display_text_restarts_the_active_session() {
        let mut store = ChatStore::new();
        let id = store.begin_session();
        store.append_user(id, "old question");

        let outcome = dispatch(
            &mut store,
            r#"{"command":"display_text","chat_id":-1,"texts":[{"type":"text_plain","content":"captured selection"}]}"#,
        );
        match outcome {
            DispatchOutcome::MessagesAppended { chat_id, messages } => {
                assert_eq!(chat_id, id);
                assert_eq!(messages.len(), 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        let session = store.session(id).unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].text, "captured selection");
    }

    #[test]
    fn display_text_targets_the_named_chat() {
        let mut store = ChatStore::new();
        let outcome = dispatch(
            &mut store,
            r#"{"command":"display_text","chat_id":7,"texts":[{"type":"table_block","content":{"rows":[["a"]]}}]}"#,
        );
        match outcome {
            DispatchOutcome::MessagesAppended { chat_id, .. } => assert_eq!(chat_id, 7),
            other => panic!("unexpected outcome: {:?}", other),
        }
        let session = store.session(7).unwrap();
        assert_eq!(
            session.messages[0].content_type.as_deref(),
            Some("table_block")
        );
        assert_eq!(store.active_chat_id(), Some(7));
    }

    #[test]
    fn chat_id_assignment_flows_through() {
        let mut store = ChatStore::new();
        let outcome = dispatch(&mut store, r#"{"command":"generate_chat_id","chat_id":12}"#);
        assert_eq!(outcome, DispatchOutcome::ChatIdAssigned(12));
        assert_eq!(store.active_chat_id(), Some(12));
    }

    #[test]
    fn unknown_command_with_message_field_is_displayed() {
        let mut store = ChatStore::new();
        let outcome = dispatch(
            &mut store,
            r#"{"command":"brand_new_thing","message":"please update the client"}"#,
        );
        match outcome {
            DispatchOutcome::MessageAppended(msg) => {
                assert_eq!(msg.text, "please update the client");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn empty_message_field_falls_through_to_pretty_json() {
        let mut store = ChatStore::new();
        let outcome = dispatch(
            &mut store,
            r#"{"command":"weird_thing","message":"","payload":{"rows":3}}"#,
        );
        match outcome {
            DispatchOutcome::MessageAppended(msg) => {
                assert!(!msg.text.is_empty());
                assert!(msg.text.contains("\"rows\": 3"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn generated_response_without_a_session_starts_a_valid_one() {
        let mut store = ChatStore::new();
        let outcome = dispatch(
            &mut store,
            r#"{"command":"new_generated_response","content":"hi","title":"greeting"}"#,
        );
        match outcome {
            DispatchOutcome::MessageAppended(msg) => {
                assert!(msg.chat_id >= 1);
                assert_eq!(msg.text, "hi");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(store.sessions().iter().all(|s| s.id >= 1));
        assert_eq!(store.active_chat_id(), Some(1));
    }

    #[test]
    fn out_of_range_display_text_ids_are_treated_as_ambient() {
        for raw in [
            r#"{"command":"display_text","chat_id":0,"texts":[{"type":"text_plain","content":"a"}]}"#,
            r#"{"command":"display_text","chat_id":-7,"texts":[{"type":"text_plain","content":"b"}]}"#,
        ] {
            let mut store = ChatStore::new();
            match dispatch(&mut store, raw) {
                DispatchOutcome::MessagesAppended { chat_id, messages } => {
                    assert!(chat_id >= 1);
                    assert_eq!(messages.len(), 1);
                }
                other => panic!("unexpected outcome: {:?}", other),
            }
            assert!(store.sessions().iter().all(|s| s.id >= 1));
        }
    }

    #[test]
    fn unknown_object_is_pretty_printed() {
        let mut store = ChatStore::new();
        let outcome = dispatch(&mut store, r#"{"foo":{"bar":1}}"#);
        match outcome {
            DispatchOutcome::MessageAppended(msg) => {
                assert!(msg.text.contains("\"bar\": 1"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn non_json_frame_is_displayed_verbatim() {
        let mut store = ChatStore::new();
        store.set_waiting(true);
        let outcome = dispatch(&mut store, "plain words from the hub");
        match outcome {
            DispatchOutcome::MessageAppended(msg) => {
                assert_eq!(msg.text, "plain words from the hub");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!store.is_waiting());
    }

    #[test]
    fn bare_pong_frames_are_consumed_silently() {
        let mut store = ChatStore::new();
        store.set_waiting(true);
        assert_eq!(dispatch(&mut store, "pong"), DispatchOutcome::Pong);
        assert_eq!(dispatch(&mut store, r#""pong""#), DispatchOutcome::Pong);
        assert!(!store.is_waiting());
        assert!(store.sessions().is_empty());
    }

    #[test]
    fn empty_frame_is_ignored() {
        let mut store = ChatStore::new();
        assert_eq!(dispatch(&mut store, "   "), DispatchOutcome::Ignored);
        assert!(store.sessions().is_empty());
    }

    #[test]
    fn response_failure_is_visible_as_error() {
        let mut store = ChatStore::new();
        store.set_waiting(true);
        let outcome = dispatch(
            &mut store,
            r#"{"command":"response_failure","error":"prompt rejected"}"#,
        );
        match outcome {
            DispatchOutcome::MessageAppended(msg) => {
                assert_eq!(msg.text, "prompt rejected");
                assert_eq!(msg.content_type.as_deref(), Some("error"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!store.is_waiting());
    }
}
