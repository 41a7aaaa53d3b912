//! Overlay Shell - Terminal Surface for the Overlay Chat Client
//!
//! A line-oriented shell over `overlay-core`: type a prompt, read the
//! generated response, with slash commands for the chat-bound operations.
//! Useful for driving a chat hub without the overlay window.
//!
//! # Usage
//!
//! ```bash
//! # Connect to the default hub
//! overlay-shell
//!
//! # Custom hub endpoint
//! overlay-shell --hub-url ws://hub.example:8080/chatHub
//!
//! # Without persisting chats to disk
//! overlay-shell --ephemeral
//!
//! # Verbose logging
//! RUST_LOG=debug overlay-shell
//! ```
//!
//! # Commands
//!
//! - `/apply` / `/cancel`: act on the last generated response
//! - `/workflows <file-type>`: request workflow suggestions
//! - `/select <file-type>`: select the suggested workflow
//! - `/new`: start a new chat
//! - `/chats`: list stored chats
//! - `/delete <chat-id>`: delete a stored chat
//! - `/connect`: retry after the reconnect budget is exhausted
//! - `/quit`: exit
//!
//! Anything else is sent as a prompt.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use overlay_core::{
    ChatClient, ChatStore, ClientConfig, ClientError, ConnectionEvent, DispatchOutcome,
    JsonFileStore, WebSocketTransport,
};

/// Overlay Shell - terminal surface for the overlay chat client
#[derive(Parser, Debug)]
#[command(name = "overlay-shell")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chat hub WebSocket endpoint
    #[arg(short = 'u', long, env = "OVERLAY_HUB_URL", value_name = "URL")]
    hub_url: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "OVERLAY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keep chats in memory only
    #[arg(short = 'e', long)]
    ephemeral: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "OVERLAY_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("overlay_shell={level},overlay_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load_from_path(path)
            .with_context(|| format!("reading config file {}", path.display()))?
            .apply_env(),
        None => ClientConfig::load(),
    };
    if let Some(url) = &args.hub_url {
        config.hub_url = url.clone();
    }
    Ok(config)
}

fn open_store(args: &Args, config: &ClientConfig) -> Result<ChatStore> {
    if args.ephemeral {
        return Ok(ChatStore::new());
    }
    let backend = match &config.data_dir {
        Some(dir) => JsonFileStore::open(dir.join("chats")),
        None => JsonFileStore::open_default(),
    }
    .context("opening the chat store")?;
    Ok(ChatStore::with_persistence(Box::new(backend)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = load_config(&args)?;
    info!(hub_url = %config.hub_url, "overlay shell starting");

    let store = open_store(&args, &config)?;
    let transport = WebSocketTransport::new(&config.hub_url);
    let mut client = ChatClient::with_store(transport, config, store);
    let mut conn_events = client
        .connection_events()
        .context("connection events already taken")?;

    client.connect().await?;
    println!("overlay-shell ready; /quit to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // Cleared once the pump errors out so the loop does not spin on a dead
    // connection; /connect (or an automatic recovery) re-arms it.
    let mut pumping = true;
    loop {
        tokio::select! {
            maybe_line = lines.next_line() => {
                match maybe_line? {
                    Some(line) => {
                        if !handle_line(&mut client, line.trim()).await {
                            break;
                        }
                        pumping = true;
                    }
                    None => break,
                }
            }
            outcome = client.next_event(), if pumping => {
                match outcome {
                    Ok(outcome) => render_outcome(&client, &outcome),
                    Err(e) => {
                        warn!(error = %e, "inbound pump stopped");
                        println!("! connection lost ({e}); /connect to retry");
                        pumping = false;
                    }
                }
            }
            maybe_event = conn_events.recv() => {
                if let Some(event) = maybe_event {
                    if matches!(event, ConnectionEvent::Connected) {
                        pumping = true;
                    }
                    render_connection_event(&event);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.close().await;
    info!("overlay shell stopped");
    Ok(())
}

/// Handle one input line; returns false when the shell should exit
async fn handle_line(client: &mut ChatClient<WebSocketTransport>, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }

    let result: Result<(), ClientError> = match line.split_once(' ') {
        _ if line == "/quit" || line == "/exit" => return false,
        _ if line == "/apply" => match client.apply_response().await {
            Ok(()) => {
                println!("* apply requested");
                Ok(())
            }
            Err(e) => Err(e),
        },
        _ if line == "/cancel" => match client.cancel_response().await {
            Ok(()) => {
                println!("* cancel requested");
                Ok(())
            }
            Err(e) => Err(e),
        },
        _ if line == "/new" => {
            let id = client.new_chat();
            println!("* started chat {id}");
            Ok(())
        }
        _ if line == "/chats" => {
            list_chats(client);
            Ok(())
        }
        _ if line == "/connect" => client.connect().await,
        Some(("/workflows", file_type)) => client.request_top_workflows(file_type.trim()).await,
        Some(("/select", file_type)) => client.select_workflow(file_type.trim()).await,
        Some(("/delete", id)) => {
            match id.trim().parse::<i64>() {
                Ok(id) => {
                    client.store_mut().delete_session(id);
                    println!("* deleted chat {id}");
                }
                Err(_) => println!("! usage: /delete <chat-id>"),
            }
            Ok(())
        }
        _ if line.starts_with('/') => {
            println!("! unknown command: {line}");
            Ok(())
        }
        _ => client.send_prompt(line, "").await,
    };

    if let Err(e) = result {
        println!("! {e}");
    }
    true
}

fn list_chats(client: &ChatClient<WebSocketTransport>) {
    let store = client.store();
    if store.sessions().is_empty() {
        println!("* no chats yet");
        return;
    }
    for session in store.sessions() {
        let marker = if store.active_chat_id() == Some(session.id) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} [{}] {} ({} messages)",
            session.id,
            session.title,
            session.messages.len()
        );
    }
}

fn render_outcome(client: &ChatClient<WebSocketTransport>, outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::MessageAppended(msg) => {
            if let Some(title) = &msg.title {
                println!("-- {title}");
            }
            println!("{}", msg.text);
        }
        DispatchOutcome::MessagesAppended { chat_id, messages } => {
            for msg in messages {
                if let Some(title) = &msg.title {
                    println!("[chat {chat_id}] -- {title}");
                }
                println!("{}", msg.text);
            }
        }
        DispatchOutcome::ChatIdAssigned(id) => {
            debug!(chat_id = id, "chat id assigned");
        }
        DispatchOutcome::WorkflowsUpdated(count) => {
            println!("* {count} workflow suggestions:");
            for wf in client.store().workflows() {
                println!(
                    "  - {} ({})",
                    wf.name.as_deref().unwrap_or("unnamed"),
                    wf.file_type.as_deref().unwrap_or("any")
                );
            }
        }
        DispatchOutcome::ContextUpdated => {
            debug!("program context updated");
        }
        DispatchOutcome::Pong | DispatchOutcome::Ignored => {}
    }
}

fn render_connection_event(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Connected => println!("* connected"),
        ConnectionEvent::Disconnected => println!("* connection lost"),
        ConnectionEvent::ReconnectScheduled { attempt, delay } => {
            println!("* reconnecting (attempt {attempt}, in {delay:?})");
        }
        ConnectionEvent::Failed => {
            println!("* gave up reconnecting; /connect to retry");
        }
        ConnectionEvent::Connecting
        | ConnectionEvent::ReconnectFailed { .. }
        | ConnectionEvent::KeepAlivePing
        | ConnectionEvent::PendingFlushed => {
            debug!(?event, "connection event");
        }
    }
}
