//! Murmur terminal client.
//!
//! Reads lines from stdin and prints chat, typing, presence and notification
//! updates to stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! murmur --ws-url wss://chat.example --api-url https://chat.example/api \
//!     --user-id 7 --nickname ada --room 1/2
//! ```

mod command;

use std::{
    collections::HashSet,
    io::{self, Write},
};

use clap::Parser;
use command::Command;
use murmur_client::{
    ChatMessage, Identity, SyncEvent,
    http::HttpApi,
    runtime::{Runtime, RuntimeConfig, RuntimeUpdate},
};
use murmur_proto::{MessageId, RoomKey};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Murmur chat client
#[derive(Parser, Debug)]
#[command(name = "murmur")]
#[command(about = "Terminal client for Murmur chat, presence and notifications")]
#[command(version)]
struct Args {
    /// WebSocket base URL
    #[arg(long, default_value = "ws://localhost:8080")]
    ws_url: String,

    /// REST API base URL
    #[arg(long, default_value = "http://localhost:8080/api")]
    api_url: String,

    /// Bearer token for the REST API
    #[arg(long, env = "MURMUR_TOKEN")]
    token: Option<String>,

    /// Signed-in user id
    #[arg(short, long)]
    user_id: u64,

    /// Display name
    #[arg(short, long, default_value = "anonymous")]
    nickname: String,

    /// Room to enter on start, as `workspace/room`
    #[arg(short, long, value_parser = parse_room)]
    room: Option<RoomKey>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn parse_room(value: &str) -> Result<RoomKey, String> {
    let (workspace, room) = value.split_once('/').ok_or("expected workspace/room")?;
    let workspace = workspace.parse().map_err(|_| format!("invalid workspace id: {workspace}"))?;
    let room = room.parse().map_err(|_| format!("invalid room id: {room}"))?;
    Ok(RoomKey::new(workspace, room))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    tracing::info!(user_id = args.user_id, ws_url = %args.ws_url, "murmur starting");

    let mut api = HttpApi::new(args.api_url);
    if let Some(token) = args.token {
        api = api.with_token(token);
    }

    let (updates_tx, mut updates_rx) = mpsc::channel(256);
    let (commands_tx, commands_rx) = mpsc::channel(64);

    let runtime = Runtime::new(
        RuntimeConfig::new(args.ws_url),
        Identity::new(args.user_id, args.nickname),
        api,
        updates_tx,
    );
    let runtime = tokio::spawn(runtime.run(commands_rx));

    if let Some(room) = args.room {
        commands_tx.send(SyncEvent::EnterRoom { room }).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut screen = Screen::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Nothing) => {},
                    Ok(Command::Sync(event)) => {
                        commands_tx.send(SyncEvent::Activity).await?;
                        commands_tx.send(event).await?;
                    },
                    Err(err) => {
                        tracing::warn!(%err, "rejected input line");
                        screen.line(&format!("! {err}"))?;
                    },
                }
            },
            update = updates_rx.recv() => {
                let Some(update) = update else {
                    tracing::warn!("runtime stopped sending updates");
                    break;
                };
                screen.render(update)?;
            },
        }
    }

    drop(commands_tx);
    if let Err(err) = runtime.await? {
        tracing::warn!(%err, "runtime exited with error");
        return Err(err.into());
    }
    tracing::info!("murmur stopped");
    Ok(())
}

/// Incremental printer for runtime updates.
#[derive(Default)]
struct Screen {
    /// Confirmed messages already printed
    shown: HashSet<MessageId>,
    /// Last typing line, to avoid repeats
    typing: Vec<String>,
}

impl Screen {
    fn render(&mut self, update: RuntimeUpdate) -> io::Result<()> {
        match update {
            RuntimeUpdate::Messages(messages) => {
                for message in messages.iter().filter(|m| !m.is_optimistic()) {
                    if self.shown.insert(message.id) {
                        self.line(&format_message(message))?;
                    }
                }
            },
            RuntimeUpdate::Typing(names) => {
                if names != self.typing {
                    if !names.is_empty() {
                        self.line(&format!("... {} typing", names.join(", ")))?;
                    }
                    self.typing = names;
                }
            },
            RuntimeUpdate::Presence(records) => {
                for record in records {
                    let note = record.status_message.map(|text| format!(" ({text})")).unwrap_or_default();
                    self.line(&format!("* user {} is {}{note}", record.user_id, record.status))?;
                }
            },
            RuntimeUpdate::Notification(notification) => {
                self.line(&format!("! {}", notification.title))?;
            },
            RuntimeUpdate::ScrollToBottom | RuntimeUpdate::PreserveScrollAnchor => {},
        }
        Ok(())
    }

    fn line(&self, text: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{text}")?;
        out.flush()
    }
}

fn format_message(message: &ChatMessage) -> String {
    let name = message
        .sender
        .as_ref()
        .map(|sender| sender.nickname.clone())
        .or_else(|| message.sender_id.map(|id| format!("user{id}")))
        .unwrap_or_else(|| "system".to_string());
    format!("[{name}] {}", message.body)
}
