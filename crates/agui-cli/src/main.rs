use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use agui_core::{
    ChatSession, InboundEnvelope, Role, SendOutcome, SessionConfig, SessionConfigBuilder,
    SessionError, SessionEvent, Subject, Topic,
};

/// Terminal client for an AG-UI conversational backend
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Backend base address (http or https)
    #[arg(long, default_value = agui_core::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Path of the streaming channel on the backend
    #[arg(long, default_value = agui_core::config::DEFAULT_SOCKET_PATH)]
    socket_path: String,

    /// Subject of the first conversation
    #[arg(long)]
    artist_id: String,

    /// Display name for the subject
    #[arg(long)]
    artist_name: Option<String>,

    /// Never use the HTTP fallback
    #[arg(long)]
    no_fallback: bool,

    /// Keep at most this many conversations
    #[arg(long)]
    max_conversations: Option<usize>,

    /// Write a wire transcript into this directory
    #[arg(long)]
    wire_log_dir: Option<PathBuf>,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let mut builder = SessionConfigBuilder::new()
            .base_url(self.base_url.clone())
            .socket_path(self.socket_path.clone())
            .fallback_enabled(!self.no_fallback);
        if let Some(max) = self.max_conversations {
            builder = builder.max_conversations(max);
        }
        if let Some(dir) = &self.wire_log_dir {
            builder = builder.wire_log_dir(dir.clone());
        }
        builder.build()
    }
}

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Message(String),
    Visualize(String),
    History,
    New { id: String, name: Option<String> },
    Reconnect,
    Quit,
    Empty,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if !line.starts_with('/') {
        return Command::Message(line.to_string());
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();

    match name {
        "/quit" | "/exit" => Command::Quit,
        "/history" => Command::History,
        "/reconnect" => Command::Reconnect,
        "/viz" if !rest.is_empty() => Command::Visualize(rest.to_string()),
        "/new" if !rest.is_empty() => {
            let (id, name) = match rest.split_once(char::is_whitespace) {
                Some((id, name)) => (id, Some(name.trim().to_string())),
                None => (rest, None),
            };
            Command::New {
                id: id.to_string(),
                name,
            }
        }
        _ => Command::Unknown(line.to_string()),
    }
}

fn subject(id: &str, name: Option<&str>) -> Subject {
    let subject = Subject::new(id);
    match name {
        Some(name) => subject.with_name(name),
        None => subject,
    }
}

/// Print inbound traffic as it is published.
fn install_printers(session: &ChatSession) {
    let bus = session.event_bus();
    bus.subscribe(Topic::Connection, |event| {
        if let SessionEvent::Connection { status } = event {
            println!("[connection] {}", status);
        }
        Ok(())
    });
    bus.subscribe(Topic::Message, |event| {
        if let SessionEvent::Message(response) = event {
            println!("assistant> {}", response.content);
        }
        Ok(())
    });
    bus.subscribe(Topic::Component, |event| {
        if let SessionEvent::Component(component) = event {
            println!("[component] {} {}", component.component, component.props);
        }
        Ok(())
    });
    bus.subscribe(Topic::Context, |event| {
        if let SessionEvent::Context(update) = event {
            println!("[context] {}", update.context);
        }
        Ok(())
    });
    bus.subscribe(Topic::Insight, |event| {
        if let SessionEvent::Insight(insight) = event {
            println!("[insight:{}] {}", insight.insight_type, insight.insight);
        }
        Ok(())
    });
    bus.subscribe(Topic::Error, |event| {
        if let SessionEvent::Error(err) = event {
            eprintln!("[protocol error] {}", err.message);
        }
        Ok(())
    });
}

/// Fallback replies are returned, not published, so print them here.
fn report(outcome: &SendOutcome) {
    if let SendOutcome::Fallback(Some(InboundEnvelope::AiResponse(response))) = outcome {
        println!("assistant> {}", response.content);
    }
}

async fn start(session: &ChatSession, subject: Subject) {
    match session.start_conversation(subject).await {
        Ok(started) => {
            log::info!("Conversation {} started", started.id);
            report(&started.outcome);
        }
        Err(e) => eprintln!("Could not start conversation: {}", e),
    }
}

/// Returns false when the loop should stop.
async fn handle(session: &ChatSession, command: Command) -> bool {
    match command {
        Command::Empty => {}
        Command::Quit => return false,
        Command::Message(text) => match session.send_message(&text, None).await {
            Ok(outcome) => report(&outcome),
            Err(SessionError::NoActiveConversation) => {
                eprintln!("No conversation yet; use /new <artist-id> [name]")
            }
            Err(e) => eprintln!("Send failed: {}", e),
        },
        Command::Visualize(kind) => {
            let context = serde_json::json!({
                "conversationId": session.current_conversation(),
            });
            if let Err(e) = session.request_visualization(&kind, context).await {
                eprintln!("Visualization request failed: {}", e);
            }
        }
        Command::History => {
            for message in session.history(None) {
                let who = match message.role {
                    Role::User => "you",
                    Role::Assistant => "assistant",
                };
                println!(
                    "{} {}> {}",
                    message.timestamp.format("%H:%M:%S"),
                    who,
                    message.content
                );
            }
        }
        Command::New { id, name } => start(session, subject(&id, name.as_deref())).await,
        Command::Reconnect => {
            if let Err(e) = session.reconnect().await {
                eprintln!("Reconnect failed: {}", e);
            }
        }
        Command::Unknown(line) => eprintln!("Unknown command: {}", line),
    }
    true
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    env_logger::init();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let session = ChatSession::new(args.session_config());
    install_printers(&session);

    match session.initialize().await {
        Ok(readiness) if !readiness.backend_healthy => {
            log::warn!("Backend health check failed");
        }
        Ok(_) => {}
        Err(e) => log::warn!("Streaming unavailable ({}), using HTTP fallback", e),
    }

    start(
        &session,
        subject(&args.artist_id, args.artist_name.as_deref()),
    )
    .await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle(&session, parse_command(&line)).await {
                        break;
                    }
                }
                None => break,
            },
            _ = signal::ctrl_c() => {
                println!("\nReceived Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
