mod config;
mod error;
mod tools;

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use runtime::{Message, Orchestrator, Session, ToolRegistry};
use storage::{Event, EventKind, EventStore, Role, SessionId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

#[derive(Parser)]
#[command(name = "toolchat")]
#[command(about = "Chat with a model that can call local tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the config file (defaults to ./toolchat.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// List all sessions
    Sessions {
        /// Show only the last N sessions
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show event logs for a session
    Logs {
        /// Session ID (prefix match supported)
        #[arg(short, long)]
        session: String,
        /// Filter by event kind (message, tool_call, tool_result, round_failed)
        #[arg(short, long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Chat) | None => cmd_chat(cli.config).await,
        Some(Commands::Sessions { limit }) => cmd_sessions(limit),
        Some(Commands::Logs { session, kind }) => cmd_logs(&session, kind.as_deref()),
    }
}

async fn cmd_chat(config_path: Option<PathBuf>) -> Result<()> {
    println!("toolchat v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::discover(config_path.as_deref())?;
    let backend = config.backend()?;

    let mut registry = ToolRegistry::new();
    registry.register_all(tools::builtin());
    let tool_names: Vec<_> = registry.names().map(str::to_string).collect();

    let orchestrator =
        Orchestrator::new(backend, Arc::new(registry)).with_config(config.orchestrator());

    let data_dir = dirs_data_dir().unwrap_or_else(|| ".toolchat".into());
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("events.db");
    let mut store = EventStore::open(&db_path)?;

    let session_id = SessionId::new();
    let system_prompt = config.session.system_prompt.clone();
    store.append(&Event::new(
        session_id,
        EventKind::SessionStart {
            system_prompt: system_prompt.clone(),
        },
    ))?;

    tracing::info!(%session_id, model = %config.backend.model, "session started");

    let mut session = Session::new(Arc::new(orchestrator), system_prompt);
    let mut persisted = session.conversation().len();

    println!("Session stored at: {}", db_path.display());
    println!("Session ID: {session_id}");
    println!("Model: {}", model_label(&config));
    println!("Tools: {}", tool_names.join(", "));
    println!("Type 'quit', Ctrl+D or Ctrl+C to exit. Ctrl+C while waiting cancels the answer.\n");

    let mut lines = spawn_line_reader();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let Some(line) = next_line(&mut lines, tokio::signal::ctrl_c()).await? else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };
        let result = session.chat_with_cancel(input, &cancel).await;
        interrupt.abort();

        let messages = &session.conversation().messages()[persisted..];
        let mut events: Vec<Event> = messages
            .iter()
            .flat_map(|message| message_events(session_id, message))
            .collect();
        persisted = session.conversation().len();

        match result {
            Ok(answer) => println!("\n{answer}\n"),
            Err(e) => {
                events.push(Event::new(
                    session_id,
                    EventKind::RoundFailed {
                        reason: e.to_string(),
                    },
                ));
                println!("\nResponse failed because '{e}'\n");
            }
        }
        tracing::debug!(events = events.len(), "persisting turn");
        store.append_all(&events)?;
    }

    store.append(&Event::new(session_id, EventKind::SessionEnd))?;
    let usage = session.end().usage();
    println!(
        "\nSession ended. Tokens used: {} in, {} out.",
        usage.input_tokens, usage.output_tokens
    );
    Ok(())
}

/// Read stdin lines on a plain thread so the prompt can also wait on Ctrl+C.
fn spawn_line_reader() -> mpsc::UnboundedReceiver<io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// The next input line, or `None` on end of input or an interrupt at the
/// prompt.
async fn next_line<F>(
    lines: &mut mpsc::UnboundedReceiver<io::Result<String>>,
    interrupt: F,
) -> io::Result<Option<String>>
where
    F: Future<Output = io::Result<()>>,
{
    tokio::select! {
        line = lines.recv() => line.transpose(),
        _ = interrupt => {
            println!();
            Ok(None)
        }
    }
}

fn model_label(config: &Config) -> String {
    match &config.backend.base_url {
        Some(url) => format!("{} at {url}", config.backend.model),
        None => config.backend.model.clone(),
    }
}

/// Log events for one conversation message.
fn message_events(session_id: SessionId, message: &Message) -> Vec<Event> {
    match message {
        Message::System { content } => vec![Event::message(session_id, Role::System, content)],
        Message::User { content } => vec![Event::message(session_id, Role::User, content)],
        Message::Assistant {
            content,
            tool_calls,
        } => {
            let text = (!content.is_empty() || tool_calls.is_empty())
                .then(|| Event::message(session_id, Role::Assistant, content));
            text.into_iter()
                .chain(tool_calls.iter().map(|call| {
                    Event::new(
                        session_id,
                        EventKind::ToolCall {
                            call_id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call
                                .arguments
                                .iter()
                                .map(|(k, v)| (k.to_string(), v.to_string()))
                                .collect(),
                        },
                    )
                }))
                .collect()
        }
        Message::ToolResult {
            call_id,
            content,
            is_error,
        } => vec![Event::new(
            session_id,
            EventKind::ToolResult {
                call_id: call_id.clone(),
                content: content.clone(),
                is_error: *is_error,
            },
        )],
    }
}

fn cmd_sessions(limit: usize) -> Result<()> {
    let store = open_store()?;
    let sessions = store.list_sessions()?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:<8}  STATUS",
        "SESSION ID", "STARTED", "MSGS"
    );
    println!("{}", "-".repeat(80));

    for summary in sessions.into_iter().take(limit) {
        let started = Local
            .from_utc_datetime(&summary.started_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        let status = if summary.ended_at.is_some() {
            "ended"
        } else {
            "active"
        };
        println!(
            "{:<36}  {:<20}  {:<8}  {status}",
            summary.id, started, summary.message_count
        );
    }

    Ok(())
}

fn cmd_logs(session_prefix: &str, kind_filter: Option<&str>) -> Result<()> {
    let store = open_store()?;

    let matching = store.find_sessions(session_prefix)?;
    let session_id = match matching.as_slice() {
        [] => {
            return Err(Error::SessionNotFound {
                prefix: session_prefix.to_string(),
            });
        }
        [id] => *id,
        _ => {
            return Err(Error::AmbiguousSession {
                prefix: session_prefix.to_string(),
                matches: matching.iter().map(|id| id.to_string()).collect(),
            });
        }
    };

    let events = store.load_events(session_id, kind_filter)?;

    if events.is_empty() {
        println!("No events found for session {session_id}");
        return Ok(());
    }

    println!("Session: {session_id}\n");

    for event in events {
        print_event(&event);
    }

    Ok(())
}

fn print_event(event: &Event) {
    let time = Local
        .from_utc_datetime(&event.timestamp.naive_utc())
        .format("%H:%M:%S");

    match &event.kind {
        EventKind::SessionStart { system_prompt } => {
            println!("[{time}] === Session started === ({})", truncate(system_prompt));
        }
        EventKind::SessionEnd => {
            println!("[{time}] === Session ended ===");
        }
        EventKind::Message { role, content } => {
            println!("[{time}] {role}: {}", truncate(content));
        }
        EventKind::ToolCall {
            call_id,
            name,
            arguments,
        } => {
            println!("[{time}] TOOL CALL {call_id}: {name} {arguments:?}");
        }
        EventKind::ToolResult {
            call_id,
            content,
            is_error,
        } => {
            let label = if *is_error { "TOOL ERROR" } else { "TOOL RESULT" };
            println!("[{time}] {label} {call_id}: {}", truncate(content));
        }
        EventKind::RoundFailed { reason } => {
            println!("[{time}] FAILED: {reason}");
        }
    }
}

/// Shorten long text for display, on a char boundary.
fn truncate(content: &str) -> String {
    const LIMIT: usize = 200;
    match content.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

fn open_store() -> Result<EventStore> {
    let data_dir = dirs_data_dir().unwrap_or_else(|| ".toolchat".into());
    let db_path = data_dir.join("events.db");

    if !db_path.exists() {
        return Err(Error::DatabaseNotFound { path: db_path });
    }

    Ok(EventStore::open(&db_path)?)
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/toolchat"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("toolchat"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("toolchat"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::{Arguments, ToolCall};

    #[test]
    fn assistant_tool_calls_become_call_events() {
        let session = SessionId::new();
        let message = Message::assistant_with_calls(
            "",
            vec![ToolCall::new(
                "call_1",
                "ConvertTemperature",
                Arguments::new().with("Value", "20").with("Unit", "C"),
            )],
        );

        let events = message_events(session, &message);
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            EventKind::ToolCall {
                call_id,
                name,
                arguments,
            } => {
                assert_eq!(call_id, "call_1");
                assert_eq!(name, "ConvertTemperature");
                assert_eq!(arguments.get("Unit").map(String::as_str), Some("C"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn plain_answer_becomes_one_message() {
        let events = message_events(SessionId::new(), &Message::assistant("It's 18°C"));
        assert_eq!(
            events[0].kind,
            EventKind::Message {
                role: Role::Assistant,
                content: "It's 18°C".into()
            }
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let long = "é".repeat(250);
        let short = truncate(&long);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), 203);
        assert_eq!(truncate("short"), "short");
    }

    #[tokio::test]
    async fn interrupt_at_prompt_ends_input() {
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let line = next_line(&mut rx, std::future::ready(Ok(()))).await.unwrap();
        assert_eq!(line, None);
    }

    #[tokio::test]
    async fn lines_pass_through_until_input_closes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Ok("what time is it?".to_string())).unwrap();
        drop(tx);

        let first = next_line(&mut rx, std::future::pending()).await.unwrap();
        assert_eq!(first.as_deref(), Some("what time is it?"));
        let end = next_line(&mut rx, std::future::pending()).await.unwrap();
        assert_eq!(end, None);
    }

    #[test]
    fn verbosity_flag_is_counted() {
        let cli = Cli::parse_from(["toolchat", "-vv", "sessions", "--limit", "3"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Some(Commands::Sessions { limit: 3 })));
    }
}
