//! SQLite-backed event storage for toolchat sessions.
//!
//! Every conversation the CLI runs is recorded as an append-only log of
//! [`Event`]s: the session start with its system prompt, each text message,
//! each tool call the model requested and the result it got back, rounds that
//! failed, and the session end. The log is what `toolchat sessions` and
//! `toolchat logs` browse.
//!
//! Events are returned in the order they were appended, not by timestamp.
//!
//! # Example
//!
//! ```no_run
//! use storage::{Event, EventKind, EventStore, Role, SessionId};
//!
//! let store = EventStore::open("events.db")?;
//!
//! let session_id = SessionId::new();
//! store.append(&Event::new(
//!     session_id,
//!     EventKind::SessionStart { system_prompt: "Be brief".into() },
//! ))?;
//! store.append(&Event::message(session_id, Role::User, "What time is it?"))?;
//!
//! for event in store.load_events(session_id, Some("message"))? {
//!     println!("{}: {:?}", event.timestamp, event.kind);
//! }
//!
//! for summary in store.list_sessions()? {
//!     println!("{}: {} messages", summary.id, summary.message_count);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod store;

pub use error::{Error, Result};
pub use event::{Event, EventKind, Role, SessionId};
pub use store::{EventStore, SessionSummary};
