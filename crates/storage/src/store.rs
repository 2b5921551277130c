//! SQLite event store implementation.

use crate::{Error, Event, EventKind, Result, SessionId};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;

/// Summary of a stored session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message_count: usize,
}

/// SQLite-backed event store.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Open or create an event store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory event store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_session
                ON events(session_id, seq);
            "#,
        )?;
        Ok(())
    }

    /// Append an event to the store.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (id, session_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.session_id.to_string(),
                event.timestamp.to_rfc3339(),
                event.kind.name(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Append several events in one transaction.
    pub fn append_all<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO events (id, session_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for event in events {
                stmt.execute(params![
                    event.id.to_string(),
                    event.session_id.to_string(),
                    event.timestamp.to_rfc3339(),
                    event.kind.name(),
                    serde_json::to_string(&event.kind)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Load all events for a session, in insertion order.
    pub fn load_session(&self, session_id: SessionId) -> Result<Vec<Event>> {
        self.load_events(session_id, None)
    }

    /// Load events for a session, optionally restricted to one kind
    /// (`message`, `tool_call`, ...).
    pub fn load_events(&self, session_id: SessionId, kind: Option<&str>) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, timestamp, data FROM events
             WHERE session_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY seq",
        )?;

        let rows = stmt.query_map(params![session_id.to_string(), kind], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, session_id, timestamp, data) = row?;
            events.push(decode_event(id, &session_id, &timestamp, &data)?);
        }
        Ok(events)
    }

    /// List sessions, most recently started first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id,
                    (SELECT timestamp FROM events f WHERE f.session_id = e.session_id
                        ORDER BY seq LIMIT 1),
                    (SELECT timestamp FROM events f WHERE f.session_id = e.session_id
                        AND f.kind = 'session_end' ORDER BY seq DESC LIMIT 1),
                    SUM(CASE WHEN kind = 'message' THEN 1 ELSE 0 END)
             FROM events e
             GROUP BY session_id
             ORDER BY MIN(seq) DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, started_at, ended_at, message_count) = row?;
            sessions.push(SessionSummary {
                id: parse_session_id(&id)?,
                started_at: parse_timestamp(&id, &started_at)?,
                ended_at: ended_at
                    .map(|ts| parse_timestamp(&id, &ts))
                    .transpose()?,
                message_count: usize::try_from(message_count).unwrap_or(0),
            });
        }
        Ok(sessions)
    }

    /// All sessions whose id starts with `prefix`.
    pub fn find_sessions(&self, prefix: &str) -> Result<Vec<SessionId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT session_id FROM events
             WHERE substr(session_id, 1, length(?1)) = ?1
             ORDER BY session_id",
        )?;
        let rows = stmt.query_map([prefix], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(parse_session_id(&row?)?);
        }
        Ok(ids)
    }
}

fn decode_event(id: String, session_id: &str, timestamp: &str, data: &str) -> Result<Event> {
    let kind: EventKind = serde_json::from_str(data)?;
    let parsed_id = id.parse().map_err(|e: uuid::Error| Error::Corrupt {
        id: id.clone(),
        reason: e.to_string(),
    })?;
    Ok(Event {
        id: parsed_id,
        session_id: parse_session_id(session_id)?,
        timestamp: parse_timestamp(&id, timestamp)?,
        kind,
    })
}

fn parse_session_id(raw: &str) -> Result<SessionId> {
    raw.parse().map_err(|e: uuid::Error| Error::Corrupt {
        id: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_timestamp(id: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
}
