//! SQLite storage layer
//!
//! The database is opened twice:
//! - Writer: one connection, owned by the writer thread (see `writer.rs`)
//! - Readers: an r2d2 pool of `query_only` connections for queries and counts
//!
//! WAL mode lets readers run alongside the writer without blocking it.
//!
//! Layout: `events` holds one row per stored event; `event_tags` holds one row
//! per non-empty tag with its first value (NULL when the tag has none) and its
//! position in the tag array.

use crate::config::DatabaseConfig;
use crate::error::{RelayError, Result};
use nostr::{Event, Filter, sort_events};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY,
        pubkey TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        kind INTEGER NOT NULL,
        tags TEXT NOT NULL,
        content TEXT NOT NULL,
        sig TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_events_pubkey ON events(pubkey)",
    "CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind)",
    "CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_events_kind_pubkey ON events(kind, pubkey)",
    "CREATE TABLE IF NOT EXISTS event_tags (
        event_id TEXT NOT NULL,
        tag_name TEXT NOT NULL,
        tag_value TEXT,
        position INTEGER NOT NULL,
        FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS idx_event_tags_event_id ON event_tags(event_id)",
    "CREATE INDEX IF NOT EXISTS idx_event_tags_name_value ON event_tags(tag_name, tag_value)",
];

pub type ReaderPool = Pool<SqliteConnectionManager>;
pub type ReaderConnection = PooledConnection<SqliteConnectionManager>;

/// Open the writer connection and make sure the schema exists.
pub(crate) fn open_writer(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", true)?;
    init_schema(&conn)?;

    info!("Database initialized at {:?} (journal_mode={})", path, mode);
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA {
        conn.execute(statement, [])?;
    }
    debug!("Database schema initialized");
    Ok(())
}

/// Pool of read-only connections.
pub(crate) fn reader_pool(config: &DatabaseConfig) -> Result<ReaderPool> {
    let manager = SqliteConnectionManager::file(&config.path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "query_only", true)
    });
    Pool::builder()
        .max_size(config.max_reader_connections.max(1))
        .build(manager)
        .map_err(RelayError::Pool)
}

/// Insert an event row and its tag rows. Returns false if the id exists.
pub(crate) fn insert_event(conn: &Connection, event: &Event) -> Result<bool> {
    let tags_json = serde_json::to_string(&event.tags)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO events (id, pubkey, created_at, kind, tags, content, sig)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &event.id,
            &event.pubkey,
            to_sql_time(event.created_at)?,
            event.kind,
            tags_json,
            &event.content,
            &event.sig,
        ],
    )?;
    if inserted == 0 {
        return Ok(false);
    }

    let mut stmt = conn.prepare_cached(
        "INSERT INTO event_tags (event_id, tag_name, tag_value, position)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (position, tag) in event.tags.iter().enumerate() {
        let Some(tag_name) = tag.first() else {
            continue;
        };
        let tag_value = tag.get(1).map(String::as_str);
        stmt.execute(params![&event.id, tag_name, tag_value, position as i64])?;
    }

    Ok(true)
}

/// Id and timestamp of the stored version of an addressable coordinate.
pub(crate) fn current_version(
    conn: &Connection,
    kind: u16,
    pubkey: &str,
    d: &str,
) -> Result<Option<(String, u64)>> {
    let row = conn
        .query_row(
            "SELECT e.id, e.created_at FROM events e
             JOIN event_tags t ON t.event_id = e.id AND t.tag_name = 'd'
             WHERE e.kind = ?1 AND e.pubkey = ?2 AND t.tag_value = ?3
             ORDER BY e.created_at DESC, e.id DESC
             LIMIT 1",
            params![kind, pubkey, d],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    row.map(|(id, created_at)| Ok((id, from_sql_time(created_at, 1)?)))
        .transpose()
}

/// Delete versions of a coordinate strictly older than `(created_at, id)`.
/// Tag rows go with them through the foreign key cascade.
pub(crate) fn delete_older_versions(
    conn: &Connection,
    kind: u16,
    pubkey: &str,
    d: &str,
    created_at: u64,
    id: &str,
) -> Result<usize> {
    let at = to_sql_time(created_at)?;
    let deleted = conn.execute(
        "DELETE FROM events
         WHERE kind = ?1 AND pubkey = ?2
           AND id IN (SELECT event_id FROM event_tags WHERE tag_name = 'd' AND tag_value = ?3)
           AND (created_at < ?4 OR (created_at = ?4 AND id < ?5))",
        params![kind, pubkey, d, at, id],
    )?;
    Ok(deleted)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub events: u64,
    pub tags: u64,
    /// `(kind, count)` ascending by kind
    pub kinds: Vec<(u16, u64)>,
}

pub(crate) fn stats(conn: &Connection) -> Result<StoreStats> {
    let events: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
    let tags: i64 = conn.query_row("SELECT COUNT(*) FROM event_tags", [], |row| row.get(0))?;

    let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM events GROUP BY kind ORDER BY kind")?;
    let kinds = stmt
        .query_map([], |row| {
            Ok((row.get::<_, u16>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(StoreStats {
        events: events as u64,
        tags: tags as u64,
        kinds,
    })
}

pub(crate) fn count_all(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Get an event by ID
pub(crate) fn get_event(conn: &Connection, id: &str) -> Result<Option<Event>> {
    conn.query_row(
        "SELECT id, pubkey, created_at, kind, tags, content, sig FROM events WHERE id = ?1",
        params![id],
        RawEvent::from_row,
    )
    .optional()?
    .map(RawEvent::into_event)
    .transpose()
}

/// Run each filter with its own limit, then merge, de-duplicate and order
/// the results newest first.
pub(crate) fn query_events(
    conn: &Connection,
    filters: &[Filter],
    default_limit: usize,
) -> Result<Vec<Event>> {
    let mut merged: HashMap<String, Event> = HashMap::new();

    for filter in filters {
        let mut params_vec = Vec::new();
        let clause = filter_clause(filter, &mut params_vec);
        let limit = filter.limit.unwrap_or(default_limit);
        params_vec.push(Value::Integer(limit as i64));

        let sql = format!(
            "SELECT id, pubkey, created_at, kind, tags, content, sig FROM events
             WHERE {}
             ORDER BY created_at DESC, id ASC
             LIMIT ?",
            clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params_vec.iter()), RawEvent::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for raw in rows {
            let event = raw.into_event()?;
            merged.entry(event.id.clone()).or_insert(event);
        }
    }

    let mut events: Vec<Event> = merged.into_values().collect();
    sort_events(&mut events);
    Ok(events)
}

/// Number of events matching any filter; limits are ignored.
pub(crate) fn count_events(conn: &Connection, filters: &[Filter]) -> Result<u64> {
    if filters.is_empty() {
        return Ok(0);
    }

    let mut params_vec = Vec::new();
    let clauses: Vec<String> = filters
        .iter()
        .map(|filter| format!("({})", filter_clause(filter, &mut params_vec)))
        .collect();
    let sql = format!("SELECT COUNT(*) FROM events WHERE {}", clauses.join(" OR "));

    let count: i64 = conn.query_row(&sql, params_from_iter(params_vec.iter()), |row| {
        row.get(0)
    })?;
    Ok(count as u64)
}

/// SQL condition for one filter, pushing its parameters onto `params_vec`.
///
/// An empty id/author/kind/tag-value list matches nothing.
fn filter_clause(filter: &Filter, params_vec: &mut Vec<Value>) -> String {
    let mut conditions: Vec<String> = Vec::new();

    if let Some(ref ids) = filter.ids {
        conditions.push(in_list("id", ids.iter().cloned().map(Value::Text), params_vec));
    }

    if let Some(ref authors) = filter.authors {
        conditions.push(in_list(
            "pubkey",
            authors.iter().cloned().map(Value::Text),
            params_vec,
        ));
    }

    if let Some(ref kinds) = filter.kinds {
        conditions.push(in_list(
            "kind",
            kinds.iter().map(|kind| Value::Integer(i64::from(*kind))),
            params_vec,
        ));
    }

    // Stored timestamps always fit i64.
    if let Some(since) = filter.since {
        match i64::try_from(since) {
            Ok(since) => {
                conditions.push("created_at >= ?".to_string());
                params_vec.push(Value::Integer(since));
            }
            Err(_) => conditions.push("0".to_string()),
        }
    }

    if let Some(until) = filter.until
        && let Ok(until) = i64::try_from(until)
    {
        conditions.push("created_at <= ?".to_string());
        params_vec.push(Value::Integer(until));
    }

    for (name, values) in filter.tag_filters() {
        if values.is_empty() {
            conditions.push("0".to_string());
            continue;
        }
        params_vec.push(Value::Text(name.to_string()));
        let placeholders = vec!["?"; values.len()].join(", ");
        params_vec.extend(values.iter().cloned().map(Value::Text));
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM event_tags t
                     WHERE t.event_id = events.id AND t.tag_name = ? AND t.tag_value IN ({}))",
            placeholders
        ));
    }

    if conditions.is_empty() {
        "1".to_string()
    } else {
        conditions.join(" AND ")
    }
}

fn in_list(
    column: &str,
    values: impl ExactSizeIterator<Item = Value>,
    params_vec: &mut Vec<Value>,
) -> String {
    if values.len() == 0 {
        return "0".to_string();
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    params_vec.extend(values);
    format!("{} IN ({})", column, placeholders)
}

fn to_sql_time(created_at: u64) -> Result<i64> {
    i64::try_from(created_at).map_err(|_| {
        RelayError::Rejected(nostr::EventError::Malformed(format!(
            "created_at {} out of range",
            created_at
        )))
    })
}

fn from_sql_time(created_at: i64, column: usize) -> Result<u64> {
    u64::try_from(created_at).map_err(|_| {
        RelayError::Storage(rusqlite::Error::IntegralValueOutOfRange(column, created_at))
    })
}

struct RawEvent {
    id: String,
    pubkey: String,
    created_at: i64,
    kind: u16,
    tags: String,
    content: String,
    sig: String,
}

impl RawEvent {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            pubkey: row.get(1)?,
            created_at: row.get(2)?,
            kind: row.get(3)?,
            tags: row.get(4)?,
            content: row.get(5)?,
            sig: row.get(6)?,
        })
    }

    fn into_event(self) -> Result<Event> {
        Ok(Event {
            created_at: from_sql_time(self.created_at, 2)?,
            tags: serde_json::from_str(&self.tags)?,
            id: self.id,
            pubkey: self.pubkey,
            kind: self.kind,
            content: self.content,
            sig: self.sig,
        })
    }
}
