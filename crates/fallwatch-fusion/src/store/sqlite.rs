//! SQLite-backed event store.
//!
//! Connection in WAL mode behind a mutex; callers in async contexts drive
//! the store through `spawn_blocking`.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fallwatch_core::StorageError;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::domain::{
    EventId, EventSource, EventStatus, EventStore, FallEvent, StoredEvent,
};

/// Persistent fall event store on SQLite.
pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventStore {
    /// Opens (or creates) the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the database cannot be opened or the
    /// schema cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)
            .map_err(|e| StorageError::connection(e.to_string()))?;
        Self::initialize(conn)
    }

    /// Opens an in-memory store (tests and ephemeral runs).
    ///
    /// # Errors
    ///
    /// Returns a connection error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::connection(e.to_string()))?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS fall_events (
                 id          INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp   TEXT NOT NULL,
                 source      TEXT NOT NULL,
                 entity_id   TEXT NOT NULL,
                 latitude    REAL,
                 longitude   REAL,
                 has_gps_fix INTEGER NOT NULL,
                 status      TEXT NOT NULL
             );",
        )
        .map_err(|e| StorageError::connection(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl EventStore for SqliteEventStore {
    fn insert(&self, event: &FallEvent) -> Result<EventId, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO fall_events
                 (timestamp, source, entity_id, latitude, longitude, has_gps_fix, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.timestamp.to_rfc3339(),
                event.source.as_str(),
                event.entity_id,
                event.location.map(|p| p.y()),
                event.location.map(|p| p.x()),
                event.location.is_some() as i64,
                EventStatus::Pending.as_str(),
            ],
        )
        .map_err(|e| StorageError::write(e.to_string()))?;
        Ok(EventId::new(conn.last_insert_rowid()))
    }

    fn update_status(&self, id: EventId, status: EventStatus) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE fall_events SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id.value()],
            )
            .map_err(|e| StorageError::write(e.to_string()))?;
        if changed == 0 {
            return Err(StorageError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, source, entity_id, latitude, longitude, has_gps_fix, status
                 FROM fall_events ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| StorageError::query(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let id: i64 = row.get(0)?;
                let timestamp: String = row.get(1)?;
                let source: String = row.get(2)?;
                let entity_id: String = row.get(3)?;
                let latitude: Option<f64> = row.get(4)?;
                let longitude: Option<f64> = row.get(5)?;
                let has_gps_fix: bool = row.get(6)?;
                let status: String = row.get(7)?;
                Ok((
                    id, timestamp, source, entity_id, latitude, longitude, has_gps_fix, status,
                ))
            })
            .map_err(|e| StorageError::query(e.to_string()))?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, source, entity_id, latitude, longitude, has_gps_fix, status) =
                row.map_err(|e| StorageError::query(e.to_string()))?;

            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| StorageError::query(format!("bad timestamp in row {id}: {e}")))?
                .with_timezone(&Utc);
            let source = match source.as_str() {
                "camera" => EventSource::Camera,
                "remote" => EventSource::Remote,
                other => {
                    return Err(StorageError::query(format!(
                        "bad source in row {id}: {other}"
                    )))
                }
            };
            let status = EventStatus::parse(&status)
                .ok_or_else(|| StorageError::query(format!("bad status in row {id}: {status}")))?;
            let location = match (has_gps_fix, latitude, longitude) {
                (true, Some(lat), Some(lon)) => Some(geo::Point::new(lon, lat)),
                _ => None,
            };

            events.push(StoredEvent {
                id: EventId::new(id),
                event: FallEvent {
                    timestamp,
                    source,
                    entity_id,
                    location,
                },
                status,
            });
        }
        Ok(events)
    }
}
