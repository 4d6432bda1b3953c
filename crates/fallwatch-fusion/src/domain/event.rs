//! Fall events and the persistent event store contract.

use chrono::{DateTime, Utc};
use fallwatch_core::StorageError;
use parking_lot::Mutex;

use super::entity::AlertKey;
use super::report::RemoteReport;

/// Which detection source produced a fall event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// Camera pipeline
    Camera,
    /// Remote wearable/ESP32 device
    Remote,
}

impl EventSource {
    /// Returns the canonical storage string for this source.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Remote => "remote",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identifier assigned by the event store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(i64);

impl EventId {
    /// Wraps a store-assigned identifier.
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery status of a stored fall event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Persisted; notification fan-out not yet settled
    Pending,
    /// At least one notification channel delivered
    Notified,
    /// Every notification channel failed
    Failed,
}

impl EventStatus {
    /// Returns the canonical storage string for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Notified => "notified",
            Self::Failed => "failed",
        }
    }

    /// Parses a storage string back into a status.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "notified" => Some(Self::Notified),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed fall, immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct FallEvent {
    /// When the fall was confirmed
    pub timestamp: DateTime<Utc>,
    /// Which source confirmed it
    pub source: EventSource,
    /// Alert key string of the affected entity
    pub entity_id: String,
    /// GPS location, present only with a valid fix (x = longitude, y = latitude)
    pub location: Option<geo::Point<f64>>,
}

impl FallEvent {
    /// Builds an event for a camera-confirmed fall. Camera events carry no GPS.
    #[must_use]
    pub fn from_camera(key: &AlertKey, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            source: EventSource::Camera,
            entity_id: key.to_string(),
            location: None,
        }
    }

    /// Builds an event for a remote-reported fall.
    #[must_use]
    pub fn from_remote(key: &AlertKey, report: &RemoteReport, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            source: EventSource::Remote,
            entity_id: key.to_string(),
            location: report.location(),
        }
    }
}

/// A fall event as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Store-assigned identifier
    pub id: EventId,
    /// The event payload
    pub event: FallEvent,
    /// Current delivery status
    pub status: EventStatus,
}

/// Persistent store for fall events.
///
/// Implementations must be safe to call from background execution contexts;
/// blocking implementations are driven through `spawn_blocking` by callers.
pub trait EventStore: Send + Sync {
    /// Persists an event and returns its store-assigned identifier.
    fn insert(&self, event: &FallEvent) -> Result<EventId, StorageError>;

    /// Updates the delivery status of a stored event.
    fn update_status(&self, id: EventId, status: EventStatus) -> Result<(), StorageError>;

    /// Returns the most recent events, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>, StorageError>;
}

/// In-memory event store for tests and embedded use.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<StoredEvent>>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns `true` if no events are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventStore for InMemoryEventStore {
    fn insert(&self, event: &FallEvent) -> Result<EventId, StorageError> {
        let mut events = self.events.lock();
        let id = EventId::new(events.len() as i64 + 1);
        events.push(StoredEvent {
            id,
            event: event.clone(),
            status: EventStatus::Pending,
        });
        Ok(id)
    }

    fn update_status(&self, id: EventId, status: EventStatus) -> Result<(), StorageError> {
        let mut events = self.events.lock();
        let stored = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })?;
        stored.status = status;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>, StorageError> {
        let events = self.events.lock();
        Ok(events.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackId;

    fn camera_event() -> FallEvent {
        FallEvent::from_camera(&AlertKey::Camera(TrackId::new(1)), Utc::now())
    }

    #[test]
    fn test_insert_returns_monotonic_ids() {
        let store = InMemoryEventStore::new();
        let a = store.insert(&camera_event()).unwrap();
        let b = store.insert(&camera_event()).unwrap();
        assert!(b.value() > a.value());
    }

    #[test]
    fn test_status_transitions() {
        let store = InMemoryEventStore::new();
        let id = store.insert(&camera_event()).unwrap();
        let stored = &store.recent(1).unwrap()[0];
        assert_eq!(stored.status, EventStatus::Pending);

        store.update_status(id, EventStatus::Notified).unwrap();
        assert_eq!(store.recent(1).unwrap()[0].status, EventStatus::Notified);

        let missing = store.update_status(EventId::new(999), EventStatus::Failed);
        assert!(missing.is_err());
    }

    #[test]
    fn test_recent_is_newest_first() {
        let store = InMemoryEventStore::new();
        for _ in 0..3 {
            store.insert(&camera_event()).unwrap();
        }
        let recent = store.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id.value(), 3);
        assert_eq!(recent[1].id.value(), 2);
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [EventStatus::Pending, EventStatus::Notified, EventStatus::Failed] {
            assert_eq!(EventStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(EventStatus::parse("unknown"), None);
    }
}
