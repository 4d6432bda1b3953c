//! Domain model: alert keys, remote reports, and fall events.

pub mod entity;
pub mod event;
pub mod report;

pub use entity::AlertKey;
pub use event::{
    EventId, EventSource, EventStatus, EventStore, FallEvent, InMemoryEventStore, StoredEvent,
};
pub use report::{RemoteReport, ReportError};
