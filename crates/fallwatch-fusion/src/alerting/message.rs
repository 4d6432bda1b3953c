//! Human-readable alert text.

use crate::domain::{EventId, EventSource, FallEvent};

/// Composes the alert message for a persisted fall event.
///
/// The storage identifier is embedded verbatim so responders can reference
/// the stored record; GPS coordinates appear only when the event carries a
/// valid fix.
#[must_use]
pub fn compose(event: &FallEvent, id: EventId) -> String {
    match (event.source, event.location) {
        (EventSource::Camera, _) => format!(
            "Fall detected by camera for {}. Event ID: {id}.",
            event.entity_id
        ),
        (EventSource::Remote, Some(location)) => format!(
            "Fall detected by {} at GPS {:.5}, {:.5}. Event ID: {id}.",
            event.entity_id,
            location.y(),
            location.x()
        ),
        (EventSource::Remote, None) => format!(
            "Fall detected by {} (no GPS fix). Event ID: {id}.",
            event.entity_id
        ),
    }
}
