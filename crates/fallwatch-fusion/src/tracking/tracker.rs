//! Greedy IoU bounding-box tracker.
//!
//! Assigns stable integer identities to per-frame detections using spatial
//! overlap with the previous frame. Deliberately minimal: first-match greedy
//! association, no occlusion memory, no re-identification. An identity that
//! goes unmatched for a single frame is dropped, and a momentarily occluded
//! person comes back under a fresh identity.

use fallwatch_core::Detection;

/// Stable identifier for a camera-tracked person.
///
/// Identities are unique and monotonically increasing for the lifetime of the
/// tracker; an id is never reused after its track is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct TrackId(u64);

impl TrackId {
    /// Wraps a raw track identifier.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for [`BoxTracker`].
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum IoU between an existing track's box and a new detection for
    /// the detection to continue that track (default: 0.3)
    pub iou_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { iou_threshold: 0.3 }
    }
}

/// Tracks people across frames by bounding-box overlap.
pub struct BoxTracker {
    config: TrackerConfig,
    next_id: u64,
    /// Current tracks in creation order; each holds the box from the most
    /// recent frame in which it matched.
    tracks: Vec<(TrackId, Detection)>,
}

impl BoxTracker {
    /// Creates a tracker with the given configuration.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            next_id: 0,
            tracks: Vec::new(),
        }
    }

    /// Updates tracked identities with this frame's detections.
    ///
    /// Each existing identity greedily claims the first still-unclaimed
    /// detection whose IoU with its previous box exceeds the threshold (ties
    /// broken by detection order). Leftover detections become new identities;
    /// identities that claimed nothing are dropped. An empty detection list
    /// therefore forgets every prior identity.
    ///
    /// The returned pairs have unique identities within the call.
    pub fn update(&mut self, detections: Vec<Detection>) -> Vec<(TrackId, Detection)> {
        let mut claimed = vec![false; detections.len()];
        let mut current: Vec<(TrackId, Detection)> = Vec::with_capacity(detections.len());

        for (id, previous) in &self.tracks {
            let matched = detections.iter().enumerate().find(|(i, candidate)| {
                !claimed[*i] && previous.bbox.iou(&candidate.bbox) > self.config.iou_threshold
            });
            if let Some((i, candidate)) = matched {
                claimed[i] = true;
                current.push((*id, *candidate));
            } else {
                tracing::debug!(track_id = %id, "track dropped: no matching detection");
            }
        }

        for (i, detection) in detections.iter().enumerate() {
            if claimed[i] {
                continue;
            }
            let id = TrackId::new(self.next_id);
            self.next_id += 1;
            tracing::debug!(track_id = %id, "new track born");
            current.push((id, *detection));
        }

        self.tracks = current.clone();
        current
    }

    /// Returns the number of currently tracked identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Returns `true` if nothing is currently tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
