//! Entity correlation and alert policy.
//!
//! The correlator maps camera-tracked identities and remote device identities
//! onto the shared [`AlertKey`] space, owns the arena of per-entity fall
//! state machines, applies deduplication and cooldown through the
//! [`AlertLedger`], and forwards authorized fall events to the dispatcher.

pub mod ledger;

pub use ledger::{AlertLedger, DedupVerdict};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fallwatch_core::{BoundingBox, Frame, PoseLandmarks};
use parking_lot::Mutex;

use crate::alerting::AlertDispatcher;
use crate::detection::{FallConfig, FallDetector};
use crate::domain::{AlertKey, FallEvent, RemoteReport};
use crate::tracking::TrackId;

/// Configuration for [`Correlator`].
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Fall state machine parameters, applied to every entity
    pub fall: FallConfig,
    /// Minimum time between two alerts for the same entity (default: 5 min)
    pub cooldown: Duration,
    /// Evict state machines for entities unseen this long; `None` (the
    /// default) never evicts
    pub entity_idle_eviction: Option<Duration>,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            fall: FallConfig::default(),
            cooldown: Duration::from_secs(300),
            entity_idle_eviction: None,
        }
    }
}

struct EntityState {
    detector: FallDetector,
    last_seen: DateTime<Utc>,
}

/// Correlates observations from both detection sources against the alert
/// policy.
pub struct Correlator {
    config: CorrelatorConfig,
    entities: Mutex<HashMap<AlertKey, EntityState>>,
    ledger: AlertLedger,
    dispatcher: Arc<AlertDispatcher>,
}

impl Correlator {
    /// Creates a correlator forwarding authorized events to `dispatcher`.
    #[must_use]
    pub fn new(config: CorrelatorConfig, dispatcher: Arc<AlertDispatcher>) -> Self {
        let ledger = AlertLedger::new(config.cooldown);
        Self {
            config,
            entities: Mutex::new(HashMap::new()),
            ledger,
            dispatcher,
        }
    }

    /// Processes one camera observation for a tracked identity.
    ///
    /// Looks up or lazily creates the identity's fall state machine,
    /// evaluates it, and, only if it confirms and the cooldown allows,
    /// builds a GPS-less fall event and hands it to the dispatcher together
    /// with the frame snapshot.
    pub fn on_camera_observation(
        &self,
        snapshot: &Frame,
        track: TrackId,
        bbox: &BoundingBox,
        pose: &PoseLandmarks,
    ) {
        let key = AlertKey::Camera(track);
        let now = Utc::now();

        let confirmed = {
            let mut entities = self.entities.lock();
            let state = entities.entry(key.clone()).or_insert_with(|| EntityState {
                detector: FallDetector::new(self.config.fall.clone()),
                last_seen: now,
            });
            state.last_seen = now;
            state.detector.observe(pose)
        };

        if !confirmed {
            return;
        }

        if !self.ledger.try_authorize(&key, now) {
            tracing::debug!(entity = %key, "fall confirmed but cooling down");
            return;
        }

        let center = bbox.center();
        tracing::info!(
            entity = %key,
            box_center_x = center.0,
            box_center_y = center.1,
            "camera fall confirmed, alert authorized"
        );

        let event = FallEvent::from_camera(&key, now);
        let image = snapshot.has_image().then(|| snapshot.clone());
        self.dispatcher.dispatch(event, image);
    }

    /// Processes one raw payload from the remote transport.
    ///
    /// Malformed payloads are logged and dropped; reports that do not
    /// explicitly flag a fall are ignored; retransmissions (identical device
    /// timestamp) are dropped before the cooldown check runs.
    pub fn on_remote_report(&self, payload: &[u8]) {
        let report = match RemoteReport::from_payload(payload) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "remote payload rejected");
                return;
            }
        };

        if !report.fall_detected {
            return;
        }

        if let Some(timestamp) = report.timestamp {
            if self
                .ledger
                .observe_report_timestamp(&report.device_id, timestamp)
                == DedupVerdict::Duplicate
            {
                tracing::debug!(
                    device = %report.device_id,
                    timestamp,
                    "duplicate remote report dropped"
                );
                return;
            }
        }

        let key = AlertKey::Device(report.device_id.clone());
        let now = Utc::now();

        if !self.ledger.try_authorize(&key, now) {
            tracing::debug!(entity = %key, "remote fall reported but cooling down");
            return;
        }

        tracing::info!(
            entity = %key,
            has_gps_fix = report.has_gps_fix,
            "remote fall report accepted, alert authorized"
        );

        let event = FallEvent::from_remote(&key, &report, now);
        self.dispatcher.dispatch(event, None);
    }

    /// Drops state machines for entities unseen longer than the configured
    /// idle window. A no-op when eviction is disabled. The cooldown ledger is
    /// deliberately left untouched: alert-rate bookkeeping must outlive
    /// entity state.
    pub fn prune_idle(&self, now: DateTime<Utc>) {
        let Some(window) = self.config.entity_idle_eviction else {
            return;
        };
        let Ok(window) = chrono::Duration::from_std(window) else {
            return;
        };
        let mut entities = self.entities.lock();
        let before = entities.len();
        entities.retain(|_, state| now.signed_duration_since(state.last_seen) < window);
        let evicted = before - entities.len();
        if evicted > 0 {
            tracing::debug!(evicted, "idle entity state machines evicted");
        }
    }

    /// Number of entities with live state machines.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.lock().len()
    }
}
