//! # FallWatch Fusion
//!
//! Fall-detection fusion core: raises a human-safety alert when a fall is
//! detected, fusing two independent detection sources: a camera pipeline
//! that tracks multiple people and estimates skeletal pose, and remote
//! wearable/ESP32 devices that report fall status over a subscribe channel.
//!
//! The pose and detection models themselves are external collaborators
//! (see [`fallwatch_core::traits`]); this crate is the layer on top of them:
//!
//! - **Tracking**: stable per-entity identity across frames
//! - **Detection**: one temporal fall state machine per tracked entity
//! - **Correlation**: both sources folded onto one alert key space, with
//!   deduplication and cooldown
//! - **Alerting**: persist-then-notify dispatch across independent,
//!   failure-prone channels
//!
//! ## Architecture
//!
//! ```text
//! frames ─▶ detector ─▶ tracker ─▶ pose ─▶ fall state machine ─┐
//!                                                              ├─▶ correlator ─▶ dispatcher ─▶ channels
//! subscribe payloads ─▶ validation ─▶ dedup ───────────────────┘                    │
//!                                                                                  └─▶ event store
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fallwatch_fusion::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = FusionConfig::builder()
//!         .cooldown(std::time::Duration::from_secs(300))
//!         .frames_to_confirm_motion(15)
//!         .build();
//!
//!     let store = Arc::new(InMemoryEventStore::new());
//!     let dispatcher = Arc::new(AlertDispatcher::new(
//!         config.dispatcher.clone(),
//!         store,
//!         Vec::new(),
//!     ));
//!     let correlator = Arc::new(Correlator::new(config.correlator(), dispatcher.clone()));
//!     let runtime = FusionRuntime::new(config.runtime.clone(), correlator, dispatcher);
//!
//!     let handle = runtime.start(None, None);
//!     handle.shutdown().await;
//! }
//! ```

#![warn(missing_docs)]

pub mod alerting;
pub mod channels;
pub mod correlator;
pub mod detection;
pub mod domain;
pub mod integration;
pub mod runtime;
pub mod store;
pub mod tracking;

use std::time::Duration;

pub use alerting::{AlertDispatcher, DispatcherConfig, NotificationChannel, RetryPolicy, SendOutcome};
pub use correlator::{AlertLedger, Correlator, CorrelatorConfig, DedupVerdict};
pub use detection::{FallConfig, FallDetector, TorsoPosture};
pub use domain::{
    AlertKey, EventId, EventSource, EventStatus, EventStore, FallEvent, InMemoryEventStore,
    RemoteReport, ReportError, StoredEvent,
};
pub use integration::{QueueTransport, ReceiverConfig, RemoteTransport, ReplaySource, ReportReceiver};
pub use runtime::{FusionRuntime, RuntimeConfig, RuntimeHandle, VisionBundle};
pub use store::SqliteEventStore;
pub use tracking::{BoxTracker, TrackId, TrackerConfig};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common result type for fusion operations.
pub type Result<T> = std::result::Result<T, FusionError>;

/// Unified error type for fusion operations.
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    /// Shared core error
    #[error("Core error: {0}")]
    Core(#[from] fallwatch_core::CoreError),

    /// Event store error
    #[error("Storage error: {0}")]
    Storage(#[from] fallwatch_core::StorageError),

    /// Remote payload rejected
    #[error("Report rejected: {0}")]
    Report(#[from] domain::ReportError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Top-level configuration for an assembled fusion system.
#[derive(Debug, Clone, Default)]
pub struct FusionConfig {
    /// Fall state machine parameters
    pub fall: FallConfig,
    /// Alert policy parameters (cooldown, eviction)
    pub policy: PolicyConfig,
    /// Dispatcher parameters
    pub dispatcher: DispatcherConfig,
    /// Runtime loop parameters (includes the tracker)
    pub runtime: RuntimeConfig,
}

/// Alert-policy slice of the configuration.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Minimum time between two alerts for the same entity (default: 5 min)
    pub cooldown: Duration,
    /// Evict state machines for entities unseen this long; `None` never
    /// evicts (default)
    pub entity_idle_eviction: Option<Duration>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(300),
            entity_idle_eviction: None,
        }
    }
}

impl FusionConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> FusionConfigBuilder {
        FusionConfigBuilder::default()
    }

    /// Projects the correlator's slice of this configuration.
    #[must_use]
    pub fn correlator(&self) -> CorrelatorConfig {
        CorrelatorConfig {
            fall: self.fall.clone(),
            cooldown: self.policy.cooldown,
            entity_idle_eviction: self.policy.entity_idle_eviction,
        }
    }
}

/// Builder for [`FusionConfig`].
#[derive(Debug, Default)]
pub struct FusionConfigBuilder {
    config: FusionConfig,
}

impl FusionConfigBuilder {
    /// Sets the tracker's IoU continuation threshold.
    #[must_use]
    pub fn iou_threshold(mut self, threshold: f32) -> Self {
        self.config.runtime.tracker.iou_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Sets the alert cooldown window.
    #[must_use]
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.policy.cooldown = cooldown;
        self
    }

    /// Enables idle eviction of entity state machines.
    #[must_use]
    pub fn entity_idle_eviction(mut self, window: Duration) -> Self {
        self.config.policy.entity_idle_eviction = Some(window);
        self
    }

    /// Sets the centroid velocity threshold (pixels per frame).
    #[must_use]
    pub fn velocity_threshold(mut self, threshold: f32) -> Self {
        self.config.fall.velocity_threshold = threshold.max(0.0);
        self
    }

    /// Sets the consecutive-frame threshold for motion-confirmed falls.
    #[must_use]
    pub fn frames_to_confirm_motion(mut self, frames: u32) -> Self {
        self.config.fall.frames_to_confirm_motion = frames.max(1);
        self
    }

    /// Sets the consecutive-frame threshold for lying-confirmed falls.
    #[must_use]
    pub fn frames_to_confirm_lying(mut self, frames: u32) -> Self {
        self.config.fall.frames_to_confirm_lying = frames.max(1);
        self
    }

    /// Sets the maximum simultaneous outgoing channel sends.
    #[must_use]
    pub fn max_concurrent_sends(mut self, limit: usize) -> Self {
        self.config.dispatcher.max_concurrent_sends = limit.max(1);
        self
    }

    /// Sets the shutdown grace period for in-flight dispatches.
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.runtime.shutdown_grace = grace;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> FusionConfig {
        self.config
    }
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        AlertDispatcher, AlertKey, BoxTracker, Correlator, CorrelatorConfig, DispatcherConfig,
        EventId, EventSource, EventStatus, EventStore, FallConfig, FallDetector, FallEvent,
        FusionConfig, FusionError, FusionRuntime, InMemoryEventStore, NotificationChannel,
        QueueTransport, ReceiverConfig, RemoteReport, RemoteTransport, ReplaySource,
        ReportReceiver, Result, RuntimeConfig, SendOutcome, SqliteEventStore, StoredEvent,
        TrackId, TrackerConfig, VisionBundle,
    };
    pub use crate::channels::{ChatChannel, ChatConfig, TelephonyChannel, TelephonyConfig};
}
