//! Runtime orchestration of the two producer loops.
//!
//! The camera loop and the remote-report loop run as independent tokio
//! tasks feeding the shared correlator; a failure in one never stops the
//! other, and both stop on the shared shutdown signal. Per-frame processing
//! is synchronous within the camera task, so the tracker and the per-entity
//! state machines are mutated from exactly one place.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fallwatch_core::{Detection, Frame, FrameSource, HumanDetector, PoseEstimator, PoseLandmarks};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::alerting::AlertDispatcher;
use crate::correlator::Correlator;
use crate::integration::RemoteTransport;
use crate::tracking::{BoxTracker, TrackerConfig};

/// The camera-side collaborator set.
pub struct VisionBundle {
    /// Frame source
    pub source: Arc<dyn FrameSource>,
    /// Object detector
    pub detector: Arc<dyn HumanDetector>,
    /// Pose estimator
    pub estimator: Arc<dyn PoseEstimator>,
}

/// Configuration for [`FusionRuntime`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Tracker parameters for the camera loop
    pub tracker: TrackerConfig,
    /// Sleep after the frame source reports no frame available (default: 200ms)
    pub frame_idle_backoff: Duration,
    /// Sleep after a frame-source error (default: 500ms)
    pub error_backoff: Duration,
    /// How often the camera loop prunes idle entity state (default: 30s)
    pub prune_interval: Duration,
    /// Grace period for in-flight dispatches on shutdown (default: 5s)
    pub shutdown_grace: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            frame_idle_backoff: Duration::from_millis(200),
            error_backoff: Duration::from_millis(500),
            prune_interval: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Owns the producer loops for the lifetime of the process.
pub struct FusionRuntime {
    config: RuntimeConfig,
    correlator: Arc<Correlator>,
    dispatcher: Arc<AlertDispatcher>,
}

impl FusionRuntime {
    /// Creates a runtime over an assembled correlator and dispatcher.
    #[must_use]
    pub fn new(
        config: RuntimeConfig,
        correlator: Arc<Correlator>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            config,
            correlator,
            dispatcher,
        }
    }

    /// Starts the configured producer loops.
    ///
    /// Either producer may be absent (camera-only or remote-only
    /// deployments); with both absent the runtime only carries dispatch
    /// shutdown semantics.
    #[must_use]
    pub fn start(
        &self,
        vision: Option<VisionBundle>,
        transport: Option<Box<dyn RemoteTransport>>,
    ) -> RuntimeHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let camera_task = vision.map(|vision| {
            let correlator = Arc::clone(&self.correlator);
            let config = self.config.clone();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                camera_loop(config, vision, correlator, shutdown).await;
            })
        });

        let remote_task = transport.map(|transport| {
            let correlator = Arc::clone(&self.correlator);
            let shutdown = shutdown_rx;
            tokio::spawn(async move {
                remote_loop(transport, correlator, shutdown).await;
            })
        });

        RuntimeHandle {
            shutdown_tx,
            camera_task,
            remote_task,
            dispatcher: Arc::clone(&self.dispatcher),
            grace: self.config.shutdown_grace,
        }
    }
}

/// Handle for stopping a running system.
pub struct RuntimeHandle {
    shutdown_tx: watch::Sender<bool>,
    camera_task: Option<JoinHandle<()>>,
    remote_task: Option<JoinHandle<()>>,
    dispatcher: Arc<AlertDispatcher>,
    grace: Duration,
}

impl RuntimeHandle {
    /// Signals both loops to stop, waits for them, then gives in-flight
    /// dispatches the configured grace period to complete or be abandoned.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        for (name, task) in [
            ("camera", self.camera_task),
            ("remote", self.remote_task),
        ] {
            let Some(task) = task else { continue };
            match tokio::time::timeout(self.grace, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(loop_name = name, error = %e, "loop task failed"),
                Err(_) => tracing::warn!(loop_name = name, "loop did not stop within grace"),
            }
        }

        self.dispatcher.shutdown(self.grace).await;
        tracing::info!("runtime stopped");
    }
}

async fn camera_loop(
    config: RuntimeConfig,
    vision: VisionBundle,
    correlator: Arc<Correlator>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tracker = BoxTracker::new(config.tracker.clone());
    let mut last_prune = tokio::time::Instant::now();
    tracing::info!("camera loop started");

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = vision.source.next_frame() => frame,
        };

        match frame {
            Ok(Some(frame)) => {
                process_frame(&mut tracker, &vision, &correlator, &frame);
            }
            Ok(None) => {
                // Temporary unavailability, not end-of-stream.
                tokio::time::sleep(config.frame_idle_backoff).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "frame source error");
                tokio::time::sleep(config.error_backoff).await;
            }
        }

        if last_prune.elapsed() >= config.prune_interval {
            correlator.prune_idle(Utc::now());
            last_prune = tokio::time::Instant::now();
        }
    }
    tracing::info!("camera loop stopped");
}

/// Runs one frame through detect → track → per-identity pose → correlator.
///
/// Collaborator failures are contained here: a failing detector skips the
/// frame, a failing pose estimate is treated as "no pose" so the identity's
/// state machine sees the gap and resets.
fn process_frame(
    tracker: &mut BoxTracker,
    vision: &VisionBundle,
    correlator: &Correlator,
    frame: &Frame,
) {
    let detections = match vision.detector.detect(frame) {
        Ok(detections) => detections,
        Err(e) => {
            tracing::warn!(seq = frame.seq, error = %e, "detector failed, frame skipped");
            return;
        }
    };

    let people: Vec<Detection> = detections.into_iter().filter(Detection::is_person).collect();
    let tracked = tracker.update(people);

    for (track, detection) in tracked {
        let pose = match vision.estimator.estimate(frame, &detection.bbox) {
            Ok(Some(pose)) => pose,
            Ok(None) => PoseLandmarks::new(),
            Err(e) => {
                tracing::warn!(track_id = %track, error = %e, "pose estimator failed");
                PoseLandmarks::new()
            }
        };
        correlator.on_camera_observation(frame, track, &detection.bbox, &pose);
    }
}

async fn remote_loop(
    transport: Box<dyn RemoteTransport>,
    correlator: Arc<Correlator>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("remote report loop started");
    loop {
        let payload = tokio::select! {
            _ = shutdown.changed() => break,
            payload = transport.next_payload() => payload,
        };

        match payload {
            Some(payload) => correlator.on_remote_report(&payload),
            None => {
                tracing::info!("remote transport closed");
                break;
            }
        }
    }
    tracing::info!("remote report loop stopped");
}
