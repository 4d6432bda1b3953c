//! Integration tests for the full fall-detection pipeline.
//!
//! These tests drive the system with deterministic synthetic sequences:
//! 1. Scripted frames -> tracker -> state machine -> correlator -> dispatcher
//! 2. Remote payloads -> validation -> dedup -> cooldown -> dispatcher
//! 3. Channel fan-out isolation and persistence-failure semantics
//!
//! No mocks of the core, no random data. All sequences are scripted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use fallwatch_fusion::prelude::*;
use fallwatch_fusion::{DispatcherConfig, RetryPolicy};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Channel that records every delivered text.
struct RecordingChannel {
    name: &'static str,
    texts: Mutex<Vec<String>>,
}

impl RecordingChannel {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            texts: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send_text(&self, message: &str) -> SendOutcome {
        self.texts.lock().push(message.to_string());
        SendOutcome::Delivered
    }
}

/// Channel that fails every attempt.
struct BrokenChannel {
    attempts: Mutex<u32>,
}

impl BrokenChannel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: Mutex::new(0),
        })
    }
}

#[async_trait]
impl NotificationChannel for BrokenChannel {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn send_text(&self, _message: &str) -> SendOutcome {
        *self.attempts.lock() += 1;
        SendOutcome::Retryable("simulated outage".into())
    }
}

fn fast_dispatcher_config() -> DispatcherConfig {
    DispatcherConfig {
        persist_max_attempts: 2,
        persist_initial_backoff: Duration::from_millis(1),
        persist_max_backoff: Duration::from_millis(2),
        persist_attempt_timeout: Duration::from_secs(1),
        channel_retry: RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_millis(2),
            attempt_timeout: Duration::from_secs(1),
        },
        max_concurrent_sends: 4,
    }
}

struct System {
    store: Arc<InMemoryEventStore>,
    dispatcher: Arc<AlertDispatcher>,
    correlator: Arc<Correlator>,
}

fn build_system(config: &FusionConfig, channels: Vec<Arc<dyn NotificationChannel>>) -> System {
    let store = Arc::new(InMemoryEventStore::new());
    let dispatcher = Arc::new(AlertDispatcher::new(
        fast_dispatcher_config(),
        store.clone() as Arc<dyn EventStore>,
        channels,
    ));
    let correlator = Arc::new(Correlator::new(config.correlator(), dispatcher.clone()));
    System {
        store,
        dispatcher,
        correlator,
    }
}

// ---------------------------------------------------------------------------
// Synthetic sequences
// ---------------------------------------------------------------------------

/// One replay-script line: a single person whose torso line is tilted
/// `angle_deg` from vertical with its centroid at (`cx`, `cy`). The bounding
/// box is kept fixed so tracking identity persists across the sequence.
fn script_line(angle_deg: f32, cx: f32, cy: f32) -> String {
    let rad = angle_deg.to_radians();
    let (dx, dy) = (30.0 * rad.sin(), -30.0 * rad.cos());
    let (top_x, top_y) = (cx + dx, cy + dy);
    let (bot_x, bot_y) = (cx - dx, cy - dy);

    let mut pose = vec![
        format!(r#"{{"index":5,"x":{:.1},"y":{:.1},"confidence":0.9}}"#, top_x - 10.0, top_y),
        format!(r#"{{"index":6,"x":{:.1},"y":{:.1},"confidence":0.9}}"#, top_x + 10.0, top_y),
        format!(r#"{{"index":11,"x":{:.1},"y":{:.1},"confidence":0.9}}"#, bot_x - 10.0, bot_y),
        format!(r#"{{"index":12,"x":{:.1},"y":{:.1},"confidence":0.9}}"#, bot_x + 10.0, bot_y),
    ];
    // Filler keypoints so the landmark-count gate passes.
    for index in [0, 13, 14, 15] {
        pose.push(format!(
            r#"{{"index":{index},"x":{cx:.1},"y":{cy:.1},"confidence":0.9}}"#
        ));
    }

    format!(
        r#"{{"detections":[{{"bbox":[100,50,260,450],"confidence":0.95,"pose":[{}]}}]}}"#,
        pose.join(",")
    )
}

/// A topple: upright baseline, then `falling_frames` fast tilted frames.
fn topple_script(falling_frames: usize) -> String {
    let mut lines = vec![script_line(10.0, 180.0, 250.0)];
    for i in 1..=falling_frames {
        lines.push(script_line(75.0, 180.0, 250.0 + 40.0 * i as f32));
    }
    lines.join("\n")
}

async fn wait_for_events(store: &InMemoryEventStore, count: usize) {
    for _ in 0..200 {
        if store.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {count} stored events");
}

// ---------------------------------------------------------------------------
// Camera pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_scripted_topple_produces_exactly_one_alert() {
    let config = FusionConfig::builder().frames_to_confirm_motion(3).build();
    let chat = RecordingChannel::new("chat");
    let system = build_system(&config, vec![chat.clone()]);

    // Plenty of falling frames beyond the threshold: the post-confirmation
    // reset plus the cooldown must still yield a single alert.
    let replay = Arc::new(ReplaySource::parse(&topple_script(8), false).unwrap());
    let vision = VisionBundle {
        source: replay.clone(),
        detector: replay.clone(),
        estimator: replay,
    };

    let runtime = FusionRuntime::new(
        config.runtime.clone(),
        system.correlator.clone(),
        system.dispatcher.clone(),
    );
    let handle = runtime.start(Some(vision), None);

    wait_for_events(&system.store, 1).await;
    handle.shutdown().await;

    assert_eq!(system.store.len(), 1);
    let stored = &system.store.recent(1).unwrap()[0];
    assert_eq!(stored.event.source, EventSource::Camera);
    assert_eq!(stored.event.entity_id, "camera:0");
    assert!(stored.event.location.is_none());
    assert_eq!(stored.status, EventStatus::Notified);

    let texts = chat.sent();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains(&format!("Event ID: {}.", stored.id)));
}

#[tokio::test]
async fn test_short_topple_below_threshold_never_alerts() {
    let config = FusionConfig::builder().frames_to_confirm_motion(5).build();
    let system = build_system(&config, Vec::new());

    let replay = Arc::new(ReplaySource::parse(&topple_script(3), false).unwrap());
    let vision = VisionBundle {
        source: replay.clone(),
        detector: replay.clone(),
        estimator: replay,
    };

    let runtime = FusionRuntime::new(
        config.runtime.clone(),
        system.correlator.clone(),
        system.dispatcher.clone(),
    );
    let handle = runtime.start(Some(vision), None);

    // Give the loop ample time to drain the script.
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.shutdown().await;

    assert!(system.store.is_empty());
}

// ---------------------------------------------------------------------------
// Remote pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_duplicate_remote_payload_persists_one_event() {
    let config = FusionConfig::default();
    let chat = RecordingChannel::new("chat");
    let system = build_system(&config, vec![chat.clone()]);

    let payload = br#"{"device_id":"dev1","fall_detected":true,"latitude":10.5,"longitude":106.7,"has_gps_fix":true,"timestamp":1000}"#;
    system.correlator.on_remote_report(payload);
    system.correlator.on_remote_report(payload);
    system.dispatcher.drain().await;

    assert_eq!(system.store.len(), 1);
    assert_eq!(chat.sent().len(), 1);
    let stored = &system.store.recent(1).unwrap()[0];
    assert_eq!(stored.event.entity_id, "device:dev1");
    assert!(stored.event.location.is_some());
}

#[tokio::test]
async fn test_cooldown_gates_repeat_confirmations() {
    let config = FusionConfig::builder()
        .cooldown(Duration::from_millis(250))
        .build();
    let system = build_system(&config, Vec::new());

    let payload = |ts: u64| {
        format!(r#"{{"device_id":"dev1","fall_detected":true,"timestamp":{ts}}}"#).into_bytes()
    };

    // Two distinct reports (fresh timestamps) inside the window: one alert.
    system.correlator.on_remote_report(&payload(1000));
    system.correlator.on_remote_report(&payload(1001));
    system.dispatcher.drain().await;
    assert_eq!(system.store.len(), 1);

    // A third report after the window elapses: a second alert.
    tokio::time::sleep(Duration::from_millis(300)).await;
    system.correlator.on_remote_report(&payload(1002));
    system.dispatcher.drain().await;
    assert_eq!(system.store.len(), 2);
}

#[tokio::test]
async fn test_remote_loop_feeds_correlator_through_transport() {
    let config = FusionConfig::default();
    let system = build_system(&config, Vec::new());

    let (tx, transport) = QueueTransport::channel(16);
    let runtime = FusionRuntime::new(
        config.runtime.clone(),
        system.correlator.clone(),
        system.dispatcher.clone(),
    );
    let handle = runtime.start(None, Some(Box::new(transport)));

    tx.send(bytes::Bytes::from_static(
        br#"{"device_id":"dev2","fall_detected":true,"timestamp":50}"#,
    ))
    .await
    .unwrap();
    // Malformed and non-fall payloads must be absorbed without effect.
    tx.send(bytes::Bytes::from_static(b"garbage")).await.unwrap();
    tx.send(bytes::Bytes::from_static(
        br#"{"device_id":"dev2","fall_detected":false}"#,
    ))
    .await
    .unwrap();

    wait_for_events(&system.store, 1).await;
    handle.shutdown().await;

    assert_eq!(system.store.len(), 1);
    assert_eq!(
        system.store.recent(1).unwrap()[0].event.entity_id,
        "device:dev2"
    );
}

// ---------------------------------------------------------------------------
// Dispatch resilience
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_broken_channel_never_blocks_healthy_channel() {
    let config = FusionConfig::default();
    let broken = BrokenChannel::new();
    let healthy = RecordingChannel::new("healthy");
    let system = build_system(&config, vec![broken.clone(), healthy.clone()]);

    system
        .correlator
        .on_remote_report(br#"{"device_id":"dev3","fall_detected":true,"timestamp":7}"#);
    system.dispatcher.drain().await;

    assert!(*broken.attempts.lock() > 0);
    assert_eq!(healthy.sent().len(), 1);
    // One delivery suffices for the event to settle as notified.
    assert_eq!(
        system.store.recent(1).unwrap()[0].status,
        EventStatus::Notified
    );
}

#[tokio::test]
async fn test_all_channels_down_marks_event_failed_but_keeps_it() {
    let config = FusionConfig::default();
    let broken = BrokenChannel::new();
    let system = build_system(&config, vec![broken]);

    system
        .correlator
        .on_remote_report(br#"{"device_id":"dev4","fall_detected":true,"timestamp":8}"#);
    system.dispatcher.drain().await;

    assert_eq!(system.store.len(), 1);
    assert_eq!(
        system.store.recent(1).unwrap()[0].status,
        EventStatus::Failed
    );
}
