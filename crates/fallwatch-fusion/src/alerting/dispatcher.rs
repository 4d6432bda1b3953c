//! Alert dispatching and delivery.
//!
//! `dispatch` returns immediately; the work (persist, compose, fan out)
//! runs on a background task so a slow or hung channel can never stall frame
//! processing or message consumption. Channel sends are isolated from each
//! other and gated by a bounded concurrency limit.

use std::sync::Arc;
use std::time::Duration;

use fallwatch_core::Frame;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::channel::{
    send_image_with_retry, send_text_with_retry, NotificationChannel, RetryPolicy,
};
use super::message;
use crate::domain::{EventId, EventStatus, EventStore, FallEvent};

/// Configuration for [`AlertDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum attempts to persist an event before abandoning its alert
    /// (default: 4)
    pub persist_max_attempts: u32,
    /// Backoff before the second persistence attempt, doubled per attempt
    /// (default: 250ms)
    pub persist_initial_backoff: Duration,
    /// Backoff ceiling for persistence retries (default: 5s)
    pub persist_max_backoff: Duration,
    /// Timeout applied to each individual persistence attempt (default: 5s)
    pub persist_attempt_timeout: Duration,
    /// Retry policy applied to each channel send
    pub channel_retry: RetryPolicy,
    /// Maximum simultaneous outgoing channel sends (default: 4)
    pub max_concurrent_sends: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            persist_max_attempts: 4,
            persist_initial_backoff: Duration::from_millis(250),
            persist_max_backoff: Duration::from_secs(5),
            persist_attempt_timeout: Duration::from_secs(5),
            channel_retry: RetryPolicy::default(),
            max_concurrent_sends: 4,
        }
    }
}

/// Persists fall events and fans alerts out to the notification channels.
pub struct AlertDispatcher {
    config: DispatcherConfig,
    store: Arc<dyn EventStore>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    limiter: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl AlertDispatcher {
    /// Creates a dispatcher over the given store and channels.
    #[must_use]
    pub fn new(
        config: DispatcherConfig,
        store: Arc<dyn EventStore>,
        channels: Vec<Arc<dyn NotificationChannel>>,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_concurrent_sends.max(1)));
        Self {
            config,
            store,
            channels,
            limiter,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Dispatches an alert for a confirmed fall event.
    ///
    /// Returns immediately; must be called from within a tokio runtime.
    pub fn dispatch(&self, event: FallEvent, snapshot: Option<Frame>) {
        let config = self.config.clone();
        let store = Arc::clone(&self.store);
        let channels = self.channels.clone();
        let limiter = Arc::clone(&self.limiter);

        self.tasks.lock().spawn(async move {
            run_dispatch(config, store, channels, limiter, event, snapshot).await;
        });
    }

    /// Waits for all in-flight dispatches to settle.
    pub async fn drain(&self) {
        let mut tasks = { std::mem::take(&mut *self.tasks.lock()) };
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "dispatch task failed");
            }
        }
    }

    /// Waits up to `grace` for in-flight dispatches, then abandons the rest.
    pub async fn shutdown(&self, grace: Duration) {
        let mut tasks = { std::mem::take(&mut *self.tasks.lock()) };
        let drain = async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "dispatch task failed");
                }
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "shutdown grace elapsed; abandoning in-flight dispatches"
            );
        }
    }
}

async fn run_dispatch(
    config: DispatcherConfig,
    store: Arc<dyn EventStore>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    limiter: Arc<Semaphore>,
    event: FallEvent,
    snapshot: Option<Frame>,
) {
    // No alert is sent for an event that could not be recorded: the alert
    // text embeds the storage identifier.
    let Some(event_id) = persist_with_retry(&config, &store, &event).await else {
        tracing::error!(
            entity = %event.entity_id,
            "persistence retries exhausted; alert aborted"
        );
        return;
    };

    let text = message::compose(&event, event_id);
    tracing::info!(
        event_id = %event_id,
        entity = %event.entity_id,
        source = %event.source,
        "dispatching fall alert"
    );

    let image: Arc<[u8]> = snapshot
        .filter(Frame::has_image)
        .map(|f| Arc::from(f.data.into_boxed_slice()))
        .unwrap_or_else(|| Arc::from(Vec::new().into_boxed_slice()));

    let mut sends: JoinSet<(&'static str, bool)> = JoinSet::new();
    for channel in &channels {
        let channel = Arc::clone(channel);
        let limiter = Arc::clone(&limiter);
        let retry = config.channel_retry.clone();
        let text = text.clone();
        let image = Arc::clone(&image);

        sends.spawn(async move {
            let name = channel.name();
            let Ok(_permit) = limiter.acquire_owned().await else {
                return (name, false);
            };
            let outcome = if image.is_empty() {
                send_text_with_retry(channel.as_ref(), &retry, &text).await
            } else {
                send_image_with_retry(channel.as_ref(), &retry, &image, &text).await
            };
            (name, outcome.is_delivered())
        });
    }

    let mut delivered = 0usize;
    let mut failed = 0usize;
    while let Some(result) = sends.join_next().await {
        match result {
            Ok((name, true)) => {
                delivered += 1;
                tracing::info!(event_id = %event_id, channel = name, "alert delivered");
            }
            Ok((name, false)) => {
                failed += 1;
                tracing::warn!(event_id = %event_id, channel = name, "alert not delivered");
            }
            // One channel's panic must never prevent another channel's
            // attempt; the JoinSet already isolated it, just record it.
            Err(e) => {
                failed += 1;
                tracing::error!(event_id = %event_id, error = %e, "channel task failed");
            }
        }
    }

    let status = if delivered > 0 || channels.is_empty() {
        EventStatus::Notified
    } else {
        EventStatus::Failed
    };
    tracing::info!(
        event_id = %event_id,
        delivered,
        failed,
        status = %status,
        "alert fan-out settled"
    );

    let store = Arc::clone(&store);
    let update = tokio::task::spawn_blocking(move || store.update_status(event_id, status)).await;
    match update {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(event_id = %event_id, error = %e, "status update failed"),
        Err(e) => tracing::error!(event_id = %event_id, error = %e, "status update task failed"),
    }
}

async fn persist_with_retry(
    config: &DispatcherConfig,
    store: &Arc<dyn EventStore>,
    event: &FallEvent,
) -> Option<EventId> {
    let mut backoff = config.persist_initial_backoff;
    for attempt in 1..=config.persist_max_attempts {
        let store = Arc::clone(store);
        let event = event.clone();
        let write = tokio::time::timeout(
            config.persist_attempt_timeout,
            tokio::task::spawn_blocking(move || store.insert(&event)),
        )
        .await;
        match write {
            Ok(Ok(Ok(id))) => return Some(id),
            Ok(Ok(Err(e))) => {
                tracing::warn!(
                    attempt,
                    max_attempts = config.persist_max_attempts,
                    error = %e,
                    "event persist failed"
                );
                if !e.is_recoverable() {
                    return None;
                }
            }
            Ok(Err(e)) => {
                tracing::error!(attempt, error = %e, "persist task failed");
            }
            Err(_) => {
                tracing::warn!(
                    attempt,
                    timeout_ms = config.persist_attempt_timeout.as_millis() as u64,
                    "event persist attempt timed out"
                );
            }
        }
        if attempt < config.persist_max_attempts {
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(config.persist_max_backoff);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::channel::SendOutcome;
    use crate::domain::{AlertKey, InMemoryEventStore, StoredEvent};
    use crate::tracking::TrackId;
    use async_trait::async_trait;
    use chrono::Utc;
    use fallwatch_core::StorageError;

    struct CountingChannel {
        name: &'static str,
        deliver: bool,
        texts: Mutex<Vec<String>>,
    }

    impl CountingChannel {
        fn new(name: &'static str, deliver: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                deliver,
                texts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send_text(&self, message: &str) -> SendOutcome {
            self.texts.lock().push(message.to_string());
            if self.deliver {
                SendOutcome::Delivered
            } else {
                SendOutcome::Terminal("configured to fail".into())
            }
        }
    }

    struct AlwaysFailingStore;

    impl EventStore for AlwaysFailingStore {
        fn insert(&self, _event: &FallEvent) -> Result<EventId, StorageError> {
            Err(StorageError::write("disk on fire"))
        }

        fn update_status(&self, _id: EventId, _status: EventStatus) -> Result<(), StorageError> {
            Err(StorageError::write("disk on fire"))
        }

        fn recent(&self, _limit: usize) -> Result<Vec<StoredEvent>, StorageError> {
            Ok(Vec::new())
        }
    }

    fn test_config() -> DispatcherConfig {
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
            max_concurrent_sends: 2,
        }
    }

    fn camera_event() -> FallEvent {
        FallEvent::from_camera(&AlertKey::Camera(TrackId::new(0)), Utc::now())
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_succeeding_channel() {
        let store = Arc::new(InMemoryEventStore::new());
        let bad = CountingChannel::new("bad", false);
        let good = CountingChannel::new("good", true);
        let dispatcher = AlertDispatcher::new(
            test_config(),
            store.clone() as Arc<dyn EventStore>,
            vec![bad.clone(), good.clone()],
        );

        dispatcher.dispatch(camera_event(), None);
        dispatcher.drain().await;

        assert!(!good.texts.lock().is_empty());
        assert_eq!(store.len(), 1);
        // At least one delivery succeeded: the event settles as notified.
        assert_eq!(store.recent(1).unwrap()[0].status, EventStatus::Notified);
    }

    #[tokio::test]
    async fn test_alert_text_embeds_storage_id() {
        let store = Arc::new(InMemoryEventStore::new());
        let channel = CountingChannel::new("chat", true);
        let dispatcher = AlertDispatcher::new(
            test_config(),
            store.clone() as Arc<dyn EventStore>,
            vec![channel.clone()],
        );

        dispatcher.dispatch(camera_event(), None);
        dispatcher.drain().await;

        let id = store.recent(1).unwrap()[0].id;
        let texts = channel.texts.lock();
        assert!(texts[0].contains(&format!("Event ID: {id}.")));
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts_alert() {
        let channel = CountingChannel::new("chat", true);
        let dispatcher = AlertDispatcher::new(
            test_config(),
            Arc::new(AlwaysFailingStore),
            vec![channel.clone()],
        );

        dispatcher.dispatch(camera_event(), None);
        dispatcher.drain().await;

        assert!(channel.texts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_all_channels_failing_marks_event_failed() {
        let store = Arc::new(InMemoryEventStore::new());
        let bad = CountingChannel::new("bad", false);
        let dispatcher = AlertDispatcher::new(
            test_config(),
            store.clone() as Arc<dyn EventStore>,
            vec![bad],
        );

        dispatcher.dispatch(camera_event(), None);
        dispatcher.drain().await;

        assert_eq!(store.recent(1).unwrap()[0].status, EventStatus::Failed);
    }
}
