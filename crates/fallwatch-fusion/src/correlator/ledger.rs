//! Cooldown and deduplication ledger.
//!
//! Process-wide alert bookkeeping, reachable concurrently from the camera
//! path and the subscribe path. The ledger is the single owner of this state
//! and exposes only atomic check-and-update operations: read-then-write of
//! "last alert time" and "last report timestamp" happens under one lock
//! acquisition per call, so two near-simultaneous observations can never both
//! pass a check.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fallwatch_core::DeviceId;
use parking_lot::Mutex;

use crate::domain::AlertKey;

/// Verdict of a remote-report timestamp check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    /// First time this timestamp was seen for the device
    Fresh,
    /// Retransmission of an already-handled event
    Duplicate,
}

#[derive(Default)]
struct LedgerState {
    last_alert_at: HashMap<AlertKey, DateTime<Utc>>,
    /// Device timestamps are compared bitwise: a retransmission carries the
    /// identical number, so exact equality is the correct test.
    last_report_ts: HashMap<DeviceId, u64>,
}

/// Single-owner cooldown/dedup ledger.
pub struct AlertLedger {
    cooldown: ChronoDuration,
    state: Mutex<LedgerState>,
}

impl AlertLedger {
    /// Creates a ledger with the given cooldown window.
    #[must_use]
    pub fn new(cooldown: std::time::Duration) -> Self {
        let cooldown = ChronoDuration::from_std(cooldown).unwrap_or(ChronoDuration::MAX);
        Self {
            cooldown,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Atomically checks the cooldown window for `key` and, if an alert is
    /// permitted, records `now` as the key's last alert time.
    ///
    /// The window starts at authorization time, not detection time, and is
    /// recorded here even though the downstream dispatch may later fail: the
    /// ledger bounds alert rate, it does not guarantee delivery.
    pub fn try_authorize(&self, key: &AlertKey, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        if let Some(last) = state.last_alert_at.get(key) {
            if now.signed_duration_since(*last) < self.cooldown {
                return false;
            }
        }
        state.last_alert_at.insert(key.clone(), now);
        true
    }

    /// Atomically checks a device-supplied event timestamp against the last
    /// one recorded for that device, always recording the new value.
    ///
    /// Recording happens inside the same lock acquisition as the check, so
    /// two retransmissions racing concurrently cannot both come back
    /// [`DedupVerdict::Fresh`].
    pub fn observe_report_timestamp(&self, device: &DeviceId, timestamp: f64) -> DedupVerdict {
        let bits = timestamp.to_bits();
        let mut state = self.state.lock();
        let previous = state.last_report_ts.insert(device.clone(), bits);
        match previous {
            Some(p) if p == bits => DedupVerdict::Duplicate,
            _ => DedupVerdict::Fresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackId;
    use std::time::Duration;

    fn key() -> AlertKey {
        AlertKey::Camera(TrackId::new(0))
    }

    #[test]
    fn test_first_alert_is_authorized() {
        let ledger = AlertLedger::new(Duration::from_secs(300));
        assert!(ledger.try_authorize(&key(), Utc::now()));
    }

    #[test]
    fn test_cooldown_window_gates_and_then_reopens() {
        let ledger = AlertLedger::new(Duration::from_secs(300));
        let t0 = Utc::now();

        assert!(ledger.try_authorize(&key(), t0));
        // Second confirmation inside the window: rejected.
        assert!(!ledger.try_authorize(&key(), t0 + ChronoDuration::seconds(60)));
        // Third confirmation after the window elapses: authorized again.
        assert!(ledger.try_authorize(&key(), t0 + ChronoDuration::seconds(301)));
    }

    #[test]
    fn test_window_restarts_from_authorization_time() {
        let ledger = AlertLedger::new(Duration::from_secs(300));
        let t0 = Utc::now();

        assert!(ledger.try_authorize(&key(), t0));
        let t1 = t0 + ChronoDuration::seconds(400);
        assert!(ledger.try_authorize(&key(), t1));
        // 301s after t0 but only 1s after t1: still cooling down.
        assert!(!ledger.try_authorize(&key(), t1 + ChronoDuration::seconds(1)));
    }

    #[test]
    fn test_keys_cool_down_independently() {
        let ledger = AlertLedger::new(Duration::from_secs(300));
        let now = Utc::now();
        let camera = AlertKey::Camera(TrackId::new(1));
        let device = AlertKey::Device(DeviceId::new("dev1"));

        assert!(ledger.try_authorize(&camera, now));
        assert!(ledger.try_authorize(&device, now));
        assert!(!ledger.try_authorize(&camera, now));
    }

    #[test]
    fn test_duplicate_timestamp_is_flagged() {
        let ledger = AlertLedger::new(Duration::from_secs(300));
        let dev = DeviceId::new("dev1");

        assert_eq!(
            ledger.observe_report_timestamp(&dev, 1000.0),
            DedupVerdict::Fresh
        );
        assert_eq!(
            ledger.observe_report_timestamp(&dev, 1000.0),
            DedupVerdict::Duplicate
        );
        // A newer timestamp is fresh, and the latest value is what sticks.
        assert_eq!(
            ledger.observe_report_timestamp(&dev, 1001.0),
            DedupVerdict::Fresh
        );
        assert_eq!(
            ledger.observe_report_timestamp(&dev, 1001.0),
            DedupVerdict::Duplicate
        );
    }

    #[test]
    fn test_dedup_is_per_device() {
        let ledger = AlertLedger::new(Duration::from_secs(300));
        assert_eq!(
            ledger.observe_report_timestamp(&DeviceId::new("a"), 1000.0),
            DedupVerdict::Fresh
        );
        assert_eq!(
            ledger.observe_report_timestamp(&DeviceId::new("b"), 1000.0),
            DedupVerdict::Fresh
        );
    }

    #[test]
    fn test_racing_retransmissions_cannot_both_pass() {
        use std::sync::Arc;

        let ledger = Arc::new(AlertLedger::new(Duration::from_secs(300)));
        let dev = DeviceId::new("dev1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let dev = dev.clone();
                std::thread::spawn(move || ledger.observe_report_timestamp(&dev, 2000.0))
            })
            .collect();

        let fresh = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .filter(|v| *v == DedupVerdict::Fresh)
            .count();
        assert_eq!(fresh, 1);
    }
}
