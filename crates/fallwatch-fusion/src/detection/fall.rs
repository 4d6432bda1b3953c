//! Per-entity fall state machine.
//!
//! One [`FallDetector`] instance exists per tracked identity. It consumes a
//! sequence of pose observations and confirms a fall with temporal
//! hysteresis: a motion-triggered condition (torso tilt plus centroid
//! velocity) and a velocity-independent posture condition (torso clearly
//! tilted past the lying margin) each drive their own consecutive-frame
//! counter, and a fall is confirmed the instant either counter reaches its
//! threshold.

use fallwatch_core::PoseLandmarks;

use super::posture::TorsoPosture;
use crate::domain::RemoteReport;

/// Configuration for [`FallDetector`].
#[derive(Debug, Clone)]
pub struct FallConfig {
    /// Minimum observed keypoints for a landmark set to be evaluated at all
    /// (default: 8)
    pub min_landmarks: usize,
    /// Minimum confidence required on each of the four torso keypoints
    /// (default: 0.5)
    pub torso_min_confidence: f32,
    /// Torso deviation from vertical that counts toward a fall, degrees
    /// (default: 60.0)
    pub vertical_angle_threshold: f32,
    /// Torso deviation from horizontal that counts toward a fall, degrees.
    /// Catches topples toward or away from the camera, where the image-plane
    /// torso stays near vertical while the centroid moves fast
    /// (default: 60.0)
    pub horizontal_angle_threshold: f32,
    /// Added to either angle threshold for the stricter, velocity-independent
    /// lying check, degrees (default: 20.0)
    pub lying_margin: f32,
    /// Centroid displacement per frame that counts as falling motion, pixels
    /// (default: 8.0)
    pub velocity_threshold: f32,
    /// Consecutive falling observations required to confirm (default: 15)
    pub frames_to_confirm_motion: u32,
    /// Consecutive lying observations required to confirm (default: 30).
    /// Independently tunable: motion-triggered falls should confirm faster
    /// than motionless-lying detection
    pub frames_to_confirm_lying: u32,
}

impl Default for FallConfig {
    fn default() -> Self {
        Self {
            min_landmarks: 8,
            torso_min_confidence: fallwatch_core::DEFAULT_CONFIDENCE_THRESHOLD,
            vertical_angle_threshold: 60.0,
            horizontal_angle_threshold: 60.0,
            lying_margin: 20.0,
            velocity_threshold: 8.0,
            frames_to_confirm_motion: 15,
            frames_to_confirm_lying: 30,
        }
    }
}

/// Temporal fall state machine for a single tracked or remote identity.
#[derive(Debug)]
pub struct FallDetector {
    config: FallConfig,
    consecutive_falling: u32,
    consecutive_lying: u32,
    previous_center: Option<(f32, f32)>,
}

impl FallDetector {
    /// Creates a fresh state machine.
    #[must_use]
    pub fn new(config: FallConfig) -> Self {
        Self {
            config,
            consecutive_falling: 0,
            consecutive_lying: 0,
            previous_center: None,
        }
    }

    /// Clears all internal state: counters and the velocity reference.
    pub fn reset(&mut self) {
        self.consecutive_falling = 0;
        self.consecutive_lying = 0;
        self.previous_center = None;
    }

    /// Consumes one pose observation and returns `true` when a fall is
    /// confirmed on this observation.
    ///
    /// A landmark set that is absent in effect (too few observed keypoints)
    /// or whose torso keypoints fall below the confidence minimum resets the
    /// machine and returns `false`: a sensor glitch never counts as movement
    /// evidence, and a partial falling streak does not persist across an
    /// occlusion. On confirmation the machine resets immediately so a
    /// continuing lying posture does not refire every frame.
    pub fn observe(&mut self, pose: &PoseLandmarks) -> bool {
        if pose.observed_count() < self.config.min_landmarks {
            self.reset();
            return false;
        }
        let Some(torso) = pose.torso(self.config.torso_min_confidence) else {
            self.reset();
            return false;
        };

        let posture = TorsoPosture::from_torso(&torso);

        // First valid observation after a reset has no prior reference and
        // therefore velocity 0 by definition.
        let velocity = match self.previous_center {
            Some(previous) => posture.centroid_displacement(previous),
            None => 0.0,
        };
        self.previous_center = Some(posture.centroid);

        let tilted = posture.angle_from_vertical > self.config.vertical_angle_threshold
            || posture.angle_from_horizontal > self.config.horizontal_angle_threshold;
        let falling = tilted && velocity > self.config.velocity_threshold;

        // Lying is checked only when not falling: the two conditions are
        // mutually exclusive per observation.
        let lying = !falling
            && (posture.angle_from_vertical
                > self.config.vertical_angle_threshold + self.config.lying_margin
                || posture.angle_from_horizontal
                    > self.config.horizontal_angle_threshold + self.config.lying_margin);

        if falling {
            self.consecutive_falling += 1;
            self.consecutive_lying = 0;
        } else if lying {
            self.consecutive_lying += 1;
            self.consecutive_falling = 0;
        } else {
            self.consecutive_falling = 0;
            self.consecutive_lying = 0;
        }

        let confirmed = self.consecutive_falling >= self.config.frames_to_confirm_motion
            || self.consecutive_lying >= self.config.frames_to_confirm_lying;

        if confirmed {
            tracing::debug!(
                angle_from_vertical = posture.angle_from_vertical,
                velocity,
                "fall confirmed by state machine"
            );
            self.reset();
        }

        confirmed
    }

    /// Variant for identities that also receive a remote corroborating
    /// signal: a report explicitly flagging a fall is authoritative and
    /// short-circuits geometric evaluation.
    pub fn observe_corroborated(&mut self, pose: &PoseLandmarks, report: &RemoteReport) -> bool {
        if report.fall_detected {
            self.reset();
            return true;
        }
        self.observe(pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fallwatch_core::{Confidence, Keypoint, KeypointType, PoseLandmarks};

    /// Builds a full-body pose whose torso line is tilted `angle_deg` from
    /// vertical with its centroid at `centroid`. Non-torso keypoints are
    /// filled so the landmark-count gate passes.
    fn pose_at(angle_deg: f32, centroid: (f32, f32), torso_conf: f32) -> PoseLandmarks {
        let rad = angle_deg.to_radians();
        let half = 30.0;
        let dx = half * rad.sin();
        let dy = -half * rad.cos();
        let top = (centroid.0 + dx, centroid.1 + dy);
        let bottom = (centroid.0 - dx, centroid.1 - dy);

        let conf = Confidence::clamped(torso_conf);
        let filler = Confidence::clamped(0.9);

        let mut pose = PoseLandmarks::new();
        pose.set(Keypoint::new(KeypointType::LeftShoulder, top.0 - 10.0, top.1, 0.0, conf));
        pose.set(Keypoint::new(KeypointType::RightShoulder, top.0 + 10.0, top.1, 0.0, conf));
        pose.set(Keypoint::new(KeypointType::LeftHip, bottom.0 - 10.0, bottom.1, 0.0, conf));
        pose.set(Keypoint::new(KeypointType::RightHip, bottom.0 + 10.0, bottom.1, 0.0, conf));
        for kp_type in [
            KeypointType::Nose,
            KeypointType::LeftEye,
            KeypointType::RightEye,
            KeypointType::LeftKnee,
            KeypointType::RightKnee,
            KeypointType::LeftAnkle,
            KeypointType::RightAnkle,
        ] {
            pose.set(Keypoint::new(kp_type, centroid.0, centroid.1, 0.0, filler));
        }
        pose
    }

    fn quick_config() -> FallConfig {
        FallConfig {
            frames_to_confirm_motion: 3,
            frames_to_confirm_lying: 5,
            ..FallConfig::default()
        }
    }

    #[test]
    fn test_empty_pose_returns_false() {
        let mut d = FallDetector::new(FallConfig::default());
        assert!(!d.observe(&PoseLandmarks::new()));
    }

    #[test]
    fn test_topple_confirms_on_exactly_the_threshold_frame() {
        let mut d = FallDetector::new(quick_config());

        // Upright baseline establishes the velocity reference.
        assert!(!d.observe(&pose_at(10.0, (100.0, 100.0), 0.9)));

        // Rapid topple: ~75° from vertical, centroid dropping 30px per frame.
        assert!(!d.observe(&pose_at(75.0, (100.0, 130.0), 0.9)));
        assert!(!d.observe(&pose_at(75.0, (100.0, 160.0), 0.9)));
        // Third consecutive falling observation reaches the threshold.
        assert!(d.observe(&pose_at(75.0, (100.0, 190.0), 0.9)));
    }

    #[test]
    fn test_confirmation_resets_state() {
        let mut d = FallDetector::new(quick_config());
        d.observe(&pose_at(10.0, (100.0, 100.0), 0.9));
        for i in 1..=2 {
            d.observe(&pose_at(75.0, (100.0, 100.0 + 30.0 * i as f32), 0.9));
        }
        assert!(d.observe(&pose_at(75.0, (100.0, 190.0), 0.9)));

        // Still moving fast and tilted: the streak starts over rather than
        // refiring immediately.
        assert!(!d.observe(&pose_at(75.0, (100.0, 220.0), 0.9)));
        assert!(!d.observe(&pose_at(75.0, (100.0, 250.0), 0.9)));
        assert!(d.observe(&pose_at(75.0, (100.0, 280.0), 0.9)));
    }

    #[test]
    fn test_low_torso_confidence_resets_streak() {
        let mut d = FallDetector::new(quick_config());
        d.observe(&pose_at(10.0, (100.0, 100.0), 0.9));
        d.observe(&pose_at(75.0, (100.0, 130.0), 0.9));
        d.observe(&pose_at(75.0, (100.0, 160.0), 0.9));

        // Glitch frame: torso confidence below minimum. Streak clears.
        assert!(!d.observe(&pose_at(75.0, (100.0, 190.0), 0.2)));

        // The machine restarts from zero, including the velocity reference:
        // this frame has velocity 0 and does not count as falling.
        assert!(!d.observe(&pose_at(75.0, (100.0, 220.0), 0.9)));
        assert!(!d.observe(&pose_at(75.0, (100.0, 250.0), 0.9)));
        assert!(!d.observe(&pose_at(75.0, (100.0, 280.0), 0.9)));
        assert!(d.observe(&pose_at(75.0, (100.0, 310.0), 0.9)));
    }

    #[test]
    fn test_motionless_lying_confirms_via_posture_counter() {
        let mut d = FallDetector::new(quick_config());

        // 85° exceeds vertical threshold + margin; centroid static, so the
        // motion condition never holds.
        for _ in 0..4 {
            assert!(!d.observe(&pose_at(85.0, (100.0, 200.0), 0.9)));
        }
        assert!(d.observe(&pose_at(85.0, (100.0, 200.0), 0.9)));
    }

    #[test]
    fn test_moderate_tilt_without_motion_never_confirms() {
        let mut d = FallDetector::new(quick_config());
        // 70° exceeds the falling angle threshold but not the lying margin,
        // and there is no velocity: neither counter may advance.
        for _ in 0..20 {
            assert!(!d.observe(&pose_at(70.0, (100.0, 200.0), 0.9)));
        }
    }

    #[test]
    fn test_streak_breaks_when_condition_breaks() {
        let mut d = FallDetector::new(quick_config());
        d.observe(&pose_at(10.0, (100.0, 100.0), 0.9));
        d.observe(&pose_at(75.0, (100.0, 130.0), 0.9));
        d.observe(&pose_at(75.0, (100.0, 160.0), 0.9));

        // Recovered upright: counter resets, no confirmation later.
        assert!(!d.observe(&pose_at(10.0, (100.0, 160.0), 0.9)));
        assert!(!d.observe(&pose_at(75.0, (100.0, 190.0), 0.9)));
        assert!(!d.observe(&pose_at(75.0, (100.0, 220.0), 0.9)));
    }

    #[test]
    fn test_remote_corroboration_short_circuits() {
        let mut d = FallDetector::new(quick_config());
        let report = crate::domain::RemoteReport {
            device_id: fallwatch_core::DeviceId::new("wrist1"),
            fall_detected: true,
            latitude: 0.0,
            longitude: 0.0,
            has_gps_fix: false,
            timestamp: None,
        };
        // Upright, motionless pose: the remote signal alone confirms.
        assert!(d.observe_corroborated(&pose_at(5.0, (100.0, 100.0), 0.9), &report));

        let negative = crate::domain::RemoteReport {
            fall_detected: false,
            ..report
        };
        assert!(!d.observe_corroborated(&pose_at(5.0, (100.0, 100.0), 0.9), &negative));
    }
}
