//! Core data types for the FallWatch system.
//!
//! This module defines the fundamental data structures shared by the camera
//! pipeline and the fusion core: bounding boxes and detections, the fixed
//! 17-slot pose landmark schema, frames, and identity newtypes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::KEYPOINT_COUNT;

// =============================================================================
// Common Types
// =============================================================================

/// Unique identifier for a remote wearable/ESP32 device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new device ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the device ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Confidence score in the range [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f32);

impl Confidence {
    /// Minimum confidence (0.0).
    pub const MIN: Self = Self(0.0);
    /// Maximum confidence (1.0).
    pub const MAX: Self = Self(1.0);

    /// Creates a new confidence value, validating the range.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `value` is outside [0.0, 1.0] or NaN.
    pub fn new(value: f32) -> CoreResult<Self> {
        if !(0.0..=1.0).contains(&value) {
            return Err(CoreError::validation(format!(
                "Confidence must be in [0.0, 1.0], got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Creates a confidence value, clamping into [0.0, 1.0].
    ///
    /// NaN clamps to 0.0.
    #[must_use]
    pub fn clamped(value: f32) -> Self {
        if value.is_nan() {
            Self::MIN
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// Returns the inner value.
    #[must_use]
    pub fn value(&self) -> f32 {
        self.0
    }

    /// Returns `true` if this confidence meets the given threshold.
    #[must_use]
    pub fn is_at_least(&self, threshold: f32) -> bool {
        self.0 >= threshold
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::MIN
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

// =============================================================================
// Geometry Types
// =============================================================================

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge X coordinate
    pub x_min: f32,
    /// Top edge Y coordinate
    pub y_min: f32,
    /// Right edge X coordinate
    pub x_max: f32,
    /// Bottom edge Y coordinate
    pub y_max: f32,
}

impl BoundingBox {
    /// Creates a new bounding box.
    #[must_use]
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Returns the width of the bounding box.
    #[must_use]
    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    /// Returns the height of the bounding box.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    /// Returns the area of the bounding box.
    #[must_use]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Returns the center point of the bounding box.
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    /// Returns `true` if the box has zero or negative extent on either axis.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Computes the Intersection over Union (IoU) with another bounding box.
    ///
    /// Degenerate boxes yield an IoU of 0.0 against everything.
    #[must_use]
    pub fn iou(&self, other: &Self) -> f32 {
        let x_min = self.x_min.max(other.x_min);
        let y_min = self.y_min.max(other.y_min);
        let x_max = self.x_max.min(other.x_max);
        let y_max = self.y_max.min(other.y_max);

        if x_max <= x_min || y_max <= y_min {
            return 0.0;
        }

        let intersection = (x_max - x_min) * (y_max - y_min);
        let union = self.area() + other.area() - intersection;

        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// A single object detection produced by the external detector for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Location of the detected object
    pub bbox: BoundingBox,
    /// Detector confidence for this detection
    pub confidence: Confidence,
    /// Object-class tag (0 = person)
    pub class_id: u32,
}

impl Detection {
    /// Creates a new detection.
    #[must_use]
    pub fn new(bbox: BoundingBox, confidence: Confidence, class_id: u32) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
        }
    }

    /// Returns `true` if this detection is tagged as a person.
    #[must_use]
    pub fn is_person(&self) -> bool {
        self.class_id == crate::PERSON_CLASS_ID
    }
}

// =============================================================================
// Pose Types
// =============================================================================

/// Body keypoint types in the fixed 17-slot COCO schema.
///
/// The discriminants are stable slot indices; the four torso keypoints
/// (shoulders and hips) anchor all fall-geometry computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeypointType {
    /// Nose
    Nose = 0,
    /// Left eye
    LeftEye = 1,
    /// Right eye
    RightEye = 2,
    /// Left ear
    LeftEar = 3,
    /// Right ear
    RightEar = 4,
    /// Left shoulder
    LeftShoulder = 5,
    /// Right shoulder
    RightShoulder = 6,
    /// Left elbow
    LeftElbow = 7,
    /// Right elbow
    RightElbow = 8,
    /// Left wrist
    LeftWrist = 9,
    /// Right wrist
    RightWrist = 10,
    /// Left hip
    LeftHip = 11,
    /// Right hip
    RightHip = 12,
    /// Left knee
    LeftKnee = 13,
    /// Right knee
    RightKnee = 14,
    /// Left ankle
    LeftAnkle = 15,
    /// Right ankle
    RightAnkle = 16,
}

impl KeypointType {
    /// The four torso-defining keypoints, in canonical order.
    pub const TORSO: [Self; 4] = [
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftHip,
        Self::RightHip,
    ];

    /// Returns the stable slot index of this keypoint type.
    #[must_use]
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Returns `true` if this keypoint is one of the four torso anchors.
    #[must_use]
    pub fn is_torso(&self) -> bool {
        matches!(
            self,
            Self::LeftShoulder | Self::RightShoulder | Self::LeftHip | Self::RightHip
        )
    }
}

impl TryFrom<u8> for KeypointType {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Nose),
            1 => Ok(Self::LeftEye),
            2 => Ok(Self::RightEye),
            3 => Ok(Self::LeftEar),
            4 => Ok(Self::RightEar),
            5 => Ok(Self::LeftShoulder),
            6 => Ok(Self::RightShoulder),
            7 => Ok(Self::LeftElbow),
            8 => Ok(Self::RightElbow),
            9 => Ok(Self::LeftWrist),
            10 => Ok(Self::RightWrist),
            11 => Ok(Self::LeftHip),
            12 => Ok(Self::RightHip),
            13 => Ok(Self::LeftKnee),
            14 => Ok(Self::RightKnee),
            15 => Ok(Self::LeftAnkle),
            16 => Ok(Self::RightAnkle),
            _ => Err(CoreError::validation(format!(
                "Keypoint index out of range: {value}"
            ))),
        }
    }
}

/// A single body keypoint observation in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Which body part this keypoint represents
    pub keypoint_type: KeypointType,
    /// X coordinate in pixels
    pub x: f32,
    /// Y coordinate in pixels (grows downward)
    pub y: f32,
    /// Relative depth estimate from the pose model (unitless)
    pub depth: f32,
    /// Visibility confidence of this keypoint
    pub confidence: Confidence,
}

impl Keypoint {
    /// Creates a new keypoint.
    #[must_use]
    pub fn new(
        keypoint_type: KeypointType,
        x: f32,
        y: f32,
        depth: f32,
        confidence: Confidence,
    ) -> Self {
        Self {
            keypoint_type,
            x,
            y,
            depth,
            confidence,
        }
    }
}

/// A full landmark set for one person in one frame.
///
/// Fixed-size, fixed-index storage: slot `i` holds the keypoint whose
/// [`KeypointType`] discriminant is `i`, or `None` when the estimator did not
/// observe it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseLandmarks {
    keypoints: [Option<Keypoint>; KEYPOINT_COUNT],
}

impl PoseLandmarks {
    /// Creates an empty landmark set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a keypoint in its canonical slot, replacing any previous value.
    pub fn set(&mut self, keypoint: Keypoint) {
        self.keypoints[keypoint.keypoint_type.index()] = Some(keypoint);
    }

    /// Returns the keypoint in the given slot, if observed.
    #[must_use]
    pub fn get(&self, keypoint_type: KeypointType) -> Option<&Keypoint> {
        self.keypoints[keypoint_type.index()].as_ref()
    }

    /// Returns the number of observed keypoints.
    #[must_use]
    pub fn observed_count(&self) -> usize {
        self.keypoints.iter().filter(|k| k.is_some()).count()
    }

    /// Returns `true` if no keypoints are observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observed_count() == 0
    }

    /// Returns the four torso keypoints when all are observed at or above the
    /// given confidence threshold, in [`KeypointType::TORSO`] order.
    #[must_use]
    pub fn torso(&self, min_confidence: f32) -> Option<[&Keypoint; 4]> {
        let mut out: [Option<&Keypoint>; 4] = [None; 4];
        for (slot, kp_type) in KeypointType::TORSO.iter().enumerate() {
            let kp = self.get(*kp_type)?;
            if !kp.confidence.is_at_least(min_confidence) {
                return None;
            }
            out[slot] = Some(kp);
        }
        Some([out[0]?, out[1]?, out[2]?, out[3]?])
    }

    /// Iterates over all observed keypoints.
    pub fn iter(&self) -> impl Iterator<Item = &Keypoint> {
        self.keypoints.iter().filter_map(|k| k.as_ref())
    }
}

// =============================================================================
// Media Types
// =============================================================================

/// A single frame delivered by a frame source.
///
/// `data` holds the source's encoded image bytes (JPEG for MJPEG-style
/// sources) and may be empty for sources that carry no pixels, such as replay
/// scripts; downstream consumers must tolerate an empty payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Monotonic sequence number assigned by the source
    pub seq: u64,
    /// Encoded image bytes; may be empty
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Capture timestamp
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// Creates a new frame captured now.
    #[must_use]
    pub fn new(seq: u64, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            seq,
            data,
            width,
            height,
            captured_at: Utc::now(),
        }
    }

    /// Returns `true` if the frame carries encoded image bytes.
    #[must_use]
    pub fn has_image(&self) -> bool {
        !self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp(kp_type: KeypointType, x: f32, y: f32, conf: f32) -> Keypoint {
        Keypoint::new(kp_type, x, y, 0.0, Confidence::clamped(conf))
    }

    #[test]
    fn test_confidence_validation() {
        assert!(Confidence::new(0.5).is_ok());
        assert!(Confidence::new(-0.1).is_err());
        assert!(Confidence::new(1.1).is_err());
        assert!(Confidence::new(f32::NAN).is_err());
    }

    #[test]
    fn test_confidence_clamping() {
        assert!((Confidence::clamped(1.5).value() - 1.0).abs() < f32::EPSILON);
        assert!(Confidence::clamped(-0.5).value().abs() < f32::EPSILON);
        assert!(Confidence::clamped(f32::NAN).value().abs() < f32::EPSILON);
    }

    #[test]
    fn test_iou_identical_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert!(a.iou(&b).abs() < f32::EPSILON);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_degenerate_box_is_zero() {
        let a = BoundingBox::new(5.0, 5.0, 5.0, 5.0);
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.is_degenerate());
        assert!(a.iou(&b).abs() < f32::EPSILON);
        assert!(b.iou(&a).abs() < f32::EPSILON);
    }

    #[test]
    fn test_keypoint_type_roundtrip() {
        for i in 0..17u8 {
            let kp_type = KeypointType::try_from(i).unwrap();
            assert_eq!(kp_type.index(), i as usize);
        }
        assert!(KeypointType::try_from(17).is_err());
    }

    #[test]
    fn test_torso_membership() {
        assert!(KeypointType::LeftShoulder.is_torso());
        assert!(KeypointType::RightHip.is_torso());
        assert!(!KeypointType::Nose.is_torso());
        assert_eq!(KeypointType::LeftShoulder.index(), 5);
        assert_eq!(KeypointType::RightShoulder.index(), 6);
        assert_eq!(KeypointType::LeftHip.index(), 11);
        assert_eq!(KeypointType::RightHip.index(), 12);
    }

    #[test]
    fn test_pose_torso_requires_all_four() {
        let mut pose = PoseLandmarks::new();
        pose.set(kp(KeypointType::LeftShoulder, 10.0, 10.0, 0.9));
        pose.set(kp(KeypointType::RightShoulder, 20.0, 10.0, 0.9));
        pose.set(kp(KeypointType::LeftHip, 10.0, 40.0, 0.9));
        assert!(pose.torso(0.5).is_none());

        pose.set(kp(KeypointType::RightHip, 20.0, 40.0, 0.9));
        assert!(pose.torso(0.5).is_some());
    }

    #[test]
    fn test_pose_torso_respects_confidence_threshold() {
        let mut pose = PoseLandmarks::new();
        pose.set(kp(KeypointType::LeftShoulder, 10.0, 10.0, 0.9));
        pose.set(kp(KeypointType::RightShoulder, 20.0, 10.0, 0.9));
        pose.set(kp(KeypointType::LeftHip, 10.0, 40.0, 0.9));
        pose.set(kp(KeypointType::RightHip, 20.0, 40.0, 0.3));
        assert!(pose.torso(0.5).is_none());
        assert!(pose.torso(0.2).is_some());
    }

    #[test]
    fn test_pose_observed_count() {
        let mut pose = PoseLandmarks::new();
        assert!(pose.is_empty());
        pose.set(kp(KeypointType::Nose, 1.0, 1.0, 0.9));
        pose.set(kp(KeypointType::Nose, 2.0, 2.0, 0.8));
        assert_eq!(pose.observed_count(), 1);
    }
}
