//! # FallWatch Core
//!
//! Shared primitives for the FallWatch fall-detection system: geometry and
//! pose types, the error taxonomy, and the capability traits the detection
//! core uses to talk to its external collaborators (frame sources, object
//! detectors, pose estimators).
//!
//! # Type Categories
//!
//! - **Geometry**: [`BoundingBox`], [`Detection`], [`Confidence`]
//! - **Pose**: [`KeypointType`], [`Keypoint`], [`PoseLandmarks`]
//! - **Media**: [`Frame`]
//! - **Identity**: [`DeviceId`]
//! - **Errors**: [`CoreError`] and its subsystem errors
//! - **Collaborators**: [`FrameSource`], [`HumanDetector`], [`PoseEstimator`]

#![warn(missing_docs)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{ChannelError, CoreError, CoreResult, StorageError, VisionError};
pub use traits::{FrameSource, HumanDetector, PoseEstimator};
pub use types::{
    BoundingBox, Confidence, Detection, DeviceId, Frame, Keypoint, KeypointType, PoseLandmarks,
};

/// Number of keypoint slots in a pose landmark set (COCO-17 schema).
pub const KEYPOINT_COUNT: usize = 17;

/// Default minimum confidence for a keypoint to count as observed.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Object-class tag assigned to person detections.
pub const PERSON_CLASS_ID: u32 = 0;
