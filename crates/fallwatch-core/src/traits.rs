//! Capability traits for the external vision collaborators.
//!
//! The detection core consumes the object detector, the pose estimator, and
//! the frame source exclusively through these seams; their implementations
//! (model wrappers, capture backends, replay scripts) live outside the core.

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::types::{BoundingBox, Detection, Frame, PoseLandmarks};

/// Source of video frames.
///
/// `Ok(None)` signals temporary unavailability, never end-of-stream; callers
/// must tolerate repeated `None` without terminating.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Returns the next frame, or `None` if no frame is currently available.
    async fn next_frame(&self) -> CoreResult<Option<Frame>>;
}

/// Object detector: finds people in a frame.
///
/// May return an empty list. Calls are bounded by the collaborator's own
/// inference latency and must not block indefinitely.
pub trait HumanDetector: Send + Sync {
    /// Detects objects in the given frame.
    fn detect(&self, frame: &Frame) -> CoreResult<Vec<Detection>>;
}

/// Pose estimator: extracts body landmarks within a region of a frame.
pub trait PoseEstimator: Send + Sync {
    /// Estimates a landmark set for the person inside `bbox`.
    ///
    /// `Ok(None)` signals "no pose found in this region".
    fn estimate(&self, frame: &Frame, bbox: &BoundingBox) -> CoreResult<Option<PoseLandmarks>>;
}
