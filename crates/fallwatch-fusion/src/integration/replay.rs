//! Offline replay of scripted detection sequences.
//!
//! A replay script is JSON-lines: one frame per line, each carrying its
//! detections and, per detection, the pose keypoints observed inside it.
//! The source implements the whole vision triad (frame source, detector,
//! pose estimator), which makes offline runs, demos, and the integration
//! suite independent of real model wrappers.
//!
//! ```text
//! {"detections":[{"bbox":[120,80,280,420],"confidence":0.92,
//!   "pose":[{"index":5,"x":160,"y":120,"confidence":0.9}, ...]}]}
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use fallwatch_core::{
    BoundingBox, Confidence, CoreError, CoreResult, Detection, Frame, FrameSource, HumanDetector,
    Keypoint, KeypointType, PoseEstimator, PoseLandmarks, VisionError,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ScriptKeypoint {
    index: u8,
    x: f32,
    y: f32,
    #[serde(default)]
    depth: f32,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct ScriptDetection {
    bbox: [f32; 4],
    #[serde(default = "default_confidence")]
    confidence: f32,
    #[serde(default)]
    class_id: u32,
    #[serde(default)]
    pose: Vec<ScriptKeypoint>,
}

#[derive(Debug, Default, Deserialize)]
struct ScriptFrame {
    #[serde(default)]
    detections: Vec<ScriptDetection>,
}

struct ReplayDetection {
    detection: Detection,
    pose: Option<PoseLandmarks>,
}

struct ReplayFrame {
    detections: Vec<ReplayDetection>,
}

/// Scripted vision source for offline runs.
pub struct ReplaySource {
    frames: Vec<ReplayFrame>,
    cursor: AtomicU64,
    loop_playback: bool,
    width: u32,
    height: u32,
}

impl ReplaySource {
    /// Parses a JSON-lines script.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the offending line when the script
    /// cannot be parsed.
    pub fn parse(script: &str, loop_playback: bool) -> CoreResult<Self> {
        let mut frames = Vec::new();
        for (line_no, line) in script.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed: ScriptFrame = serde_json::from_str(line).map_err(|e| {
                CoreError::validation(format!("replay script line {}: {e}", line_no + 1))
            })?;
            frames.push(convert_frame(parsed, line_no + 1)?);
        }
        Ok(Self {
            frames,
            cursor: AtomicU64::new(0),
            loop_playback,
            width: 1280,
            height: 720,
        })
    }

    /// Reads and parses a script file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path<P: AsRef<Path>>(path: P, loop_playback: bool) -> CoreResult<Self> {
        let script = std::fs::read_to_string(&path).map_err(|e| {
            VisionError::frame_source(format!("replay script {}: {e}", path.as_ref().display()))
        })?;
        Self::parse(&script, loop_playback)
    }

    /// Number of scripted frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if the script has no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn frame_at(&self, seq: u64) -> Option<&ReplayFrame> {
        if self.frames.is_empty() {
            return None;
        }
        let index = if self.loop_playback {
            (seq % self.frames.len() as u64) as usize
        } else {
            seq as usize
        };
        self.frames.get(index)
    }
}

fn convert_frame(parsed: ScriptFrame, line_no: usize) -> CoreResult<ReplayFrame> {
    let mut detections = Vec::with_capacity(parsed.detections.len());
    for d in parsed.detections {
        let [x_min, y_min, x_max, y_max] = d.bbox;
        let detection = Detection::new(
            BoundingBox::new(x_min, y_min, x_max, y_max),
            Confidence::clamped(d.confidence),
            d.class_id,
        );

        let pose = if d.pose.is_empty() {
            None
        } else {
            let mut landmarks = PoseLandmarks::new();
            for kp in &d.pose {
                let kp_type = KeypointType::try_from(kp.index).map_err(|_| {
                    CoreError::validation(format!(
                        "replay script line {line_no}: keypoint index {} out of range",
                        kp.index
                    ))
                })?;
                landmarks.set(Keypoint::new(
                    kp_type,
                    kp.x,
                    kp.y,
                    kp.depth,
                    Confidence::clamped(kp.confidence),
                ));
            }
            Some(landmarks)
        };

        detections.push(ReplayDetection { detection, pose });
    }
    Ok(ReplayFrame { detections })
}

#[async_trait]
impl FrameSource for ReplaySource {
    async fn next_frame(&self) -> CoreResult<Option<Frame>> {
        let seq = self.cursor.fetch_add(1, Ordering::SeqCst);
        if self.frame_at(seq).is_none() {
            // Script exhausted: keep signalling "temporarily unavailable".
            return Ok(None);
        }
        Ok(Some(Frame::new(seq, Vec::new(), self.width, self.height)))
    }
}

impl HumanDetector for ReplaySource {
    fn detect(&self, frame: &Frame) -> CoreResult<Vec<Detection>> {
        Ok(self
            .frame_at(frame.seq)
            .map(|f| f.detections.iter().map(|d| d.detection).collect())
            .unwrap_or_default())
    }
}

impl PoseEstimator for ReplaySource {
    fn estimate(&self, frame: &Frame, bbox: &BoundingBox) -> CoreResult<Option<PoseLandmarks>> {
        let Some(scripted) = self.frame_at(frame.seq) else {
            return Ok(None);
        };
        let found = scripted.detections.iter().find(|d| {
            let b = d.detection.bbox;
            (b.x_min - bbox.x_min).abs() < 0.5
                && (b.y_min - bbox.y_min).abs() < 0.5
                && (b.x_max - bbox.x_max).abs() < 0.5
                && (b.y_max - bbox.y_max).abs() < 0.5
        });
        Ok(found.and_then(|d| d.pose.clone()))
    }
}
