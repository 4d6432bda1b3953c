//! Per-frame identity tracking for camera detections.

pub mod tracker;

pub use tracker::{BoxTracker, TrackId, TrackerConfig};
