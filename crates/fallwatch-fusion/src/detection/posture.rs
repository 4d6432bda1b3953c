//! Torso posture geometry.
//!
//! The torso line runs from the shoulder midpoint to the hip midpoint. Its
//! deviation angles are derived with `atan2` on the (dx, dy) components,
//! which stays numerically stable at every orientation; an inverse-cosine
//! formulation saturates near 0° and 180° and was deliberately avoided.

use fallwatch_core::Keypoint;

/// Geometric summary of one torso observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorsoPosture {
    /// Deviation of the torso line from the vertical axis, degrees in [0, 90]
    pub angle_from_vertical: f32,
    /// Deviation of the torso line from the horizontal axis, degrees in [0, 90]
    pub angle_from_horizontal: f32,
    /// Centroid of the four torso keypoints, frame coordinates
    pub centroid: (f32, f32),
}

impl TorsoPosture {
    /// Computes the posture from the four torso keypoints in
    /// [`fallwatch_core::KeypointType::TORSO`] order (left/right shoulder,
    /// left/right hip).
    #[must_use]
    pub fn from_torso(torso: &[&Keypoint; 4]) -> Self {
        let [ls, rs, lh, rh] = torso;

        let shoulder_mid = ((ls.x + rs.x) / 2.0, (ls.y + rs.y) / 2.0);
        let hip_mid = ((lh.x + rh.x) / 2.0, (lh.y + rh.y) / 2.0);

        let dx = shoulder_mid.0 - hip_mid.0;
        let dy = shoulder_mid.1 - hip_mid.1;

        let (angle_from_vertical, angle_from_horizontal) = if dx == 0.0 && dy == 0.0 {
            // Collapsed torso: treat as upright rather than guessing.
            (0.0, 90.0)
        } else {
            let from_vertical = dx.abs().atan2(dy.abs()).to_degrees();
            (from_vertical, 90.0 - from_vertical)
        };

        let centroid = (
            (ls.x + rs.x + lh.x + rh.x) / 4.0,
            (ls.y + rs.y + lh.y + rh.y) / 4.0,
        );

        Self {
            angle_from_vertical,
            angle_from_horizontal,
            centroid,
        }
    }

    /// Euclidean distance between this observation's centroid and a previous
    /// centroid.
    #[must_use]
    pub fn centroid_displacement(&self, previous: (f32, f32)) -> f32 {
        let dx = self.centroid.0 - previous.0;
        let dy = self.centroid.1 - previous.1;
        (dx * dx + dy * dy).sqrt()
    }
}
