//! Alert key space shared by both detection sources.
//!
//! Camera-tracked people and remote devices are folded onto one key space so
//! the cooldown ledger and the state-machine arena can treat them uniformly.
//! The string forms are prefixed (`camera:`, `device:`) so the two spaces can
//! never collide.

use fallwatch_core::DeviceId;
use serde::{Deserialize, Serialize};

use crate::tracking::TrackId;

/// Stable key identifying the subject of a potential alert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKey {
    /// A camera-tracked person
    Camera(TrackId),
    /// A remote wearable/ESP32 device
    Device(DeviceId),
}

impl AlertKey {
    /// Returns `true` if this key belongs to the camera key space.
    #[must_use]
    pub fn is_camera(&self) -> bool {
        matches!(self, Self::Camera(_))
    }
}

impl From<TrackId> for AlertKey {
    fn from(id: TrackId) -> Self {
        Self::Camera(id)
    }
}

impl From<DeviceId> for AlertKey {
    fn from(id: DeviceId) -> Self {
        Self::Device(id)
    }
}

impl std::fmt::Display for AlertKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Camera(id) => write!(f, "camera:{id}"),
            Self::Device(id) => write!(f, "device:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_spaces_never_collide() {
        let camera = AlertKey::Camera(TrackId::new(7));
        let device = AlertKey::Device(DeviceId::new("7"));
        assert_ne!(camera, device);
        assert_eq!(camera.to_string(), "camera:7");
        assert_eq!(device.to_string(), "device:7");
    }

    #[test]
    fn test_same_device_id_is_same_key() {
        let a = AlertKey::Device(DeviceId::new("dev1"));
        let b = AlertKey::Device(DeviceId::new("dev1"));
        assert_eq!(a, b);
    }
}
