//! Remote fall reports and their validation.
//!
//! Remote devices publish flat JSON objects over the transport. Payloads are
//! turned into fully-populated [`RemoteReport`] values by an explicit
//! validation step, or rejected with a typed reason; partially-populated
//! reports never exist.

use fallwatch_core::DeviceId;
use serde_json::Value;
use thiserror::Error;

/// Why a remote payload was rejected.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The payload was not valid JSON
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload parsed but was not a JSON object
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// `device_id` was absent or not a string
    #[error("missing or non-string device_id")]
    MissingDeviceId,

    /// `device_id` was present but empty
    #[error("empty device_id")]
    EmptyDeviceId,

    /// `fall_detected` was absent or not a boolean
    #[error("missing or non-boolean fall_detected")]
    InvalidFallFlag,

    /// A GPS coordinate was present but not a number
    #[error("non-numeric GPS coordinate")]
    NonNumericGps,

    /// GPS coordinates were out of the valid range
    #[error("GPS coordinates out of range: lat {latitude}, lon {longitude}")]
    GpsOutOfRange {
        /// Reported latitude
        latitude: f64,
        /// Reported longitude
        longitude: f64,
    },

    /// `timestamp` was present but not a number
    #[error("non-numeric timestamp")]
    NonNumericTimestamp,
}

/// A validated fall status report from a remote device.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReport {
    /// Reporting device
    pub device_id: DeviceId,
    /// Whether the device flagged a fall
    pub fall_detected: bool,
    /// Reported latitude in degrees
    pub latitude: f64,
    /// Reported longitude in degrees
    pub longitude: f64,
    /// Whether the device had a GPS fix when reporting
    pub has_gps_fix: bool,
    /// Device-supplied event timestamp (epoch seconds), used for dedup
    pub timestamp: Option<f64>,
}

impl RemoteReport {
    /// Parses and validates a raw transport payload.
    ///
    /// # Errors
    ///
    /// Returns a [`ReportError`] naming the first validation rule the payload
    /// violated. GPS coordinates are validated only when `has_gps_fix` is
    /// true; without a fix the device may send placeholder values.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ReportError> {
        let value: Value = serde_json::from_slice(payload)?;
        let obj = value.as_object().ok_or(ReportError::NotAnObject)?;

        let device_id = obj
            .get("device_id")
            .and_then(Value::as_str)
            .ok_or(ReportError::MissingDeviceId)?;
        if device_id.is_empty() {
            return Err(ReportError::EmptyDeviceId);
        }

        let fall_detected = obj
            .get("fall_detected")
            .ok_or(ReportError::InvalidFallFlag)?
            .as_bool()
            .ok_or(ReportError::InvalidFallFlag)?;

        let latitude = read_number(obj.get("latitude"), 0.0)?;
        let longitude = read_number(obj.get("longitude"), 0.0)?;
        let has_gps_fix = obj
            .get("has_gps_fix")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if has_gps_fix && !gps_in_range(latitude, longitude) {
            return Err(ReportError::GpsOutOfRange {
                latitude,
                longitude,
            });
        }

        let timestamp = match obj.get("timestamp") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_f64().ok_or(ReportError::NonNumericTimestamp)?),
        };

        Ok(Self {
            device_id: DeviceId::new(device_id),
            fall_detected,
            latitude,
            longitude,
            has_gps_fix,
            timestamp,
        })
    }

    /// Returns the GPS location as a point, if the fix is valid.
    #[must_use]
    pub fn location(&self) -> Option<geo::Point<f64>> {
        if self.has_gps_fix {
            Some(geo::Point::new(self.longitude, self.latitude))
        } else {
            None
        }
    }
}

fn read_number(value: Option<&Value>, default: f64) -> Result<f64, ReportError> {
    match value {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v.as_f64().ok_or(ReportError::NonNumericGps),
    }
}

fn gps_in_range(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}
