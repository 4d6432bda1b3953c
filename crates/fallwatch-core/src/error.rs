//! Error types for the FallWatch system.
//!
//! This module provides the shared error taxonomy using [`thiserror`] for
//! automatic `Display` and `Error` trait implementations.
//!
//! # Error Hierarchy
//!
//! - [`CoreError`]: top-level error type that encompasses all subsystem errors
//! - [`VisionError`]: errors from the camera-side collaborators (frame source,
//!   detector, pose estimator)
//! - [`StorageError`]: errors from the persistent event store
//! - [`ChannelError`]: errors from notification channel transports

use thiserror::Error;

/// A specialized `Result` type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Top-level error type for the FallWatch system.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    /// Camera-side collaborator error
    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    /// Event store error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Notification channel error
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error
        message: String,
    },

    /// Validation error for input data
    #[error("Validation error: {message}")]
    Validation {
        /// Description of what validation failed
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {duration_ms}ms: {operation}")]
    Timeout {
        /// The operation that timed out
        operation: String,
        /// Duration in milliseconds before timeout
        duration_ms: u64,
    },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

impl CoreError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the failed operation is worth retrying.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Vision(e) => e.is_recoverable(),
            Self::Storage(e) => e.is_recoverable(),
            Self::Channel(e) => e.is_recoverable(),
            Self::Timeout { .. } => true,
            Self::Configuration { .. } | Self::Validation { .. } | Self::Internal { .. } => false,
        }
    }
}

/// Errors from the camera-side collaborators.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum VisionError {
    /// The frame source could not produce a frame
    #[error("Frame source failure: {reason}")]
    FrameSource {
        /// Reason the source failed
        reason: String,
    },

    /// The object detector returned an error
    #[error("Detector failure: {reason}")]
    Detector {
        /// Reason the detector failed
        reason: String,
    },

    /// The pose estimator returned an error
    #[error("Pose estimator failure: {reason}")]
    PoseEstimator {
        /// Reason the estimator failed
        reason: String,
    },

    /// A collaborator returned a structurally invalid response
    #[error("Contract violation from {collaborator}: {detail}")]
    ContractViolation {
        /// Which collaborator misbehaved
        collaborator: &'static str,
        /// What was wrong with the response
        detail: String,
    },
}

impl VisionError {
    /// Creates a frame source error.
    #[must_use]
    pub fn frame_source(reason: impl Into<String>) -> Self {
        Self::FrameSource {
            reason: reason.into(),
        }
    }

    /// Creates a detector error.
    #[must_use]
    pub fn detector(reason: impl Into<String>) -> Self {
        Self::Detector {
            reason: reason.into(),
        }
    }

    /// Creates a pose estimator error.
    #[must_use]
    pub fn pose_estimator(reason: impl Into<String>) -> Self {
        Self::PoseEstimator {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the failed operation is worth retrying.
    ///
    /// Vision failures are transient by nature (the next frame may succeed);
    /// only a contract violation marks a collaborator as untrustworthy.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ContractViolation { .. })
    }
}

/// Errors from the persistent event store.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StorageError {
    /// Could not open or reach the store
    #[error("Store connection failed: {reason}")]
    Connection {
        /// Reason the connection failed
        reason: String,
    },

    /// A write did not complete
    #[error("Store write failed: {reason}")]
    Write {
        /// Reason the write failed
        reason: String,
    },

    /// A read did not complete
    #[error("Store query failed: {reason}")]
    Query {
        /// Reason the query failed
        reason: String,
    },

    /// The referenced event does not exist
    #[error("Event not found: {id}")]
    NotFound {
        /// The missing event identifier
        id: String,
    },
}

impl StorageError {
    /// Creates a connection error.
    #[must_use]
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    /// Creates a write error.
    #[must_use]
    pub fn write(reason: impl Into<String>) -> Self {
        Self::Write {
            reason: reason.into(),
        }
    }

    /// Creates a query error.
    #[must_use]
    pub fn query(reason: impl Into<String>) -> Self {
        Self::Query {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the failed operation is worth retrying.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Write { .. } | Self::Query { .. } => true,
            Self::NotFound { .. } => false,
        }
    }
}

/// Errors from notification channel transports.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ChannelError {
    /// Could not establish the channel's connection
    #[error("Channel '{channel}' connect failed: {reason}")]
    Connect {
        /// Channel name
        channel: &'static str,
        /// Reason the connection failed
        reason: String,
    },

    /// A send attempt failed in a way that may succeed on retry
    #[error("Channel '{channel}' send failed (retryable): {reason}")]
    Transient {
        /// Channel name
        channel: &'static str,
        /// Reason the send failed
        reason: String,
    },

    /// A send attempt failed permanently (bad credentials, rejected payload)
    #[error("Channel '{channel}' send failed (terminal): {reason}")]
    Terminal {
        /// Channel name
        channel: &'static str,
        /// Reason the send failed
        reason: String,
    },
}

impl ChannelError {
    /// Returns `true` if the failed operation is worth retrying.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability_classification() {
        assert!(CoreError::timeout("store insert", 5000).is_recoverable());
        assert!(!CoreError::validation("bad payload").is_recoverable());
        assert!(!CoreError::configuration("missing token").is_recoverable());

        let vision: CoreError = VisionError::detector("inference failed").into();
        assert!(vision.is_recoverable());

        let contract: CoreError = VisionError::ContractViolation {
            collaborator: "detector",
            detail: "negative box area".into(),
        }
        .into();
        assert!(!contract.is_recoverable());

        let storage: CoreError = StorageError::write("disk full").into();
        assert!(storage.is_recoverable());

        let terminal: CoreError = ChannelError::Terminal {
            channel: "chat",
            reason: "chat not found".into(),
        }
        .into();
        assert!(!terminal.is_recoverable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = CoreError::timeout("originate call", 2500);
        let text = err.to_string();
        assert!(text.contains("2500ms"));
        assert!(text.contains("originate call"));
    }
}
