// SPDX-License-Identifier: GPL-3.0-only

//! Error types for camera session operations
//!
//! Every rejection carries a stable [`ErrorKind`] that callers can match on,
//! plus a human-readable message. Validation errors are produced before any
//! hardware call; backend failures carry the platform message through.

use crate::backends::camera::types::BackendError;
use serde::Serialize;
use std::fmt;

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;

/// Machine-checkable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    PermissionDenied,
    SessionNotRunning,
    DeviceNotFound,
    AlreadyRecording,
    NoRecordingInProgress,
    OutputConflict,
    HardwareAcquisitionFailed,
    EncodingFailed,
    SessionStopped,
    Storage,
}

impl ErrorKind {
    /// Stable code reported across the bridge
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::SessionNotRunning => "SESSION_NOT_RUNNING",
            ErrorKind::DeviceNotFound => "DEVICE_NOT_FOUND",
            ErrorKind::AlreadyRecording => "ALREADY_RECORDING",
            ErrorKind::NoRecordingInProgress => "NO_RECORDING_IN_PROGRESS",
            ErrorKind::OutputConflict => "OUTPUT_CONFLICT",
            ErrorKind::HardwareAcquisitionFailed => "HARDWARE_ACQUISITION_FAILED",
            ErrorKind::EncodingFailed => "ENCODING_FAILED",
            ErrorKind::SessionStopped => "SESSION_STOPPED",
            ErrorKind::Storage => "STORAGE",
        }
    }
}

/// Session operation error
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Camera or microphone permission not granted (names the permission)
    PermissionDenied(String),
    /// Operation requires a running session
    SessionNotRunning,
    /// No device matched the request
    DeviceNotFound(String),
    /// A recording is already starting, active or stopping
    AlreadyRecording,
    /// There is no recording to stop
    NoRecordingInProgress,
    /// The pipeline could not add a required output
    OutputConflict(String),
    /// The device could not be opened or stopped responding
    HardwareAcquisitionFailed(String),
    /// Photo or video encoding failed
    EncodingFailed(String),
    /// The session was stopped, flipped or lost while the operation was in flight
    SessionStopped(String),
    /// Temp-file I/O failed
    Storage(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            SessionError::SessionNotRunning => ErrorKind::SessionNotRunning,
            SessionError::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            SessionError::AlreadyRecording => ErrorKind::AlreadyRecording,
            SessionError::NoRecordingInProgress => ErrorKind::NoRecordingInProgress,
            SessionError::OutputConflict(_) => ErrorKind::OutputConflict,
            SessionError::HardwareAcquisitionFailed(_) => ErrorKind::HardwareAcquisitionFailed,
            SessionError::EncodingFailed(_) => ErrorKind::EncodingFailed,
            SessionError::SessionStopped(_) => ErrorKind::SessionStopped,
            SessionError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Serializable `{code, message}` form handed to the host bridge
    pub fn to_rejection(&self) -> Rejection {
        Rejection {
            code: self.kind().code(),
            message: self.to_string(),
        }
    }
}

/// Rejection payload for bridge callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub code: &'static str,
    pub message: String,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PermissionDenied(what) => write!(f, "{} permission denied", what),
            SessionError::SessionNotRunning => write!(f, "Camera session is not running"),
            SessionError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            SessionError::AlreadyRecording => write!(f, "Recording already in progress"),
            SessionError::NoRecordingInProgress => write!(f, "No recording in progress"),
            SessionError::OutputConflict(msg) => write!(f, "Output conflict: {}", msg),
            SessionError::HardwareAcquisitionFailed(msg) => {
                write!(f, "Hardware acquisition failed: {}", msg)
            }
            SessionError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
            SessionError::SessionStopped(msg) => write!(f, "Session stopped: {}", msg),
            SessionError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<BackendError> for SessionError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::DeviceNotFound(msg) => SessionError::DeviceNotFound(msg),
            BackendError::OutputUnsupported(msg) => SessionError::OutputConflict(msg),
            BackendError::NoRecordingInProgress => SessionError::NoRecordingInProgress,
            BackendError::RecordingFailed(msg) | BackendError::EncodingFailed(msg) => {
                SessionError::EncodingFailed(msg)
            }
            BackendError::IoError(msg) => SessionError::Storage(msg),
            other @ (BackendError::NotAvailable(_)
            | BackendError::DeviceBusy(_)
            | BackendError::Other(_)) => SessionError::HardwareAcquisitionFailed(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Storage(err.to_string())
    }
}
