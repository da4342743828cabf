use std::path::PathBuf;

use thiserror::Error;

/// Unrecoverable failures that end the capture loop.
///
/// Both variants stem from external misconfiguration, so they are reported
/// once and never retried.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera device {device_id} unavailable: {reason}")]
    DeviceUnavailable { device_id: u32, reason: String },
    #[error("failed to load detector configuration {}: {reason}", .path.display())]
    DetectorLoad { path: PathBuf, reason: String },
}

/// A frame read that produced nothing usable this time around.
///
/// Always transient: the capture loop backs off for one interval and tries again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("device {0} not ready")]
    DeviceNotReady(u32),
    #[error("image was empty")]
    EmptyFrame,
}
