use crate::shared::frame::Frame;

use super::capture_error::{CaptureError, ReadError};

/// A camera device that hands out frames on demand.
///
/// Implementations handle the driver details (demuxer, pixel format) while the
/// pipeline only sees [`Frame`]s. A failed `read` is always retryable; only
/// `open` can fail for good.
pub trait FrameSource: Send {
    /// Opens the device. Failure here is fatal for the capture loop.
    fn open(&mut self, device_id: u32) -> Result<(), CaptureError>;

    /// Reads the next frame, or reports why there is none right now.
    fn read(&mut self) -> Result<Frame, ReadError>;

    /// Releases the device. Safe to call more than once.
    fn close(&mut self);
}
