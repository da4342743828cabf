use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for object detection.
///
/// Returns every detection for the frame, in the order the implementation
/// produced them. The pipeline never filters, merges or reorders them.
/// `&mut self` because inference sessions need mutable access.
pub trait RegionDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}

/// Builds a detector from a configuration file (for example a model path).
///
/// Loading happens on the capture thread at startup; a failure is fatal.
pub trait DetectorLoader: Send {
    fn load(
        &self,
        config_path: &Path,
    ) -> Result<Box<dyn RegionDetector>, Box<dyn std::error::Error>>;
}
