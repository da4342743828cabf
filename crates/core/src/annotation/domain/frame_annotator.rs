use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for marking detected regions on a frame.
///
/// Implementations draw in place (`&mut Frame`), one region at a time in the
/// given order; later marks may cover earlier ones.
pub trait FrameAnnotator: Send {
    fn annotate(&self, frame: &mut Frame, regions: &[Region])
        -> Result<(), Box<dyn std::error::Error>>;
}
