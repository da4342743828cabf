use serde::Serialize;

use super::frame::Frame;
use super::region::Region;

/// Frame size in pixels at capture time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const ZERO: Dimensions = Dimensions {
        width: 0,
        height: 0,
    };
}

/// One capture cycle's worth of results.
///
/// The document owns its image buffer exclusively: it is created by the
/// capture loop, mutated in place by the annotator, then handed to the
/// state holder. Only `screen` and `items` are served over HTTP.
#[derive(Clone, Debug)]
pub struct Document {
    pub image: Frame,
    pub screen: Dimensions,
    pub items: Vec<Region>,
}

impl Document {
    /// Wraps a detector's output for `frame`.
    ///
    /// The frame is duplicated so later in-place drawing never aliases the
    /// buffer the source handed out. Regions keep the detector's order.
    pub fn capture(frame: &Frame, regions: Vec<Region>) -> Self {
        Self {
            image: frame.clone(),
            screen: frame.dimensions(),
            items: regions,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.image.sequence()
    }
}
