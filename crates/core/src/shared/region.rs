use serde::Serialize;

/// An axis-aligned detection box in frame-pixel space.
///
/// Corners are inclusive. Field order matches the wire format
/// (`min_x`, `max_x`, `min_y`, `max_y`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Region {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl Region {
    /// Builds a region from two opposite corners, swapping them if needed
    /// so that `min <= max` on both axes.
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x: min_x.min(max_x),
            max_x: min_x.max(max_x),
            min_y: min_y.min(max_y),
            max_y: min_y.max(max_y),
        }
    }

    pub fn width(&self) -> i32 {
        self.max_x.saturating_sub(self.min_x)
    }

    pub fn height(&self) -> i32 {
        self.max_y.saturating_sub(self.min_y)
    }

    /// Restricts the region to a `width` x `height` frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let max_x = (width as i32 - 1).max(0);
        let max_y = (height as i32 - 1).max(0);
        Self::new(
            self.min_x.clamp(0, max_x),
            self.min_y.clamp(0, max_y),
            self.max_x.clamp(0, max_x),
            self.max_y.clamp(0, max_y),
        )
    }
}
