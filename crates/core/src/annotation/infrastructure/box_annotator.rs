use image::{ImageBuffer, Rgb};

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::shared::constants::DEFAULT_LABEL;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::bitmap_font;

/// Outline and label color (RGB blue).
const DEFAULT_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// Outline stroke width in pixels, centered on the region edge.
const DEFAULT_THICKNESS: i32 = 3;

/// Integer scale applied to the 5x7 font.
const DEFAULT_FONT_SCALE: i32 = 2;

/// Gap between the label's bottom edge and the region's top edge.
const LABEL_GAP: i32 = 2;

/// Draws a rectangle outline and a fixed text label for every region.
pub struct BoxAnnotator {
    label: String,
    color: Rgb<u8>,
    thickness: i32,
    font_scale: i32,
}

impl BoxAnnotator {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            color: DEFAULT_COLOR,
            thickness: DEFAULT_THICKNESS,
            font_scale: DEFAULT_FONT_SCALE,
        }
    }

    /// Top-left corner of the label for `region`.
    ///
    /// Horizontal placement only looks at the left edge:
    /// `min_x + min_x / 2 - text_width / 2`. It approximates centering for
    /// boxes whose width is about their left offset and drifts right otherwise.
    /// Results beyond the `i32` range saturate.
    pub fn label_origin(&self, region: &Region) -> (i32, i32) {
        let (x, y) = self.label_origin_wide(region);
        (saturate(x), saturate(y))
    }

    fn label_origin_wide(&self, region: &Region) -> (i64, i64) {
        let text_w = i64::from(bitmap_font::text_width(&self.label, self.font_scale));
        let text_h = i64::from(bitmap_font::text_height(self.font_scale));
        let min_x = i64::from(region.min_x);
        let x = min_x + min_x / 2 - text_w / 2;
        let y = i64::from(region.min_y) - i64::from(LABEL_GAP) - text_h;
        (x, y)
    }

    /// Strokes are walked only over their visible part.
    fn draw_outline(&self, canvas: &mut Canvas<'_>, region: &Region) {
        let (width, height) = (i64::from(canvas.width()), i64::from(canvas.height()));
        let lo = -i64::from(self.thickness / 2);
        let hi = lo + i64::from(self.thickness);
        for offset in lo..hi {
            let left = i64::from(region.min_x) - offset;
            let right = i64::from(region.max_x) + offset;
            let top = i64::from(region.min_y) - offset;
            let bottom = i64::from(region.max_y) + offset;

            let (x0, x1) = (left.max(0), right.min(width - 1));
            let (y0, y1) = (top.max(0), bottom.min(height - 1));
            for y in [top, bottom] {
                if (0..height).contains(&y) {
                    for x in x0..=x1 {
                        plot(canvas, x, y, self.color);
                    }
                }
            }
            for x in [left, right] {
                if (0..width).contains(&x) {
                    for y in y0..=y1 {
                        plot(canvas, x, y, self.color);
                    }
                }
            }
        }
    }

    fn draw_label(&self, canvas: &mut Canvas<'_>, region: &Region) {
        let (x, y) = self.label_origin_wide(region);
        let text_w = i64::from(bitmap_font::text_width(&self.label, self.font_scale));
        let text_h = i64::from(bitmap_font::text_height(self.font_scale));
        let off_canvas = x >= i64::from(canvas.width())
            || y >= i64::from(canvas.height())
            || x + text_w <= 0
            || y + text_h <= 0;
        if off_canvas {
            return;
        }
        // Overlaps the canvas, so both coordinates are small enough for i32.
        bitmap_font::render(&self.label, x as i32, y as i32, self.font_scale, |px, py| {
            plot(canvas, px.into(), py.into(), self.color)
        });
    }
}

fn saturate(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

impl Default for BoxAnnotator {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL)
    }
}

impl FrameAnnotator for BoxAnnotator {
    fn annotate(
        &self,
        frame: &mut Frame,
        regions: &[Region],
    ) -> Result<(), Box<dyn std::error::Error>> {
        if regions.is_empty() || frame.is_empty() {
            return Ok(());
        }
        if frame.channels() != 3 {
            return Err(format!("expected an RGB frame, got {} channels", frame.channels()).into());
        }

        let (width, height) = (frame.width(), frame.height());
        let mut canvas = Canvas::from_raw(width, height, frame.data_mut())
            .ok_or("frame buffer does not match its dimensions")?;

        for region in regions {
            self.draw_outline(&mut canvas, region);
            self.draw_label(&mut canvas, region);
        }
        Ok(())
    }
}

type Canvas<'a> = ImageBuffer<Rgb<u8>, &'a mut [u8]>;

/// Sets one pixel, silently clipping anything outside the canvas.
fn plot(canvas: &mut Canvas<'_>, x: i64, y: i64, color: Rgb<u8>) {
    if x < 0 || y < 0 || x >= i64::from(canvas.width()) || y >= i64::from(canvas.height()) {
        return;
    }
    canvas.put_pixel(x as u32, y as u32, color);
}
