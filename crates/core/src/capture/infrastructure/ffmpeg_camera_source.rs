use crate::capture::domain::capture_error::{CaptureError, ReadError};
use crate::capture::domain::frame_source::FrameSource;
use crate::shared::frame::Frame;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;

/// Packets to pull per `read` before giving up and reporting the device as not ready.
const MAX_PACKETS_PER_READ: usize = 64;

/// Camera capture via ffmpeg-next (libavdevice + libavcodec).
///
/// Opens the platform capture demuxer for a numeric device id and converts
/// every decoded picture to packed RGB24.
pub struct FfmpegCameraSource {
    device: Option<OpenDevice>,
    device_id: u32,
    next_sequence: u64,
}

// Safety: FfmpegCameraSource is owned by the capture loop thread only.
// The raw pointers inside ffmpeg types are never shared across threads.
unsafe impl Send for FfmpegCameraSource {}

impl FfmpegCameraSource {
    pub fn new() -> Self {
        Self {
            device: None,
            device_id: 0,
            next_sequence: 0,
        }
    }
}

impl Default for FfmpegCameraSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegCameraSource {
    fn open(&mut self, device_id: u32) -> Result<(), CaptureError> {
        let unavailable = |reason: String| CaptureError::DeviceUnavailable { device_id, reason };

        ffmpeg_next::init().map_err(|e| unavailable(e.to_string()))?;

        let (demuxer, locator) = device_locator(device_id);
        let ictx = match demuxer.and_then(find_input_format) {
            Some(format) => {
                let mut options = ffmpeg_next::Dictionary::new();
                if cfg!(target_os = "macos") {
                    options.set("framerate", "30");
                }
                match ffmpeg_next::format::open_with(&locator, &format, options) {
                    Ok(ffmpeg_next::format::context::Context::Input(ictx)) => ictx,
                    Ok(_) => return Err(unavailable(format!("{locator} is not an input"))),
                    Err(e) => return Err(unavailable(format!("{locator}: {e}"))),
                }
            }
            None => ffmpeg_next::format::input(&locator)
                .map_err(|e| unavailable(format!("{locator}: {e}")))?,
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| unavailable("no video stream".into()))?;
        let stream_index = stream.index();
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| unavailable(e.to_string()))?;

        log::info!(
            "Opened camera device {device_id} ({locator}, {}x{})",
            decoder.width(),
            decoder.height()
        );

        self.device_id = device_id;
        self.device = Some(OpenDevice {
            ictx,
            decoder,
            scaler: None,
            stream_index,
        });
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, ReadError> {
        let device_id = self.device_id;
        let Some(device) = self.device.as_mut() else {
            return Err(ReadError::DeviceNotReady(device_id));
        };

        let decoded = device
            .next_picture()
            .ok_or(ReadError::DeviceNotReady(device_id))?;
        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Err(ReadError::EmptyFrame);
        }

        let pixels = device.convert_to_rgb(&decoded).map_err(|e| {
            log::warn!("Pixel conversion failed on device {device_id}: {e}");
            ReadError::EmptyFrame
        })?;
        if pixels.len() != (width as usize) * (height as usize) * 3 {
            return Err(ReadError::EmptyFrame);
        }

        let frame = Frame::new(pixels, width, height, 3, self.next_sequence);
        self.next_sequence += 1;
        Ok(frame)
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            log::info!("Closed camera device {}", self.device_id);
        }
    }
}

struct OpenDevice {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<(scaling::Context, Pixel, u32, u32)>,
    stream_index: usize,
}

impl OpenDevice {
    /// Feeds packets to the decoder until it yields a picture.
    fn next_picture(&mut self) -> Option<Video> {
        let mut decoded = Video::empty();
        for _ in 0..MAX_PACKETS_PER_READ {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return Some(decoded);
            }

            let (stream, packet) = self.ictx.packets().next()?;
            if stream.index() != self.stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }
        }
        None
    }

    /// Converts a decoded picture to tightly packed RGB24, rebuilding the
    /// scaler if the camera switched format or resolution.
    fn convert_to_rgb(&mut self, decoded: &Video) -> Result<Vec<u8>, ffmpeg_next::Error> {
        let (format, width, height) = (decoded.format(), decoded.width(), decoded.height());
        let stale = !matches!(
            &self.scaler,
            Some((_, f, w, h)) if *f == format && *w == width && *h == height
        );
        if stale {
            let ctx = scaling::Context::get(
                format,
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                scaling::Flags::BILINEAR,
            )?;
            self.scaler = Some((ctx, format, width, height));
        }

        let mut rgb = Video::empty();
        if let Some((scaler, ..)) = self.scaler.as_mut() {
            scaler.run(decoded, &mut rgb)?;
        }
        Ok(extract_rgb_pixels(&rgb, width, height))
    }
}

/// Demuxer name and input locator for a numeric camera id on this platform.
fn device_locator(device_id: u32) -> (Option<&'static str>, String) {
    if cfg!(target_os = "linux") {
        (Some("video4linux2"), format!("/dev/video{device_id}"))
    } else if cfg!(target_os = "macos") {
        (Some("avfoundation"), format!("{device_id}"))
    } else {
        (None, format!("/dev/video{device_id}"))
    }
}

/// Looks up a registered capture demuxer. ffmpeg names some of them with
/// comma-separated aliases (`"video4linux2,v4l2"`).
fn find_input_format(name: &str) -> Option<ffmpeg_next::format::Format> {
    ffmpeg_next::device::input::video().find(|format| format.name().split(',').any(|n| n == name))
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping the per-row padding (stride > width * 3).
fn extract_rgb_pixels(rgb_frame: &Video, width: u32, height: u32) -> Vec<u8> {
    if rgb_frame.planes() == 0 {
        return Vec::new();
    }
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
