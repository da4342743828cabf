//! YOLO object detector using ONNX Runtime via `ort`.
//!
//! Handles letterbox preprocessing, inference, per-class confidence
//! thresholding, and NMS post-processing. Works with both single-class
//! exports and the 80-class COCO layout.
use std::path::Path;

use crate::detection::domain::region_detector::{DetectorLoader, RegionDetector};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::execution_provider::Accelerator;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default confidence threshold for a detection to be reported.
pub const DEFAULT_CONFIDENCE: f64 = 0.25;

/// COCO class index for "person".
pub const DEFAULT_CLASS_ID: usize = 0;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Box geometry occupies the first four values of every output row.
const BOX_VALUES: usize = 4;

/// YOLO detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    confidence: f64,
    class_id: usize,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(
        model_path: &Path,
        confidence: f64,
        class_id: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let accelerator = Accelerator::for_platform();
        let session = ort::session::Session::builder()?
            .with_execution_providers(accelerator.providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!(
            "Loaded YOLO model {} (input {input_size}px, class {class_id}, confidence {confidence}, {} requested)",
            model_path.display(),
            accelerator.name()
        );

        Ok(Self {
            session,
            confidence,
            class_id,
            input_size,
        })
    }
}

impl RegionDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let letterboxed = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(letterboxed.tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let mut raw = parse_detections(data, &shape, self.class_id, self.confidence)?;
        let kept = nms(&mut raw, NMS_IOU_THRESH);

        Ok(to_frame_regions(&kept, &letterboxed, frame.width(), frame.height()))
    }
}

/// Loads [`OnnxYoloDetector`]s from `.onnx` model files.
#[derive(Clone, Debug)]
pub struct OnnxDetectorLoader {
    pub confidence: f64,
    pub class_id: usize,
}

impl Default for OnnxDetectorLoader {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            class_id: DEFAULT_CLASS_ID,
        }
    }
}

impl DetectorLoader for OnnxDetectorLoader {
    fn load(
        &self,
        config_path: &Path,
    ) -> Result<Box<dyn RegionDetector>, Box<dyn std::error::Error>> {
        if !config_path.is_file() {
            return Err(format!("model file not found: {}", config_path.display()).into());
        }
        let detector = OnnxYoloDetector::new(config_path, self.confidence, self.class_id)?;
        Ok(Box::new(detector))
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

struct Letterboxed {
    tensor: ndarray::Array4<f32>,
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

/// Letterbox-resize a frame to `target_size` x `target_size` as an NCHW
/// float32 tensor, padded with YOLO's 114 gray.
fn letterbox(frame: &Frame, target_size: u32) -> Letterboxed {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbor resize into the padded area
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    Letterboxed {
        tensor,
        scale,
        pad_x,
        pad_y,
    }
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

/// A candidate box in letterbox coordinates.
#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

impl RawDetection {
    /// Maps back to frame pixels and clamps to the frame.
    fn to_region(&self, scale: f64, pad_x: u32, pad_y: u32, width: u32, height: u32) -> Region {
        let unpad = |v: f64, pad: u32| ((v - pad as f64) / scale).round() as i32;
        Region::new(
            unpad(self.x1, pad_x),
            unpad(self.y1, pad_y),
            unpad(self.x2, pad_x),
            unpad(self.y2, pad_y),
        )
        .clamp_to(width, height)
    }
}

/// Maps kept detections back to frame pixels, dropping boxes that collapse
/// to a line or a point once clamped (entirely outside the frame).
fn to_frame_regions(
    kept: &[RawDetection],
    letterboxed: &Letterboxed,
    width: u32,
    height: u32,
) -> Vec<Region> {
    kept.iter()
        .map(|det| {
            det.to_region(
                letterboxed.scale,
                letterboxed.pad_x,
                letterboxed.pad_y,
                width,
                height,
            )
        })
        .filter(|region| region.width() > 0 && region.height() > 0)
        .collect()
}

/// Reads `[cx, cy, w, h, class scores...]` rows from a YOLO output tensor.
///
/// Accepts `[1, features, detections]` (the usual transposed export) and
/// `[1, detections, features]`.
fn parse_detections(
    data: &[f32],
    shape: &[usize],
    class_id: usize,
    confidence: f64,
) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if data.len() < num_dets * num_feats {
        return Err(format!("YOLO output too short for shape {shape:?}").into());
    }

    let score_index = BOX_VALUES + class_id;
    if score_index >= num_feats {
        return Err(format!("class {class_id} not present in model output ({num_feats} features)").into());
    }

    let value = |det: usize, feat: usize| -> f64 {
        if transposed {
            data[feat * num_dets + det] as f64
        } else {
            data[det * num_feats + feat] as f64
        }
    };

    let mut dets = Vec::new();
    for i in 0..num_dets {
        let conf = value(i, score_index);
        if conf < confidence {
            continue;
        }
        let (cx, cy, w, h) = (value(i, 0), value(i, 1), value(i, 2), value(i, 3));
        dets.push(RawDetection {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            confidence: conf,
        });
    }
    Ok(dets)
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        let suppressed = keep.iter().any(|k| {
            bbox_iou(
                &[k.x1, k.y1, k.x2, k.y2],
                &[det.x1, det.y1, det.x2, det.y2],
            ) > iou_thresh
        });
        if !suppressed {
            keep.push(det.clone());
        }
    }
    keep
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 200x100 → 640: scale 3.2, content 640x320, 160 rows of padding top and bottom
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3, 0);
        let lb = letterbox(&frame, 640);

        assert_eq!(lb.tensor.shape(), &[1, 3, 640, 640]);
        assert_relative_eq!(lb.scale, 3.2, epsilon = 1e-9);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 160);
    }

    #[test]
    fn test_letterbox_pads_with_gray() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 3, 0);
        let lb = letterbox(&frame, 640);

        let inside = lb.tensor[[0, 0, lb.pad_y as usize + 1, 1]];
        assert_relative_eq!(inside, 1.0, epsilon = 0.01);
        assert_relative_eq!(lb.tensor[[0, 0, 0, 0]], 114.0 / 255.0, epsilon = 0.01);
    }

    #[test]
    fn test_parse_transposed_layout_picks_requested_class() {
        // 6 features (box + 2 classes) x 2 detections, feature-major
        let shape = [1, 6, 2];
        #[rustfmt::skip]
        let data = [
            100.0, 300.0, // cx
            100.0, 300.0, // cy
            40.0,  20.0,  // w
            60.0,  20.0,  // h
            0.9,   0.1,   // class 0
            0.2,   0.8,   // class 1
        ];

        let people = parse_detections(&data, &shape, 0, 0.5).unwrap();
        assert_eq!(people.len(), 1);
        assert_relative_eq!(people[0].x1, 80.0);
        assert_relative_eq!(people[0].y2, 130.0);

        let others = parse_detections(&data, &shape, 1, 0.5).unwrap();
        assert_eq!(others.len(), 1);
        assert_relative_eq!(others[0].x1, 290.0);
    }

    #[test]
    fn test_parse_row_major_layout() {
        // 6 detections x 5 features (single-class export)
        let shape = [1, 6, 5];
        let mut data = vec![0.0f32; 30];
        data[..5].copy_from_slice(&[50.0, 50.0, 10.0, 10.0, 0.95]);
        let dets = parse_detections(&data, &shape, 0, 0.25).unwrap();
        assert_eq!(dets.len(), 1);
        assert_relative_eq!(dets[0].x1, 45.0);
        assert_relative_eq!(dets[0].confidence, 0.95, epsilon = 1e-6);
    }

    #[test]
    fn test_parse_rejects_missing_class() {
        let shape = [1, 5, 10];
        let data = vec![0.0f32; 50];
        assert!(parse_detections(&data, &shape, 3, 0.25).is_err());
    }

    #[test]
    fn test_parse_rejects_unexpected_rank() {
        assert!(parse_detections(&[0.0; 4], &[4], 0, 0.25).is_err());
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let mut dets = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.9),
            det(5.0, 5.0, 105.0, 105.0, 0.8),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_nms_keeps_non_overlapping_in_confidence_order() {
        let mut dets = vec![
            det(0.0, 0.0, 50.0, 50.0, 0.6),
            det(200.0, 200.0, 250.0, 250.0, 0.8),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 2);
        assert_relative_eq!(kept[0].confidence, 0.8);
        assert_relative_eq!(kept[1].confidence, 0.6);
    }

    #[test]
    fn test_nms_empty_input() {
        let kept = nms(&mut [], 0.3);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_to_region_undoes_letterbox_and_clamps() {
        // scale 2, 10 px of horizontal padding
        let region = det(30.0, 20.0, 110.0, 500.0, 0.9).to_region(2.0, 10, 0, 100, 200);
        assert_eq!(region, Region::new(10, 10, 50, 199));
    }

    #[test]
    fn test_boxes_outside_frame_are_dropped() {
        let letterboxed = Letterboxed {
            tensor: ndarray::Array4::zeros((1, 3, 1, 1)),
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        };
        let kept = [
            det(10.0, 10.0, 40.0, 40.0, 0.9),
            // Right of a 100 px wide frame: clamps to a vertical line.
            det(150.0, 10.0, 180.0, 40.0, 0.8),
        ];
        let regions = to_frame_regions(&kept, &letterboxed, 100, 100);
        assert_eq!(regions, vec![Region::new(10, 10, 40, 40)]);
    }

    #[test]
    fn test_bbox_iou_no_overlap() {
        assert_eq!(
            bbox_iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]),
            0.0
        );
    }

    #[test]
    fn test_bbox_iou_perfect() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert_relative_eq!(bbox_iou(&b, &b), 1.0);
    }

    #[test]
    fn test_loader_rejects_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = OnnxDetectorLoader::default();
        let err = loader.load(&dir.path().join("absent.onnx")).err().unwrap();
        assert!(err.to_string().contains("model file not found"));
    }

    #[test]
    fn test_loader_rejects_invalid_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"not a model").unwrap();
        let loader = OnnxDetectorLoader::default();
        assert!(loader.load(&path).is_err());
    }
}
