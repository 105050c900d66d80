/// YOLO face detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, output decoding and NMS.
/// Boxes are returned in original frame pixels, ordered left to right.
use std::path::Path;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

use super::execution_provider::build_session;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default confidence threshold for face detection.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Padding value for letterboxed pixels (YOLO convention).
const LETTERBOX_GRAY: f32 = 114.0 / 255.0;

/// YOLO face detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        let geometry = Letterbox::fit(frame.width(), frame.height(), self.input_size);
        let input_tensor = geometry.apply(frame);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let mut raw = decode_output(data, tensor.shape(), self.confidence, &geometry)?;
        let kept = nms(&mut raw, NMS_IOU_THRESH);

        let mut boxes: Vec<BoundingBox> = kept
            .iter()
            .filter_map(|d| {
                BoundingBox::from_corners(d.x1, d.y1, d.x2, d.y2, frame.width(), frame.height())
            })
            .collect();
        boxes.sort_by_key(|b| (b.x, b.y));
        Ok(boxes)
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Placement of a frame inside the square model input.
#[derive(Clone, Copy, Debug)]
struct Letterbox {
    target_size: u32,
    scale: f64,
    new_w: u32,
    new_h: u32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target_size: u32) -> Self {
        let target = target_size as f64;
        let scale = (target / width as f64).min(target / height as f64);
        let new_w = ((width as f64 * scale).round() as u32).min(target_size);
        let new_h = ((height as f64 * scale).round() as u32).min(target_size);
        Self {
            target_size,
            scale,
            new_w,
            new_h,
            pad_x: (target_size - new_w) / 2,
            pad_y: (target_size - new_h) / 2,
        }
    }

    /// Nearest-neighbour resize into a gray-padded NCHW float32 tensor.
    fn apply(&self, frame: &Frame) -> ndarray::Array4<f32> {
        let size = self.target_size as usize;
        let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, size, size), LETTERBOX_GRAY);

        let src = frame.as_ndarray();
        let src_h = frame.height() as usize;
        let src_w = frame.width() as usize;

        for y in 0..self.new_h as usize {
            let src_y = ((y as f64 / self.scale) as usize).min(src_h - 1);
            for x in 0..self.new_w as usize {
                let src_x = ((x as f64 / self.scale) as usize).min(src_w - 1);
                let ty = self.pad_y as usize + y;
                let tx = self.pad_x as usize + x;
                for c in 0..3 {
                    tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
                }
            }
        }
        tensor
    }

    /// Maps a model-space coordinate back to frame pixels.
    fn unmap(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

/// Decodes `[1, features, detections]` or `[1, detections, features]` rows of
/// `[cx, cy, w, h, conf, ...]`. Trailing keypoint values are ignored.
fn decode_output(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
    geometry: &Letterbox,
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
    if num_feats < 5 || data.len() < num_dets * num_feats {
        return Err(format!("YOLO output too small for shape {shape:?}").into());
    }

    let value = |det: usize, feat: usize| -> f64 {
        let idx = if transposed {
            feat * num_dets + det
        } else {
            det * num_feats + feat
        };
        data[idx] as f64
    };

    let mut dets = Vec::new();
    for i in 0..num_dets {
        let conf = value(i, 4);
        if conf < confidence {
            continue;
        }
        let (cx, cy, w, h) = (value(i, 0), value(i, 1), value(i, 2), value(i, 3));
        let (x1, y1) = geometry.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = geometry.unmap(cx + w / 2.0, cy + h / 2.0);
        dets.push(RawDetection {
            x1,
            y1,
            x2,
            y2,
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
        if keep.iter().all(|k| corner_iou(k, det) <= iou_thresh) {
            keep.push(det.clone());
        }
    }
    keep
}

fn corner_iou(a: &RawDetection, b: &RawDetection) -> f64 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn raw(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> RawDetection {
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
        // 200x100 into 640: scale 3.2, content 640x320, 160 rows of padding on top.
        let geometry = Letterbox::fit(200, 100, 640);
        assert_relative_eq!(geometry.scale, 3.2, epsilon = 1e-9);
        assert_eq!((geometry.new_w, geometry.new_h), (640, 320));
        assert_eq!((geometry.pad_x, geometry.pad_y), (0, 160));
    }

    #[test]
    fn test_letterbox_values_normalized() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 3);
        let geometry = Letterbox::fit(100, 50, 640);
        let tensor = geometry.apply(&frame);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        let y = geometry.pad_y as usize + 1;
        assert_relative_eq!(tensor[[0, 0, y, 1]], 1.0, epsilon = 1e-6);
        assert_relative_eq!(tensor[[0, 0, 0, 0]], LETTERBOX_GRAY, epsilon = 1e-6);
    }

    #[test]
    fn test_unmap_inverts_letterbox() {
        let geometry = Letterbox::fit(200, 100, 640);
        let (x, y) = geometry.unmap(320.0, 320.0);
        assert_relative_eq!(x, 100.0, epsilon = 1e-9);
        assert_relative_eq!(y, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_decode_row_major_output() {
        let geometry = Letterbox::fit(640, 640, 640);
        // Two detections, five features each; the second is below threshold.
        let data = [
            100.0, 100.0, 40.0, 60.0, 0.9, //
            300.0, 300.0, 40.0, 40.0, 0.1,
        ];
        let dets = decode_output(&data, &[1, 2, 5], 0.5, &geometry).unwrap();
        assert_eq!(dets.len(), 1);
        assert_relative_eq!(dets[0].x1, 80.0);
        assert_relative_eq!(dets[0].y1, 70.0);
        assert_relative_eq!(dets[0].x2, 120.0);
        assert_relative_eq!(dets[0].y2, 130.0);
    }

    #[test]
    fn test_decode_transposed_output() {
        let geometry = Letterbox::fit(640, 640, 640);
        // Five features by six detections, feature-major.
        let mut data = vec![0.0f32; 5 * 6];
        let det = 4;
        for (feat, v) in [50.0, 60.0, 20.0, 20.0, 0.8].into_iter().enumerate() {
            data[feat * 6 + det] = v;
        }
        let dets = decode_output(&data, &[1, 5, 6], 0.5, &geometry).unwrap();
        assert_eq!(dets.len(), 1);
        assert_relative_eq!(dets[0].x1, 40.0);
        assert_relative_eq!(dets[0].y2, 70.0);
    }

    #[test]
    fn test_decode_rejects_unexpected_shape() {
        let geometry = Letterbox::fit(640, 640, 640);
        assert!(decode_output(&[0.0; 4], &[4], 0.5, &geometry).is_err());
        assert!(decode_output(&[0.0; 4], &[1, 1, 4], 0.5, &geometry).is_err());
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let mut dets = vec![
            raw(0.0, 0.0, 100.0, 100.0, 0.8),
            raw(5.0, 5.0, 105.0, 105.0, 0.9),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let mut dets = vec![
            raw(0.0, 0.0, 50.0, 50.0, 0.9),
            raw(200.0, 200.0, 250.0, 250.0, 0.8),
        ];
        assert_eq!(nms(&mut dets, 0.3).len(), 2);
    }

    #[test]
    fn test_nms_empty_input() {
        assert!(nms(&mut [], 0.3).is_empty());
    }

    #[test]
    fn test_corner_iou_identical_and_disjoint() {
        let a = raw(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = raw(20.0, 20.0, 30.0, 30.0, 1.0);
        assert_relative_eq!(corner_iou(&a, &a), 1.0);
        assert_eq!(corner_iou(&a, &b), 0.0);
    }
}
