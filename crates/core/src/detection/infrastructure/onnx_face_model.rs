use std::path::Path;

use crate::detection::domain::face_model::FaceModel;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::embedding::Embedding;
use crate::shared::frame::Frame;

use super::arcface_embedder::ArcFaceEmbedder;
use super::onnx_yolo_detector::OnnxYoloDetector;

/// [`FaceModel`] backed by a YOLO face detector and an ArcFace embedder.
pub struct OnnxFaceModel {
    detector: OnnxYoloDetector,
    embedder: ArcFaceEmbedder,
}

impl OnnxFaceModel {
    pub fn new(
        detector_path: &Path,
        embedder_path: &Path,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            detector: OnnxYoloDetector::new(detector_path, confidence)?,
            embedder: ArcFaceEmbedder::new(embedder_path)?,
        })
    }
}

impl FaceModel for OnnxFaceModel {
    fn detect(&mut self, frame: &Frame) -> Vec<BoundingBox> {
        match self.detector.detect(frame) {
            Ok(boxes) => boxes,
            Err(e) => {
                log::warn!("Face detection failed: {e}");
                Vec::new()
            }
        }
    }

    fn embed(&mut self, frame: &Frame, boxes: &[BoundingBox]) -> Vec<Embedding> {
        let mut embeddings = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            match self.embedder.embed(frame, bbox) {
                Ok(embedding) => embeddings.push(embedding),
                Err(e) => {
                    log::warn!(
                        "Embedding failed for face {bbox}; {} later face(s) skipped: {e}",
                        boxes.len() - embeddings.len() - 1
                    );
                    break;
                }
            }
        }
        embeddings
    }
}
