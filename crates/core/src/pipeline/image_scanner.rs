use std::path::{Path, PathBuf};

use crate::detection::domain::face_model::FaceModel;
use crate::imaging::domain::image_reader::ImageReader;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::embedding::Embedding;
use crate::shared::frame::Frame;

/// Result of decoding, detecting and embedding one image.
pub enum ScanOutcome {
    /// The file could not be decoded.
    Unreadable(String),
    NoFaces,
    /// Faces were found but none could be embedded.
    NoEmbeddings { boxes: Vec<BoundingBox> },
    Faces {
        frame: Frame,
        faces: Vec<(BoundingBox, Embedding)>,
        /// Detected faces that came back without an embedding.
        dropped: usize,
    },
}

pub struct ImageScan {
    pub source: PathBuf,
    pub outcome: ScanOutcome,
}

/// Scans one image. Boxes without an embedding are dropped and counted.
pub fn scan_image(
    reader: &dyn ImageReader,
    model: &mut dyn FaceModel,
    source: &Path,
) -> ImageScan {
    let outcome = match reader.read(source) {
        Err(e) => ScanOutcome::Unreadable(e.to_string()),
        Ok(frame) => {
            let boxes = model.detect(&frame);
            if boxes.is_empty() {
                ScanOutcome::NoFaces
            } else {
                let embeddings = model.embed(&frame, &boxes);
                if embeddings.is_empty() {
                    ScanOutcome::NoEmbeddings { boxes }
                } else {
                    let dropped = boxes.len().saturating_sub(embeddings.len());
                    if dropped > 0 {
                        log::warn!(
                            "{}: {} of {} faces embedded",
                            source.display(),
                            embeddings.len(),
                            boxes.len()
                        );
                    }
                    let faces = boxes.into_iter().zip(embeddings).collect();
                    ScanOutcome::Faces {
                        frame,
                        faces,
                        dropped,
                    }
                }
            }
        }
    };
    ImageScan {
        source: source.to_path_buf(),
        outcome,
    }
}

/// Produces scans for a list of images, in list order.
///
/// This is a port: infrastructure decides whether scanning overlaps with the
/// consumer. `on_scan` returns `false` to stop early.
pub trait ImageScanner: Send {
    fn scan(
        &mut self,
        sources: &[PathBuf],
        on_scan: &mut dyn FnMut(ImageScan) -> bool,
    ) -> Result<(), Box<dyn std::error::Error>>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Stub collaborators shared by the use-case tests.

    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::imaging::domain::image_writer::ImageWriter;

    /// One scripted face: its box and embedding.
    pub type Face = (BoundingBox, Embedding);

    pub fn face(x: i32, value: f32) -> Face {
        (
            BoundingBox::new(x, 10, 20, 20),
            Embedding::new(vec![value, 0.0]),
        )
    }

    /// File names seen by the reader. A frame's pixel value is the index of
    /// its file name, which lets the model recognise the image.
    #[derive(Clone, Default)]
    struct Names(Arc<Mutex<Vec<String>>>);

    impl Names {
        fn index_of(&self, name: String) -> u8 {
            let mut names = self.0.lock().unwrap();
            match names.iter().position(|n| *n == name) {
                Some(i) => i as u8,
                None => {
                    names.push(name);
                    (names.len() - 1) as u8
                }
            }
        }

        fn name_at(&self, index: u8) -> Option<String> {
            self.0.lock().unwrap().get(index as usize).cloned()
        }
    }

    #[derive(Clone)]
    pub struct StubReader {
        names: Names,
        unreadable: Vec<PathBuf>,
        pub reads: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl StubReader {
        pub fn unreadable(mut self, path: &Path) -> Self {
            self.unreadable.push(path.to_path_buf());
            self
        }
    }

    impl ImageReader for StubReader {
        fn read(&self, path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
            self.reads.lock().unwrap().push(path.to_path_buf());
            if self.unreadable.iter().any(|p| p == path) {
                return Err("corrupt jpeg".into());
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let value = self.names.index_of(name);
            Ok(Frame::new(vec![value; 64 * 64 * 3], 64, 64, 3))
        }
    }

    /// Returns scripted faces by file name. Unknown names have no faces;
    /// `blind` names detect faces but embed none; `partial` names embed
    /// only their first few faces.
    pub struct StubModel {
        names: Names,
        script: HashMap<String, Vec<Face>>,
        blind: Vec<String>,
        embed_limit: HashMap<String, usize>,
        pub detections: Arc<Mutex<usize>>,
    }

    impl StubModel {
        pub fn with(mut self, name: &str, faces: Vec<Face>) -> Self {
            self.script.insert(name.to_string(), faces);
            self
        }

        pub fn blind(mut self, name: &str, faces: Vec<Face>) -> Self {
            self.blind.push(name.to_string());
            self.with(name, faces)
        }

        pub fn partial(mut self, name: &str, faces: Vec<Face>, embedded: usize) -> Self {
            self.embed_limit.insert(name.to_string(), embedded);
            self.with(name, faces)
        }

        fn faces(&self, frame: &Frame) -> (Option<String>, Vec<Face>) {
            let name = frame.data().first().and_then(|v| self.names.name_at(*v));
            let faces = name
                .as_ref()
                .and_then(|n| self.script.get(n))
                .cloned()
                .unwrap_or_default();
            (name, faces)
        }
    }

    impl FaceModel for StubModel {
        fn detect(&mut self, frame: &Frame) -> Vec<BoundingBox> {
            *self.detections.lock().unwrap() += 1;
            self.faces(frame).1.iter().map(|(b, _)| *b).collect()
        }

        fn embed(&mut self, frame: &Frame, boxes: &[BoundingBox]) -> Vec<Embedding> {
            let (name, faces) = self.faces(frame);
            if name.as_ref().is_some_and(|n| self.blind.contains(n)) {
                return Vec::new();
            }
            let limit = name
                .and_then(|n| self.embed_limit.get(&n).copied())
                .unwrap_or(usize::MAX);
            boxes
                .iter()
                .filter_map(|b| faces.iter().find(|(fb, _)| fb == b).map(|(_, e)| e.clone()))
                .take(limit)
                .collect()
        }
    }

    /// A reader and model that agree on which frame is which image.
    pub fn stubs() -> (StubReader, StubModel) {
        let names = Names::default();
        (
            StubReader {
                names: names.clone(),
                unreadable: Vec::new(),
                reads: Arc::default(),
            },
            StubModel {
                names,
                script: HashMap::new(),
                blind: Vec::new(),
                embed_limit: HashMap::new(),
                detections: Arc::default(),
            },
        )
    }

    #[derive(Clone, Default)]
    pub struct StubWriter {
        pub written: Arc<Mutex<Vec<(PathBuf, Option<(u32, u32)>)>>>,
    }

    impl ImageWriter for StubWriter {
        fn write(
            &self,
            path: &Path,
            _frame: &Frame,
            size: Option<(u32, u32)>,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.written.lock().unwrap().push((path.to_path_buf(), size));
            Ok(())
        }
    }
}
