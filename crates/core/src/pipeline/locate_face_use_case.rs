use std::path::{Path, PathBuf};

use crate::clustering::cluster_engine::ClusterEngine;
use crate::clustering::domain::observation::GroupId;
use crate::pipeline::image_scanner::{ImageScanner, ScanOutcome};
use crate::shared::bounding_box::BoundingBox;

/// A face in the queried image and the group it would join, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedFace {
    pub bbox: BoundingBox,
    /// `None` when no group accepts the face or it could not be embedded.
    pub group: Option<GroupId>,
}

/// Read-only query: which existing group each face of one image belongs to.
///
/// Uses the same first-match rule as sorting, so the answer is the group the
/// face would join if the image were sorted now. Nothing is written.
pub struct LocateFaceUseCase {
    scanner: Box<dyn ImageScanner>,
    engine: ClusterEngine,
}

impl LocateFaceUseCase {
    pub fn new(scanner: Box<dyn ImageScanner>, engine: ClusterEngine) -> Self {
        Self { scanner, engine }
    }

    pub fn execute(&mut self, image: &Path) -> Result<Vec<LocatedFace>, Box<dyn std::error::Error>> {
        let mut outcome = None;
        self.scanner.scan(&[image.to_path_buf()], &mut |scan| {
            outcome = Some(scan.outcome);
            false
        })?;
        let outcome = outcome.ok_or_else(|| format!("{} was not scanned", image.display()))?;

        let located = match outcome {
            ScanOutcome::Unreadable(e) => {
                return Err(format!("Cannot read {}: {e}", image.display()).into())
            }
            ScanOutcome::NoFaces => Vec::new(),
            ScanOutcome::NoEmbeddings { boxes } => boxes
                .into_iter()
                .map(|bbox| LocatedFace { bbox, group: None })
                .collect(),
            ScanOutcome::Faces { faces, .. } => faces
                .into_iter()
                .map(|(bbox, embedding)| LocatedFace {
                    bbox,
                    group: self.engine.find_match(&embedding),
                })
                .collect(),
        };
        log::info!("{}: {} face(s) located", image.display(), located.len());
        Ok(located)
    }

    /// Paths of the files already sorted into `group`, if its directory exists.
    pub fn group_members(group_dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(group_dir) else {
            return Vec::new();
        };
        let mut members: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
            .map(|e| e.path())
            .collect();
        members.sort();
        members
    }
}
