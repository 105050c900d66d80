use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::clustering::domain::observation::Placement;
use crate::shared::bounding_box::BoundingBox;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint {path} was opened read-only")]
    ReadOnly { path: PathBuf },
}

/// Durable record of work already reflected in the embedding store.
///
/// Observations are keyed by `(source path, face box)`; faceless images use
/// `None` for the box. Recorded placements are returned on replay so a
/// skipped observation reproduces its original outcome.
pub trait Checkpoint: Send {
    fn placement(&self, source: &Path, bbox: Option<&BoundingBox>) -> Option<Placement>;

    fn is_processed(&self, source: &Path, bbox: Option<&BoundingBox>) -> bool {
        self.placement(source, bbox).is_some()
    }

    /// Durably marks an observation as assigned.
    fn record(
        &mut self,
        source: &Path,
        bbox: Option<&BoundingBox>,
        placement: Placement,
    ) -> Result<(), CheckpointError>;

    /// Whether every face of `source` has been recorded.
    fn is_image_complete(&self, source: &Path) -> bool;

    fn record_image_complete(&mut self, source: &Path) -> Result<(), CheckpointError>;

    fn completed_images(&self) -> usize;

    /// Rewrites the whole checkpoint.
    fn save_all(&mut self) -> Result<(), CheckpointError>;
}
