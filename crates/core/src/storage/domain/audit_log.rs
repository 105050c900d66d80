use std::path::PathBuf;

use crate::shared::bounding_box::BoundingBox;

/// One placement decision: a face (or a faceless image) and its destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditRow {
    pub image_path: PathBuf,
    /// `None` for images without a usable face.
    pub bbox: Option<BoundingBox>,
    /// Destination directory label.
    pub group: String,
}

/// Append-only record of placement decisions.
pub trait AuditLog: Send {
    fn record(&mut self, row: &AuditRow) -> Result<(), Box<dyn std::error::Error>>;
}
