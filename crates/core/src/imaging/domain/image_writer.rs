use std::path::Path;

use crate::shared::frame::Frame;

/// Encodes a frame to disk, used for face-crop thumbnails.
///
/// The format follows the file extension. Missing parent directories are
/// created. `size`, when given, is the exact output size in pixels.
pub trait ImageWriter: Send {
    fn write(
        &self,
        path: &Path,
        frame: &Frame,
        size: Option<(u32, u32)>,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
