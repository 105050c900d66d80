use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How a source image reaches its destination directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transfer {
    #[default]
    Copy,
    Move,
}

impl std::fmt::Display for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transfer::Copy => write!(f, "copy"),
            Transfer::Move => write!(f, "move"),
        }
    }
}

/// Places source images into output directories.
///
/// `copy_or_move` must be idempotent: placing the same source into the same
/// directory twice leaves one copy and returns the same path.
pub trait FileStore: Send {
    fn ensure_directory(&self, dir: &Path) -> std::io::Result<()>;

    /// Returns the final path of the placed file.
    fn copy_or_move(
        &self,
        source: &Path,
        dest_dir: &Path,
        transfer: Transfer,
    ) -> std::io::Result<PathBuf>;
}
