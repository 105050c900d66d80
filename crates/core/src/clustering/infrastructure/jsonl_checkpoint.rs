//! Append-only JSON-lines checkpoint.
//!
//! Every `record` appends and syncs one line, so a crash loses at most the
//! line being written. `save_all` compacts the log into a fresh file.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clustering::domain::checkpoint::{Checkpoint, CheckpointError};
use crate::clustering::domain::observation::Placement;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::durable_file::{
    append_json_line, ends_cleanly, open_append, read_json_lines, write_json_lines,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CheckpointEntry {
    Observation {
        path: PathBuf,
        bbox: Option<BoundingBox>,
        placement: Placement,
    },
    ImageComplete {
        path: PathBuf,
    },
}

type ObservationKey = (PathBuf, Option<BoundingBox>);

pub struct JsonlCheckpoint {
    path: PathBuf,
    observations: HashMap<ObservationKey, Placement>,
    completed: HashSet<PathBuf>,
    file: Option<fs::File>,
    read_only: bool,
    /// A failed append may have left a partial line behind.
    needs_compaction: bool,
}

impl JsonlCheckpoint {
    /// Loads the checkpoint at `path`.
    ///
    /// Never fails: an absent file is a cold start and a damaged one is moved
    /// aside to `<name>.corrupt` before starting empty.
    pub fn load_all(path: &Path) -> Self {
        let mut checkpoint = Self {
            path: path.to_path_buf(),
            observations: HashMap::new(),
            completed: HashSet::new(),
            file: None,
            read_only: false,
            needs_compaction: false,
        };

        if !path.exists() {
            log::info!("No checkpoint at {}, starting fresh", path.display());
            return checkpoint;
        }

        match read_json_lines::<CheckpointEntry>(path) {
            Ok(lines) => {
                for entry in lines.entries {
                    checkpoint.apply(entry);
                }
                log::info!(
                    "Resumed checkpoint with {} observations across {} completed images",
                    checkpoint.observations.len(),
                    checkpoint.completed.len()
                );
                if lines.torn_tail {
                    log::warn!(
                        "Checkpoint {} ends with an interrupted write, rewriting it",
                        path.display()
                    );
                    if let Err(e) = checkpoint.save_all() {
                        log::warn!("Failed to rewrite checkpoint: {e}");
                    }
                }
            }
            Err(e) => {
                log::warn!("Checkpoint is corrupt, starting fresh: {e}");
                let aside = corrupt_path(path);
                if let Err(e) = fs::rename(path, &aside) {
                    log::warn!("Failed to move corrupt checkpoint aside: {e}");
                } else {
                    log::warn!("Corrupt checkpoint kept at {}", aside.display());
                }
            }
        }

        checkpoint
    }

    /// Loads the checkpoint for queries only; the file is never touched.
    ///
    /// A torn final line is ignored and a damaged file reads as empty. Every
    /// write returns [`CheckpointError::ReadOnly`].
    pub fn open_read_only(path: &Path) -> Self {
        let mut checkpoint = Self {
            path: path.to_path_buf(),
            observations: HashMap::new(),
            completed: HashSet::new(),
            file: None,
            read_only: true,
            needs_compaction: false,
        };
        match read_json_lines::<CheckpointEntry>(path) {
            Ok(lines) => lines
                .entries
                .into_iter()
                .for_each(|entry| checkpoint.apply(entry)),
            Err(e) => log::warn!("Ignoring unreadable checkpoint: {e}"),
        }
        checkpoint
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_writable(&self) -> Result<(), CheckpointError> {
        if self.read_only {
            Err(CheckpointError::ReadOnly {
                path: self.path.clone(),
            })
        } else {
            Ok(())
        }
    }

    fn apply(&mut self, entry: CheckpointEntry) {
        match entry {
            CheckpointEntry::Observation {
                path,
                bbox,
                placement,
            } => {
                self.observations.insert((path, bbox), placement);
            }
            CheckpointEntry::ImageComplete { path } => {
                self.completed.insert(path);
            }
        }
    }

    fn append(&mut self, entry: &CheckpointEntry) -> Result<(), CheckpointError> {
        self.ensure_writable()?;
        let path = self.path.clone();
        let io_err = |source| CheckpointError::Io {
            path: path.clone(),
            source,
        };
        let mut file = match self.file.take() {
            Some(file) => file,
            None => {
                // Appending after a partial line would glue two entries into
                // one malformed line, so rewrite from memory first.
                if self.needs_compaction || !ends_cleanly(&path).map_err(io_err)? {
                    self.save_all()?;
                }
                open_append(&path).map_err(io_err)?
            }
        };
        if let Err(e) = append_json_line(&mut file, entry) {
            self.needs_compaction = true;
            return Err(io_err(e));
        }
        self.file = Some(file);
        Ok(())
    }

    fn entries(&self) -> Vec<CheckpointEntry> {
        let mut entries: Vec<CheckpointEntry> = self
            .observations
            .iter()
            .map(|((path, bbox), placement)| CheckpointEntry::Observation {
                path: path.clone(),
                bbox: *bbox,
                placement: *placement,
            })
            .chain(
                self.completed
                    .iter()
                    .map(|path| CheckpointEntry::ImageComplete { path: path.clone() }),
            )
            .collect();
        entries.sort_by(|a, b| entry_sort_key(a).cmp(&entry_sort_key(b)));
        entries
    }
}

/// Orders compacted entries by path, observations before the completion marker.
fn entry_sort_key(entry: &CheckpointEntry) -> (&Path, u8, Option<(i32, i32, i32, i32)>) {
    match entry {
        CheckpointEntry::Observation { path, bbox, .. } => (
            path.as_path(),
            0,
            bbox.map(|b| (b.y, b.x, b.width, b.height)),
        ),
        CheckpointEntry::ImageComplete { path } => (path.as_path(), 1, None),
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}

impl Checkpoint for JsonlCheckpoint {
    fn placement(&self, source: &Path, bbox: Option<&BoundingBox>) -> Option<Placement> {
        self.observations
            .get(&(source.to_path_buf(), bbox.copied()))
            .copied()
    }

    fn record(
        &mut self,
        source: &Path,
        bbox: Option<&BoundingBox>,
        placement: Placement,
    ) -> Result<(), CheckpointError> {
        let entry = CheckpointEntry::Observation {
            path: source.to_path_buf(),
            bbox: bbox.copied(),
            placement,
        };
        self.append(&entry)?;
        self.apply(entry);
        Ok(())
    }

    fn is_image_complete(&self, source: &Path) -> bool {
        self.completed.contains(source)
    }

    fn record_image_complete(&mut self, source: &Path) -> Result<(), CheckpointError> {
        if self.completed.contains(source) {
            return Ok(());
        }
        let entry = CheckpointEntry::ImageComplete {
            path: source.to_path_buf(),
        };
        self.append(&entry)?;
        self.apply(entry);
        Ok(())
    }

    fn completed_images(&self) -> usize {
        self.completed.len()
    }

    fn save_all(&mut self) -> Result<(), CheckpointError> {
        self.ensure_writable()?;
        self.file = None;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| CheckpointError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        write_json_lines(&self.path, &self.entries()).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.needs_compaction = false;
        Ok(())
    }
}
