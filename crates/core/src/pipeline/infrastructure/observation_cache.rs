//! Resumable record of scanned observations for batch clustering.
//!
//! Faces are appended as they are scanned and an image is sealed with a
//! done marker once all of its faces are on disk. Faces of an unsealed image
//! are discarded on load, so a rescan never duplicates them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::shared::bounding_box::BoundingBox;
use crate::shared::durable_file::{
    append_json_line, ends_cleanly, open_append, read_json_lines, write_json_lines,
};
use crate::shared::embedding::Embedding;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CacheEntry {
    Face {
        path: PathBuf,
        bbox: BoundingBox,
        embedding: Embedding,
    },
    ImageDone {
        path: PathBuf,
    },
}

pub struct ObservationCache {
    path: PathBuf,
    faces: BTreeMap<PathBuf, Vec<(BoundingBox, Embedding)>>,
    file: Option<fs::File>,
    /// A failed record may have left unsealed faces or a partial line.
    needs_compaction: bool,
}

impl ObservationCache {
    /// Loads the cache at `path`. An unreadable cache is discarded.
    pub fn load(path: &Path) -> Self {
        let mut cache = Self {
            path: path.to_path_buf(),
            faces: BTreeMap::new(),
            file: None,
            needs_compaction: false,
        };

        let mut pending: BTreeMap<PathBuf, Vec<(BoundingBox, Embedding)>> = BTreeMap::new();
        let needs_rewrite = match read_json_lines::<CacheEntry>(path) {
            Ok(lines) => {
                for entry in lines.entries {
                    match entry {
                        CacheEntry::Face {
                            path,
                            bbox,
                            embedding,
                        } => pending.entry(path).or_default().push((bbox, embedding)),
                        CacheEntry::ImageDone { path } => {
                            let faces = pending.remove(&path).unwrap_or_default();
                            cache.faces.insert(path, faces);
                        }
                    }
                }
                lines.torn_tail || !pending.is_empty()
            }
            Err(e) => {
                log::warn!("Discarding observation cache: {e}");
                true
            }
        };

        if !cache.faces.is_empty() {
            log::info!("Observation cache holds {} scanned images", cache.faces.len());
        }
        if needs_rewrite {
            if let Err(e) = cache.compact() {
                log::warn!("Failed to rewrite observation cache: {e}");
            }
        }
        cache
    }

    pub fn contains(&self, source: &Path) -> bool {
        self.faces.contains_key(source)
    }

    /// Durably records every face of one image, then seals it.
    pub fn record(
        &mut self,
        source: &Path,
        faces: &[(BoundingBox, Embedding)],
    ) -> std::io::Result<()> {
        if self.faces.contains_key(source) {
            return Ok(());
        }
        let mut file = match self.file.take() {
            Some(file) => file,
            None => {
                if self.needs_compaction || !ends_cleanly(&self.path)? {
                    self.compact()?;
                }
                open_append(&self.path)?
            }
        };
        if let Err(e) = append_image(&mut file, source, faces) {
            self.needs_compaction = true;
            return Err(e);
        }
        self.file = Some(file);
        self.faces.insert(source.to_path_buf(), faces.to_vec());
        Ok(())
    }

    /// Faces recorded for a sealed image. Empty when it had none.
    pub fn faces(&self, source: &Path) -> Option<&[(BoundingBox, Embedding)]> {
        self.faces.get(source).map(Vec::as_slice)
    }

    fn compact(&mut self) -> std::io::Result<()> {
        self.file = None;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut entries = Vec::new();
        for (path, faces) in &self.faces {
            for (bbox, embedding) in faces {
                entries.push(CacheEntry::Face {
                    path: path.clone(),
                    bbox: *bbox,
                    embedding: embedding.clone(),
                });
            }
            entries.push(CacheEntry::ImageDone { path: path.clone() });
        }
        write_json_lines(&self.path, &entries)?;
        self.needs_compaction = false;
        Ok(())
    }
}

fn append_image(
    file: &mut fs::File,
    source: &Path,
    faces: &[(BoundingBox, Embedding)],
) -> std::io::Result<()> {
    for (bbox, embedding) in faces {
        append_json_line(
            file,
            &CacheEntry::Face {
                path: source.to_path_buf(),
                bbox: *bbox,
                embedding: embedding.clone(),
            },
        )?;
    }
    append_json_line(
        file,
        &CacheEntry::ImageDone {
            path: source.to_path_buf(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn face(x: i32, v: f32) -> (BoundingBox, Embedding) {
        (BoundingBox::new(x, 0, 10, 10), Embedding::new(vec![v, 1.0]))
    }

    #[test]
    fn test_records_survive_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("observations.jsonl");

        let mut cache = ObservationCache::load(&path);
        cache
            .record(Path::new("a.jpg"), &[face(0, 0.5), face(20, 0.25)])
            .unwrap();
        cache.record(Path::new("blank.jpg"), &[]).unwrap();

        let cache = ObservationCache::load(&path);
        assert!(cache.contains(Path::new("a.jpg")));
        assert_eq!(cache.faces(Path::new("blank.jpg")), Some(&[][..]));
        assert_eq!(
            cache.faces(Path::new("a.jpg")),
            Some(&[face(0, 0.5), face(20, 0.25)][..])
        );
        assert_eq!(cache.faces(Path::new("missing.jpg")), None);
    }

    #[test]
    fn test_unsealed_image_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("observations.jsonl");
        let mut cache = ObservationCache::load(&path);
        cache.record(Path::new("a.jpg"), &[face(0, 0.5)]).unwrap();
        drop(cache);

        // Simulate a run killed between a face and its done marker.
        let mut file = open_append(&path).unwrap();
        append_json_line(
            &mut file,
            &CacheEntry::Face {
                path: PathBuf::from("b.jpg"),
                bbox: face(0, 0.5).0,
                embedding: face(0, 0.5).1,
            },
        )
        .unwrap();
        drop(file);

        let mut cache = ObservationCache::load(&path);
        assert!(cache.contains(Path::new("a.jpg")));
        assert!(!cache.contains(Path::new("b.jpg")));

        cache.record(Path::new("b.jpg"), &[face(0, 0.5)]).unwrap();
        let cache = ObservationCache::load(&path);
        assert_eq!(cache.faces(Path::new("b.jpg")).map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_garbage_cache_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("observations.jsonl");
        fs::write(&path, "garbage\n{\"kind\":\"image_done\",\"path\":\"a.jpg\"}\n").unwrap();

        let cache = ObservationCache::load(&path);
        assert!(!cache.contains(Path::new("a.jpg")));
        assert!(fs::read_to_string(&path).unwrap().is_empty());
    }

    #[test]
    fn test_record_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("observations.jsonl");
        let mut cache = ObservationCache::load(&path);
        cache.record(Path::new("a.jpg"), &[face(0, 0.5)]).unwrap();
        cache.record(Path::new("a.jpg"), &[face(0, 0.5)]).unwrap();

        let cache = ObservationCache::load(&path);
        assert_eq!(cache.faces(Path::new("a.jpg")).map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_interrupted_record_is_compacted_before_the_next() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("observations.jsonl");
        let mut cache = ObservationCache::load(&path);
        cache.record(Path::new("a.jpg"), &[face(0, 0.5)]).unwrap();

        let mut file = open_append(&path).unwrap();
        std::io::Write::write_all(&mut file, b"{\"kind\":\"fa").unwrap();
        drop(file);
        cache.file = None;
        cache.needs_compaction = true;

        cache.record(Path::new("b.jpg"), &[face(5, 0.25)]).unwrap();
        assert!(!cache.needs_compaction);

        let cache = ObservationCache::load(&path);
        assert_eq!(cache.faces(Path::new("a.jpg")), Some(&[face(0, 0.5)][..]));
        assert_eq!(cache.faces(Path::new("b.jpg")), Some(&[face(5, 0.25)][..]));
    }
}
