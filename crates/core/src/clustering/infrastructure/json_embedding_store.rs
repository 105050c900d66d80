//! File-per-group embedding store.
//!
//! Each group lives in `<dir>/<id>.json`. Groups are read lazily and cached
//! for the lifetime of the store; every mutation rewrites the group's file
//! atomically before returning.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clustering::domain::embedding_store::{EmbeddingStore, StoreError};
use crate::clustering::domain::observation::GroupId;
use crate::shared::durable_file::write_atomically;
use crate::shared::embedding::Embedding;

const GROUP_FILE_EXTENSION: &str = "json";

#[derive(Serialize, Deserialize)]
struct GroupRecord {
    id: GroupId,
    references: Vec<Embedding>,
}

pub struct JsonEmbeddingStore {
    dir: PathBuf,
    known: BTreeSet<GroupId>,
    cache: BTreeMap<GroupId, Vec<Embedding>>,
    next_id: GroupId,
}

impl JsonEmbeddingStore {
    /// Opens (creating if needed) the store directory and scans it for groups.
    ///
    /// `first_id` is the id handed out when the store holds no groups.
    pub fn open(dir: &Path, first_id: GroupId) -> Result<Self, StoreError> {
        let io_err = |source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        let mut known = BTreeSet::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            match group_id_from_path(&path) {
                Some(id) => {
                    known.insert(id);
                }
                None => log::debug!("Ignoring non-group file {}", path.display()),
            }
        }

        let next_id = known.iter().next_back().map_or(first_id, |max| max.next());
        if known.is_empty() {
            log::info!(
                "Embedding store at {} is empty, first group id {first_id}",
                dir.display()
            );
        } else {
            log::info!(
                "Embedding store at {} holds {} groups, next id {next_id}",
                dir.display(),
                known.len()
            );
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            known,
            cache: BTreeMap::new(),
            next_id,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn next_id(&self) -> GroupId {
        self.next_id
    }

    fn group_path(&self, id: GroupId) -> PathBuf {
        self.dir.join(format!("{id}.{GROUP_FILE_EXTENSION}"))
    }

    fn read_group(&self, id: GroupId) -> Result<Vec<Embedding>, StoreError> {
        let path = self.group_path(id);
        let bytes = fs::read(&path).map_err(|e| StoreError::Corrupt {
            id,
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        let record: GroupRecord =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                id,
                reason: format!("cannot parse {}: {e}", path.display()),
            })?;
        if record.id != id {
            return Err(StoreError::Corrupt {
                id,
                reason: format!("file holds group {}", record.id),
            });
        }
        Ok(record.references)
    }

    fn write_group(&self, id: GroupId, references: &[Embedding]) -> Result<(), StoreError> {
        #[derive(Serialize)]
        struct GroupRecordRef<'a> {
            id: GroupId,
            references: &'a [Embedding],
        }

        let path = self.group_path(id);
        let bytes = serde_json::to_vec(&GroupRecordRef { id, references })
            .map_err(|source| StoreError::Encode { id, source })?;
        write_atomically(&path, &bytes).map_err(|source| StoreError::Io { path, source })
    }

    fn ensure_cached(&mut self, id: GroupId) -> Result<(), StoreError> {
        if !self.cache.contains_key(&id) {
            let references = self.read_group(id)?;
            self.cache.insert(id, references);
        }
        Ok(())
    }
}

impl EmbeddingStore for JsonEmbeddingStore {
    fn list_groups(&self) -> BTreeSet<GroupId> {
        self.known.clone()
    }

    fn load(&mut self, id: GroupId) -> Result<&[Embedding], StoreError> {
        if !self.known.contains(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.ensure_cached(id)?;
        Ok(self.cache.get(&id).map(Vec::as_slice).unwrap_or_default())
    }

    fn append(&mut self, id: GroupId, embedding: Embedding) -> Result<(), StoreError> {
        if self.known.contains(&id) {
            self.ensure_cached(id)?;
        }
        let references = self.cache.entry(id).or_default();
        references.push(embedding);

        // Roll back the cached copy so memory never runs ahead of disk.
        let written = {
            let references = &self.cache[&id];
            self.write_group(id, references)
        };
        if let Err(e) = written {
            if let Some(references) = self.cache.get_mut(&id) {
                references.pop();
                if references.is_empty() && !self.known.contains(&id) {
                    self.cache.remove(&id);
                }
            }
            return Err(e);
        }

        self.known.insert(id);
        if id >= self.next_id {
            self.next_id = id.next();
        }
        Ok(())
    }

    fn create_group(&mut self, embedding: Embedding) -> Result<GroupId, StoreError> {
        let id = self.next_id;
        let references = vec![embedding];
        self.write_group(id, &references)?;
        self.known.insert(id);
        self.cache.insert(id, references);
        self.next_id = id.next();
        Ok(id)
    }
}

fn group_id_from_path(path: &Path) -> Option<GroupId> {
    if path.extension()? != GROUP_FILE_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok().map(GroupId)
}
