use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;

use crate::clustering::domain::observation::GroupId;
use crate::shared::embedding::Embedding;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("group {0} does not exist")]
    NotFound(GroupId),
    #[error("group {id} is unreadable: {reason}")]
    Corrupt { id: GroupId, reason: String },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode group {id}: {source}")]
    Encode {
        id: GroupId,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable mapping from group id to the group's reference embeddings.
///
/// Every mutating call is durable when it returns `Ok`. Implementations own
/// id allocation: fresh ids start one past the largest id persisted when the
/// store was opened, so ids are never reused across runs.
pub trait EmbeddingStore: Send {
    /// Ids of every persisted group, including unreadable ones.
    fn list_groups(&self) -> BTreeSet<GroupId>;

    /// Reference embeddings of a group.
    ///
    /// `&mut self` lets implementations materialise groups lazily.
    fn load(&mut self, id: GroupId) -> Result<&[Embedding], StoreError>;

    /// Appends one embedding, creating the group's record if it does not exist.
    fn append(&mut self, id: GroupId, embedding: Embedding) -> Result<(), StoreError>;

    /// Allocates a fresh id holding `embedding` as its only reference.
    fn create_group(&mut self, embedding: Embedding) -> Result<GroupId, StoreError>;
}
