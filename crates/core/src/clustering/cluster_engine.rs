//! Incremental assignment of face observations to identity groups.
//!
//! Per observation: replay the checkpointed outcome if one exists; otherwise
//! compare against every group in ascending id order and take the **first**
//! group the oracle accepts, creating a new group when none does. The store
//! mutation is durable before the checkpoint records the outcome, so the
//! checkpoint never claims work the store does not hold.
//!
//! First-match is order-sensitive: when two groups could both accept a face,
//! the lower id wins even if the other is closer.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

use crate::clustering::domain::checkpoint::{Checkpoint, CheckpointError};
use crate::clustering::domain::embedding_store::{EmbeddingStore, StoreError};
use crate::clustering::domain::observation::{
    GroupId, Observation, Placement, UnclusterableReason,
};
use crate::clustering::domain::similarity_oracle::SimilarityOracle;
use crate::shared::embedding::Embedding;

/// Storage failure that leaves one observation unassigned.
///
/// The checkpoint was not written, so the observation is retried on the next
/// run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("embedding store write failed: {0}")]
    Store(#[from] StoreError),
    #[error("checkpoint write failed: {0}")]
    Checkpoint(#[from] CheckpointError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentKind {
    /// Already checkpointed; the recorded placement was returned untouched.
    Replayed,
    /// Appended to an existing group.
    Matched,
    /// Started a new group.
    Created,
    /// Routed to the catch-all destination.
    Unclusterable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub placement: Placement,
    pub kind: AssignmentKind,
}

/// Size of one persisted group, or why it could not be read.
#[derive(Debug)]
pub struct GroupSummary {
    pub id: GroupId,
    pub references: Result<usize, StoreError>,
}

pub struct ClusterEngine {
    store: Box<dyn EmbeddingStore>,
    checkpoint: Box<dyn Checkpoint>,
    oracle: Box<dyn SimilarityOracle>,
    reported_unreadable: HashSet<GroupId>,
}

impl ClusterEngine {
    pub fn new(
        store: Box<dyn EmbeddingStore>,
        checkpoint: Box<dyn Checkpoint>,
        oracle: Box<dyn SimilarityOracle>,
    ) -> Self {
        Self {
            store,
            checkpoint,
            oracle,
            reported_unreadable: HashSet::new(),
        }
    }

    /// Assigns one face to a group.
    pub fn assign(&mut self, observation: Observation) -> Result<Assignment, EngineError> {
        let Observation {
            source,
            bbox,
            embedding,
        } = observation;

        if let Some(placement) = self.checkpoint.placement(&source, Some(&bbox)) {
            log::debug!("{} {bbox}: already assigned", source.display());
            return Ok(Assignment {
                placement,
                kind: AssignmentKind::Replayed,
            });
        }

        let (id, kind) = match self.find_match(&embedding) {
            Some(id) => {
                self.store.append(id, embedding)?;
                (id, AssignmentKind::Matched)
            }
            None => {
                let id = self.store.create_group(embedding)?;
                log::info!("New group {id} from {} {bbox}", source.display());
                (id, AssignmentKind::Created)
            }
        };

        let placement = Placement::Assigned(id);
        self.checkpoint.record(&source, Some(&bbox), placement)?;
        Ok(Assignment { placement, kind })
    }

    /// Records an image that produced no usable embedding.
    pub fn mark_unclusterable(
        &mut self,
        source: &Path,
        reason: UnclusterableReason,
    ) -> Result<Assignment, EngineError> {
        if let Some(placement) = self.checkpoint.placement(source, None) {
            return Ok(Assignment {
                placement,
                kind: AssignmentKind::Replayed,
            });
        }
        log::info!("{}: {reason}", source.display());
        self.checkpoint
            .record(source, None, Placement::Unclusterable)?;
        Ok(Assignment {
            placement: Placement::Unclusterable,
            kind: AssignmentKind::Unclusterable,
        })
    }

    /// First group, in ascending id order, whose references accept `candidate`.
    ///
    /// Read-only. Groups that cannot be loaded count as non-matching.
    pub fn find_match(&mut self, candidate: &Embedding) -> Option<GroupId> {
        // Snapshot ids up front: a group created later must not be visible
        // to the pass that created it.
        let ids: Vec<GroupId> = self.store.list_groups().into_iter().collect();
        for id in ids {
            match self.store.load(id) {
                Ok(references) => {
                    if self.oracle.matches(references, candidate) {
                        return Some(id);
                    }
                }
                Err(e) => self.report_unreadable(id, &e),
            }
        }
        None
    }

    pub fn is_image_complete(&self, source: &Path) -> bool {
        self.checkpoint.is_image_complete(source)
    }

    /// Marks every face of `source` as durably handled.
    pub fn complete_image(&mut self, source: &Path) -> Result<(), EngineError> {
        Ok(self.checkpoint.record_image_complete(source)?)
    }

    pub fn completed_images(&self) -> usize {
        self.checkpoint.completed_images()
    }

    pub fn group_summaries(&mut self) -> Vec<GroupSummary> {
        let ids: Vec<GroupId> = self.store.list_groups().into_iter().collect();
        ids.into_iter()
            .map(|id| GroupSummary {
                id,
                references: self.store.load(id).map(<[Embedding]>::len),
            })
            .collect()
    }

    /// Compacts the checkpoint.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        Ok(self.checkpoint.save_all()?)
    }

    fn report_unreadable(&mut self, id: GroupId, error: &StoreError) {
        if self.reported_unreadable.insert(id) {
            log::warn!("Skipping group {id}: {error}");
        } else {
            log::debug!("Skipping group {id}: {error}");
        }
    }
}
