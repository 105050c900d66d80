use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::shared::bounding_box::BoundingBox;
use crate::shared::embedding::Embedding;

/// Stable identifier of an identity group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u32);

impl GroupId {
    pub fn next(self) -> GroupId {
        GroupId(self.0 + 1)
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One detected face in one source image.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub source: PathBuf,
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Where an observation (or a faceless image) ends up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Assigned(GroupId),
    Unclusterable,
}

/// Why an image could not contribute any observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnclusterableReason {
    /// The detector found no face.
    DetectionEmpty,
    /// Faces were found but no embedding could be extracted.
    EmbeddingEmpty,
}

impl std::fmt::Display for UnclusterableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnclusterableReason::DetectionEmpty => write!(f, "no face detected"),
            UnclusterableReason::EmbeddingEmpty => write!(f, "no usable face embedding"),
        }
    }
}
