/// Accepts a candidate whose mean distance to the group's references is
/// below the threshold. Less sensitive to one noisy reference than voting,
/// slower to admit legitimately varied appearances.
use crate::clustering::domain::similarity_oracle::SimilarityOracle;
use crate::shared::embedding::Embedding;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

pub struct MeanDistanceOracle {
    threshold: f64,
}

impl MeanDistanceOracle {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// `None` for an empty group.
    pub fn mean_distance(group: &[Embedding], candidate: &Embedding) -> Option<f64> {
        if group.is_empty() {
            return None;
        }
        let total: f64 = group.iter().map(|r| r.distance(candidate)).sum();
        Some(total / group.len() as f64)
    }
}

impl Default for MeanDistanceOracle {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl SimilarityOracle for MeanDistanceOracle {
    fn matches(&self, group: &[Embedding], candidate: &Embedding) -> bool {
        Self::mean_distance(group, candidate).is_some_and(|mean| mean < self.threshold)
    }
}
