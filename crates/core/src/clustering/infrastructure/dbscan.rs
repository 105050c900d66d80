/// Density-based one-shot clustering of face embeddings.
///
/// A point is a core point when at least `min_samples` points (itself
/// included) lie within `eps`. Core points within `eps` of each other share a
/// cluster; a non-core point joins the cluster of its lowest-index core
/// neighbour, or is noise when it has none. Cluster labels are numbered by
/// each cluster's smallest member index, so the output is deterministic.
use crate::clustering::infrastructure::math;
use crate::shared::embedding::Embedding;

pub const DEFAULT_EPS: f64 = 0.5;
pub const DEFAULT_MIN_SAMPLES: usize = 3;

pub struct Dbscan {
    eps: f64,
    min_samples: usize,
}

impl Dbscan {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self { eps, min_samples }
    }

    /// Returns one label per input embedding; `None` marks noise.
    pub fn fit(&self, embeddings: &[Embedding]) -> Vec<Option<usize>> {
        let n = embeddings.len();
        let neighbours: Vec<Vec<usize>> = (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| embeddings[i].distance(&embeddings[j]) <= self.eps)
                    .collect()
            })
            .collect();
        let is_core: Vec<bool> = neighbours
            .iter()
            .map(|nb| nb.len() >= self.min_samples)
            .collect();

        let mut parent: Vec<usize> = (0..n).collect();
        for i in (0..n).filter(|&i| is_core[i]) {
            for &j in &neighbours[i] {
                if is_core[j] {
                    math::union(&mut parent, i, j);
                }
            }
        }

        let cores: Vec<usize> = (0..n).filter(|&i| is_core[i]).collect();
        let mut labels = vec![None; n];
        for (label, members) in math::collect_groups(&mut parent, &cores)
            .into_iter()
            .enumerate()
        {
            for idx in members {
                labels[idx] = Some(label);
            }
        }

        for i in (0..n).filter(|&i| !is_core[i]) {
            labels[i] = neighbours[i]
                .iter()
                .find(|&&j| is_core[j])
                .and_then(|&j| labels[j]);
        }

        labels
    }
}

impl Default for Dbscan {
    fn default() -> Self {
        Self::new(DEFAULT_EPS, DEFAULT_MIN_SAMPLES)
    }
}
