/// Majority-of-references vote between a candidate and a group.
///
/// Each reference casts a vote when its Euclidean distance to the candidate
/// is within the threshold. Groups with more than [`LARGE_GROUP_SIZE`]
/// references need [`LARGE_GROUP_MIN_VOTES`] votes so a single outlier
/// reference cannot pull in a stranger; smaller groups need one.
use crate::clustering::domain::similarity_oracle::SimilarityOracle;
use crate::shared::embedding::Embedding;

pub const DEFAULT_THRESHOLD: f64 = 0.6;

pub const LARGE_GROUP_SIZE: usize = 4;
pub const LARGE_GROUP_MIN_VOTES: usize = 3;
pub const SMALL_GROUP_MIN_VOTES: usize = 1;

pub struct VoteOracle {
    threshold: f64,
}

impl VoteOracle {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Number of references within the threshold of `candidate`.
    pub fn votes(&self, group: &[Embedding], candidate: &Embedding) -> usize {
        group
            .iter()
            .filter(|reference| reference.distance(candidate) <= self.threshold)
            .count()
    }
}

impl Default for VoteOracle {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl SimilarityOracle for VoteOracle {
    fn matches(&self, group: &[Embedding], candidate: &Embedding) -> bool {
        let required = if group.len() > LARGE_GROUP_SIZE {
            LARGE_GROUP_MIN_VOTES
        } else {
            SMALL_GROUP_MIN_VOTES
        };
        self.votes(group, candidate) >= required
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// One-dimensional embeddings make distances easy to read: `at(x)` is
    /// `|x - y|` away from `at(y)`.
    fn at(x: f32) -> Embedding {
        Embedding::new(vec![x])
    }

    /// A group of `size` references, the first `close` of which are within
    /// the default threshold of `at(0.0)`.
    fn group(size: usize, close: usize) -> Vec<Embedding> {
        (0..size)
            .map(|i| if i < close { at(0.1) } else { at(5.0) })
            .collect()
    }

    #[test]
    fn test_small_group_one_vote_of_two_matches() {
        let oracle = VoteOracle::default();
        let g = group(2, 1);
        assert_eq!(oracle.votes(&g, &at(0.0)), 1);
        assert!(oracle.matches(&g, &at(0.0)));
    }

    #[test]
    fn test_large_group_two_votes_of_five_rejected() {
        let oracle = VoteOracle::default();
        let g = group(5, 2);
        assert_eq!(oracle.votes(&g, &at(0.0)), 2);
        assert!(!oracle.matches(&g, &at(0.0)));
    }

    #[test]
    fn test_large_group_three_votes_of_five_matches() {
        let oracle = VoteOracle::default();
        assert!(oracle.matches(&group(5, 3), &at(0.0)));
    }

    #[rstest]
    #[case::single_ref_no_vote(1, 0, false)]
    #[case::single_ref_vote(1, 1, true)]
    #[case::four_refs_one_vote(4, 1, true)]
    #[case::four_refs_no_vote(4, 0, false)]
    #[case::six_refs_two_votes(6, 2, false)]
    #[case::six_refs_three_votes(6, 3, true)]
    fn test_vote_boundaries(#[case] size: usize, #[case] close: usize, #[case] expected: bool) {
        let oracle = VoteOracle::default();
        assert_eq!(oracle.matches(&group(size, close), &at(0.0)), expected);
    }

    #[test]
    fn test_empty_group_never_matches() {
        assert!(!VoteOracle::default().matches(&[], &at(0.0)));
    }

    #[test]
    fn test_distance_equal_to_threshold_votes() {
        let oracle = VoteOracle::new(0.5);
        assert!(oracle.matches(&[at(0.5)], &at(0.0)));
        assert!(!oracle.matches(&[at(0.5001)], &at(0.0)));
    }

    #[test]
    fn test_is_deterministic() {
        let oracle = VoteOracle::default();
        let g = group(5, 3);
        let first = oracle.matches(&g, &at(0.0));
        for _ in 0..10 {
            assert_eq!(oracle.matches(&g, &at(0.0)), first);
        }
    }
}
