use serde::{Deserialize, Serialize};

use crate::shared::embedding::Embedding;

/// Decides whether a candidate face belongs to a group.
///
/// Implementations are pure: the answer depends only on the arguments and
/// the oracle's fixed threshold.
pub trait SimilarityOracle: Send {
    fn matches(&self, group: &[Embedding], candidate: &Embedding) -> bool;
}

/// Which decision rule the engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Vote,
    MeanDistance,
}

impl std::fmt::Display for MatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchRule::Vote => write!(f, "vote"),
            MatchRule::MeanDistance => write!(f, "mean-distance"),
        }
    }
}

impl std::str::FromStr for MatchRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vote" => Ok(MatchRule::Vote),
            "mean-distance" | "mean_distance" => Ok(MatchRule::MeanDistance),
            other => Err(format!(
                "Match rule must be 'vote' or 'mean-distance', got '{other}'"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("vote", MatchRule::Vote)]
    #[case("mean-distance", MatchRule::MeanDistance)]
    #[case("mean_distance", MatchRule::MeanDistance)]
    fn test_parse_match_rule(#[case] input: &str, #[case] expected: MatchRule) {
        assert_eq!(input.parse::<MatchRule>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_rule_fails() {
        assert!("closest".parse::<MatchRule>().is_err());
    }
}
