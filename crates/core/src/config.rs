use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clustering::domain::observation::{GroupId, Placement};
use crate::clustering::domain::similarity_oracle::{MatchRule, SimilarityOracle};
use crate::clustering::infrastructure::dbscan;
use crate::clustering::infrastructure::mean_distance_oracle::{self, MeanDistanceOracle};
use crate::clustering::infrastructure::vote_oracle::{self, VoteOracle};
use crate::detection::infrastructure::onnx_yolo_detector;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::storage::domain::file_store::Transfer;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Settings for the one-shot DBSCAN mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub eps: f64,
    pub min_samples: usize,
    /// Cluster `k` is written to `<dir_prefix><k>`.
    pub dir_prefix: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            eps: dbscan::DEFAULT_EPS,
            min_samples: dbscan::DEFAULT_MIN_SAMPLES,
            dir_prefix: "face_".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    pub match_rule: MatchRule,
    /// Per-reference distance at or below which a reference votes yes.
    pub vote_threshold: f64,
    /// Mean distance strictly below which a group matches.
    pub mean_distance_threshold: f64,
    /// Id given to the first group of an empty store.
    pub first_group_id: u32,
    /// Group `n` is written to `<group_dir_prefix><n>`.
    pub group_dir_prefix: String,
    pub unclusterable_dir: String,
    pub transfer: Transfer,
    pub save_face_crops: bool,
    /// Detector confidence threshold.
    pub confidence: f64,
    pub extensions: Vec<String>,
    pub batch: BatchConfig,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            match_rule: MatchRule::Vote,
            vote_threshold: vote_oracle::DEFAULT_THRESHOLD,
            mean_distance_threshold: mean_distance_oracle::DEFAULT_THRESHOLD,
            first_group_id: 0,
            group_dir_prefix: String::new(),
            unclusterable_dir: "others".to_string(),
            transfer: Transfer::Copy,
            save_face_crops: false,
            confidence: onnx_yolo_detector::DEFAULT_CONFIDENCE,
            extensions: IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            batch: BatchConfig::default(),
        }
    }
}

impl SortConfig {
    /// `<platform config dir>/FaceSort/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceSort").join("config.json"))
    }

    /// Loads an explicit config file. Any failure is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path` when given, otherwise the default location.
    ///
    /// A missing or unreadable default file yields the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let Some(default_path) = Self::default_path() else {
            log::debug!("No config directory; using defaults");
            return Ok(Self::default());
        };
        if !default_path.exists() {
            return Ok(Self::default());
        }
        match Self::load(&default_path) {
            Ok(config) => {
                log::info!("Loaded config from {}", default_path.display());
                Ok(config)
            }
            Err(e) => {
                log::warn!("{e}; using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_threshold("vote_threshold", self.vote_threshold)?;
        check_threshold("mean_distance_threshold", self.mean_distance_threshold)?;
        check_threshold("batch.eps", self.batch.eps)?;
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ConfigError::Invalid(format!(
                "confidence must be between 0 and 1, got {}",
                self.confidence
            )));
        }
        if self.batch.min_samples == 0 {
            return Err(ConfigError::Invalid(
                "batch.min_samples must be at least 1".to_string(),
            ));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "extensions must not be empty".to_string(),
            ));
        }
        check_dir_name("unclusterable_dir", &self.unclusterable_dir)?;
        // A prefix may be empty, but a group directory name never is.
        check_dir_name("group_dir_prefix", &format!("{}0", self.group_dir_prefix))?;
        check_dir_name("batch.dir_prefix", &format!("{}0", self.batch.dir_prefix))?;
        if self.group_dir_prefix.is_empty()
            && self.unclusterable_dir.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ConfigError::Invalid(format!(
                "unclusterable_dir {:?} collides with group directory names",
                self.unclusterable_dir
            )));
        }
        Ok(())
    }

    pub fn first_group_id(&self) -> GroupId {
        GroupId(self.first_group_id)
    }

    pub fn build_oracle(&self) -> Box<dyn SimilarityOracle> {
        match self.match_rule {
            MatchRule::Vote => Box::new(VoteOracle::new(self.vote_threshold)),
            MatchRule::MeanDistance => {
                Box::new(MeanDistanceOracle::new(self.mean_distance_threshold))
            }
        }
    }

    /// Threshold of the active rule.
    pub fn threshold(&self) -> f64 {
        match self.match_rule {
            MatchRule::Vote => self.vote_threshold,
            MatchRule::MeanDistance => self.mean_distance_threshold,
        }
    }

    /// Sets the threshold of the active rule.
    pub fn set_threshold(&mut self, threshold: f64) {
        match self.match_rule {
            MatchRule::Vote => self.vote_threshold = threshold,
            MatchRule::MeanDistance => self.mean_distance_threshold = threshold,
        }
    }

    /// Output directory name for a placement.
    pub fn destination_label(&self, placement: Placement) -> String {
        match placement {
            Placement::Assigned(id) => format!("{}{id}", self.group_dir_prefix),
            Placement::Unclusterable => self.unclusterable_dir.clone(),
        }
    }
}

fn check_threshold(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

fn check_dir_name(name: &str, value: &str) -> Result<(), ConfigError> {
    let path_like = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || Path::new(value).is_absolute();
    if path_like {
        Err(ConfigError::Invalid(format!(
            "{name} must be a plain directory name, got {value:?}"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = SortConfig::default();
        config.validate().unwrap();
        assert_eq!(config.match_rule, MatchRule::Vote);
        assert_eq!(config.vote_threshold, 0.6);
        assert_eq!(config.mean_distance_threshold, 0.5);
        assert_eq!(config.first_group_id(), GroupId(0));
        assert_eq!(config.unclusterable_dir, "others");
        assert_eq!(config.batch.min_samples, 3);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            r#"{"match_rule":"mean_distance","transfer":"move","batch":{"eps":0.7}}"#,
        )
        .unwrap();

        let config = SortConfig::load(&path).unwrap();
        assert_eq!(config.match_rule, MatchRule::MeanDistance);
        assert_eq!(config.transfer, Transfer::Move);
        assert_eq!(config.batch.eps, 0.7);
        assert_eq!(config.batch.min_samples, 3);
        assert_eq!(config.unclusterable_dir, "others");
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.json");
        let config = SortConfig {
            first_group_id: 1,
            group_dir_prefix: "person_".to_string(),
            ..SortConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SortConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_explicit_path_errors_are_fatal() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("missing.json");
        assert!(matches!(
            SortConfig::load_or_default(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));

        let broken = tmp.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();
        assert!(matches!(
            SortConfig::load_or_default(Some(&broken)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[rstest]
    #[case::zero_vote(SortConfig { vote_threshold: 0.0, ..SortConfig::default() })]
    #[case::nan_mean(SortConfig { mean_distance_threshold: f64::NAN, ..SortConfig::default() })]
    #[case::confidence(SortConfig { confidence: 1.5, ..SortConfig::default() })]
    #[case::min_samples(SortConfig {
        batch: BatchConfig { min_samples: 0, ..BatchConfig::default() },
        ..SortConfig::default()
    })]
    #[case::nested_dir(SortConfig { unclusterable_dir: "a/b".to_string(), ..SortConfig::default() })]
    #[case::empty_dir(SortConfig { unclusterable_dir: String::new(), ..SortConfig::default() })]
    #[case::numeric_catch_all(SortConfig { unclusterable_dir: "7".to_string(), ..SortConfig::default() })]
    #[case::prefix_parent(SortConfig { group_dir_prefix: "../".to_string(), ..SortConfig::default() })]
    #[case::no_extensions(SortConfig { extensions: vec![], ..SortConfig::default() })]
    fn test_validate_rejects(#[case] config: SortConfig) {
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_numeric_catch_all_allowed_with_prefix() {
        let config = SortConfig {
            group_dir_prefix: "face_".to_string(),
            unclusterable_dir: "0".to_string(),
            ..SortConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_destination_labels() {
        let mut config = SortConfig::default();
        assert_eq!(config.destination_label(Placement::Assigned(GroupId(3))), "3");
        assert_eq!(config.destination_label(Placement::Unclusterable), "others");

        config.group_dir_prefix = "face_".to_string();
        assert_eq!(
            config.destination_label(Placement::Assigned(GroupId(3))),
            "face_3"
        );
    }

    #[test]
    fn test_threshold_follows_active_rule() {
        let mut config = SortConfig::default();
        config.set_threshold(1.1);
        assert_eq!(config.vote_threshold, 1.1);
        assert_eq!(config.mean_distance_threshold, 0.5);

        config.match_rule = MatchRule::MeanDistance;
        config.set_threshold(0.9);
        assert_eq!(config.threshold(), 0.9);
        assert_eq!(config.vote_threshold, 1.1);
    }
}
