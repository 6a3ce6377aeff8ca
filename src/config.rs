//! Learner and inference configuration, loaded from TOML.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes:
//!
//! ```toml
//! [learner]
//! max_depth = 4
//! significance = "randomization"
//!
//! [rdn]
//! iterations = 100
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// How the best split's significance is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceKind {
    Parametric,
    Randomization,
}

/// When to stop growing a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppingKind {
    /// Depth, size, and significance.
    Default,
    /// Depth and size only; any non-degenerate split is accepted.
    DepthSize,
}

/// Order in which candidates are scored at each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitOrder {
    /// Canonical feature-string order.
    Deterministic,
    /// Seeded shuffle per node.
    Shuffled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    pub max_depth: usize,
    /// Minimum total instance weight for a node to be split.
    pub min_instances: f64,
    pub stopping: StoppingKind,
    pub significance: SignificanceKind,
    /// Parametric p-value threshold.
    pub p_value: f64,
    pub randomization_samples: usize,
    pub randomization_threshold: f64,
    /// Maximum number of thresholds tried per aggregate.
    pub num_thresholds: usize,
    pub split_order: SplitOrder,
    /// Aggregators never used over the core item.
    pub invalid_for_core: Vec<String>,
    pub seed: u64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_instances: 2.0,
            stopping: StoppingKind::Default,
            significance: SignificanceKind::Parametric,
            p_value: 0.05,
            randomization_samples: 50,
            randomization_threshold: 0.9,
            num_thresholds: 4,
            split_order: SplitOrder::Deterministic,
            invalid_for_core: vec!["mode".to_string(), "proportion".to_string()],
            seed: 0,
        }
    }
}

impl LearnerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.p_value > 0.0 && self.p_value <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "p_value".into(),
                message: format!("{} is not in (0, 1]", self.p_value),
            });
        }
        if !(0.0..=1.0).contains(&self.randomization_threshold) {
            return Err(ConfigError::Invalid {
                field: "randomization_threshold".into(),
                message: format!("{} is not in [0, 1]", self.randomization_threshold),
            });
        }
        if self.num_thresholds == 0 {
            return Err(ConfigError::Invalid {
                field: "num_thresholds".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdnConfig {
    pub iterations: usize,
    pub burn_in: usize,
    pub skip: usize,
    pub seed: u64,
    /// Sample models on the rayon pool.
    pub parallel: bool,
    /// Log a progress line every this many iterations (0 disables).
    pub log_every: usize,
    /// Snapshot labels every this many iterations (0 disables).
    pub snapshot_every: usize,
    pub snapshot_prefix: String,
}

impl Default for RdnConfig {
    fn default() -> Self {
        Self {
            iterations: 50,
            burn_in: 5,
            skip: 2,
            seed: 0,
            parallel: false,
            log_every: 10,
            snapshot_every: 0,
            snapshot_prefix: "rdn_iter".to_string(),
        }
    }
}

/// A learning task as written in a project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub item_kind: String,
    pub attr: String,
    /// Sources in canonical form, e.g. `[<acted_in:actor].gender`.
    pub sources: Vec<String>,
    #[serde(default)]
    pub positive_class: Option<String>,
    /// Fraction of the population held out for tree selection and evaluation.
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
}

fn default_test_fraction() -> f64 {
    0.3
}

/// Top-level project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub learner: LearnerConfig,
    #[serde(default)]
    pub rdn: RdnConfig,
    pub task: TaskConfig,
}

impl ProjectConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.learner.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_fields_take_defaults() {
        let config: ProjectConfig = toml::from_str(
            r#"
            [learner]
            max_depth = 5
            significance = "randomization"

            [task]
            item_kind = "movie"
            attr = "genre"
            sources = ["[self].budget"]
            "#,
        )
        .unwrap();
        assert_eq!(config.learner.max_depth, 5);
        assert_eq!(config.learner.significance, SignificanceKind::Randomization);
        assert_eq!(config.learner.randomization_samples, 50);
        assert_eq!(config.rdn.burn_in, 5);
        assert_eq!(config.rdn.skip, 2);
        assert_eq!(config.task.test_fraction, 0.3);
    }

    #[test]
    fn invalid_p_value_rejected() {
        let config = LearnerConfig {
            p_value: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("project.toml");
        let config = ProjectConfig {
            learner: LearnerConfig::default(),
            rdn: RdnConfig {
                parallel: true,
                ..Default::default()
            },
            task: TaskConfig {
                item_kind: "movie".into(),
                attr: "genre".into(),
                sources: vec!["[<acted_in:actor].gender".into()],
                positive_class: Some("drama".into()),
                test_fraction: 0.25,
            },
        };
        config.save(&path).unwrap();
        assert_eq!(ProjectConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn malformed_toml_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[task\nitem_kind=").unwrap();
        let err = ProjectConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
