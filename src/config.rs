//! Experiment configuration
//!
//! An experiment is described by one TOML or YAML file. Relative paths in
//! the file are resolved against the directory that contains it.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::io::CsvOptions;
use crate::ml::features::{EntityFeatureExtractor, FeatureSpec, TargetSpec};
use crate::ml::metrics::Scorer;
use crate::ml::model_selection::{CvStrategy, KFold, ParamGrid, StratifiedKFold};
use crate::ml::models::{Estimator, ParamValue};
use crate::ml::pipeline::{Pipeline, Step};

/// Where the raw table comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub csv: CsvOptions,
    /// Text columns expanded into 0/1 indicator columns after loading
    #[serde(default)]
    pub one_hot: Vec<String>,
    #[serde(default)]
    pub drop_first: bool,
}

/// Labels taken from a separate table of positive entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelsConfig {
    pub path: PathBuf,
    /// Column of the label table holding entity keys
    pub column: String,
    /// Entity key in the data; defaults to the `entity` key
    #[serde(default)]
    pub key: Option<String>,
    /// Name of the label column added to the data
    #[serde(default = "default_label_column")]
    pub label_column: String,
}

fn default_label_column() -> String {
    "label".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_seed")]
    pub random_seed: Option<u64>,
    #[serde(default = "default_true")]
    pub stratify: bool,
}

fn default_test_size() -> f64 {
    0.25
}

fn default_seed() -> Option<u64> {
    Some(42)
}

fn default_true() -> bool {
    true
}

impl Default for SplitConfig {
    fn default() -> Self {
        SplitConfig {
            test_size: default_test_size(),
            random_seed: default_seed(),
            stratify: true,
        }
    }
}

/// One preprocessing step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

/// The final classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub kind: String,
    /// Step name used to address the model's parameters in a grid
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

fn default_model_name() -> String {
    "model".to_string()
}

/// Hyperparameter search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    pub grid: ParamGrid,
    #[serde(default = "default_cv")]
    pub cv: usize,
    #[serde(default = "default_true")]
    pub stratified: bool,
    #[serde(default = "default_true")]
    pub shuffle: bool,
    /// Worker threads; 0 uses every core
    #[serde(default = "default_n_jobs")]
    pub n_jobs: usize,
}

fn default_cv() -> usize {
    5
}

fn default_n_jobs() -> usize {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

/// Everything needed to run one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    pub data: DataConfig,
    #[serde(default)]
    pub entity: Option<EntityFeatureExtractor>,
    #[serde(default)]
    pub labels: Option<LabelsConfig>,
    pub target: TargetSpec,
    #[serde(default)]
    pub features: FeatureSpec,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub pipeline: Vec<StepConfig>,
    pub model: ModelConfig,
    #[serde(default)]
    pub search: Option<SearchConfig>,
    #[serde(default)]
    pub scoring: Scorer,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ExperimentConfig {
    /// Loads and validates a `.toml`, `.yaml` or `.yml` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let mut config = match extension.as_str() {
            "toml" => Self::from_toml_str(&text)?,
            "yaml" | "yml" => Self::from_yaml_str(&text)?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config extension '{}' (use .toml, .yaml or .yml)",
                    other
                )))
            }
        };
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        log::debug!("loaded experiment config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ExperimentConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: ExperimentConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Makes relative paths relative to `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.data.path);
        if let Some(labels) = &mut self.labels {
            resolve(&mut labels.path);
        }
        if let Some(p) = &mut self.output.model_path {
            resolve(p);
        }
        if let Some(p) = &mut self.output.report_path {
            resolve(p);
        }
    }

    /// Key of the per-entity rows, if the data is aggregated or labelled
    /// by entity
    pub fn entity_key(&self) -> Option<&str> {
        self.labels
            .as_ref()
            .and_then(|l| l.key.as_deref())
            .or_else(|| self.entity.as_ref().map(|e| e.key.as_str()))
    }

    /// Feature selection with the entity key excluded
    pub fn feature_spec(&self) -> FeatureSpec {
        let mut spec = self.features.clone();
        if spec.key.is_none() {
            spec.key = self.entity_key().map(str::to_string);
        }
        spec
    }

    /// Scorer used for model selection and test evaluation
    pub fn scorer(&self) -> Scorer {
        self.scoring
    }

    /// Checks value ranges and names before any data is read
    pub fn validate(&self) -> Result<()> {
        let split = &self.split;
        if !(split.test_size > 0.0 && split.test_size < 1.0) {
            return Err(Error::Config(format!(
                "split.test_size must be in (0, 1), got {}",
                split.test_size
            )));
        }
        if self.target.column.is_empty() {
            return Err(Error::Config("target.column is empty".to_string()));
        }

        if let Some(entity) = &self.entity {
            if entity.aggregates.is_empty() {
                return Err(Error::Config(
                    "entity needs at least one aggregate".to_string(),
                ));
            }
        }
        if let Some(labels) = &self.labels {
            if self.entity_key().is_none() {
                return Err(Error::Config(
                    "labels need labels.key or an entity section".to_string(),
                ));
            }
            if labels.label_column != self.target.column {
                log::warn!(
                    "labels are written to '{}' but the target is '{}'",
                    labels.label_column,
                    self.target.column
                );
            }
        }

        if let Scorer::Cost {
            cost_fp, cost_fn, ..
        } = self.scoring
        {
            Scorer::cost(cost_fp, cost_fn).map_err(|e| Error::Config(e.to_string()))?;
        }

        let mut names = HashSet::new();
        for step in &self.pipeline {
            if !names.insert(step.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate pipeline step '{}'",
                    step.name
                )));
            }
        }
        // building the pipeline checks kinds and parameters
        self.build_pipeline()
            .map_err(|e| Error::Config(e.to_string()))?;

        if let Some(search) = &self.search {
            if search.cv < 2 {
                return Err(Error::Config(format!(
                    "search.cv must be at least 2, got {}",
                    search.cv
                )));
            }
            if search.grid.is_empty() {
                return Err(Error::Config("search.grid is empty".to_string()));
            }
            search
                .grid
                .candidates()
                .map_err(|e| Error::Config(e.to_string()))?;
        }
        Ok(())
    }

    /// Unfitted pipeline described by `pipeline` and `model`
    pub fn build_pipeline(&self) -> Result<Pipeline> {
        let estimator = Estimator::from_kind(&self.model.kind, &self.model.params)?;
        let mut pipeline = Pipeline::new(self.model.name.clone(), estimator);
        for step in &self.pipeline {
            pipeline.add_step(step.name.clone(), Step::from_kind(&step.kind, &step.params)?)?;
        }
        Ok(pipeline)
    }

    /// Cross-validation strategy of the search section
    pub fn cv_strategy(&self) -> Option<CvStrategy> {
        self.search.as_ref().map(|s| {
            let seed = self.split.random_seed;
            if s.stratified {
                let cv = StratifiedKFold::new(s.cv);
                CvStrategy::StratifiedKFold(if s.shuffle { cv.shuffled(seed) } else { cv })
            } else {
                let cv = KFold::new(s.cv);
                CvStrategy::KFold(if s.shuffle { cv.shuffled(seed) } else { cv })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_CONFIG: &str = r#"
[data]
path = "flows.csv"

[data.csv]
na_values = ["", "?"]

[entity]
key = "src"
aggregates = [
    { column = "bytes", agg = "mean" },
    { column = "dst_port", agg = "nunique", output = "ports" },
]

[labels]
path = "redteam.csv"
column = "computer"

[target]
column = "label"

[split]
test_size = 0.3

[[pipeline]]
name = "impute"
kind = "simple_imputer"
params = { strategy = "median" }

[[pipeline]]
name = "scale"
kind = "standard_scaler"

[model]
kind = "random_forest"
params = { n_estimators = 20, random_seed = 1 }

[search]
cv = 3
grid = { "model__max_depth" = [2, 4], "model__min_samples_leaf" = [1, 3] }

[scoring]
metric = "cost"
cost_fp = 1.0
cost_fn = 25.0

[output]
model_path = "out/model.json"
"#;

    #[test]
    fn test_parse_toml() {
        let config = ExperimentConfig::from_toml_str(TOML_CONFIG).unwrap();
        assert_eq!(config.data.csv.na_values, vec!["", "?"]);
        assert_eq!(config.entity_key(), Some("src"));
        assert_eq!(config.feature_spec().key.as_deref(), Some("src"));
        assert_eq!(config.split.test_size, 0.3);
        assert_eq!(config.split.random_seed, Some(42));
        assert_eq!(config.labels.as_ref().unwrap().label_column, "label");
        assert_eq!(config.search.as_ref().unwrap().grid.candidates().unwrap().len(), 4);
        assert!(!config.scorer().greater_is_better());

        let pipeline = config.build_pipeline().unwrap();
        assert_eq!(pipeline.steps().len(), 2);
        assert_eq!(pipeline.estimator().kind(), "random_forest");
        assert!(matches!(
            config.cv_strategy(),
            Some(CvStrategy::StratifiedKFold(StratifiedKFold { n_splits: 3, .. }))
        ));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
data:
  path: credit.csv
target:
  column: class
  positive_values: ["bad"]
features:
  exclude: [id]
model:
  kind: knn
  params:
    n_neighbors: 7
    weights: distance
scoring:
  metric: f1
"#;
        let config = ExperimentConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.target.positive_values, vec!["bad"]);
        assert!(config.search.is_none());
        assert!(config.cv_strategy().is_none());
        assert_eq!(config.scorer().name(), "f1");
        assert_eq!(config.entity_key(), None);
    }

    #[test]
    fn test_validation_errors() {
        let bad_split = TOML_CONFIG.replace("test_size = 0.3", "test_size = 1.5");
        assert!(matches!(
            ExperimentConfig::from_toml_str(&bad_split),
            Err(Error::Config(_))
        ));

        let bad_cv = TOML_CONFIG.replace("cv = 3", "cv = 1");
        assert!(ExperimentConfig::from_toml_str(&bad_cv).is_err());

        let bad_cost = TOML_CONFIG.replace("cost_fn = 25.0", "cost_fn = -2.0");
        assert!(ExperimentConfig::from_toml_str(&bad_cost).is_err());

        let empty_grid = TOML_CONFIG.replace("\"model__max_depth\" = [2, 4]", "\"model__max_depth\" = []");
        assert!(ExperimentConfig::from_toml_str(&empty_grid).is_err());

        let bad_kind = TOML_CONFIG.replace("kind = \"random_forest\"", "kind = \"svm\"");
        assert!(ExperimentConfig::from_toml_str(&bad_kind).is_err());

        let bad_step = TOML_CONFIG.replace("name = \"scale\"", "name = \"impute\"");
        assert!(ExperimentConfig::from_toml_str(&bad_step).is_err());

        let unknown_field = TOML_CONFIG.replace("[output]", "[output]\nfoo = 1");
        assert!(ExperimentConfig::from_toml_str(&unknown_field).is_err());
    }

    #[test]
    fn test_from_file_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.toml");
        fs::write(&path, TOML_CONFIG).unwrap();

        let config = ExperimentConfig::from_file(&path).unwrap();
        assert_eq!(config.data.path, dir.path().join("flows.csv"));
        assert_eq!(
            config.output.model_path,
            Some(dir.path().join("out/model.json"))
        );

        let other = dir.path().join("experiment.json");
        fs::write(&other, "{}").unwrap();
        assert!(matches!(
            ExperimentConfig::from_file(&other),
            Err(Error::Config(_))
        ));
    }
}
