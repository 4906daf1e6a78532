//! End-to-end experiment runner
//!
//! Ties the pieces together the way a notebook would: load, featurize,
//! split, fit (optionally through a grid search), evaluate and save.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::ExperimentConfig;
use crate::dataframe::{DataFrame, DummyEncoding};
use crate::error::{Error, Result};
use crate::io::read_csv;
use crate::ml::features::{class_name, label_entities, load_label_set, Dataset};
use crate::ml::metrics::{evaluate_binary, ModelMetrics, Scorer};
use crate::ml::model_selection::{train_test_split, CvResult, GridSearchCV};
use crate::ml::models::ParamValue;
use crate::ml::persistence::{ModelPersistence, SavedModel};

/// Summary of one experiment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub n_samples: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub feature_names: Vec<String>,
    /// Samples per class over the whole dataset
    pub class_counts: BTreeMap<String, usize>,
    pub pipeline: String,
    pub scoring: String,
    pub best_params: Option<BTreeMap<String, ParamValue>>,
    /// Mean cross-validation score of the best candidate
    pub cv_score: Option<f64>,
    #[serde(default)]
    pub cv_results: Vec<CvResult>,
    /// Score of the configured scorer on the test set
    pub test_score: f64,
    pub test_metrics: ModelMetrics,
    /// Features that reach the estimator after selection steps
    pub selected_features: Vec<String>,
    pub model_path: Option<PathBuf>,
}

impl ExperimentReport {
    /// Writes the report as pretty JSON
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        create_parent_dir(path.as_ref())?;
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        info!("wrote report to {}", path.as_ref().display());
        Ok(())
    }
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Loads the configured data file and applies entity extraction and
/// labelling
pub fn prepare_frame(config: &ExperimentConfig) -> Result<DataFrame> {
    Ok(load_frame(config, &config.data.path, None)?.0)
}

/// Prepares `path` for scoring by saved models. One-hot columns
/// use the categories the models were trained with rather than the ones
/// present in `path`; with several models the indicators cover every
/// model's categories and each model reads its own.
pub fn prepare_frame_for_models<P: AsRef<Path>>(
    config: &ExperimentConfig,
    path: P,
    models: &[&SavedModel],
) -> Result<DataFrame> {
    let mut merged: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for model in models {
        for encoding in &model.one_hot {
            merged
                .entry(encoding.column.as_str())
                .or_default()
                .extend(encoding.categories.iter().map(String::as_str));
        }
    }
    let encodings: Vec<DummyEncoding> = merged
        .into_iter()
        .map(|(column, categories)| DummyEncoding {
            column: column.to_string(),
            categories: categories.into_iter().map(str::to_string).collect(),
        })
        .collect();
    Ok(load_frame(config, path.as_ref(), Some(&encodings))?.0)
}

/// Returns the prepared frame and the one-hot categories it was encoded with
fn load_frame(
    config: &ExperimentConfig,
    path: &Path,
    saved: Option<&[DummyEncoding]>,
) -> Result<(DataFrame, Vec<DummyEncoding>)> {
    let mut df = read_csv(path, &config.data.csv)?;

    let mut encodings = Vec::with_capacity(config.data.one_hot.len());
    for column in &config.data.one_hot {
        match saved.and_then(|s| s.iter().find(|e| &e.column == column)) {
            Some(encoding) => encodings.push(encoding.clone()),
            None => {
                if saved.is_some() {
                    warn!(
                        "no saved categories for '{}', encoding from {}",
                        column,
                        path.display()
                    );
                }
                encodings.extend(df.dummy_encodings(&[column], config.data.drop_first)?);
            }
        }
    }
    if !encodings.is_empty() {
        df = df.apply_dummies(&encodings)?;
    }

    if let Some(entity) = &config.entity {
        df = entity.extract(&df)?;
    }
    if let Some(labels) = &config.labels {
        let key = config
            .entity_key()
            .ok_or_else(|| Error::Config("labels need an entity key".to_string()))?;
        let positives = load_label_set(&labels.path, &labels.column)?;
        df = label_entities(&df, key, &positives, &labels.label_column)?;
    }
    Ok((df, encodings))
}

/// One configured experiment
#[derive(Debug, Clone)]
pub struct Experiment {
    config: ExperimentConfig,
}

impl Experiment {
    pub fn from_config(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Experiment { config })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Runs the experiment and saves the model and report when the output
    /// section asks for them
    pub fn run(&self) -> Result<ExperimentReport> {
        let (model, mut report) = self.train()?;
        if let Some(path) = &self.config.output.model_path {
            create_parent_dir(path)?;
            model.save_model(path)?;
            report.model_path = Some(path.clone());
        }
        if let Some(path) = &self.config.output.report_path {
            report.save_json(path)?;
        }
        Ok(report)
    }

    /// Fits and evaluates without writing anything
    pub fn train(&self) -> Result<(SavedModel, ExperimentReport)> {
        let (df, one_hot) = load_frame(&self.config, &self.config.data.path, None)?;
        let (model, report) = self.train_on(&df)?;
        Ok((model.with_one_hot(one_hot), report))
    }

    /// Fits and evaluates on an already prepared frame
    pub fn train_on(&self, df: &DataFrame) -> Result<(SavedModel, ExperimentReport)> {
        let config = &self.config;
        let scorer = config.scorer();
        let features = config.feature_spec();
        let dataset = Dataset::from_frame(df, &config.target, &features)?;

        let stratify = config.split.stratify.then_some(dataset.y.as_slice());
        let (train_idx, test_idx) = train_test_split(
            dataset.n_samples(),
            config.split.test_size,
            config.split.random_seed,
            stratify,
        )?;
        let train = dataset.subset(&train_idx)?;
        let test = dataset.subset(&test_idx)?;
        info!(
            "split {} samples into {} train / {} test",
            dataset.n_samples(),
            train.n_samples(),
            test.n_samples()
        );

        let base = config.build_pipeline()?;
        let (pipeline, best_params, cv_score, cv_results) =
            match (&config.search, config.cv_strategy()) {
                (Some(search), Some(cv)) => {
                    let mut grid = GridSearchCV::new(base, search.grid.clone(), cv, scorer)
                        .n_jobs(search.n_jobs);
                    grid.fit(&train)?;
                    let best_params = grid.best_params().cloned();
                    let cv_score = grid.best_score();
                    let cv_results = grid.cv_results().to_vec();
                    let pipeline = grid.into_best_estimator().ok_or_else(|| {
                        Error::ComputationError("grid search produced no estimator".to_string())
                    })?;
                    (pipeline, best_params, cv_score, cv_results)
                }
                _ => {
                    let mut pipeline = base;
                    pipeline.fit(&train.x, &train.y)?;
                    (pipeline, None, None, Vec::new())
                }
            };

        let predictions = pipeline.predict(&test.x)?;
        let test_score = scorer.score(&test.y, &predictions)?;
        let costs = match scorer {
            Scorer::Cost {
                cost_fp, cost_fn, ..
            } => Some((cost_fp, cost_fn)),
            _ => None,
        };
        let test_metrics =
            evaluate_binary(&test.y, &predictions, scorer.positive_label(), costs)?;
        info!("test {} = {:.4}", scorer.name(), test_score);

        let report = ExperimentReport {
            n_samples: dataset.n_samples(),
            n_train: train.n_samples(),
            n_test: test.n_samples(),
            feature_names: dataset.feature_names.clone(),
            class_counts: dataset
                .class_counts()
                .into_iter()
                .map(|(c, n)| (class_name(c), n))
                .collect(),
            pipeline: pipeline.to_string(),
            scoring: scorer.to_string(),
            best_params,
            cv_score,
            cv_results,
            test_score,
            test_metrics,
            selected_features: pipeline.selected_features(&dataset.feature_names),
            model_path: None,
        };
        let model = SavedModel::new(
            pipeline,
            dataset.feature_names,
            config.target.clone(),
            scorer,
        )
        .with_key(features.key);
        Ok((model, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_credit_csv(dir: &Path) -> PathBuf {
        let mut text = String::from("id,income,debt,age,housing,class\n");
        for i in 0..40 {
            let bad = i % 4 == 0;
            let income = if bad { 20 + i % 5 } else { 60 + i % 7 };
            let debt = if bad { 30 + i % 3 } else { 5 + i % 4 };
            let age = if i % 9 == 0 { "?".to_string() } else { (25 + i % 30).to_string() };
            text.push_str(&format!(
                "r{},{},{},{},{},{}\n",
                i,
                income,
                debt,
                age,
                if i % 3 == 0 { "rent" } else { "own" },
                if bad { "bad" } else { "good" }
            ));
        }
        let path = dir.join("credit.csv");
        fs::write(&path, text).unwrap();
        path
    }

    fn config(dir: &Path, search: bool) -> ExperimentConfig {
        let search_section = if search {
            "[search]\ncv = 3\ngrid = { \"model__max_depth\" = [1, 3] }\n"
        } else {
            ""
        };
        let text = format!(
            r#"
[data]
path = "{}"
one_hot = ["housing"]

[target]
column = "class"
positive_values = ["bad"]

[features]
key = "id"

[[pipeline]]
name = "impute"
kind = "imputer"

[model]
kind = "decision_tree"

{}
[scoring]
metric = "cost"
cost_fp = 1.0
cost_fn = 5.0
"#,
            write_credit_csv(dir).display(),
            search_section
        );
        ExperimentConfig::from_toml_str(&text).unwrap()
    }

    #[test]
    fn test_plain_fit() {
        let dir = tempfile::tempdir().unwrap();
        let experiment = Experiment::from_config(config(dir.path(), false)).unwrap();
        let (model, report) = experiment.train().unwrap();

        assert_eq!(report.n_samples, 40);
        assert_eq!(report.n_train + report.n_test, 40);
        assert!(report.n_test >= 10 && report.n_test <= 11);
        assert_eq!(report.class_counts.get("1"), Some(&10));
        assert_eq!(report.class_counts.get("0"), Some(&30));
        assert_eq!(
            report.feature_names,
            vec!["income", "debt", "age", "housing_own", "housing_rent"]
        );
        assert!(report.best_params.is_none());
        assert!(report.test_metrics.get_metric("cost").is_some());
        assert_eq!(report.test_metrics.get_metric("cost"), Some(report.test_score));
        assert_eq!(model.key.as_deref(), Some("id"));
    }

    #[test]
    fn test_grid_search_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), true);
        cfg.output.model_path = Some(dir.path().join("models/best.json"));
        cfg.output.report_path = Some(dir.path().join("report.json"));
        let experiment = Experiment::from_config(cfg).unwrap();

        let report = experiment.run().unwrap();
        assert_eq!(report.cv_results.len(), 2);
        assert!(report.cv_score.is_some());
        assert!(report.best_params.unwrap().contains_key("model__max_depth"));

        let saved = SavedModel::load_model(dir.path().join("models/best.json")).unwrap();
        assert_eq!(saved.feature_names, report.feature_names);

        let text = fs::read_to_string(dir.path().join("report.json")).unwrap();
        let reloaded: ExperimentReport = serde_json::from_str(&text).unwrap();
        assert_eq!(reloaded.n_test, report.n_test);
    }

    fn write_batch(dir: &Path, housing: &str) -> PathBuf {
        let path = dir.join("batch.csv");
        let text = format!(
            "id,income,debt,age,housing\nb0,21,31,30,{h}\nb1,65,6,40,{h}\n",
            h = housing
        );
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_predict_batch_missing_a_category() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), false);
        let (model, _) = Experiment::from_config(cfg.clone()).unwrap().train().unwrap();
        assert_eq!(
            model.one_hot,
            vec![DummyEncoding {
                column: "housing".to_string(),
                categories: vec!["own".to_string(), "rent".to_string()],
            }]
        );

        let batch = write_batch(dir.path(), "rent");
        let df = prepare_frame_for_models(&cfg, &batch, &[&model]).unwrap();
        assert_eq!(
            df.get_column_numeric_values("housing_own").unwrap(),
            vec![0.0, 0.0]
        );
        let predictions = model.predict_frame(&df).unwrap();
        assert_eq!(predictions.ids, vec!["b0", "b1"]);

        // the dropped category is the training one, not the batch's first
        let mut dropped = cfg.clone();
        dropped.data.drop_first = true;
        let (model, _) = Experiment::from_config(dropped.clone()).unwrap().train().unwrap();
        assert_eq!(
            model.feature_names,
            vec!["income", "debt", "age", "housing_rent"]
        );
        let batch = write_batch(dir.path(), "own");
        let df = prepare_frame_for_models(&dropped, &batch, &[&model]).unwrap();
        assert_eq!(
            df.get_column_numeric_values("housing_rent").unwrap(),
            vec![0.0, 0.0]
        );
        assert_eq!(model.predict_frame(&df).unwrap().labels.len(), 2);
    }

    #[test]
    fn test_models_with_different_categories_share_a_frame() {
        use crate::ml::compare_saved_models;

        let dir = tempfile::tempdir().unwrap();
        let full = config(dir.path(), false);
        let mut dropped = full.clone();
        dropped.data.drop_first = true;
        let (champion, _) = Experiment::from_config(dropped).unwrap().train().unwrap();
        let (challenger, _) = Experiment::from_config(full.clone()).unwrap().train().unwrap();

        let df = prepare_frame_for_models(&full, &full.data.path, &[&champion, &challenger])
            .unwrap();
        assert!(df.contains_column("housing_own"));
        assert!(df.contains_column("housing_rent"));
        let outcome =
            compare_saved_models(&champion, &challenger, &df, &Scorer::Accuracy).unwrap();
        assert_eq!(outcome.n_samples, 40);
    }

    #[test]
    fn test_runs_are_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let experiment = Experiment::from_config(config(dir.path(), true)).unwrap();
        let (_, a) = experiment.train().unwrap();
        let (_, b) = experiment.train().unwrap();
        assert_eq!(a.test_score, b.test_score);
        assert_eq!(a.cv_score, b.cv_score);
    }
}
