//! Saving and loading fitted models
//!
//! Models are written as a JSON envelope carrying a format version, the
//! library version and a kind tag around the serialized payload. Writes go
//! through a temporary file in the target directory that is renamed into
//! place, so readers never observe a half-written model.

use std::fs;
use std::io::Write;
use std::path::Path;

use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dataframe::{DataFrame, DummyEncoding};
use crate::error::{Error, Result};
use crate::ml::features::{feature_matrix, row_ids, Dataset, TargetSpec};
use crate::ml::metrics::Scorer;
use crate::ml::pipeline::Pipeline;

/// Version of the envelope layout
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    library_version: String,
    kind: String,
    payload: serde_json::Value,
}

/// Trait for saving and loading models
pub trait ModelPersistence {
    /// Save the model to a file
    fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()>;

    /// Load the model from a file
    fn load_model<P: AsRef<Path>>(path: P) -> Result<Self>
    where
        Self: Sized;
}

fn write_envelope<T: Serialize>(value: &T, kind: &str, path: &Path) -> Result<()> {
    let envelope = Envelope {
        format_version: FORMAT_VERSION,
        library_version: crate::VERSION.to_string(),
        kind: kind.to_string(),
        payload: serde_json::to_value(value)?,
    };
    let json = serde_json::to_vec_pretty(&envelope)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(&json)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;

    info!("saved {} to {}", kind, path.display());
    Ok(())
}

fn read_envelope<T: DeserializeOwned>(kind: &str, path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    let envelope: Envelope = serde_json::from_slice(&bytes)?;
    if envelope.format_version != FORMAT_VERSION {
        return Err(Error::InvalidInput(format!(
            "{} uses model format {}, this build reads format {}",
            path.display(),
            envelope.format_version,
            FORMAT_VERSION
        )));
    }
    if envelope.kind != kind {
        return Err(Error::InvalidInput(format!(
            "{} holds a '{}', expected a '{}'",
            path.display(),
            envelope.kind,
            kind
        )));
    }
    if envelope.library_version != crate::VERSION {
        log::warn!(
            "{} was written by version {}, reading with {}",
            path.display(),
            envelope.library_version,
            crate::VERSION
        );
    }
    Ok(serde_json::from_value(envelope.payload)?)
}

impl ModelPersistence for Pipeline {
    fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if !self.is_fitted() {
            return Err(Error::NotFitted("cannot save an unfitted pipeline".to_string()));
        }
        write_envelope(self, "pipeline", path.as_ref())
    }

    fn load_model<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_envelope("pipeline", path.as_ref())
    }
}

/// Predictions for a table of rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predictions {
    pub ids: Vec<String>,
    pub labels: Vec<f64>,
    /// Probability of the positive class
    pub positive_proba: Vec<f64>,
}

/// A fitted pipeline together with what is needed to apply it to new data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub pipeline: Pipeline,
    /// Input columns, in the order the pipeline expects them
    pub feature_names: Vec<String>,
    pub target: TargetSpec,
    pub scorer: Scorer,
    /// Row identifier column, if the data has one
    #[serde(default)]
    pub key: Option<String>,
    /// One-hot categories seen in training, reapplied to new data
    #[serde(default)]
    pub one_hot: Vec<DummyEncoding>,
}

impl SavedModel {
    pub fn new(
        pipeline: Pipeline,
        feature_names: Vec<String>,
        target: TargetSpec,
        scorer: Scorer,
    ) -> Self {
        SavedModel {
            pipeline,
            feature_names,
            target,
            scorer,
            key: None,
            one_hot: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.key = key;
        self
    }

    pub fn with_one_hot(mut self, one_hot: Vec<DummyEncoding>) -> Self {
        self.one_hot = one_hot;
        self
    }

    /// Labelled dataset with this model's feature columns, in training order
    pub fn dataset(&self, df: &DataFrame) -> Result<Dataset> {
        Dataset::from_columns(df, &self.target, self.feature_names.clone(), self.key.as_deref())
    }

    /// Predicts every row of `df`. The target column is not needed.
    pub fn predict_frame(&self, df: &DataFrame) -> Result<Predictions> {
        let x = feature_matrix(df, &self.feature_names)?;
        let ids = row_ids(df, self.key.as_deref())?;
        let labels = self.pipeline.predict(&x)?;
        let proba = self.pipeline.predict_proba(&x)?;

        let positive = self.scorer.positive_label();
        let column = self.pipeline.classes().iter().position(|&c| c == positive);
        let positive_proba = proba
            .iter()
            .map(|p| column.map_or(0.0, |j| p[j]))
            .collect();
        Ok(Predictions {
            ids,
            labels,
            positive_proba,
        })
    }
}

impl ModelPersistence for SavedModel {
    fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if !self.pipeline.is_fitted() {
            return Err(Error::NotFitted("cannot save an unfitted pipeline".to_string()));
        }
        write_envelope(self, "saved_model", path.as_ref())
    }

    fn load_model<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_envelope("saved_model", path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::{Estimator, RandomForestClassifier, RandomForestConfig};
    use crate::ml::pipeline::Step;
    use crate::ml::preprocessing::StandardScaler;

    fn fitted_pipeline() -> (Pipeline, Vec<Vec<f64>>) {
        let x: Vec<Vec<f64>> = (0..30)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64])
            .collect();
        let y: Vec<f64> = (0..30).map(|i| if i >= 15 { 1.0 } else { 0.0 }).collect();
        let config = RandomForestConfig {
            n_estimators: 10,
            random_seed: Some(3),
            ..RandomForestConfig::default()
        };
        let mut pipe = Pipeline::new(
            "forest",
            Estimator::RandomForest(RandomForestClassifier::new(config)),
        )
        .with_step("scale", Step::StandardScaler(StandardScaler::default()))
        .unwrap();
        pipe.fit(&x, &y).unwrap();
        (pipe, x)
    }

    #[test]
    fn test_pipeline_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let (pipe, x) = fitted_pipeline();

        pipe.save_model(&path).unwrap();
        let loaded = Pipeline::load_model(&path).unwrap();
        assert_eq!(pipe.predict(&x).unwrap(), loaded.predict(&x).unwrap());
        assert_eq!(
            pipe.predict_proba(&x).unwrap(),
            loaded.predict_proba(&x).unwrap()
        );
    }

    #[test]
    fn test_wrong_kind_and_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let (pipe, _) = fitted_pipeline();
        pipe.save_model(&path).unwrap();

        assert!(matches!(
            SavedModel::load_model(&path),
            Err(Error::InvalidInput(_))
        ));

        let text = fs::read_to_string(&path).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
        value["format_version"] = serde_json::json!(99);
        fs::write(&path, value.to_string()).unwrap();
        assert!(matches!(
            Pipeline::load_model(&path),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_unfitted_pipeline_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let pipe = Pipeline::new(
            "forest",
            Estimator::RandomForest(RandomForestClassifier::default()),
        );
        assert!(pipe.save_model(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_saved_model_predict_frame() {
        use crate::dataframe::Column;

        let (pipe, x) = fitted_pipeline();
        let mut df = DataFrame::new();
        df.add_column(
            "host",
            Column::String((0..30).map(|i| format!("H{}", i)).collect()),
        )
        .unwrap();
        df.add_column("b", Column::Float64(x.iter().map(|r| r[1]).collect()))
            .unwrap();
        df.add_column("a", Column::Float64(x.iter().map(|r| r[0]).collect()))
            .unwrap();

        let model = SavedModel::new(
            pipe.clone(),
            vec!["a".into(), "b".into()],
            TargetSpec::new("label"),
            Scorer::Accuracy,
        )
        .with_key(Some("host".into()));

        // feature order follows the saved names, not the frame
        let predictions = model.predict_frame(&df).unwrap();
        assert_eq!(predictions.labels, pipe.predict(&x).unwrap());
        assert_eq!(predictions.ids[0], "H0");
        assert!(predictions
            .positive_proba
            .iter()
            .all(|p| (0.0..=1.0).contains(p)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.json");
        model.save_model(&path).unwrap();
        let loaded = SavedModel::load_model(&path).unwrap();
        assert_eq!(loaded.predict_frame(&df).unwrap(), predictions);
        assert_eq!(loaded.key.as_deref(), Some("host"));
    }
}
