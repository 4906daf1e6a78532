//! Classification models
//!
//! Every model implements [`Classifier`]. [`Estimator`] wraps the concrete
//! models in one serialisable enum so pipelines, grid search and
//! persistence can treat them uniformly.

pub mod ensemble;
pub mod naive_bayes;
pub mod neighbors;
pub mod tree;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

pub use ensemble::{AdaBoostClassifier, AdaBoostConfig, RandomForestClassifier, RandomForestConfig};
pub use naive_bayes::{GaussianNB, GaussianNBConfig};
pub use neighbors::{DistanceMetric, KNeighborsClassifier, KNeighborsConfig, NeighborWeights};
pub use tree::{DecisionTreeClassifier, DecisionTreeConfig, SplitCriterion};

/// A hyperparameter value, as written in configuration files and grids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

impl ParamValue {
    pub fn as_f64(&self, name: &str) -> Result<f64> {
        match self {
            ParamValue::Int(v) => Ok(*v as f64),
            ParamValue::Float(v) => Ok(*v),
            other => Err(invalid_value(name, other, "a number")),
        }
    }

    pub fn as_usize(&self, name: &str) -> Result<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Ok(*v as usize),
            other => Err(invalid_value(name, other, "a non-negative integer")),
        }
    }

    /// `null` maps to `None`
    pub fn as_opt_usize(&self, name: &str) -> Result<Option<usize>> {
        match self {
            ParamValue::Null => Ok(None),
            other => other.as_usize(name).map(Some),
        }
    }

    pub fn as_opt_u64(&self, name: &str) -> Result<Option<u64>> {
        Ok(self.as_opt_usize(name)?.map(|v| v as u64))
    }

    pub fn as_bool(&self, name: &str) -> Result<bool> {
        match self {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(invalid_value(name, other, "a boolean")),
        }
    }

    pub fn as_str(&self, name: &str) -> Result<&str> {
        match self {
            ParamValue::Str(v) => Ok(v),
            other => Err(invalid_value(name, other, "a string")),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => write!(f, "{}", v),
            ParamValue::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

fn invalid_value(name: &str, value: &ParamValue, expected: &str) -> Error {
    Error::InvalidParameter(format!(
        "parameter '{}' must be {}, got {}",
        name, expected, value
    ))
}

pub(crate) fn unknown_param(model: &str, name: &str) -> Error {
    Error::InvalidParameter(format!("{} has no parameter '{}'", model, name))
}

/// Common interface of every classifier
pub trait Classifier {
    /// Fits the model to a feature matrix and class labels
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;

    /// Class probabilities, one row per sample, columns ordered as [`Classifier::classes`]
    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>>;

    /// Sorted class labels seen during fit
    fn classes(&self) -> &[f64];

    fn is_fitted(&self) -> bool;

    /// Sets one hyperparameter by name
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    /// Normalised per-feature importances, when the model defines them
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }

    /// Most probable class per sample; ties go to the lower class
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let probs = self.predict_proba(x)?;
        let classes = self.classes();
        Ok(probs.iter().map(|p| classes[argmax(p)]).collect())
    }
}

/// Index of the first maximum
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Sorted distinct labels. NaN labels are rejected.
pub(crate) fn unique_classes(y: &[f64]) -> Result<Vec<f64>> {
    if y.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput(
            "class labels must be finite numbers".to_string(),
        ));
    }
    let mut classes = y.to_vec();
    classes.sort_by(|a, b| a.total_cmp(b));
    classes.dedup();
    Ok(classes)
}

/// Maps each label to its position in `classes`
pub(crate) fn encode_labels(y: &[f64], classes: &[f64]) -> Result<Vec<usize>> {
    y.iter()
        .map(|v| {
            classes
                .binary_search_by(|c| c.total_cmp(v))
                .map_err(|_| Error::InvalidInput(format!("unknown class label {}", v)))
        })
        .collect()
}

/// Checks that a fitted model receives the feature width it was trained on
pub(crate) fn check_width(x: &[Vec<f64>], expected: usize) -> Result<()> {
    let width = crate::error::check_xy(x, None)?;
    if width != expected {
        return Err(Error::DimensionMismatch(format!(
            "model was fitted with {} features, got {}",
            expected, width
        )));
    }
    Ok(())
}

/// Any of the supported classifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    DecisionTree(DecisionTreeClassifier),
    RandomForest(RandomForestClassifier),
    AdaBoost(AdaBoostClassifier),
    KNeighbors(KNeighborsClassifier),
    GaussianNb(GaussianNB),
}

impl Estimator {
    /// Builds an unfitted estimator from a kind name and parameter overrides.
    ///
    /// Accepted kinds: `decision_tree`, `random_forest`, `ada_boost`,
    /// `k_neighbors` (alias `knn`), `gaussian_nb` (alias `naive_bayes`).
    pub fn from_kind(kind: &str, params: &BTreeMap<String, ParamValue>) -> Result<Self> {
        let mut estimator = match kind {
            "decision_tree" => Estimator::DecisionTree(DecisionTreeClassifier::default()),
            "random_forest" => Estimator::RandomForest(RandomForestClassifier::default()),
            "ada_boost" | "adaboost" => Estimator::AdaBoost(AdaBoostClassifier::default()),
            "k_neighbors" | "knn" => Estimator::KNeighbors(KNeighborsClassifier::default()),
            "gaussian_nb" | "naive_bayes" => Estimator::GaussianNb(GaussianNB::default()),
            other => {
                return Err(Error::InvalidParameter(format!(
                    "unknown model kind '{}'",
                    other
                )))
            }
        };
        for (name, value) in params {
            estimator.set_param(name, value)?;
        }
        Ok(estimator)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Estimator::DecisionTree(_) => "decision_tree",
            Estimator::RandomForest(_) => "random_forest",
            Estimator::AdaBoost(_) => "ada_boost",
            Estimator::KNeighbors(_) => "k_neighbors",
            Estimator::GaussianNb(_) => "gaussian_nb",
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            Estimator::DecisionTree(m) => m,
            Estimator::RandomForest(m) => m,
            Estimator::AdaBoost(m) => m,
            Estimator::KNeighbors(m) => m,
            Estimator::GaussianNb(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Estimator::DecisionTree(m) => m,
            Estimator::RandomForest(m) => m,
            Estimator::AdaBoost(m) => m,
            Estimator::KNeighbors(m) => m,
            Estimator::GaussianNb(m) => m,
        }
    }
}

impl Classifier for Estimator {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.inner().predict_proba(x)
    }

    fn classes(&self) -> &[f64] {
        self.inner().classes()
    }

    fn is_fitted(&self) -> bool {
        self.inner().is_fitted()
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        self.inner_mut().set_param(name, value)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.inner().feature_importances()
    }
}
