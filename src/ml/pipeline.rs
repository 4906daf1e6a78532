//! Machine learning pipeline module
//!
//! A [`Pipeline`] chains named preprocessing steps in front of a final
//! classifier, so the whole chain can be cross-validated, tuned and
//! persisted as one unit.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ml::feature_selection::{SelectKBest, VarianceThreshold};
use crate::ml::models::{Classifier, Estimator, ParamValue};
use crate::ml::preprocessing::{MinMaxScaler, SimpleImputer, StandardScaler};

/// Trait for data transformers
pub trait Transformer {
    /// Learns from the data
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;

    /// Transforms the data
    fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>>;

    /// Learns from the data, then transforms it
    fn fit_transform(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<Vec<Vec<f64>>> {
        self.fit(x, y)?;
        self.transform(x)
    }

    fn is_fitted(&self) -> bool;

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    /// Names of the output columns given the input names
    fn output_features(&self, input_names: &[String]) -> Vec<String> {
        input_names.to_vec()
    }
}

/// Any transformer that can sit in a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    SimpleImputer(SimpleImputer),
    StandardScaler(StandardScaler),
    MinMaxScaler(MinMaxScaler),
    VarianceThreshold(VarianceThreshold),
    SelectKBest(SelectKBest),
}

impl Step {
    /// Builds an unfitted step from a kind name and parameter overrides
    pub fn from_kind<'a, I>(kind: &str, params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a ParamValue)>,
    {
        let mut step = match kind {
            "simple_imputer" | "imputer" => Step::SimpleImputer(SimpleImputer::default()),
            "standard_scaler" => Step::StandardScaler(StandardScaler::default()),
            "min_max_scaler" => Step::MinMaxScaler(MinMaxScaler::default()),
            "variance_threshold" => Step::VarianceThreshold(VarianceThreshold::default()),
            "select_k_best" => Step::SelectKBest(SelectKBest::default()),
            other => {
                return Err(Error::InvalidParameter(format!(
                    "unknown pipeline step '{}'",
                    other
                )))
            }
        };
        for (name, value) in params {
            step.set_param(name, value)?;
        }
        Ok(step)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Step::SimpleImputer(_) => "simple_imputer",
            Step::StandardScaler(_) => "standard_scaler",
            Step::MinMaxScaler(_) => "min_max_scaler",
            Step::VarianceThreshold(_) => "variance_threshold",
            Step::SelectKBest(_) => "select_k_best",
        }
    }

    fn inner(&self) -> &dyn Transformer {
        match self {
            Step::SimpleImputer(t) => t,
            Step::StandardScaler(t) => t,
            Step::MinMaxScaler(t) => t,
            Step::VarianceThreshold(t) => t,
            Step::SelectKBest(t) => t,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Transformer {
        match self {
            Step::SimpleImputer(t) => t,
            Step::StandardScaler(t) => t,
            Step::MinMaxScaler(t) => t,
            Step::VarianceThreshold(t) => t,
            Step::SelectKBest(t) => t,
        }
    }
}

impl Transformer for Step {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.inner().transform(x)
    }

    fn is_fitted(&self) -> bool {
        self.inner().is_fitted()
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        self.inner_mut().set_param(name, value)
    }

    fn output_features(&self, input_names: &[String]) -> Vec<String> {
        self.inner().output_features(input_names)
    }
}

/// Pipeline that chains transformation steps and ends in a classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    steps: Vec<(String, Step)>,
    estimator: (String, Estimator),
}

impl Pipeline {
    /// Creates a pipeline with no preprocessing steps
    pub fn new(name: impl Into<String>, estimator: Estimator) -> Self {
        Pipeline {
            steps: Vec::new(),
            estimator: (name.into(), estimator),
        }
    }

    /// Appends a step. Names must be unique within the pipeline.
    pub fn add_step(&mut self, name: impl Into<String>, step: Step) -> Result<&mut Self> {
        let name = name.into();
        if name.is_empty() || name.contains("__") {
            return Err(Error::InvalidInput(format!(
                "invalid step name '{}'",
                name
            )));
        }
        if name == self.estimator.0 || self.steps.iter().any(|(n, _)| *n == name) {
            return Err(Error::InvalidInput(format!(
                "duplicate step name '{}'",
                name
            )));
        }
        self.steps.push((name, step));
        Ok(self)
    }

    /// Builder form of [`Pipeline::add_step`]
    pub fn with_step(mut self, name: impl Into<String>, step: Step) -> Result<Self> {
        self.add_step(name, step)?;
        Ok(self)
    }

    pub fn steps(&self) -> &[(String, Step)] {
        &self.steps
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator.1
    }

    pub fn estimator_name(&self) -> &str {
        &self.estimator.0
    }

    /// Fits every step in order, then the classifier on the transformed data
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        let mut current: Option<Vec<Vec<f64>>> = None;
        for (name, step) in &mut self.steps {
            let input = current.as_deref().unwrap_or(x);
            let output = step.fit_transform(input, y)?;
            log::debug!(
                "fitted step '{}' ({}), {} columns out",
                name,
                step.kind(),
                output.first().map_or(0, |r| r.len())
            );
            current = Some(output);
        }
        let input = current.as_deref().unwrap_or(x);
        self.estimator.1.fit(input, y)
    }

    /// Runs the preprocessing steps only
    pub fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let mut current = x.to_vec();
        for (_, step) in &self.steps {
            current = step.transform(&current)?;
        }
        Ok(current)
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        self.check_fitted()?;
        let xt = self.transform(x)?;
        self.estimator.1.predict(&xt)
    }

    pub fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.check_fitted()?;
        let xt = self.transform(x)?;
        self.estimator.1.predict_proba(&xt)
    }

    pub fn classes(&self) -> &[f64] {
        self.estimator.1.classes()
    }

    pub fn is_fitted(&self) -> bool {
        self.estimator.1.is_fitted() && self.steps.iter().all(|(_, s)| s.is_fitted())
    }

    fn check_fitted(&self) -> Result<()> {
        if self.is_fitted() {
            Ok(())
        } else {
            Err(Error::NotFitted("pipeline".to_string()))
        }
    }

    /// Names of the columns that reach the classifier
    pub fn selected_features(&self, input_names: &[String]) -> Vec<String> {
        self.steps
            .iter()
            .fold(input_names.to_vec(), |names, (_, step)| {
                step.output_features(&names)
            })
    }

    /// Sets a parameter addressed as `<step>__<param>`
    pub fn set_param(&mut self, key: &str, value: &ParamValue) -> Result<()> {
        let (step_name, param) = key.split_once("__").ok_or_else(|| {
            Error::InvalidParameter(format!(
                "parameter '{}' must be of the form <step>__<param>",
                key
            ))
        })?;

        if step_name == self.estimator.0 {
            return self.estimator.1.set_param(param, value);
        }
        match self.steps.iter_mut().find(|(n, _)| n == step_name) {
            Some((_, step)) => step.set_param(param, value),
            None => Err(Error::InvalidParameter(format!(
                "pipeline has no step named '{}'",
                step_name
            ))),
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .steps
            .iter()
            .map(|(name, step)| format!("{}({})", name, step.kind()))
            .collect();
        parts.push(format!("{}({})", self.estimator.0, self.estimator.1.kind()));
        write!(f, "{}", parts.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::{DecisionTreeClassifier, KNeighborsClassifier};

    fn data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x = vec![
            vec![1.0, 100.0, 7.0],
            vec![2.0, f64::NAN, 7.0],
            vec![1.5, 110.0, 7.0],
            vec![8.0, 900.0, 7.0],
            vec![9.0, 950.0, 7.0],
            vec![f64::NAN, 1000.0, 7.0],
        ];
        let y = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(
            "model",
            Estimator::KNeighbors(KNeighborsClassifier::default()),
        )
        .with_step("impute", Step::SimpleImputer(SimpleImputer::default()))
        .unwrap()
        .with_step("variance", Step::VarianceThreshold(VarianceThreshold::new(0.0)))
        .unwrap()
        .with_step("scale", Step::StandardScaler(StandardScaler::default()))
        .unwrap()
    }

    #[test]
    fn test_pipeline_fit_predict() {
        let (x, y) = data();
        let mut pipe = pipeline();
        pipe.set_param("model__n_neighbors", &ParamValue::Int(3))
            .unwrap();
        pipe.fit(&x, &y).unwrap();

        assert_eq!(pipe.predict(&x).unwrap(), y);
        let proba = pipe.predict_proba(&x).unwrap();
        assert_eq!(proba.len(), 6);
        assert_eq!(pipe.transform(&x).unwrap()[0].len(), 2);

        let names: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(pipe.selected_features(&names), vec!["a", "b"]);
        assert_eq!(
            pipe.to_string(),
            "impute(simple_imputer) -> variance(variance_threshold) -> scale(standard_scaler) -> model(k_neighbors)"
        );
    }

    #[test]
    fn test_pipeline_not_fitted() {
        let (x, _) = data();
        let pipe = pipeline();
        assert!(matches!(pipe.predict(&x), Err(Error::NotFitted(_))));
    }

    #[test]
    fn test_set_param_routing() {
        let mut pipe = pipeline();
        assert!(pipe
            .set_param("variance__threshold", &ParamValue::Float(0.1))
            .is_ok());
        assert!(matches!(
            pipe.set_param("missing__threshold", &ParamValue::Float(0.1)),
            Err(Error::InvalidParameter(_))
        ));
        assert!(pipe.set_param("threshold", &ParamValue::Float(0.1)).is_err());
        assert!(pipe
            .set_param("model__no_such_param", &ParamValue::Int(1))
            .is_err());
    }

    #[test]
    fn test_duplicate_step_names() {
        let mut pipe = pipeline();
        assert!(matches!(
            pipe.add_step("scale", Step::MinMaxScaler(MinMaxScaler::default())),
            Err(Error::InvalidInput(_))
        ));
        assert!(pipe
            .add_step("model", Step::MinMaxScaler(MinMaxScaler::default()))
            .is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let base = Pipeline::new(
            "tree",
            Estimator::DecisionTree(DecisionTreeClassifier::default()),
        );
        let mut copy = base.clone();
        copy.set_param("tree__max_depth", &ParamValue::Int(2))
            .unwrap();
        match (base.estimator(), copy.estimator()) {
            (Estimator::DecisionTree(a), Estimator::DecisionTree(b)) => {
                assert_eq!(a.config().max_depth, None);
                assert_eq!(b.config().max_depth, Some(2));
            }
            _ => panic!("unexpected estimator"),
        }
    }

    #[test]
    fn test_step_from_kind() {
        let params = vec![("k".to_string(), ParamValue::Int(3))];
        let step = Step::from_kind("select_k_best", params.iter().map(|(k, v)| (k, v))).unwrap();
        match step {
            Step::SelectKBest(s) => assert_eq!(s.k, 3),
            _ => panic!("unexpected step"),
        }
        assert!(Step::from_kind("pca", std::iter::empty::<(&String, &ParamValue)>()).is_err());
    }
}
