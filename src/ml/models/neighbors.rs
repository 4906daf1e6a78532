//! k-nearest-neighbours classifier (brute-force search)

use serde::{Deserialize, Serialize};

use crate::error::{check_finite, check_xy, Error, Result};
use crate::ml::models::{check_width, encode_labels, unique_classes, unknown_param, Classifier, ParamValue};

/// How neighbours are weighted in the vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NeighborWeights {
    #[default]
    Uniform,
    /// Inverse distance; exact matches take the whole vote
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
}

impl DistanceMetric {
    fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNeighborsConfig {
    pub n_neighbors: usize,
    pub weights: NeighborWeights,
    pub metric: DistanceMetric,
}

impl Default for KNeighborsConfig {
    fn default() -> Self {
        KNeighborsConfig {
            n_neighbors: 5,
            weights: NeighborWeights::Uniform,
            metric: DistanceMetric::Euclidean,
        }
    }
}

/// Stores the training set and votes among the closest samples
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KNeighborsClassifier {
    config: KNeighborsConfig,
    x_train: Vec<Vec<f64>>,
    y_train: Vec<usize>,
    classes: Vec<f64>,
    n_features: usize,
    is_fitted: bool,
}

impl KNeighborsClassifier {
    pub fn new(config: KNeighborsConfig) -> Self {
        KNeighborsClassifier {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &KNeighborsConfig {
        &self.config
    }

    /// Indices and distances of the k closest training samples. Equal
    /// distances keep training order.
    pub fn kneighbors(&self, sample: &[f64]) -> Vec<(usize, f64)> {
        let mut dists: Vec<(usize, f64)> = self
            .x_train
            .iter()
            .enumerate()
            .map(|(i, row)| (i, self.config.metric.distance(sample, row)))
            .collect();
        dists.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        dists.truncate(self.config.n_neighbors);
        dists
    }

    fn vote(&self, sample: &[f64]) -> Vec<f64> {
        let neighbours = self.kneighbors(sample);
        let mut votes = vec![0.0; self.classes.len()];

        match self.config.weights {
            NeighborWeights::Uniform => {
                for &(i, _) in &neighbours {
                    votes[self.y_train[i]] += 1.0;
                }
            }
            NeighborWeights::Distance => {
                let exact: Vec<usize> = neighbours
                    .iter()
                    .filter(|(_, d)| *d == 0.0)
                    .map(|(i, _)| *i)
                    .collect();
                if exact.is_empty() {
                    for &(i, d) in &neighbours {
                        votes[self.y_train[i]] += 1.0 / d;
                    }
                } else {
                    for i in exact {
                        votes[self.y_train[i]] += 1.0;
                    }
                }
            }
        }

        let total: f64 = votes.iter().sum();
        votes.iter().map(|v| v / total).collect()
    }
}

impl Classifier for KNeighborsClassifier {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        let n_features = check_xy(x, Some(y.len()))?;
        check_finite(x)?;
        if self.config.n_neighbors == 0 {
            return Err(Error::InvalidParameter(
                "n_neighbors must be at least 1".to_string(),
            ));
        }
        if self.config.n_neighbors > x.len() {
            return Err(Error::InvalidParameter(format!(
                "n_neighbors ({}) exceeds the number of training samples ({})",
                self.config.n_neighbors,
                x.len()
            )));
        }
        let classes = unique_classes(y)?;
        self.y_train = encode_labels(y, &classes)?;
        self.classes = classes;
        self.x_train = x.to_vec();
        self.n_features = n_features;
        self.is_fitted = true;
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if !self.is_fitted {
            return Err(Error::NotFitted("KNeighborsClassifier".to_string()));
        }
        check_width(x, self.n_features)?;
        check_finite(x)?;
        Ok(x.iter().map(|sample| self.vote(sample)).collect())
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_neighbors" => self.config.n_neighbors = value.as_usize(name)?,
            "weights" => {
                self.config.weights = match value.as_str(name)? {
                    "uniform" => NeighborWeights::Uniform,
                    "distance" => NeighborWeights::Distance,
                    other => {
                        return Err(Error::InvalidParameter(format!(
                            "unknown weights '{}'",
                            other
                        )))
                    }
                }
            }
            "metric" => {
                self.config.metric = match value.as_str(name)? {
                    "euclidean" => DistanceMetric::Euclidean,
                    "manhattan" => DistanceMetric::Manhattan,
                    other => {
                        return Err(Error::InvalidParameter(format!(
                            "unknown metric '{}'",
                            other
                        )))
                    }
                }
            }
            _ => return Err(unknown_param("KNeighborsClassifier", name)),
        }
        Ok(())
    }
}
