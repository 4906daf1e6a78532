//! Ensemble Methods for Machine Learning
//!
//! This module provides ensemble learning algorithms including:
//! - Random Forest (bagged CART trees with feature subsampling)
//! - AdaBoost (SAMME boosting over shallow trees)

use crate::error::{check_finite, check_xy, Error, Result};
use crate::ml::models::tree::{DecisionTreeClassifier, DecisionTreeConfig, SplitCriterion};
use crate::ml::models::{
    argmax, check_width, encode_labels, unique_classes, unknown_param, Classifier, ParamValue,
};
use crate::parallel::par_map_jobs;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration for Random Forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestConfig {
    /// Number of trees in the forest
    pub n_estimators: usize,
    /// Maximum depth of each tree (None = no limit)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples required at a leaf node
    pub min_samples_leaf: usize,
    /// Number of features to consider at each split (None = ceil(sqrt(n_features)))
    pub max_features: Option<usize>,
    /// Splitting criterion of every tree
    pub criterion: SplitCriterion,
    /// Whether to bootstrap samples
    pub bootstrap: bool,
    /// Number of samples drawn for each tree (None = n_samples)
    pub max_samples: Option<usize>,
    /// Random seed; tree `i` uses `random_seed + i`
    pub random_seed: Option<u64>,
    /// Whether to use out-of-bag samples for estimation
    pub oob_score: bool,
    /// Number of parallel jobs (0 = use all cores)
    pub n_jobs: usize,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        RandomForestConfig {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: SplitCriterion::Gini,
            bootstrap: true,
            max_samples: None,
            random_seed: None,
            oob_score: false,
            n_jobs: 1,
        }
    }
}

/// Builder for RandomForestConfig
pub struct RandomForestConfigBuilder {
    config: RandomForestConfig,
}

impl RandomForestConfigBuilder {
    pub fn new() -> Self {
        RandomForestConfigBuilder {
            config: RandomForestConfig::default(),
        }
    }

    pub fn n_estimators(mut self, n: usize) -> Self {
        self.config.n_estimators = n;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = Some(depth);
        self
    }

    pub fn min_samples_leaf(mut self, samples: usize) -> Self {
        self.config.min_samples_leaf = samples;
        self
    }

    pub fn max_features(mut self, features: usize) -> Self {
        self.config.max_features = Some(features);
        self
    }

    pub fn bootstrap(mut self, bootstrap: bool) -> Self {
        self.config.bootstrap = bootstrap;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = Some(seed);
        self
    }

    pub fn oob_score(mut self, oob: bool) -> Self {
        self.config.oob_score = oob;
        self
    }

    pub fn n_jobs(mut self, n_jobs: usize) -> Self {
        self.config.n_jobs = n_jobs;
        self
    }

    pub fn build(self) -> RandomForestConfig {
        self.config
    }
}

impl Default for RandomForestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Random Forest Classifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    config: RandomForestConfig,
    trees: Vec<DecisionTreeClassifier>,
    n_features: usize,
    classes: Vec<f64>,
    feature_importances_: Option<Vec<f64>>,
    oob_score_: Option<f64>,
    is_fitted: bool,
}

impl RandomForestClassifier {
    /// Create a new random forest classifier
    pub fn new(config: RandomForestConfig) -> Self {
        RandomForestClassifier {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &RandomForestConfig {
        &self.config
    }

    /// Get the number of fitted trees
    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    /// Out-of-bag accuracy, when requested and computable
    pub fn oob_score(&self) -> Option<f64> {
        self.oob_score_
    }

    /// Bootstrap multiplicities for one tree
    fn bootstrap_counts(&self, n_samples: usize, seed: u64) -> Vec<f64> {
        if !self.config.bootstrap {
            return vec![1.0; n_samples];
        }
        let draws = self.config.max_samples.unwrap_or(n_samples);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut counts = vec![0.0; n_samples];
        for _ in 0..draws {
            counts[rng.random_range(0..n_samples)] += 1.0;
        }
        counts
    }

    /// Accuracy of each sample's vote among the trees that did not see it
    fn compute_oob_score(
        &self,
        x: &[Vec<f64>],
        y_idx: &[usize],
        counts: &[Vec<f64>],
    ) -> Option<f64> {
        let n_classes = self.classes.len();
        let mut correct = 0usize;
        let mut scored = 0usize;

        for (i, sample) in x.iter().enumerate() {
            let mut votes = vec![0.0; n_classes];
            let mut any = false;
            for (tree, tree_counts) in self.trees.iter().zip(counts) {
                if tree_counts[i] == 0.0 {
                    any = true;
                    for (v, p) in votes.iter_mut().zip(tree.predict_proba_single(sample)) {
                        *v += p;
                    }
                }
            }
            if any {
                scored += 1;
                if argmax(&votes) == y_idx[i] {
                    correct += 1;
                }
            }
        }

        if scored == 0 {
            log::warn!("no out-of-bag samples; oob_score is undefined");
            None
        } else {
            Some(correct as f64 / scored as f64)
        }
    }

    /// Calculate feature importances by averaging across trees
    fn calculate_feature_importances(&mut self) {
        let mut importances = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(tree_importances) = tree.feature_importances() {
                for (total, imp) in importances.iter_mut().zip(tree_importances) {
                    *total += imp;
                }
            }
        }
        let n_trees = self.trees.len() as f64;
        for importance in importances.iter_mut() {
            *importance /= n_trees;
        }
        self.feature_importances_ = Some(importances);
    }
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if self.config.n_estimators == 0 {
            return Err(Error::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.config.max_samples == Some(0) {
            return Err(Error::InvalidParameter(
                "max_samples must be at least 1".to_string(),
            ));
        }
        let n_features = check_xy(x, Some(y.len()))?;
        check_finite(x)?;
        let classes = unique_classes(y)?;
        let y_idx = encode_labels(y, &classes)?;

        // Default max_features to sqrt(n_features) for classification
        let max_features = self
            .config
            .max_features
            .unwrap_or((n_features as f64).sqrt().ceil() as usize)
            .clamp(1, n_features);
        let base_seed = self.config.random_seed.unwrap_or_else(rand::random);

        self.classes = classes.clone();
        self.n_features = n_features;

        let tree_ids: Vec<u64> = (0..self.config.n_estimators as u64).collect();
        let fitted = par_map_jobs(self.config.n_jobs, &tree_ids, |&tree_idx| {
            let seed = base_seed.wrapping_add(tree_idx);
            let counts = self.bootstrap_counts(x.len(), seed);
            let tree_config = DecisionTreeConfig {
                max_depth: self.config.max_depth,
                min_samples_split: self.config.min_samples_split,
                min_samples_leaf: self.config.min_samples_leaf,
                max_features: Some(max_features),
                criterion: self.config.criterion,
                random_seed: Some(seed),
            };
            let mut tree = DecisionTreeClassifier::new(tree_config);
            tree.fit_encoded(x, &y_idx, &counts, &classes)
                .map(|_| (tree, counts))
        })?
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

        let (trees, counts): (Vec<_>, Vec<_>) = fitted.into_iter().unzip();
        self.trees = trees;
        self.oob_score_ = if self.config.oob_score && self.config.bootstrap {
            self.compute_oob_score(x, &y_idx, &counts)
        } else {
            None
        };
        self.calculate_feature_importances();
        self.is_fitted = true;

        log::debug!(
            "fitted random forest with {} trees over {} features",
            self.trees.len(),
            n_features
        );
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if !self.is_fitted {
            return Err(Error::NotFitted("RandomForestClassifier".to_string()));
        }
        check_width(x, self.n_features)?;
        check_finite(x)?;

        let n_trees = self.trees.len() as f64;
        Ok(x.iter()
            .map(|sample| {
                let mut avg = vec![0.0; self.classes.len()];
                for tree in &self.trees {
                    for (a, p) in avg.iter_mut().zip(tree.predict_proba_single(sample)) {
                        *a += p;
                    }
                }
                avg.iter().map(|v| v / n_trees).collect()
            })
            .collect())
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let c = &mut self.config;
        match name {
            "n_estimators" => c.n_estimators = value.as_usize(name)?,
            "max_depth" => c.max_depth = value.as_opt_usize(name)?,
            "min_samples_split" => c.min_samples_split = value.as_usize(name)?,
            "min_samples_leaf" => c.min_samples_leaf = value.as_usize(name)?,
            "max_features" => c.max_features = value.as_opt_usize(name)?,
            "criterion" => {
                let mut tree = DecisionTreeConfig::default();
                tree.set_param(name, value)?;
                c.criterion = tree.criterion;
            }
            "bootstrap" => c.bootstrap = value.as_bool(name)?,
            "max_samples" => c.max_samples = value.as_opt_usize(name)?,
            "random_seed" => c.random_seed = value.as_opt_u64(name)?,
            "oob_score" => c.oob_score = value.as_bool(name)?,
            "n_jobs" => c.n_jobs = value.as_usize(name)?,
            _ => return Err(unknown_param("RandomForestClassifier", name)),
        }
        Ok(())
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.feature_importances_.clone()
    }
}

/// Configuration for AdaBoost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaBoostConfig {
    /// Maximum number of boosting rounds
    pub n_estimators: usize,
    /// Shrinks each learner's weight
    pub learning_rate: f64,
    /// Depth of each base tree (1 = decision stump)
    pub max_depth: usize,
    pub random_seed: Option<u64>,
}

impl Default for AdaBoostConfig {
    fn default() -> Self {
        AdaBoostConfig {
            n_estimators: 50,
            learning_rate: 1.0,
            max_depth: 1,
            random_seed: None,
        }
    }
}

/// AdaBoost classifier using the multi-class SAMME algorithm
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdaBoostClassifier {
    config: AdaBoostConfig,
    estimators: Vec<DecisionTreeClassifier>,
    estimator_weights: Vec<f64>,
    estimator_errors: Vec<f64>,
    n_features: usize,
    classes: Vec<f64>,
    is_fitted: bool,
}

impl AdaBoostClassifier {
    pub fn new(config: AdaBoostConfig) -> Self {
        AdaBoostClassifier {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &AdaBoostConfig {
        &self.config
    }

    /// Number of boosting rounds actually kept
    pub fn n_estimators(&self) -> usize {
        self.estimators.len()
    }

    pub fn estimator_weights(&self) -> &[f64] {
        &self.estimator_weights
    }

    pub fn estimator_errors(&self) -> &[f64] {
        &self.estimator_errors
    }

    fn learner(&self, round: usize) -> DecisionTreeClassifier {
        DecisionTreeClassifier::new(DecisionTreeConfig {
            max_depth: Some(self.config.max_depth),
            random_seed: Some(
                self.config
                    .random_seed
                    .unwrap_or(0)
                    .wrapping_add(round as u64),
            ),
            ..DecisionTreeConfig::default()
        })
    }

    /// Weighted class votes, normalised by the total learner weight
    fn votes(&self, sample: &[f64]) -> Vec<f64> {
        let mut votes = vec![0.0; self.classes.len()];
        for (tree, &alpha) in self.estimators.iter().zip(&self.estimator_weights) {
            votes[argmax(tree.predict_proba_single(sample))] += alpha;
        }
        let total: f64 = self.estimator_weights.iter().sum();
        if total > 0.0 {
            for v in votes.iter_mut() {
                *v /= total;
            }
        }
        votes
    }
}

impl Classifier for AdaBoostClassifier {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if self.config.n_estimators == 0 {
            return Err(Error::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if !(self.config.learning_rate > 0.0 && self.config.learning_rate.is_finite()) {
            return Err(Error::InvalidParameter(
                "learning_rate must be positive".to_string(),
            ));
        }
        let n_features = check_xy(x, Some(y.len()))?;
        check_finite(x)?;
        let classes = unique_classes(y)?;
        let y_idx = encode_labels(y, &classes)?;
        let n = x.len();
        let k = classes.len() as f64;

        self.classes = classes.clone();
        self.n_features = n_features;
        self.estimators.clear();
        self.estimator_weights.clear();
        self.estimator_errors.clear();

        let mut weights = vec![1.0 / n as f64; n];

        for round in 0..self.config.n_estimators {
            let mut tree = self.learner(round);
            tree.fit_encoded(x, &y_idx, &weights, &classes)?;

            let wrong: Vec<bool> = x
                .iter()
                .zip(&y_idx)
                .map(|(sample, &target)| argmax(tree.predict_proba_single(sample)) != target)
                .collect();
            let total: f64 = weights.iter().sum();
            let error: f64 = weights
                .iter()
                .zip(&wrong)
                .filter(|(_, &w)| w)
                .map(|(weight, _)| weight)
                .sum::<f64>()
                / total;

            if error <= 0.0 || k < 2.0 {
                // perfect learner
                self.estimators.push(tree);
                self.estimator_weights.push(1.0);
                self.estimator_errors.push(0.0);
                break;
            }

            if error >= 1.0 - 1.0 / k {
                log::warn!(
                    "AdaBoost round {} is no better than chance (error {:.4}); stopping",
                    round,
                    error
                );
                if self.estimators.is_empty() {
                    self.estimators.push(tree);
                    self.estimator_weights.push(1.0);
                    self.estimator_errors.push(error);
                }
                break;
            }

            let alpha = self.config.learning_rate * (((1.0 - error) / error).ln() + (k - 1.0).ln());
            for (w, &miss) in weights.iter_mut().zip(&wrong) {
                if miss && *w > 0.0 {
                    *w *= alpha.exp();
                }
            }
            let sum: f64 = weights.iter().sum();
            for w in weights.iter_mut() {
                *w /= sum;
            }

            log::debug!("AdaBoost round {}: error {:.4}, alpha {:.4}", round, error, alpha);
            self.estimators.push(tree);
            self.estimator_weights.push(alpha);
            self.estimator_errors.push(error);
        }

        self.is_fitted = true;
        Ok(())
    }

    /// Softmax over the normalised weighted votes, scaled by `1 / (K - 1)`
    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if !self.is_fitted {
            return Err(Error::NotFitted("AdaBoostClassifier".to_string()));
        }
        check_width(x, self.n_features)?;
        check_finite(x)?;

        let k = self.classes.len();
        Ok(x.iter()
            .map(|sample| {
                if k < 2 {
                    return vec![1.0; k];
                }
                let votes = self.votes(sample);
                let scale = (k - 1) as f64;
                let max = votes.iter().cloned().fold(f64::NEG_INFINITY, f64::max) / scale;
                let exp: Vec<f64> = votes.iter().map(|v| (v / scale - max).exp()).collect();
                let sum: f64 = exp.iter().sum();
                exp.iter().map(|e| e / sum).collect()
            })
            .collect())
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let c = &mut self.config;
        match name {
            "n_estimators" => c.n_estimators = value.as_usize(name)?,
            "learning_rate" => c.learning_rate = value.as_f64(name)?,
            "max_depth" => c.max_depth = value.as_usize(name)?,
            "random_seed" => c.random_seed = value.as_opt_u64(name)?,
            _ => return Err(unknown_param("AdaBoostClassifier", name)),
        }
        Ok(())
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        if !self.is_fitted {
            return None;
        }
        let total: f64 = self.estimator_weights.iter().sum();
        let mut importances = vec![0.0; self.n_features];
        for (tree, &alpha) in self.estimators.iter().zip(&self.estimator_weights) {
            if let Some(tree_imp) = tree.feature_importances() {
                for (acc, imp) in importances.iter_mut().zip(tree_imp) {
                    *acc += alpha * imp / total;
                }
            }
        }
        Some(importances)
    }
}
