//! Decision Tree implementation
//!
//! This module provides a decision tree classifier using the CART
//! (Classification and Regression Trees) algorithm, with optional sample
//! weights so it can serve as the base learner of the ensembles.

use crate::error::{check_finite, check_xy, Error, Result};
use crate::ml::models::{check_width, encode_labels, unique_classes, unknown_param, Classifier, ParamValue};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Criterion for splitting nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SplitCriterion {
    /// Gini impurity
    #[default]
    Gini,
    /// Entropy / Information Gain
    Entropy,
}

impl SplitCriterion {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "gini" => Ok(SplitCriterion::Gini),
            "entropy" => Ok(SplitCriterion::Entropy),
            other => Err(Error::InvalidParameter(format!(
                "unknown split criterion '{}'",
                other
            ))),
        }
    }

    /// Impurity of a node given its per-class weights
    fn impurity(self, class_weights: &[f64], total: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        match self {
            SplitCriterion::Gini => {
                1.0 - class_weights
                    .iter()
                    .map(|&c| (c / total).powi(2))
                    .sum::<f64>()
            }
            SplitCriterion::Entropy => -class_weights
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|&c| {
                    let p = c / total;
                    p * p.ln()
                })
                .sum::<f64>(),
        }
    }
}

/// Configuration for decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeConfig {
    /// Maximum depth of the tree (None = no limit)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples required at a leaf node
    pub min_samples_leaf: usize,
    /// Maximum number of features to consider for splits (None = all features)
    pub max_features: Option<usize>,
    /// Splitting criterion
    pub criterion: SplitCriterion,
    /// Random seed for the feature subsampling
    pub random_seed: Option<u64>,
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        DecisionTreeConfig {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: SplitCriterion::Gini,
            random_seed: None,
        }
    }
}

impl DecisionTreeConfig {
    fn validate(&self) -> Result<()> {
        if self.min_samples_split < 2 {
            return Err(Error::InvalidParameter(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.min_samples_leaf < 1 {
            return Err(Error::InvalidParameter(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        if self.max_features == Some(0) {
            return Err(Error::InvalidParameter(
                "max_features must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "max_depth" => self.max_depth = value.as_opt_usize(name)?,
            "min_samples_split" => self.min_samples_split = value.as_usize(name)?,
            "min_samples_leaf" => self.min_samples_leaf = value.as_usize(name)?,
            "max_features" => self.max_features = value.as_opt_usize(name)?,
            "criterion" => self.criterion = SplitCriterion::parse(value.as_str(name)?)?,
            "random_seed" => self.random_seed = value.as_opt_u64(name)?,
            _ => return Err(unknown_param("DecisionTreeClassifier", name)),
        }
        Ok(())
    }
}

/// Builder for DecisionTreeConfig
pub struct DecisionTreeConfigBuilder {
    config: DecisionTreeConfig,
}

impl DecisionTreeConfigBuilder {
    pub fn new() -> Self {
        DecisionTreeConfigBuilder {
            config: DecisionTreeConfig::default(),
        }
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = Some(depth);
        self
    }

    pub fn min_samples_split(mut self, samples: usize) -> Self {
        self.config.min_samples_split = samples;
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

    pub fn criterion(mut self, criterion: SplitCriterion) -> Self {
        self.config.criterion = criterion;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = Some(seed);
        self
    }

    pub fn build(self) -> DecisionTreeConfig {
        self.config
    }
}

impl Default for DecisionTreeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A node in the decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Feature index used for splitting
    pub feature_index: Option<usize>,
    /// Samples with `x[feature] <= threshold` go left
    pub threshold: Option<f64>,
    /// Class probabilities at this node
    pub class_probs: Vec<f64>,
    /// Left child node index
    pub left_child: Option<usize>,
    /// Right child node index
    pub right_child: Option<usize>,
    /// Number of samples at this node
    pub n_samples: usize,
    /// Total sample weight at this node
    pub weight: f64,
    /// Impurity at this node
    pub impurity: f64,
    /// Depth of this node
    pub depth: usize,
    /// Whether this is a leaf node
    pub is_leaf: bool,
}

impl TreeNode {
    fn new_leaf(class_probs: Vec<f64>, n_samples: usize, weight: f64, impurity: f64, depth: usize) -> Self {
        TreeNode {
            feature_index: None,
            threshold: None,
            class_probs,
            left_child: None,
            right_child: None,
            n_samples,
            weight,
            impurity,
            depth,
            is_leaf: true,
        }
    }
}

/// Best split found for one node
struct Split {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// Decision Tree Classifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    config: DecisionTreeConfig,
    nodes: Vec<TreeNode>,
    n_features: usize,
    classes: Vec<f64>,
    feature_importances_: Option<Vec<f64>>,
    is_fitted: bool,
}

impl DecisionTreeClassifier {
    /// Create a new decision tree classifier
    pub fn new(config: DecisionTreeConfig) -> Self {
        DecisionTreeClassifier {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &DecisionTreeConfig {
        &self.config
    }

    /// Get the tree nodes
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Get the tree depth
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Get the number of leaves
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf).count()
    }

    /// Fits with per-sample weights. Weights must be finite, non-negative
    /// and not all zero.
    pub fn fit_weighted(&mut self, x: &[Vec<f64>], y: &[f64], sample_weight: &[f64]) -> Result<()> {
        check_xy(x, Some(y.len()))?;
        let classes = unique_classes(y)?;
        let y_idx = encode_labels(y, &classes)?;
        self.fit_encoded(x, &y_idx, sample_weight, &classes)
    }

    /// Fits on labels already encoded against `classes`. Ensembles use this
    /// so every member shares the same class order even when a resample
    /// misses a class.
    pub(crate) fn fit_encoded(
        &mut self,
        x: &[Vec<f64>],
        y_idx: &[usize],
        sample_weight: &[f64],
        classes: &[f64],
    ) -> Result<()> {
        self.config.validate()?;
        let n_features = check_xy(x, Some(y_idx.len()))?;
        check_finite(x)?;
        if sample_weight.len() != x.len() {
            return Err(Error::DimensionMismatch(format!(
                "{} samples but {} weights",
                x.len(),
                sample_weight.len()
            )));
        }
        if sample_weight.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidInput(
                "sample weights must be finite and non-negative".to_string(),
            ));
        }

        let indices: Vec<usize> = (0..x.len()).filter(|&i| sample_weight[i] > 0.0).collect();
        if indices.is_empty() {
            return Err(Error::InvalidInput("all sample weights are zero".to_string()));
        }

        self.classes = classes.to_vec();
        self.n_features = n_features;
        self.nodes.clear();

        let mut rng = match self.config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let ctx = FitContext {
            x,
            y_idx,
            weights: sample_weight,
            n_classes: classes.len(),
        };
        self.build_tree(&ctx, indices, 0, &mut rng);

        self.calculate_feature_importances();
        self.is_fitted = true;
        Ok(())
    }

    /// Per-class weight totals over `indices`
    fn class_weights(ctx: &FitContext<'_>, indices: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; ctx.n_classes];
        for &i in indices {
            counts[ctx.y_idx[i]] += ctx.weights[i];
        }
        counts
    }

    /// Find the best split for a node by sweeping each candidate feature in
    /// sorted order
    fn find_best_split(
        &self,
        ctx: &FitContext<'_>,
        indices: &[usize],
        parent_counts: &[f64],
        parent_weight: f64,
        rng: &mut StdRng,
    ) -> Option<Split> {
        let n_features = self.n_features;
        let criterion = self.config.criterion;
        let min_leaf = self.config.min_samples_leaf;
        let parent_impurity = criterion.impurity(parent_counts, parent_weight);

        // Select features to consider
        let features: Vec<usize> = match self.config.max_features {
            Some(k) if k < n_features => {
                let mut all: Vec<usize> = (0..n_features).collect();
                all.shuffle(rng);
                all.truncate(k);
                all
            }
            _ => (0..n_features).collect(),
        };

        let mut best_gain = 1e-12;
        let mut best: Option<(usize, f64)> = None;
        let mut order: Vec<usize> = indices.to_vec();

        for &feature in &features {
            order.sort_by(|&a, &b| ctx.x[a][feature].total_cmp(&ctx.x[b][feature]));

            let mut left_counts = vec![0.0; ctx.n_classes];
            let mut left_weight = 0.0;

            for pos in 0..order.len() - 1 {
                let i = order[pos];
                left_counts[ctx.y_idx[i]] += ctx.weights[i];
                left_weight += ctx.weights[i];

                let value = ctx.x[i][feature];
                let next = ctx.x[order[pos + 1]][feature];
                if next <= value {
                    continue;
                }

                let n_left = pos + 1;
                let n_right = order.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let right_weight = parent_weight - left_weight;
                if left_weight <= 0.0 || right_weight <= 0.0 {
                    continue;
                }
                let right_counts: Vec<f64> = parent_counts
                    .iter()
                    .zip(&left_counts)
                    .map(|(p, l)| (p - l).max(0.0))
                    .collect();

                let weighted_impurity = (left_weight * criterion.impurity(&left_counts, left_weight)
                    + right_weight * criterion.impurity(&right_counts, right_weight))
                    / parent_weight;
                let gain = parent_impurity - weighted_impurity;

                if gain > best_gain {
                    let mut threshold = (value + next) / 2.0;
                    // Adjacent floats can round the midpoint up onto `next`
                    if threshold >= next {
                        threshold = value;
                    }
                    best_gain = gain;
                    best = Some((feature, threshold));
                }
            }
        }

        let (feature, threshold) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| ctx.x[i][feature] <= threshold);
        if left.is_empty() || right.is_empty() {
            return None;
        }
        Some(Split {
            feature,
            threshold,
            left,
            right,
        })
    }

    /// Build the tree recursively, returning the index of the created node
    fn build_tree(
        &mut self,
        ctx: &FitContext<'_>,
        indices: Vec<usize>,
        depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let counts = Self::class_weights(ctx, &indices);
        let total_weight: f64 = counts.iter().sum();
        let impurity = self.config.criterion.impurity(&counts, total_weight);
        let class_probs: Vec<f64> = counts.iter().map(|&c| c / total_weight).collect();
        let n_samples = indices.len();

        let should_stop = self.config.max_depth.map(|d| depth >= d).unwrap_or(false)
            || n_samples < self.config.min_samples_split
            || n_samples < 2 * self.config.min_samples_leaf
            || counts.iter().filter(|&&c| c > 0.0).count() <= 1;

        let split = if should_stop {
            None
        } else {
            self.find_best_split(ctx, &indices, &counts, total_weight, rng)
        };

        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::new_leaf(
            class_probs,
            n_samples,
            total_weight,
            impurity,
            depth,
        ));

        if let Some(split) = split {
            let left_child = self.build_tree(ctx, split.left, depth + 1, rng);
            let right_child = self.build_tree(ctx, split.right, depth + 1, rng);

            let node = &mut self.nodes[node_idx];
            node.feature_index = Some(split.feature);
            node.threshold = Some(split.threshold);
            node.left_child = Some(left_child);
            node.right_child = Some(right_child);
            node.is_leaf = false;
        }

        node_idx
    }

    /// Leaf probabilities for a single sample
    pub(crate) fn predict_proba_single(&self, sample: &[f64]) -> &[f64] {
        let mut node_idx = 0;
        loop {
            let node = &self.nodes[node_idx];
            match (node.feature_index, node.threshold, node.left_child, node.right_child) {
                (Some(feature), Some(threshold), Some(left), Some(right)) if !node.is_leaf => {
                    node_idx = if sample[feature] <= threshold { left } else { right };
                }
                _ => return &node.class_probs,
            }
        }
    }

    /// Calculate feature importances from the weighted impurity decrease
    fn calculate_feature_importances(&mut self) {
        let mut importances = vec![0.0f64; self.n_features];
        let total_weight = self.nodes.first().map(|n| n.weight).unwrap_or(1.0);

        for node in &self.nodes {
            if let (Some(feature), Some(left), Some(right)) =
                (node.feature_index, node.left_child, node.right_child)
            {
                let l = &self.nodes[left];
                let r = &self.nodes[right];
                let decrease = (node.weight * node.impurity
                    - l.weight * l.impurity
                    - r.weight * r.impurity)
                    / total_weight;
                importances[feature] += decrease.max(0.0);
            }
        }

        // Normalize
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut importances {
                *imp /= sum;
            }
        }

        self.feature_importances_ = Some(importances);
    }
}

struct FitContext<'a> {
    x: &'a [Vec<f64>],
    y_idx: &'a [usize],
    weights: &'a [f64],
    n_classes: usize,
}

impl Classifier for DecisionTreeClassifier {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        let weights = vec![1.0; x.len()];
        self.fit_weighted(x, y, &weights)
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if !self.is_fitted {
            return Err(Error::NotFitted("DecisionTreeClassifier".to_string()));
        }
        check_width(x, self.n_features)?;
        check_finite(x)?;
        Ok(x.iter()
            .map(|sample| self.predict_proba_single(sample).to_vec())
            .collect())
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        self.config.set_param(name, value)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.feature_importances_.clone()
    }
}
