//! Model selection: data splitting, cross-validation and grid search

use std::collections::BTreeMap;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ml::features::Dataset;
use crate::ml::metrics::Scorer;
use crate::ml::models::{encode_labels, unique_classes, ParamValue};
use crate::ml::pipeline::Pipeline;
use crate::parallel::par_map_jobs;

/// Train and test row indices of one split
pub type Split = (Vec<usize>, Vec<usize>);

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Row indices grouped by class, classes in ascending order
fn indices_by_class(y: &[f64]) -> Result<Vec<Vec<usize>>> {
    let classes = unique_classes(y)?;
    let encoded = encode_labels(y, &classes)?;
    let mut groups = vec![Vec::new(); classes.len()];
    for (i, c) in encoded.into_iter().enumerate() {
        groups[c].push(i);
    }
    Ok(groups)
}

/// Splits `0..n_samples` into shuffled train and test indices.
///
/// The test set holds `round(n_samples * test_size)` rows, at least one and
/// at most `n_samples - 1`. With `stratify`, each class contributes
/// `round(class_count * test_size)` rows so class proportions carry over.
pub fn train_test_split(
    n_samples: usize,
    test_size: f64,
    random_seed: Option<u64>,
    stratify: Option<&[f64]>,
) -> Result<Split> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(Error::InvalidParameter(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }
    if n_samples < 2 {
        return Err(Error::InsufficientData(format!(
            "cannot split {} samples into train and test sets",
            n_samples
        )));
    }

    let mut rng = make_rng(random_seed);

    let Some(labels) = stratify else {
        let n_test = ((n_samples as f64 * test_size).round() as usize).clamp(1, n_samples - 1);
        let mut indices: Vec<usize> = (0..n_samples).collect();
        indices.shuffle(&mut rng);
        let train = indices.split_off(n_test);
        return Ok((train, indices));
    };

    if labels.len() != n_samples {
        return Err(Error::DimensionMismatch(format!(
            "stratify has {} labels for {} samples",
            labels.len(),
            n_samples
        )));
    }

    let mut groups = indices_by_class(labels)?;
    let mut n_test: Vec<usize> = groups
        .iter()
        .map(|g| ((g.len() as f64 * test_size).round() as usize).min(g.len()))
        .collect();

    // keep both sides non-empty; adjust the largest class
    let largest = (0..groups.len())
        .max_by(|&a, &b| groups[a].len().cmp(&groups[b].len()).then(b.cmp(&a)))
        .unwrap_or(0);
    let total: usize = n_test.iter().sum();
    if total == 0 {
        n_test[largest] = 1;
    } else if total == n_samples {
        n_test[largest] -= 1;
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for (group, &k) in groups.iter_mut().zip(&n_test) {
        group.shuffle(&mut rng);
        test.extend_from_slice(&group[..k]);
        train.extend_from_slice(&group[k..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    Ok((train, test))
}

/// Produces cross-validation splits for a label vector
pub trait CrossValidator {
    fn n_splits(&self) -> usize;

    fn split(&self, y: &[f64]) -> Result<Vec<Split>>;
}

fn check_n_splits(n_splits: usize, available: usize, what: &str) -> Result<()> {
    if n_splits < 2 {
        return Err(Error::InvalidParameter(format!(
            "n_splits must be at least 2, got {}",
            n_splits
        )));
    }
    if n_splits > available {
        return Err(Error::InsufficientData(format!(
            "n_splits = {} exceeds the {} ({})",
            n_splits, what, available
        )));
    }
    Ok(())
}

/// Turns an ordered sequence of indices into folds: position `p` goes to
/// fold `p % n_splits`, so fold sizes differ by at most one.
fn assign_folds(order: &[usize], n_samples: usize, n_splits: usize) -> Vec<Split> {
    let mut fold_of = vec![0; n_samples];
    for (p, &i) in order.iter().enumerate() {
        fold_of[i] = p % n_splits;
    }
    (0..n_splits)
        .map(|f| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..n_samples).partition(|&i| fold_of[i] == f);
            (train, test)
        })
        .collect()
}

/// K consecutive folds, optionally over a shuffled order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KFold {
    pub n_splits: usize,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        KFold {
            n_splits,
            shuffle: false,
            random_seed: None,
        }
    }

    pub fn shuffled(mut self, random_seed: Option<u64>) -> Self {
        self.shuffle = true;
        self.random_seed = random_seed;
        self
    }
}

impl CrossValidator for KFold {
    fn n_splits(&self) -> usize {
        self.n_splits
    }

    fn split(&self, y: &[f64]) -> Result<Vec<Split>> {
        let n = y.len();
        check_n_splits(self.n_splits, n, "number of samples")?;

        let mut order: Vec<usize> = (0..n).collect();
        if self.shuffle {
            order.shuffle(&mut make_rng(self.random_seed));
        }

        // contiguous blocks, the first n % k one element larger
        let base = n / self.n_splits;
        let extra = n % self.n_splits;
        let mut fold_of = vec![0; n];
        let mut start = 0;
        for f in 0..self.n_splits {
            let size = base + usize::from(f < extra);
            for &i in &order[start..start + size] {
                fold_of[i] = f;
            }
            start += size;
        }
        Ok((0..self.n_splits)
            .map(|f| {
                let (test, train): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| fold_of[i] == f);
                (train, test)
            })
            .collect())
    }
}

/// K folds that preserve the class proportions of `y`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratifiedKFold {
    pub n_splits: usize,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        StratifiedKFold {
            n_splits,
            shuffle: false,
            random_seed: None,
        }
    }

    pub fn shuffled(mut self, random_seed: Option<u64>) -> Self {
        self.shuffle = true;
        self.random_seed = random_seed;
        self
    }
}

impl CrossValidator for StratifiedKFold {
    fn n_splits(&self) -> usize {
        self.n_splits
    }

    fn split(&self, y: &[f64]) -> Result<Vec<Split>> {
        let mut groups = indices_by_class(y)?;
        let smallest = groups.iter().map(Vec::len).min().unwrap_or(0);
        check_n_splits(self.n_splits, smallest, "smallest class count")?;

        if self.shuffle {
            let mut rng = make_rng(self.random_seed);
            for group in &mut groups {
                group.shuffle(&mut rng);
            }
        }
        let order: Vec<usize> = groups.into_iter().flatten().collect();
        Ok(assign_folds(&order, y.len(), self.n_splits))
    }
}

/// Cross-validation strategy chosen in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CvStrategy {
    KFold(KFold),
    StratifiedKFold(StratifiedKFold),
}

impl CrossValidator for CvStrategy {
    fn n_splits(&self) -> usize {
        match self {
            CvStrategy::KFold(cv) => cv.n_splits(),
            CvStrategy::StratifiedKFold(cv) => cv.n_splits(),
        }
    }

    fn split(&self, y: &[f64]) -> Result<Vec<Split>> {
        match self {
            CvStrategy::KFold(cv) => cv.split(y),
            CvStrategy::StratifiedKFold(cv) => cv.split(y),
        }
    }
}

fn score_splits(
    pipeline: &Pipeline,
    dataset: &Dataset,
    splits: &[Split],
    scorer: &Scorer,
) -> Result<Vec<f64>> {
    splits
        .iter()
        .enumerate()
        .map(|(fold, (train_idx, test_idx))| {
            let train = dataset.subset(train_idx)?;
            let test = dataset.subset(test_idx)?;
            if train.class_counts().len() < 2 {
                warn!("fold {} trains on a single class", fold);
            }

            let mut model = pipeline.clone();
            model.fit(&train.x, &train.y)?;
            let predicted = model.predict(&test.x)?;
            let score = scorer.score(&test.y, &predicted)?;
            debug!("fold {}: {} = {:.4}", fold, scorer.name(), score);
            Ok(score)
        })
        .collect()
}

/// Fits a fresh copy of `pipeline` on each training fold and scores it on
/// the matching test fold
pub fn cross_val_score<C: CrossValidator + ?Sized>(
    pipeline: &Pipeline,
    dataset: &Dataset,
    cv: &C,
    scorer: &Scorer,
) -> Result<Vec<f64>> {
    let splits = cv.split(&dataset.y)?;
    score_splits(pipeline, dataset, &splits, scorer)
}

/// Candidate values per parameter. Parameters address pipeline steps as
/// `<step>__<param>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid {
    params: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<V: Into<ParamValue>>(mut self, name: impl Into<String>, values: Vec<V>) -> Self {
        self.params
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Every combination, in sorted parameter-name order with the last
    /// name varying fastest. An empty grid yields one empty candidate.
    pub fn candidates(&self) -> Result<Vec<BTreeMap<String, ParamValue>>> {
        let mut combos = vec![BTreeMap::new()];
        for (name, values) in &self.params {
            if values.is_empty() {
                return Err(Error::InvalidParameter(format!(
                    "parameter '{}' has no candidate values",
                    name
                )));
            }
            combos = combos
                .into_iter()
                .flat_map(|combo| {
                    values.iter().map(move |v| {
                        let mut next = combo.clone();
                        next.insert(name.clone(), v.clone());
                        next
                    })
                })
                .collect();
        }
        Ok(combos)
    }
}

impl From<BTreeMap<String, Vec<ParamValue>>> for ParamGrid {
    fn from(params: BTreeMap<String, Vec<ParamValue>>) -> Self {
        ParamGrid { params }
    }
}

/// Cross-validation outcome of one grid candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvResult {
    pub params: BTreeMap<String, ParamValue>,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    /// 1 is best; equal means share a rank
    pub rank: usize,
}

/// Exhaustive search over a [`ParamGrid`] using cross-validation
#[derive(Debug, Clone)]
pub struct GridSearchCV {
    base: Pipeline,
    grid: ParamGrid,
    cv: CvStrategy,
    scorer: Scorer,
    n_jobs: usize,
    refit: bool,
    cv_results: Vec<CvResult>,
    best_index: Option<usize>,
    best_estimator: Option<Pipeline>,
}

impl GridSearchCV {
    pub fn new(base: Pipeline, grid: ParamGrid, cv: CvStrategy, scorer: Scorer) -> Self {
        GridSearchCV {
            base,
            grid,
            cv,
            scorer,
            n_jobs: 1,
            refit: true,
            cv_results: Vec::new(),
            best_index: None,
            best_estimator: None,
        }
    }

    /// Worker threads for candidate evaluation; 0 uses every core
    pub fn n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Whether to refit the best candidate on the whole dataset
    pub fn refit(mut self, refit: bool) -> Self {
        self.refit = refit;
        self
    }

    fn configured(&self, params: &BTreeMap<String, ParamValue>) -> Result<Pipeline> {
        let mut pipeline = self.base.clone();
        for (name, value) in params {
            pipeline.set_param(name, value)?;
        }
        Ok(pipeline)
    }

    pub fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        let candidates = self.grid.candidates()?;
        let splits = self.cv.split(&dataset.y)?;
        info!(
            "grid search: {} candidates x {} folds, scoring {}",
            candidates.len(),
            splits.len(),
            self.scorer
        );

        let outcomes = par_map_jobs(self.n_jobs, &candidates, |params| {
            let pipeline = self.configured(params)?;
            score_splits(&pipeline, dataset, &splits, &self.scorer)
        })?;

        let mut results = Vec::with_capacity(candidates.len());
        for (params, outcome) in candidates.into_iter().zip(outcomes) {
            let fold_scores = outcome?;
            let n = fold_scores.len() as f64;
            let mean_score = fold_scores.iter().sum::<f64>() / n;
            let std_score =
                (fold_scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n).sqrt();
            debug!("candidate {:?}: mean {:.4}", params, mean_score);
            results.push(CvResult {
                params,
                fold_scores,
                mean_score,
                std_score,
                rank: 0,
            });
        }

        let means: Vec<f64> = results.iter().map(|r| r.mean_score).collect();
        for r in results.iter_mut() {
            r.rank = 1 + means
                .iter()
                .filter(|&&m| self.scorer.is_better(m, r.mean_score))
                .count();
        }

        // earliest candidate wins ties
        let mut best = 0;
        let mut best_score = self.scorer.worst();
        for (i, &m) in means.iter().enumerate() {
            if self.scorer.is_better(m, best_score) {
                best = i;
                best_score = m;
            }
        }
        self.cv_results = results;
        self.best_index = Some(best);
        info!(
            "best candidate {:?} with mean {} {:.4}",
            self.cv_results[best].params,
            self.scorer.name(),
            self.cv_results[best].mean_score
        );

        self.best_estimator = if self.refit {
            let mut pipeline = self.configured(&self.cv_results[best].params)?;
            pipeline.fit(&dataset.x, &dataset.y)?;
            Some(pipeline)
        } else {
            None
        };
        Ok(())
    }

    pub fn cv_results(&self) -> &[CvResult] {
        &self.cv_results
    }

    pub fn best_params(&self) -> Option<&BTreeMap<String, ParamValue>> {
        self.best_index.map(|i| &self.cv_results[i].params)
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_index.map(|i| self.cv_results[i].mean_score)
    }

    /// The best candidate refitted on the full dataset, when `refit` is on
    pub fn best_estimator(&self) -> Option<&Pipeline> {
        self.best_estimator.as_ref()
    }

    pub fn into_best_estimator(self) -> Option<Pipeline> {
        self.best_estimator
    }
}
