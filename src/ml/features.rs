//! Turning tables into model inputs
//!
//! Raw records can be rolled up into one feature vector per entity with
//! [`EntityFeatureExtractor`] and labelled from a set of known positives.
//! [`Dataset::from_frame`] then picks the target and feature columns and
//! builds the numeric matrix every estimator consumes.

use std::collections::BTreeSet;
use std::path::Path;

use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dataframe::{format_float, Column, DataFrame};
use crate::error::{Error, Result};
use crate::groupby::AggregateSpec;
use crate::io::{read_csv, CsvOptions};

/// `output = numerator / denominator`, row by row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioSpec {
    pub numerator: String,
    pub denominator: String,
    pub output: String,
}

impl RatioSpec {
    pub fn new(
        numerator: impl Into<String>,
        denominator: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        RatioSpec {
            numerator: numerator.into(),
            denominator: denominator.into(),
            output: output.into(),
        }
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        df.with_ratio_column(&self.numerator, &self.denominator, &self.output)
    }
}

/// Aggregates raw records into one row per entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFeatureExtractor {
    /// Column identifying the entity, e.g. the source computer
    pub key: String,
    pub aggregates: Vec<AggregateSpec>,
    /// Ratios computed on the raw records before grouping
    #[serde(default)]
    pub ratios: Vec<RatioSpec>,
    /// Ratios computed on the aggregated columns
    #[serde(default)]
    pub derived: Vec<RatioSpec>,
}

impl EntityFeatureExtractor {
    pub fn new(key: impl Into<String>) -> Self {
        EntityFeatureExtractor {
            key: key.into(),
            aggregates: Vec::new(),
            ratios: Vec::new(),
            derived: Vec::new(),
        }
    }

    pub fn aggregate(mut self, spec: AggregateSpec) -> Self {
        self.aggregates.push(spec);
        self
    }

    pub fn ratio(mut self, spec: RatioSpec) -> Self {
        self.ratios.push(spec);
        self
    }

    pub fn derived(mut self, spec: RatioSpec) -> Self {
        self.derived.push(spec);
        self
    }

    /// One row per distinct key value, in sorted key order
    pub fn extract(&self, records: &DataFrame) -> Result<DataFrame> {
        let mut df = records.clone();
        for ratio in &self.ratios {
            df = ratio.apply(&df)?;
        }

        let mut features = df.groupby(&self.key)?.agg(&self.aggregates)?;
        for ratio in &self.derived {
            features = ratio.apply(&features)?;
        }

        info!(
            "extracted {} features for {} entities from {} records",
            features.column_count() - 1,
            features.row_count(),
            records.row_count()
        );
        Ok(features)
    }
}

/// Appends `label_column`: 1.0 where the entity key is in `positives`,
/// 0.0 otherwise
pub fn label_entities(
    df: &DataFrame,
    key: &str,
    positives: &BTreeSet<String>,
    label_column: &str,
) -> Result<DataFrame> {
    let keys = df.get_column_string_values(key)?;
    let labels: Vec<f64> = keys
        .iter()
        .map(|k| if positives.contains(k) { 1.0 } else { 0.0 })
        .collect();
    let n_positive = labels.iter().filter(|&&l| l == 1.0).count();
    if n_positive == 0 {
        warn!("no entity in '{}' matches the positive label set", key);
    }
    debug!(
        "labelled {} of {} entities positive",
        n_positive,
        labels.len()
    );

    let mut result = df.clone();
    result.add_column(label_column, Column::Float64(labels))?;
    Ok(result)
}

/// Reads the set of positive entity keys from one column of a CSV file.
/// Missing cells are skipped.
pub fn load_label_set<P: AsRef<Path>>(path: P, column: &str) -> Result<BTreeSet<String>> {
    let table = read_csv(path, &CsvOptions::default())?;
    let set: BTreeSet<String> = table
        .get_column_string_values(column)?
        .into_iter()
        .filter(|v| !v.is_empty())
        .collect();
    info!("loaded {} positive entities from '{}'", set.len(), column);
    Ok(set)
}

/// Which column holds the label and how to read it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub column: String,
    /// Values mapped to class 1.0; everything else becomes 0.0. When
    /// empty, the column must already be numeric.
    #[serde(default)]
    pub positive_values: Vec<String>,
}

impl TargetSpec {
    pub fn new(column: impl Into<String>) -> Self {
        TargetSpec {
            column: column.into(),
            positive_values: Vec::new(),
        }
    }

    pub fn with_positive_values<S: Into<String>>(mut self, values: Vec<S>) -> Self {
        self.positive_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Class label per row; NaN where the target is missing
    pub fn labels(&self, df: &DataFrame) -> Result<Vec<f64>> {
        if self.positive_values.is_empty() {
            return match df.column(&self.column)? {
                Column::Float64(values) => Ok(values.clone()),
                Column::String(_) => Err(Error::NotNumeric(format!(
                    "{} (set positive_values to map text labels)",
                    self.column
                ))),
            };
        }

        let column = df.column(&self.column)?;
        Ok((0..df.row_count())
            .map(|i| {
                let cell = column.cell_string(i).unwrap_or_default();
                if cell.is_empty() {
                    f64::NAN
                } else if self.positive_values.iter().any(|p| *p == cell) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect())
    }
}

/// Which columns become features
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Explicit feature columns
    #[serde(default)]
    pub columns: Vec<String>,
    /// Regular expression over column names
    #[serde(default)]
    pub pattern: Option<String>,
    /// Never used as features
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Row identifier column; never a feature
    #[serde(default)]
    pub key: Option<String>,
}

impl FeatureSpec {
    /// Every numeric column
    pub fn all_numeric() -> Self {
        FeatureSpec::default()
    }

    pub fn columns<S: Into<String>>(columns: Vec<S>) -> Self {
        FeatureSpec {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        FeatureSpec {
            pattern: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn excluding<S: Into<String>>(mut self, names: Vec<S>) -> Self {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    /// Feature column names in frame order
    pub fn resolve(&self, df: &DataFrame, target: &str) -> Result<Vec<String>> {
        if !self.columns.is_empty() && self.pattern.is_some() {
            return Err(Error::InvalidInput(
                "give either feature columns or a pattern, not both".to_string(),
            ));
        }

        let candidates: Vec<String> = if !self.columns.is_empty() {
            for name in &self.columns {
                df.column(name)?;
            }
            df.column_names()
                .iter()
                .filter(|c| self.columns.contains(c))
                .cloned()
                .collect()
        } else if let Some(pattern) = &self.pattern {
            let re = Regex::new(pattern)?;
            df.numeric_column_names()
                .into_iter()
                .filter(|c| re.is_match(c))
                .collect()
        } else {
            df.numeric_column_names()
        };

        let names: Vec<String> = candidates
            .into_iter()
            .filter(|c| c != target)
            .filter(|c| self.key.as_deref() != Some(c.as_str()))
            .filter(|c| !self.exclude.contains(c))
            .collect();

        if names.is_empty() {
            return Err(Error::EmptyData("no feature columns selected".to_string()));
        }
        Ok(names)
    }
}

/// Row-major matrix of the named columns
pub fn feature_matrix<S: AsRef<str>>(df: &DataFrame, names: &[S]) -> Result<Vec<Vec<f64>>> {
    let columns: Vec<Vec<f64>> = names
        .iter()
        .map(|n| df.get_column_numeric_values(n.as_ref()))
        .collect::<Result<_>>()?;
    Ok((0..df.row_count())
        .map(|i| columns.iter().map(|c| c[i]).collect())
        .collect())
}

/// Identifier of each row: the key column when given, the row number
/// otherwise
pub fn row_ids(df: &DataFrame, key: Option<&str>) -> Result<Vec<String>> {
    match key {
        Some(key) => df.get_column_string_values(key),
        None => Ok((0..df.row_count()).map(|i| i.to_string()).collect()),
    }
}

/// Feature matrix, class labels and bookkeeping for one modelling task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
    pub feature_names: Vec<String>,
    /// Row identifiers, from the feature spec's key column or row numbers
    pub ids: Vec<String>,
}

impl Dataset {
    /// Builds the dataset from a frame. Rows with a missing target are
    /// dropped; missing feature values are kept as NaN.
    pub fn from_frame(df: &DataFrame, target: &TargetSpec, features: &FeatureSpec) -> Result<Self> {
        let feature_names = features.resolve(df, &target.column)?;
        Self::from_columns(df, target, feature_names, features.key.as_deref())
    }

    /// Like [`Dataset::from_frame`] with an already resolved, ordered list
    /// of feature columns
    pub fn from_columns(
        df: &DataFrame,
        target: &TargetSpec,
        feature_names: Vec<String>,
        key: Option<&str>,
    ) -> Result<Self> {
        let labels = target.labels(df)?;
        let x_all = feature_matrix(df, &feature_names)?;
        let ids_all = row_ids(df, key)?;

        let keep: Vec<usize> = (0..labels.len()).filter(|&i| !labels[i].is_nan()).collect();
        let dropped = labels.len() - keep.len();
        if dropped > 0 {
            warn!(
                "dropped {} rows with a missing '{}' target",
                dropped, target.column
            );
        }
        if keep.is_empty() {
            return Err(Error::EmptyData(format!(
                "no rows with a value in target '{}'",
                target.column
            )));
        }

        let dataset = Dataset {
            x: keep.iter().map(|&i| x_all[i].clone()).collect(),
            y: keep.iter().map(|&i| labels[i]).collect(),
            feature_names,
            ids: keep.iter().map(|&i| ids_all[i].clone()).collect(),
        };
        debug!(
            "dataset: {} samples, {} features, classes {:?}",
            dataset.n_samples(),
            dataset.n_features(),
            dataset.class_counts()
        );
        Ok(dataset)
    }

    pub fn n_samples(&self) -> usize {
        self.y.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Rows at `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> Result<Dataset> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_samples()) {
            return Err(Error::IndexOutOfBounds {
                index: bad,
                size: self.n_samples(),
            });
        }
        Ok(Dataset {
            x: indices.iter().map(|&i| self.x[i].clone()).collect(),
            y: indices.iter().map(|&i| self.y[i]).collect(),
            feature_names: self.feature_names.clone(),
            ids: indices.iter().map(|&i| self.ids[i].clone()).collect(),
        })
    }

    /// `(class, count)` pairs in ascending class order
    pub fn class_counts(&self) -> Vec<(f64, usize)> {
        let mut counts: Vec<(f64, usize)> = Vec::new();
        for &label in &self.y {
            match counts.iter_mut().find(|(c, _)| *c == label) {
                Some((_, n)) => *n += 1,
                None => counts.push((label, 1)),
            }
        }
        counts.sort_by(|a, b| a.0.total_cmp(&b.0));
        counts
    }
}

/// String form of a class label for reports
pub fn class_name(label: f64) -> String {
    format_float(label)
}
