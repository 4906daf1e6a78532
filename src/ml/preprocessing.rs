//! Preprocessing module
//!
//! Imputation and scaling of numeric feature matrices. Every transformer
//! learns its statistics in `fit` and applies them in `transform`.

use serde::{Deserialize, Serialize};

use crate::error::{check_xy, Error, Result};
use crate::ml::models::{unknown_param, ParamValue};
use crate::ml::pipeline::Transformer;

/// Checks the width of a matrix passed to `transform`
pub(crate) fn check_fitted_width(x: &[Vec<f64>], fitted: Option<usize>, name: &str) -> Result<()> {
    let expected = fitted.ok_or_else(|| Error::NotFitted(name.to_string()))?;
    let width = check_xy(x, None)?;
    if width != expected {
        return Err(Error::DimensionMismatch(format!(
            "{} was fitted with {} columns, got {}",
            name, expected, width
        )));
    }
    Ok(())
}

/// Non-missing values of column `j`
fn observed(x: &[Vec<f64>], j: usize) -> Vec<f64> {
    x.iter().map(|row| row[j]).filter(|v| !v.is_nan()).collect()
}

/// Value used by [`SimpleImputer`] to fill missing entries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    #[default]
    Mean,
    Median,
    MostFrequent,
    Constant(f64),
}

impl ImputeStrategy {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "mean" => Ok(ImputeStrategy::Mean),
            "median" => Ok(ImputeStrategy::Median),
            "most_frequent" => Ok(ImputeStrategy::MostFrequent),
            other => Err(Error::InvalidParameter(format!(
                "unknown imputation strategy '{}'",
                other
            ))),
        }
    }

    fn fill_value(self, values: &mut [f64]) -> f64 {
        if let ImputeStrategy::Constant(c) = self {
            return c;
        }
        if values.is_empty() {
            return 0.0;
        }
        match self {
            ImputeStrategy::Mean => values.iter().sum::<f64>() / values.len() as f64,
            ImputeStrategy::Median => {
                values.sort_by(|a, b| a.total_cmp(b));
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    (values[mid - 1] + values[mid]) / 2.0
                } else {
                    values[mid]
                }
            }
            ImputeStrategy::MostFrequent => {
                // sorted runs; the smallest value wins a tie
                values.sort_by(|a, b| a.total_cmp(b));
                let mut best = values[0];
                let mut best_count = 0;
                let mut start = 0;
                while start < values.len() {
                    let mut end = start;
                    while end < values.len() && values[end] == values[start] {
                        end += 1;
                    }
                    if end - start > best_count {
                        best_count = end - start;
                        best = values[start];
                    }
                    start = end;
                }
                best
            }
            ImputeStrategy::Constant(c) => c,
        }
    }
}

/// Replaces NaN entries with a per-column statistic
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimpleImputer {
    pub strategy: ImputeStrategy,
    statistics: Vec<f64>,
    n_features: Option<usize>,
}

impl SimpleImputer {
    pub fn new(strategy: ImputeStrategy) -> Self {
        SimpleImputer {
            strategy,
            ..Default::default()
        }
    }

    /// Learned fill value of each column
    pub fn statistics(&self) -> &[f64] {
        &self.statistics
    }
}

impl Transformer for SimpleImputer {
    fn fit(&mut self, x: &[Vec<f64>], _y: &[f64]) -> Result<()> {
        let width = check_xy(x, None)?;
        self.statistics = (0..width)
            .map(|j| self.strategy.fill_value(&mut observed(x, j)))
            .collect();
        self.n_features = Some(width);
        Ok(())
    }

    fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        check_fitted_width(x, self.n_features, "SimpleImputer")?;
        Ok(x.iter()
            .map(|row| {
                row.iter()
                    .zip(&self.statistics)
                    .map(|(&v, &fill)| if v.is_nan() { fill } else { v })
                    .collect()
            })
            .collect())
    }

    fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match (name, value) {
            ("strategy", ParamValue::Float(c)) => self.strategy = ImputeStrategy::Constant(*c),
            ("strategy", ParamValue::Int(c)) => self.strategy = ImputeStrategy::Constant(*c as f64),
            ("strategy", v) => self.strategy = ImputeStrategy::parse(v.as_str(name)?)?,
            ("fill_value", v) => self.strategy = ImputeStrategy::Constant(v.as_f64(name)?),
            _ => return Err(unknown_param("SimpleImputer", name)),
        }
        Ok(())
    }
}

/// Standardizes columns to zero mean and unit variance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub with_mean: bool,
    pub with_std: bool,
    means: Vec<f64>,
    scales: Vec<f64>,
    n_features: Option<usize>,
}

impl Default for StandardScaler {
    fn default() -> Self {
        StandardScaler {
            with_mean: true,
            with_std: true,
            means: Vec::new(),
            scales: Vec::new(),
            n_features: None,
        }
    }
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    /// Population standard deviation per column; 1.0 for constant columns
    pub fn scales(&self) -> &[f64] {
        &self.scales
    }
}

impl Transformer for StandardScaler {
    fn fit(&mut self, x: &[Vec<f64>], _y: &[f64]) -> Result<()> {
        let width = check_xy(x, None)?;
        self.means.clear();
        self.scales.clear();
        for j in 0..width {
            let values = observed(x, j);
            let n = values.len().max(1) as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            self.means.push(mean);
            self.scales.push(if std > 0.0 { std } else { 1.0 });
        }
        self.n_features = Some(width);
        Ok(())
    }

    fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        check_fitted_width(x, self.n_features, "StandardScaler")?;
        Ok(x.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, &v)| {
                        let centred = if self.with_mean { v - self.means[j] } else { v };
                        if self.with_std {
                            centred / self.scales[j]
                        } else {
                            centred
                        }
                    })
                    .collect()
            })
            .collect())
    }

    fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "with_mean" => self.with_mean = value.as_bool(name)?,
            "with_std" => self.with_std = value.as_bool(name)?,
            _ => return Err(unknown_param("StandardScaler", name)),
        }
        Ok(())
    }
}

/// Rescales columns to the [0, 1] range seen during fit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinMaxScaler {
    mins: Vec<f64>,
    ranges: Vec<f64>,
    n_features: Option<usize>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transformer for MinMaxScaler {
    fn fit(&mut self, x: &[Vec<f64>], _y: &[f64]) -> Result<()> {
        let width = check_xy(x, None)?;
        self.mins.clear();
        self.ranges.clear();
        for j in 0..width {
            let values = observed(x, j);
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            if values.is_empty() {
                self.mins.push(0.0);
                self.ranges.push(0.0);
            } else {
                self.mins.push(min);
                self.ranges.push(max - min);
            }
        }
        self.n_features = Some(width);
        Ok(())
    }

    fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        check_fitted_width(x, self.n_features, "MinMaxScaler")?;
        Ok(x.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, &v)| {
                        if self.ranges[j] > 0.0 {
                            (v - self.mins[j]) / self.ranges[j]
                        } else if v.is_nan() {
                            v
                        } else {
                            0.0
                        }
                    })
                    .collect()
            })
            .collect())
    }

    fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }

    fn set_param(&mut self, name: &str, _value: &ParamValue) -> Result<()> {
        Err(unknown_param("MinMaxScaler", name))
    }
}
