//! Evaluation metrics for classification models
//!
//! The scoring functions live in [`classification`]. [`Scorer`] selects one of
//! them by name for cross-validation and model comparison.

pub mod classification;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use classification::{
    accuracy_score, confusion_matrix, cost_weighted_score, f1_score, precision_score,
    recall_score, to_binary, ConfusionMatrix,
};

/// Metric used to rank models
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum Scorer {
    Accuracy,
    Precision {
        #[serde(default = "default_positive_label")]
        positive_label: f64,
    },
    Recall {
        #[serde(default = "default_positive_label")]
        positive_label: f64,
    },
    F1 {
        #[serde(default = "default_positive_label")]
        positive_label: f64,
    },
    /// Total misclassification cost; lower is better
    Cost {
        cost_fp: f64,
        cost_fn: f64,
        #[serde(default = "default_positive_label")]
        positive_label: f64,
    },
}

fn default_positive_label() -> f64 {
    1.0
}

impl Default for Scorer {
    fn default() -> Self {
        Scorer::Accuracy
    }
}

impl Scorer {
    /// Looks a scorer up by name. `cost` needs explicit weights, so use
    /// [`Scorer::cost`] for it.
    pub fn from_name(name: &str) -> Result<Self> {
        let positive_label = default_positive_label();
        match name.to_lowercase().as_str() {
            "accuracy" => Ok(Scorer::Accuracy),
            "precision" => Ok(Scorer::Precision { positive_label }),
            "recall" => Ok(Scorer::Recall { positive_label }),
            "f1" => Ok(Scorer::F1 { positive_label }),
            other => Err(Error::InvalidParameter(format!(
                "unknown scorer '{}'",
                other
            ))),
        }
    }

    pub fn cost(cost_fp: f64, cost_fn: f64) -> Result<Self> {
        classification::validate_costs(cost_fp, cost_fn)?;
        Ok(Scorer::Cost {
            cost_fp,
            cost_fn,
            positive_label: default_positive_label(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scorer::Accuracy => "accuracy",
            Scorer::Precision { .. } => "precision",
            Scorer::Recall { .. } => "recall",
            Scorer::F1 { .. } => "f1",
            Scorer::Cost { .. } => "cost",
        }
    }

    /// Class treated as positive by the binary metrics
    pub fn positive_label(&self) -> f64 {
        match *self {
            Scorer::Accuracy => default_positive_label(),
            Scorer::Precision { positive_label }
            | Scorer::Recall { positive_label }
            | Scorer::F1 { positive_label }
            | Scorer::Cost { positive_label, .. } => positive_label,
        }
    }

    pub fn with_positive_label(self, label: f64) -> Self {
        match self {
            Scorer::Accuracy => Scorer::Accuracy,
            Scorer::Precision { .. } => Scorer::Precision {
                positive_label: label,
            },
            Scorer::Recall { .. } => Scorer::Recall {
                positive_label: label,
            },
            Scorer::F1 { .. } => Scorer::F1 {
                positive_label: label,
            },
            Scorer::Cost {
                cost_fp, cost_fn, ..
            } => Scorer::Cost {
                cost_fp,
                cost_fn,
                positive_label: label,
            },
        }
    }

    pub fn score(&self, y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
        let positive = self.positive_label();
        let binary = || (to_binary(y_true, positive), to_binary(y_pred, positive));
        match *self {
            Scorer::Accuracy => accuracy_score(y_true, y_pred),
            Scorer::Precision { .. } => {
                let (t, p) = binary();
                precision_score(&t, &p)
            }
            Scorer::Recall { .. } => {
                let (t, p) = binary();
                recall_score(&t, &p)
            }
            Scorer::F1 { .. } => {
                let (t, p) = binary();
                f1_score(&t, &p)
            }
            Scorer::Cost {
                cost_fp, cost_fn, ..
            } => {
                let (t, p) = binary();
                cost_weighted_score(&t, &p, cost_fp, cost_fn)
            }
        }
    }

    pub fn greater_is_better(&self) -> bool {
        !matches!(self, Scorer::Cost { .. })
    }

    /// True when `a` is strictly better than `b`
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        if self.greater_is_better() {
            a > b
        } else {
            a < b
        }
    }

    /// Worst possible value, used as the starting point when ranking
    pub fn worst(&self) -> f64 {
        if self.greater_is_better() {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        }
    }
}

impl fmt::Display for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scorer::Cost {
                cost_fp, cost_fn, ..
            } => write!(f, "cost(fp={}, fn={})", cost_fp, cost_fn),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Named evaluation results of a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    metrics: BTreeMap<String, f64>,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_metric(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.insert(name.into(), value);
    }

    pub fn get_metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }
}

impl fmt::Display for ModelMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.metrics {
            writeln!(f, "{:<16} {:.4}", name, value)?;
        }
        Ok(())
    }
}

/// Accuracy, precision, recall, F1 and confusion counts for a binary
/// problem. The cost is added when `costs` is `(cost_fp, cost_fn)`.
pub fn evaluate_binary(
    y_true: &[f64],
    y_pred: &[f64],
    positive_label: f64,
    costs: Option<(f64, f64)>,
) -> Result<ModelMetrics> {
    let t = to_binary(y_true, positive_label);
    let p = to_binary(y_pred, positive_label);
    let cm = ConfusionMatrix::from_labels(&t, &p)?;

    let mut metrics = ModelMetrics::new();
    metrics.add_metric("accuracy", accuracy_score(y_true, y_pred)?);
    metrics.add_metric("precision", precision_score(&t, &p)?);
    metrics.add_metric("recall", recall_score(&t, &p)?);
    metrics.add_metric("f1", f1_score(&t, &p)?);
    metrics.add_metric("tp", cm.tp as f64);
    metrics.add_metric("fp", cm.fp as f64);
    metrics.add_metric("tn", cm.tn as f64);
    metrics.add_metric("fn", cm.fn_ as f64);
    if let Some((cost_fp, cost_fn)) = costs {
        metrics.add_metric("cost", cost_weighted_score(&t, &p, cost_fp, cost_fn)?);
    }
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scorer_direction() {
        let acc = Scorer::Accuracy;
        assert!(acc.greater_is_better());
        assert!(acc.is_better(0.9, 0.8));
        assert!(!acc.is_better(0.8, 0.8));

        let cost = Scorer::cost(1.0, 5.0).unwrap();
        assert!(!cost.greater_is_better());
        assert!(cost.is_better(2.0, 3.0));
        assert_eq!(cost.worst(), f64::INFINITY);
        assert!(Scorer::cost(-1.0, 1.0).is_err());
    }

    #[test]
    fn test_scorer_score() {
        let y_true = vec![1.0, 0.0, 1.0, 1.0, 0.0, 0.0];
        let y_pred = vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0];

        let cost = Scorer::cost(1.0, 5.0).unwrap();
        assert_eq!(cost.score(&y_true, &y_pred).unwrap(), 6.0);

        let recall = Scorer::from_name("recall").unwrap();
        assert!((recall.score(&y_true, &y_pred).unwrap() - 2.0 / 3.0).abs() < 1e-12);

        // treating class 0 as positive flips the roles
        let recall0 = recall.with_positive_label(0.0);
        assert!((recall0.score(&y_true, &y_pred).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!(Scorer::from_name("auc").is_err());
    }

    #[test]
    fn test_scorer_deserialize() {
        let s: Scorer =
            serde_json::from_str(r#"{"metric":"cost","cost_fp":1.0,"cost_fn":10.0}"#).unwrap();
        assert_eq!(
            s,
            Scorer::Cost {
                cost_fp: 1.0,
                cost_fn: 10.0,
                positive_label: 1.0
            }
        );
        let s: Scorer = serde_json::from_str(r#"{"metric":"accuracy"}"#).unwrap();
        assert_eq!(s, Scorer::Accuracy);
    }

    #[test]
    fn test_evaluate_binary() {
        let y_true = vec![1.0, 0.0, 1.0, 1.0, 0.0, 0.0];
        let y_pred = vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        let metrics = evaluate_binary(&y_true, &y_pred, 1.0, Some((1.0, 5.0))).unwrap();
        assert_eq!(metrics.get_metric("tp"), Some(2.0));
        assert_eq!(metrics.get_metric("fn"), Some(1.0));
        assert_eq!(metrics.get_metric("cost"), Some(6.0));
        assert!(metrics.get_metric("auc").is_none());

        let metrics = evaluate_binary(&y_true, &y_pred, 1.0, None).unwrap();
        assert!(metrics.get_metric("cost").is_none());
    }
}
