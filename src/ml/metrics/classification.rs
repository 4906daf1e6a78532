//! Metrics for evaluating classification models

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> (Vec<bool>, Vec<bool>) {
        let true_labels = vec![true, false, true, true, false, false];
        let pred_labels = vec![true, false, false, true, true, false];
        (true_labels, pred_labels)
    }

    #[test]
    fn test_accuracy_score() {
        let (true_labels, pred_labels) = labels();
        let accuracy = accuracy_score(&true_labels, &pred_labels).unwrap();
        assert!((accuracy - 0.6666666).abs() < 1e-6); // 4/6 = 0.6666...
    }

    #[test]
    fn test_precision_score() {
        let (true_labels, pred_labels) = labels();
        let precision = precision_score(&true_labels, &pred_labels).unwrap();
        assert!((precision - 0.6666666).abs() < 1e-6); // TP=2, FP=1, 2/(2+1) = 0.6666...
    }

    #[test]
    fn test_recall_score() {
        let (true_labels, pred_labels) = labels();
        let recall = recall_score(&true_labels, &pred_labels).unwrap();
        assert!((recall - 0.6666666).abs() < 1e-6); // TP=2, FN=1, 2/(2+1) = 0.6666...
    }

    #[test]
    fn test_f1_score() {
        let (true_labels, pred_labels) = labels();
        let f1 = f1_score(&true_labels, &pred_labels).unwrap();
        assert!((f1 - 0.6666666).abs() < 1e-6);
    }

    #[test]
    fn test_confusion_matrix() {
        let (true_labels, pred_labels) = labels();
        let cm = confusion_matrix(&true_labels, &pred_labels).unwrap();
        assert_eq!(
            cm,
            ConfusionMatrix {
                tp: 2,
                fp: 1,
                tn: 2,
                fn_: 1
            }
        );
        assert_eq!(cm.total(), 6);
    }

    #[test]
    fn test_cost_weighted_score() {
        let (true_labels, pred_labels) = labels();
        // one false positive, one false negative
        let cost = cost_weighted_score(&true_labels, &pred_labels, 1.0, 5.0).unwrap();
        assert_eq!(cost, 6.0);

        let perfect = cost_weighted_score(&true_labels, &true_labels, 1.0, 5.0).unwrap();
        assert_eq!(perfect, 0.0);

        // all-negative predictions pay only false negatives
        let none = vec![false; 6];
        assert_eq!(
            cost_weighted_score(&true_labels, &none, 10.0, 2.5).unwrap(),
            7.5
        );

        assert!(cost_weighted_score(&true_labels, &pred_labels, -1.0, 1.0).is_err());
        assert!(cost_weighted_score(&true_labels, &pred_labels, 1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_zero_denominators() {
        let y_true = vec![false, false];
        let y_pred = vec![false, false];
        assert_eq!(precision_score(&y_true, &y_pred).unwrap(), 0.0);
        assert_eq!(recall_score(&y_true, &y_pred).unwrap(), 0.0);
        assert_eq!(f1_score(&y_true, &y_pred).unwrap(), 0.0);
    }

    #[test]
    fn test_empty_input() {
        let empty: Vec<bool> = vec![];

        let accuracy_result = accuracy_score(&empty, &empty);
        assert!(accuracy_result.is_err());

        let precision_result = precision_score(&empty, &empty);
        assert!(precision_result.is_err());

        assert!(cost_weighted_score(&empty, &empty, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_different_length() {
        let true_labels = vec![true, false, true];
        let pred_labels = vec![true, false];

        let accuracy_result = accuracy_score(&true_labels, &pred_labels);
        assert!(accuracy_result.is_err());

        let precision_result = precision_score(&true_labels, &pred_labels);
        assert!(precision_result.is_err());
    }

    #[test]
    fn test_to_binary() {
        assert_eq!(to_binary(&[1.0, 0.0, 2.0], 1.0), vec![true, false, false]);
    }
}

fn check_lengths<T>(y_true: &[T], y_pred: &[T]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(Error::DimensionMismatch(format!(
            "true and predicted labels differ in length: {} vs {}",
            y_true.len(),
            y_pred.len()
        )));
    }

    if y_true.is_empty() {
        return Err(Error::EmptyData(
            "cannot score an empty set of labels".to_string(),
        ));
    }
    Ok(())
}

/// Counts of a binary confusion matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[bool], y_pred: &[bool]) -> Result<Self> {
        check_lengths(y_true, y_pred)?;
        let mut cm = ConfusionMatrix::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t, p) {
                (true, true) => cm.tp += 1,
                (false, true) => cm.fp += 1,
                (false, false) => cm.tn += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }
}

/// Converts class labels to booleans: `true` where the label equals `positive`
pub fn to_binary(labels: &[f64], positive: f64) -> Vec<bool> {
    labels.iter().map(|&v| v == positive).collect()
}

/// Calculate accuracy
///
/// # Arguments
/// * `y_true` - true labels
/// * `y_pred` - predicted labels
///
/// # Returns
/// * `Result<f64>` - accuracy (0 to 1)
pub fn accuracy_score<T: PartialEq>(y_true: &[T], y_pred: &[T]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;

    let correct_count = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();

    Ok(correct_count as f64 / y_true.len() as f64)
}

/// Binary confusion matrix
pub fn confusion_matrix(y_true: &[bool], y_pred: &[bool]) -> Result<ConfusionMatrix> {
    ConfusionMatrix::from_labels(y_true, y_pred)
}

/// Calculate precision for binary classification
///
/// Returns 0.0 when nothing was predicted positive.
pub fn precision_score(y_true: &[bool], y_pred: &[bool]) -> Result<f64> {
    let cm = ConfusionMatrix::from_labels(y_true, y_pred)?;

    if cm.tp + cm.fp == 0 {
        return Ok(0.0);
    }

    Ok(cm.tp as f64 / (cm.tp + cm.fp) as f64)
}

/// Calculate recall for binary classification
///
/// Returns 0.0 when there are no actual positives.
pub fn recall_score(y_true: &[bool], y_pred: &[bool]) -> Result<f64> {
    let cm = ConfusionMatrix::from_labels(y_true, y_pred)?;

    if cm.tp + cm.fn_ == 0 {
        return Ok(0.0);
    }

    Ok(cm.tp as f64 / (cm.tp + cm.fn_) as f64)
}

/// Calculate the F1 score for binary classification
pub fn f1_score(y_true: &[bool], y_pred: &[bool]) -> Result<f64> {
    let precision = precision_score(y_true, y_pred)?;
    let recall = recall_score(y_true, y_pred)?;

    if precision + recall == 0.0 {
        return Ok(0.0);
    }

    Ok(2.0 * precision * recall / (precision + recall))
}

/// Business cost of a set of predictions:
/// `false_positives * cost_fp + false_negatives * cost_fn`.
///
/// Lower is better. Costs must be finite and non-negative.
pub fn cost_weighted_score(
    y_true: &[bool],
    y_pred: &[bool],
    cost_fp: f64,
    cost_fn: f64,
) -> Result<f64> {
    validate_costs(cost_fp, cost_fn)?;
    let cm = ConfusionMatrix::from_labels(y_true, y_pred)?;
    Ok(cm.fp as f64 * cost_fp + cm.fn_ as f64 * cost_fn)
}

pub(crate) fn validate_costs(cost_fp: f64, cost_fn: f64) -> Result<()> {
    for (name, cost) in [("cost_fp", cost_fp), ("cost_fn", cost_fn)] {
        if !cost.is_finite() || cost < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "{} must be a finite non-negative number, got {}",
                name, cost
            )));
        }
    }
    Ok(())
}
