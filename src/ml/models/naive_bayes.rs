//! Gaussian naive Bayes

use serde::{Deserialize, Serialize};

use crate::error::{check_finite, check_xy, Error, Result};
use crate::ml::models::{check_width, encode_labels, unique_classes, unknown_param, Classifier, ParamValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianNBConfig {
    /// Fraction of the largest feature variance added to every variance
    pub var_smoothing: f64,
}

impl Default for GaussianNBConfig {
    fn default() -> Self {
        GaussianNBConfig {
            var_smoothing: 1e-9,
        }
    }
}

/// Gaussian naive Bayes: features are independent normals within a class
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GaussianNB {
    config: GaussianNBConfig,
    classes: Vec<f64>,
    /// Per class, per feature
    means: Vec<Vec<f64>>,
    variances: Vec<Vec<f64>>,
    priors: Vec<f64>,
    n_features: usize,
    is_fitted: bool,
}

impl GaussianNB {
    pub fn new(config: GaussianNBConfig) -> Self {
        GaussianNB {
            config,
            ..Default::default()
        }
    }

    pub fn priors(&self) -> &[f64] {
        &self.priors
    }

    pub fn means(&self) -> &[Vec<f64>] {
        &self.means
    }

    fn joint_log_likelihood(&self, sample: &[f64]) -> Vec<f64> {
        (0..self.classes.len())
            .map(|c| {
                let log_prior = self.priors[c].ln();
                let log_likelihood: f64 = sample
                    .iter()
                    .zip(&self.means[c])
                    .zip(&self.variances[c])
                    .map(|((x, mean), var)| {
                        -0.5 * (2.0 * std::f64::consts::PI * var).ln()
                            - (x - mean).powi(2) / (2.0 * var)
                    })
                    .sum();
                log_prior + log_likelihood
            })
            .collect()
    }
}

/// Mean and population variance of each column
fn column_moments(rows: &[&Vec<f64>], n_features: usize) -> (Vec<f64>, Vec<f64>) {
    let n = rows.len() as f64;
    let mut means = vec![0.0; n_features];
    for row in rows {
        for (m, v) in means.iter_mut().zip(row.iter()) {
            *m += v / n;
        }
    }
    let mut vars = vec![0.0; n_features];
    for row in rows {
        for ((var, v), m) in vars.iter_mut().zip(row.iter()).zip(&means) {
            *var += (v - m).powi(2) / n;
        }
    }
    (means, vars)
}

impl Classifier for GaussianNB {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        let n_features = check_xy(x, Some(y.len()))?;
        check_finite(x)?;
        if !(self.config.var_smoothing >= 0.0 && self.config.var_smoothing.is_finite()) {
            return Err(Error::InvalidParameter(
                "var_smoothing must be non-negative".to_string(),
            ));
        }
        let classes = unique_classes(y)?;
        let y_idx = encode_labels(y, &classes)?;

        let all_rows: Vec<&Vec<f64>> = x.iter().collect();
        let (_, overall_var) = column_moments(&all_rows, n_features);
        let max_var = overall_var.iter().cloned().fold(0.0, f64::max);
        // keeps variances positive even for constant features
        let epsilon = (self.config.var_smoothing * max_var).max(f64::MIN_POSITIVE * 1e10);

        self.means.clear();
        self.variances.clear();
        self.priors.clear();
        for c in 0..classes.len() {
            let rows: Vec<&Vec<f64>> = x
                .iter()
                .zip(&y_idx)
                .filter(|(_, &label)| label == c)
                .map(|(row, _)| row)
                .collect();
            let (means, vars) = column_moments(&rows, n_features);
            self.priors.push(rows.len() as f64 / x.len() as f64);
            self.means.push(means);
            self.variances.push(vars.into_iter().map(|v| v + epsilon).collect());
        }

        self.classes = classes;
        self.n_features = n_features;
        self.is_fitted = true;
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if !self.is_fitted {
            return Err(Error::NotFitted("GaussianNB".to_string()));
        }
        check_width(x, self.n_features)?;
        check_finite(x)?;

        Ok(x.iter()
            .map(|sample| {
                let jll = self.joint_log_likelihood(sample);
                let max = jll.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let log_norm = max + jll.iter().map(|v| (v - max).exp()).sum::<f64>().ln();
                jll.iter().map(|v| (v - log_norm).exp()).collect()
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
        match name {
            "var_smoothing" => self.config.var_smoothing = value.as_f64(name)?,
            _ => return Err(unknown_param("GaussianNB", name)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_nb() {
        let x = vec![
            vec![1.0, 20.0],
            vec![1.2, 21.0],
            vec![0.8, 19.0],
            vec![5.0, 40.0],
            vec![5.5, 41.0],
            vec![4.5, 39.0],
        ];
        let y = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut nb = GaussianNB::default();
        nb.fit(&x, &y).unwrap();

        assert_eq!(nb.priors(), &[0.5, 0.5]);
        assert!((nb.means()[0][0] - 1.0).abs() < 1e-12);

        assert_eq!(nb.predict(&[vec![1.1, 20.5], vec![5.2, 40.5]]).unwrap(), vec![0.0, 1.0]);
        for p in nb.predict_proba(&x).unwrap() {
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_feature_is_smoothed() {
        let x = vec![vec![1.0, 0.0], vec![1.0, 1.0], vec![1.0, 5.0], vec![1.0, 6.0]];
        let y = vec![0.0, 0.0, 1.0, 1.0];
        let mut nb = GaussianNB::default();
        nb.fit(&x, &y).unwrap();
        let probs = nb.predict_proba(&[vec![1.0, 0.5]]).unwrap();
        assert!(probs[0].iter().all(|p| p.is_finite()));
        assert_eq!(nb.predict(&[vec![1.0, 5.5]]).unwrap(), vec![1.0]);
    }

    #[test]
    fn test_not_fitted() {
        let nb = GaussianNB::default();
        assert!(matches!(
            nb.predict_proba(&[vec![1.0]]),
            Err(Error::NotFitted(_))
        ));
    }
}
