//! Feature selection transformers
//!
//! Both selectors keep a subset of the input columns in their original order.

use serde::{Deserialize, Serialize};

use crate::error::{check_finite, check_xy, Error, Result};
use crate::ml::models::{encode_labels, unique_classes, unknown_param, ParamValue};
use crate::ml::pipeline::Transformer;
use crate::ml::preprocessing::check_fitted_width;

/// JSON has no NaN or infinity: non-finite scores are written as null and
/// read back as NaN
mod scores_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(scores: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let values: Vec<Option<f64>> = scores
            .iter()
            .map(|s| if s.is_finite() { Some(*s) } else { None })
            .collect();
        values.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

fn select(x: &[Vec<f64>], support: &[usize]) -> Vec<Vec<f64>> {
    x.iter()
        .map(|row| support.iter().map(|&j| row[j]).collect())
        .collect()
}

/// Drops columns whose variance does not exceed a threshold
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VarianceThreshold {
    pub threshold: f64,
    variances: Vec<f64>,
    support: Vec<usize>,
    n_features: Option<usize>,
}

impl VarianceThreshold {
    pub fn new(threshold: f64) -> Self {
        VarianceThreshold {
            threshold,
            ..Default::default()
        }
    }

    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    /// Indices of the kept columns
    pub fn support(&self) -> &[usize] {
        &self.support
    }
}

impl Transformer for VarianceThreshold {
    fn fit(&mut self, x: &[Vec<f64>], _y: &[f64]) -> Result<()> {
        let width = check_xy(x, None)?;
        check_finite(x)?;
        if !(self.threshold >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "variance threshold must be non-negative, got {}",
                self.threshold
            )));
        }
        let n = x.len() as f64;
        self.variances = (0..width)
            .map(|j| {
                let mean = x.iter().map(|row| row[j]).sum::<f64>() / n;
                x.iter().map(|row| (row[j] - mean).powi(2)).sum::<f64>() / n
            })
            .collect();
        self.support = self
            .variances
            .iter()
            .enumerate()
            .filter(|(_, &v)| v > self.threshold)
            .map(|(j, _)| j)
            .collect();
        if self.support.is_empty() {
            return Err(Error::InsufficientData(format!(
                "no feature has variance above {}",
                self.threshold
            )));
        }
        log::debug!(
            "VarianceThreshold kept {} of {} features",
            self.support.len(),
            width
        );
        self.n_features = Some(width);
        Ok(())
    }

    fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        check_fitted_width(x, self.n_features, "VarianceThreshold")?;
        Ok(select(x, &self.support))
    }

    fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "threshold" => self.threshold = value.as_f64(name)?,
            _ => return Err(unknown_param("VarianceThreshold", name)),
        }
        Ok(())
    }

    fn output_features(&self, input_names: &[String]) -> Vec<String> {
        self.support
            .iter()
            .filter_map(|&j| input_names.get(j).cloned())
            .collect()
    }
}

/// Univariate scoring function for [`SelectKBest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFunc {
    /// ANOVA F statistic between the feature and the class labels
    #[default]
    FClassif,
}

/// ANOVA F statistic of every column against the class labels.
///
/// Constant columns score NaN. A column that separates the classes
/// perfectly scores infinity.
pub fn f_classif(x: &[Vec<f64>], y: &[f64]) -> Result<Vec<f64>> {
    let width = check_xy(x, Some(y.len()))?;
    check_finite(x)?;
    let classes = unique_classes(y)?;
    let y_idx = encode_labels(y, &classes)?;
    let k = classes.len();
    let n = x.len();
    if k < 2 || n <= k {
        return Ok(vec![f64::NAN; width]);
    }

    let mut counts = vec![0usize; k];
    for &c in &y_idx {
        counts[c] += 1;
    }

    Ok((0..width)
        .map(|j| {
            let overall = x.iter().map(|row| row[j]).sum::<f64>() / n as f64;
            let mut sums = vec![0.0; k];
            for (row, &c) in x.iter().zip(&y_idx) {
                sums[c] += row[j];
            }
            let means: Vec<f64> = sums
                .iter()
                .zip(&counts)
                .map(|(s, &cnt)| s / cnt as f64)
                .collect();

            let ss_between: f64 = means
                .iter()
                .zip(&counts)
                .map(|(m, &cnt)| cnt as f64 * (m - overall).powi(2))
                .sum();
            let ss_within: f64 = x
                .iter()
                .zip(&y_idx)
                .map(|(row, &c)| (row[j] - means[c]).powi(2))
                .sum();

            let ms_between = ss_between / (k - 1) as f64;
            let ms_within = ss_within / (n - k) as f64;
            if ms_within == 0.0 {
                if ms_between == 0.0 {
                    f64::NAN
                } else {
                    f64::INFINITY
                }
            } else {
                ms_between / ms_within
            }
        })
        .collect())
}

/// Keeps the `k` highest scoring columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectKBest {
    pub k: usize,
    pub score_func: ScoreFunc,
    #[serde(with = "scores_serde")]
    scores: Vec<f64>,
    support: Vec<usize>,
    n_features: Option<usize>,
}

impl Default for SelectKBest {
    fn default() -> Self {
        SelectKBest::new(10)
    }
}

impl SelectKBest {
    pub fn new(k: usize) -> Self {
        SelectKBest {
            k,
            score_func: ScoreFunc::FClassif,
            scores: Vec::new(),
            support: Vec::new(),
            n_features: None,
        }
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn support(&self) -> &[usize] {
        &self.support
    }
}

impl Transformer for SelectKBest {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if self.k == 0 {
            return Err(Error::InvalidParameter(
                "SelectKBest needs k >= 1".to_string(),
            ));
        }
        let width = check_xy(x, Some(y.len()))?;
        self.scores = match self.score_func {
            ScoreFunc::FClassif => f_classif(x, y)?,
        };

        let mut order: Vec<usize> = (0..width).collect();
        // NaN ranks last; equal scores keep the lower index first
        order.sort_by(|&a, &b| {
            let (sa, sb) = (self.scores[a], self.scores[b]);
            match (sa.is_nan(), sb.is_nan()) {
                (true, true) => a.cmp(&b),
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => sb.total_cmp(&sa).then(a.cmp(&b)),
            }
        });
        order.truncate(self.k.min(width));
        order.sort_unstable();
        self.support = order;
        self.n_features = Some(width);
        log::debug!(
            "SelectKBest kept features {:?} of {}",
            self.support,
            width
        );
        Ok(())
    }

    fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        check_fitted_width(x, self.n_features, "SelectKBest")?;
        Ok(select(x, &self.support))
    }

    fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "k" => self.k = value.as_usize(name)?,
            _ => return Err(unknown_param("SelectKBest", name)),
        }
        Ok(())
    }

    fn output_features(&self, input_names: &[String]) -> Vec<String> {
        self.support
            .iter()
            .filter_map(|&j| input_names.get(j).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn test_variance_threshold() {
        let x = vec![
            vec![0.0, 1.0, 5.0],
            vec![0.0, 2.0, 5.0],
            vec![0.0, 3.0, 5.1],
        ];
        let mut vt = VarianceThreshold::new(0.0);
        let out = vt.fit_transform(&x, &[]).unwrap();
        assert_eq!(vt.support(), &[1, 2]);
        assert_eq!(out[0], vec![1.0, 5.0]);
        assert_eq!(vt.output_features(&names(3)), vec!["f1", "f2"]);

        let mut strict = VarianceThreshold::new(0.5);
        strict.fit(&x, &[]).unwrap();
        assert_eq!(strict.support(), &[1]);

        let mut none = VarianceThreshold::new(10.0);
        assert!(none.fit(&x, &[]).is_err());
    }

    #[test]
    fn test_f_classif() {
        let x = vec![
            vec![1.0, 5.0, 3.0],
            vec![2.0, 5.0, 1.0],
            vec![10.0, 5.0, 2.0],
            vec![11.0, 5.0, 2.0],
        ];
        let y = vec![0.0, 0.0, 1.0, 1.0];
        let scores = f_classif(&x, &y).unwrap();
        // group means 1.5 / 10.5, overall 6; between = 81, within = 1
        assert!((scores[0] - 162.0).abs() < 1e-9);
        assert!(scores[1].is_nan());
        assert!(scores[2].is_finite());
        assert!(scores[2] < 1.0);
    }

    #[test]
    fn test_select_k_best() {
        let x = vec![
            vec![1.0, 5.0, 3.0, 0.0],
            vec![2.0, 5.0, 1.0, 0.1],
            vec![10.0, 5.0, 2.0, 5.0],
            vec![11.0, 5.0, 2.0, 5.2],
        ];
        let y = vec![0.0, 0.0, 1.0, 1.0];
        let mut skb = SelectKBest::new(2);
        let out = skb.fit_transform(&x, &y).unwrap();
        // columns keep their original order
        assert_eq!(skb.support(), &[0, 3]);
        assert_eq!(out[2], vec![10.0, 5.0]);
        assert_eq!(skb.scores().len(), 4);

        let mut all = SelectKBest::new(10);
        all.fit(&x, &y).unwrap();
        assert_eq!(all.support(), &[0, 1, 2, 3]);

        let mut zero = SelectKBest::new(0);
        assert!(matches!(zero.fit(&x, &y), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_select_k_best_ties_prefer_lower_index() {
        let x = vec![
            vec![0.0, 0.0, 1.0],
            vec![1.0, 1.0, 0.0],
            vec![5.0, 5.0, 1.0],
            vec![6.0, 6.0, 0.0],
        ];
        let y = vec![0.0, 0.0, 1.0, 1.0];
        let mut skb = SelectKBest::new(1);
        skb.fit(&x, &y).unwrap();
        assert_eq!(skb.support(), &[0]);
        assert_eq!(skb.output_features(&names(3)), vec!["f0"]);
    }

    #[test]
    fn test_select_k_best_serializes_nan_scores() {
        let x = vec![vec![1.0, 5.0], vec![2.0, 5.0], vec![8.0, 5.0], vec![9.0, 5.0]];
        let y = vec![0.0, 0.0, 1.0, 1.0];
        let mut skb = SelectKBest::new(1);
        skb.fit(&x, &y).unwrap();
        assert!(skb.scores()[1].is_nan());

        let json = serde_json::to_string(&skb).unwrap();
        let back: SelectKBest = serde_json::from_str(&json).unwrap();
        assert!(back.scores()[1].is_nan());
        assert_eq!(back.support(), &[0]);
        assert_eq!(back.transform(&x).unwrap(), skb.transform(&x).unwrap());
    }
}
