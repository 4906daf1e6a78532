use thiserror::Error;

/// Error type shared by every module of the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Duplicate column name: {0}")]
    DuplicateColumnName(String),

    #[error("Inconsistent row count: expected {expected}, found {found}")]
    InconsistentRowCount { expected: usize, found: usize },

    #[error("Column '{0}' is not numeric")]
    NotNumeric(String),

    #[error("Index out of bounds: index {index}, size {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Model has not been fitted: {0}")]
    NotFitted(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Computation error: {0}")]
    ComputationError(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Checks a feature matrix for the shape problems every estimator rejects:
/// no rows, ragged rows, zero width or a row count that differs from `y`.
pub(crate) fn check_xy(x: &[Vec<f64>], n_targets: Option<usize>) -> Result<usize> {
    let first = x
        .first()
        .ok_or_else(|| Error::EmptyData("feature matrix has no rows".to_string()))?;
    let width = first.len();
    if width == 0 {
        return Err(Error::EmptyData("feature matrix has no columns".to_string()));
    }
    if let Some(row) = x.iter().position(|r| r.len() != width) {
        return Err(Error::DimensionMismatch(format!(
            "row {} has {} features, expected {}",
            row,
            x[row].len(),
            width
        )));
    }
    if let Some(n) = n_targets {
        if n != x.len() {
            return Err(Error::DimensionMismatch(format!(
                "{} samples but {} targets",
                x.len(),
                n
            )));
        }
    }
    Ok(width)
}

/// Rejects matrices containing NaN or infinite values
pub(crate) fn check_finite(x: &[Vec<f64>]) -> Result<()> {
    for (i, row) in x.iter().enumerate() {
        if let Some(j) = row.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "non-finite value at row {}, feature {} (impute missing values first)",
                i, j
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_xy_shapes() {
        let x = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert_eq!(check_xy(&x, Some(2)).unwrap(), 2);
        assert!(matches!(
            check_xy(&x, Some(3)),
            Err(Error::DimensionMismatch(_))
        ));

        let ragged = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(check_xy(&ragged, None).is_err());

        let empty: Vec<Vec<f64>> = vec![];
        assert!(matches!(check_xy(&empty, None), Err(Error::EmptyData(_))));
    }

    #[test]
    fn test_check_finite() {
        assert!(check_finite(&[vec![1.0, 2.0]]).is_ok());
        assert!(check_finite(&[vec![1.0, f64::NAN]]).is_err());
    }
}
