use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::base::{Column, DataFrame};
use crate::error::{Error, Result};

/// Indicator categories kept for one one-hot encoded column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DummyEncoding {
    pub column: String,
    pub categories: Vec<String>,
}

impl DataFrame {
    /// Adds `output = numerator / denominator` row by row.
    /// A zero or missing denominator yields NaN.
    pub fn with_ratio_column(
        &self,
        numerator: &str,
        denominator: &str,
        output: &str,
    ) -> Result<DataFrame> {
        let num = self.get_column_numeric_values(numerator)?;
        let den = self.get_column_numeric_values(denominator)?;
        let ratio: Vec<f64> = num
            .iter()
            .zip(den.iter())
            .map(|(&n, &d)| if d == 0.0 || d.is_nan() { f64::NAN } else { n / d })
            .collect();

        let mut result = self.clone();
        result.add_column(output, Column::Float64(ratio))?;
        Ok(result)
    }

    /// One-hot encodes string columns into `<column>_<category>` indicator
    /// columns (1.0 / 0.0). Categories are sorted; empty cells match none.
    /// The encoded source columns are removed and the indicators are
    /// appended at the end of the frame.
    pub fn get_dummies<S: AsRef<str>>(&self, columns: &[S], drop_first: bool) -> Result<DataFrame> {
        let encodings = self.dummy_encodings(columns, drop_first)?;
        self.apply_dummies(&encodings)
    }

    /// The categories [`get_dummies`](DataFrame::get_dummies) would emit for
    /// each column, so the same encoding can be applied to other frames
    pub fn dummy_encodings<S: AsRef<str>>(
        &self,
        columns: &[S],
        drop_first: bool,
    ) -> Result<Vec<DummyEncoding>> {
        let mut encodings = Vec::with_capacity(columns.len());
        for name in columns {
            let name = name.as_ref();
            let categories: BTreeSet<&str> = self
                .string_column(name)?
                .iter()
                .map(String::as_str)
                .filter(|v| !v.is_empty())
                .collect();
            let skip = if drop_first { 1 } else { 0 };
            encodings.push(DummyEncoding {
                column: name.to_string(),
                categories: categories.into_iter().skip(skip).map(str::to_string).collect(),
            });
        }
        Ok(encodings)
    }

    /// One-hot encodes against fixed categories. Values outside an
    /// encoding's categories get 0.0 in every indicator.
    pub fn apply_dummies(&self, encodings: &[DummyEncoding]) -> Result<DataFrame> {
        let mut result = self.clone();
        for encoding in encodings {
            let values = self.string_column(&encoding.column)?;
            result = result.drop_columns(&[encoding.column.as_str()])?;
            for category in &encoding.categories {
                let indicator: Vec<f64> = values
                    .iter()
                    .map(|v| if v == category { 1.0 } else { 0.0 })
                    .collect();
                result.add_column(
                    format!("{}_{}", encoding.column, category),
                    Column::Float64(indicator),
                )?;
            }
        }
        Ok(result)
    }

    fn string_column(&self, name: &str) -> Result<&[String]> {
        match self.column(name)? {
            Column::String(values) => Ok(values),
            Column::Float64(_) => Err(Error::InvalidInput(format!(
                "column '{}' is numeric; only string columns can be one-hot encoded",
                name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_column() {
        let mut df = DataFrame::new();
        df.add_column("bytes", Column::Float64(vec![100.0, 50.0, 10.0]))
            .unwrap();
        df.add_column("packets", Column::Float64(vec![4.0, 0.0, 5.0]))
            .unwrap();

        let df = df.with_ratio_column("bytes", "packets", "bpp").unwrap();
        let bpp = df.get_column_numeric_values("bpp").unwrap();
        assert_eq!(bpp[0], 25.0);
        assert!(bpp[1].is_nan());
        assert_eq!(bpp[2], 2.0);
    }

    #[test]
    fn test_get_dummies() {
        let mut df = DataFrame::new();
        df.add_column(
            "housing",
            Column::String(vec!["own".into(), "rent".into(), "free".into(), "".into()]),
        )
        .unwrap();
        df.add_column("amount", Column::Float64(vec![1.0, 2.0, 3.0, 4.0]))
            .unwrap();

        let encoded = df.get_dummies(&["housing"], false).unwrap();
        assert_eq!(
            encoded.column_names(),
            &["amount", "housing_free", "housing_own", "housing_rent"]
        );
        assert_eq!(
            encoded.get_column_numeric_values("housing_own").unwrap(),
            vec![1.0, 0.0, 0.0, 0.0]
        );

        let dropped = df.get_dummies(&["housing"], true).unwrap();
        assert!(!dropped.contains_column("housing_free"));
        assert!(dropped.contains_column("housing_rent"));

        assert!(df.get_dummies(&["amount"], false).is_err());
    }

    #[test]
    fn test_apply_saved_dummies() {
        let mut train = DataFrame::new();
        train
            .add_column(
                "housing",
                Column::String(vec!["own".into(), "rent".into(), "free".into()]),
            )
            .unwrap();
        let encodings = train.dummy_encodings(&["housing"], true).unwrap();
        assert_eq!(encodings[0].categories, vec!["own", "rent"]);

        // a batch that only holds one category, plus one never seen in training
        let mut batch = DataFrame::new();
        batch
            .add_column(
                "housing",
                Column::String(vec!["free".into(), "free".into(), "boat".into()]),
            )
            .unwrap();
        let encoded = batch.apply_dummies(&encodings).unwrap();
        assert_eq!(encoded.column_names(), &["housing_own", "housing_rent"]);
        assert_eq!(
            encoded.get_column_numeric_values("housing_own").unwrap(),
            vec![0.0, 0.0, 0.0]
        );
        assert_eq!(
            encoded.get_column_numeric_values("housing_rent").unwrap(),
            vec![0.0, 0.0, 0.0]
        );
    }
}
