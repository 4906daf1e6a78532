use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataframe::{format_float, Column, DataFrame};
use crate::error::{Error, Result};

/// Aggregation applied to one column within each group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Number of rows in the group, missing cells included
    Count,
    Sum,
    Mean,
    Min,
    Max,
    /// Population standard deviation
    Std,
    /// Number of distinct non-missing values
    NUnique,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregation::Count => "count",
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Std => "std",
            Aggregation::NUnique => "nunique",
        };
        write!(f, "{}", name)
    }
}

/// `output = agg(column)` for every group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub column: String,
    pub agg: Aggregation,
    /// Defaults to `<column>_<agg>`
    #[serde(default)]
    pub output: Option<String>,
}

impl AggregateSpec {
    pub fn new(column: impl Into<String>, agg: Aggregation) -> Self {
        AggregateSpec {
            column: column.into(),
            agg,
            output: None,
        }
    }

    pub fn named(column: impl Into<String>, agg: Aggregation, output: impl Into<String>) -> Self {
        AggregateSpec {
            column: column.into(),
            agg,
            output: Some(output.into()),
        }
    }

    pub fn output_name(&self) -> String {
        self.output
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.column, self.agg))
    }
}

/// Rows of a frame grouped by the string form of a key column
#[derive(Debug)]
pub struct GroupBy<'a> {
    key: String,
    /// Sorted by key so the aggregated frame is deterministic
    groups: BTreeMap<String, Vec<usize>>,
    source: &'a DataFrame,
}

impl<'a> GroupBy<'a> {
    pub fn new(source: &'a DataFrame, key: &str) -> Result<Self> {
        let keys = source.get_column_string_values(key)?;
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, k) in keys.into_iter().enumerate() {
            groups.entry(k).or_default().push(i);
        }
        Ok(GroupBy {
            key: key.to_string(),
            groups,
            source,
        })
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    pub fn indices(&self, key: &str) -> Option<&[usize]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    /// One row per group: the key column first, then one `Float64` column
    /// per spec.
    pub fn agg(&self, specs: &[AggregateSpec]) -> Result<DataFrame> {
        if specs.is_empty() {
            return Err(Error::InvalidInput(
                "at least one aggregation is required".to_string(),
            ));
        }

        let mut result = DataFrame::new();
        result.add_column(
            self.key.clone(),
            Column::String(self.groups.keys().cloned().collect()),
        )?;

        for spec in specs {
            let column = self.source.column(&spec.column)?;
            let values: Vec<f64> = self
                .groups
                .values()
                .map(|rows| aggregate(column, rows, spec.agg, &spec.column))
                .collect::<Result<_>>()?;
            result.add_column(spec.output_name(), Column::Float64(values))?;
        }

        log::debug!(
            "grouped {} rows into {} groups by '{}'",
            self.source.row_count(),
            self.groups.len(),
            self.key
        );
        Ok(result)
    }
}

fn aggregate(column: &Column, rows: &[usize], agg: Aggregation, name: &str) -> Result<f64> {
    match agg {
        Aggregation::Count => Ok(rows.len() as f64),
        Aggregation::NUnique => {
            let distinct: HashSet<String> = match column {
                Column::Float64(values) => rows
                    .iter()
                    .map(|&i| values[i])
                    .filter(|v| !v.is_nan())
                    .map(format_float)
                    .collect(),
                Column::String(values) => rows
                    .iter()
                    .map(|&i| values[i].clone())
                    .filter(|v| !v.is_empty())
                    .collect(),
            };
            Ok(distinct.len() as f64)
        }
        _ => {
            let values = match column {
                Column::Float64(values) => values,
                Column::String(_) => return Err(Error::NotNumeric(name.to_string())),
            };
            let present: Vec<f64> = rows
                .iter()
                .map(|&i| values[i])
                .filter(|v| !v.is_nan())
                .collect();
            if present.is_empty() {
                return Ok(if agg == Aggregation::Sum { 0.0 } else { f64::NAN });
            }
            let n = present.len() as f64;
            let sum: f64 = present.iter().sum();
            Ok(match agg {
                Aggregation::Sum => sum,
                Aggregation::Mean => sum / n,
                Aggregation::Min => present.iter().cloned().fold(f64::INFINITY, f64::min),
                Aggregation::Max => present.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                Aggregation::Std => {
                    let mean = sum / n;
                    (present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
                }
                Aggregation::Count | Aggregation::NUnique => unreachable!(),
            })
        }
    }
}

impl DataFrame {
    /// Groups rows by the string form of `key`
    pub fn groupby(&self, key: &str) -> Result<GroupBy<'_>> {
        GroupBy::new(self, key)
    }
}
