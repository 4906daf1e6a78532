//! Column-oriented table used as the in-memory form of every CSV the
//! workflow touches.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// A single typed column. Missing numeric cells are stored as NaN.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float64(Vec<f64>),
    String(Vec<String>),
}

impl Column {
    /// Number of cells in the column
    pub fn len(&self) -> usize {
        match self {
            Column::Float64(values) => values.len(),
            Column::String(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Float64(_))
    }

    /// String form of one cell. NaN renders as an empty string.
    pub fn cell_string(&self, row: usize) -> Option<String> {
        match self {
            Column::Float64(values) => values.get(row).map(|v| format_float(*v)),
            Column::String(values) => values.get(row).cloned(),
        }
    }

    /// Gathers the given rows into a new column
    fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Float64(values) => Column::Float64(indices.iter().map(|&i| values[i]).collect()),
            Column::String(values) => {
                Column::String(indices.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }
}

/// Shortest string form of a float: `1.0` renders as `1`, NaN as `""`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Ordered collection of equally long named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    columns: Vec<String>,
    data: HashMap<String, Column>,
    row_count: usize,
}

impl DataFrame {
    pub fn new() -> Self {
        DataFrame::default()
    }

    /// Appends a column. The first column fixes the row count.
    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.data.contains_key(&name) {
            return Err(Error::DuplicateColumnName(name));
        }
        if !self.columns.is_empty() && column.len() != self.row_count {
            return Err(Error::InconsistentRowCount {
                expected: self.row_count,
                found: column.len(),
            });
        }
        if self.columns.is_empty() {
            self.row_count = column.len();
        }
        self.columns.push(name.clone());
        self.data.insert(name, column);
        Ok(())
    }

    /// Column names in insertion order
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.data
            .get(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    /// Numeric view of a column. A string column qualifies only when every
    /// non-empty cell parses as a float; empty cells become NaN.
    pub fn get_column_numeric_values(&self, name: &str) -> Result<Vec<f64>> {
        match self.column(name)? {
            Column::Float64(values) => Ok(values.clone()),
            Column::String(values) => values
                .iter()
                .map(|v| {
                    if v.is_empty() {
                        Ok(f64::NAN)
                    } else {
                        v.parse::<f64>()
                            .map_err(|_| Error::NotNumeric(name.to_string()))
                    }
                })
                .collect(),
        }
    }

    /// String view of a column
    pub fn get_column_string_values(&self, name: &str) -> Result<Vec<String>> {
        match self.column(name)? {
            Column::Float64(values) => Ok(values.iter().map(|v| format_float(*v)).collect()),
            Column::String(values) => Ok(values.clone()),
        }
    }

    /// Names of the `Float64` columns, in order
    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|name| self.data.get(*name).map(Column::is_numeric).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// New frame holding the given rows in the given order
    pub fn take_rows(&self, indices: &[usize]) -> Result<DataFrame> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.row_count) {
            return Err(Error::IndexOutOfBounds {
                index: bad,
                size: self.row_count,
            });
        }
        let mut df = DataFrame::new();
        df.row_count = indices.len();
        for name in &self.columns {
            df.columns.push(name.clone());
            df.data.insert(name.clone(), self.data[name].take(indices));
        }
        Ok(df)
    }

    /// New frame with only the named columns, in the requested order
    pub fn select_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<DataFrame> {
        let mut df = DataFrame::new();
        for name in names {
            let name = name.as_ref();
            df.add_column(name, self.column(name)?.clone())?;
        }
        if names.is_empty() {
            df.row_count = 0;
        }
        Ok(df)
    }

    /// New frame without the named columns. Unknown names are an error.
    pub fn drop_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<DataFrame> {
        for name in names {
            self.column(name.as_ref())?;
        }
        let keep: Vec<&String> = self
            .columns
            .iter()
            .filter(|c| !names.iter().any(|n| n.as_ref() == c.as_str()))
            .collect();
        let mut df = DataFrame::new();
        df.row_count = self.row_count;
        for name in keep {
            df.columns.push(name.clone());
            df.data.insert(name.clone(), self.data[name].clone());
        }
        Ok(df)
    }
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join("\t"))?;
        for row in 0..self.row_count.min(10) {
            let cells: Vec<String> = self
                .columns
                .iter()
                .map(|c| self.data[c].cell_string(row).unwrap_or_default())
                .collect();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        if self.row_count > 10 {
            writeln!(f, "... ({} rows)", self.row_count)?;
        }
        Ok(())
    }
}
