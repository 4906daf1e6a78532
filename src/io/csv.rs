use csv::{ReaderBuilder, Trim, Writer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

use crate::dataframe::{format_float, Column, DataFrame};
use crate::error::{Error, Result};

/// Options for reading a CSV file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    pub has_header: bool,
    pub delimiter: char,
    /// Cells equal to one of these tokens (after trimming) are missing
    pub na_values: Vec<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            has_header: true,
            delimiter: ',',
            na_values: vec![
                String::new(),
                "?".to_string(),
                "NA".to_string(),
                "NaN".to_string(),
            ],
        }
    }
}

impl CsvOptions {
    fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(Error::InvalidInput(format!(
                "delimiter '{}' is not a single ASCII character",
                self.delimiter
            )))
        }
    }
}

/// Reads a CSV file into a DataFrame, inferring a numeric or string type
/// per column
pub fn read_csv<P: AsRef<Path>>(path: P, options: &CsvOptions) -> Result<DataFrame> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let df = read_csv_from_reader(file, options)?;
    log::info!(
        "loaded {} rows x {} columns from {}",
        df.row_count(),
        df.column_count(),
        path.display()
    );
    Ok(df)
}

/// Same as [`read_csv`] over any reader
pub fn read_csv_from_reader<R: std::io::Read>(reader: R, options: &CsvOptions) -> Result<DataFrame> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(options.has_header)
        .delimiter(options.delimiter_byte()?)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut records: Vec<csv::StringRecord> = Vec::new();
    for result in rdr.records() {
        records.push(result?);
    }

    let headers: Vec<String> = if options.has_header {
        let headers = rdr.headers()?;
        if headers.is_empty() {
            return Err(Error::EmptyData("CSV input has no header row".to_string()));
        }
        headers.iter().map(|h| h.to_string()).collect()
    } else {
        let width = records.iter().map(|r| r.len()).max().unwrap_or(0);
        if width == 0 {
            return Err(Error::EmptyData("CSV input is empty".to_string()));
        }
        (0..width).map(|i| format!("column_{}", i)).collect()
    };

    let is_na = |cell: &str| options.na_values.iter().any(|na| na == cell);

    let mut df = DataFrame::new();
    for (col_idx, header) in headers.iter().enumerate() {
        let cells: Vec<Option<&str>> = records
            .iter()
            .map(|record| record.get(col_idx).filter(|cell| !is_na(*cell)))
            .collect();

        let numeric: Option<Vec<f64>> = cells
            .iter()
            .map(|cell| match cell {
                None => Some(f64::NAN),
                Some(text) => text.parse::<f64>().ok(),
            })
            .collect();

        // an all-missing column stays numeric
        let column = match numeric {
            Some(values) => Column::Float64(values),
            None => Column::String(
                cells
                    .iter()
                    .map(|cell| cell.unwrap_or("").to_string())
                    .collect(),
            ),
        };
        df.add_column(header.clone(), column)?;
    }

    Ok(df)
}

/// Writes a DataFrame to a CSV file with a header row. NaN becomes an empty cell.
pub fn write_csv<P: AsRef<Path>>(df: &DataFrame, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(df.column_names())?;

    let columns: Vec<&Column> = df
        .column_names()
        .iter()
        .map(|name| df.column(name))
        .collect::<Result<_>>()?;

    for row in 0..df.row_count() {
        let record: Vec<String> = columns
            .iter()
            .map(|column| match column {
                Column::Float64(values) => format_float(values[row]),
                Column::String(values) => values[row].clone(),
            })
            .collect();
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}
