//! Small supervised classification experiments on CSV data: a column
//! table, per-entity feature extraction, preprocessing and classifier
//! pipelines, cross-validated grid search, metrics, persistence and
//! champion/challenger comparison.

pub mod config;
pub mod dataframe;
pub mod error;
pub mod experiment;
pub mod groupby;
pub mod io;
pub mod ml;
pub mod parallel;

// Re-export commonly used types
pub use config::ExperimentConfig;
pub use dataframe::DataFrame;
pub use error::{Error, Result};
pub use experiment::{Experiment, ExperimentReport};

// Export version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
