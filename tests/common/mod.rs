//! Helpers shared by the integration tests: self-cleaning temp
//! directories and CSV/config fixtures.
#![allow(dead_code)]

pub mod test_utils;

pub use test_utils::{
    credit_csv, flow_csv, get_temp_dir, test_temp_dir, write_csv_fixture, write_text,
    TempTestDir,
};
