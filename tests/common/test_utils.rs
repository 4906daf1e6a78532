//! Temp directories and data fixtures for integration tests
//!
//! Respects TMPDIR, TEMP and TMP so tests can be pointed at a scratch disk.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

static TEST_DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn get_temp_dir() -> PathBuf {
    env::var("TMPDIR")
        .or_else(|_| env::var("TEMP"))
        .or_else(|_| env::var("TMP"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir())
}

/// Unique directory path for one test; process id and a counter keep
/// parallel test binaries apart
pub fn test_temp_dir(test_name: &str) -> PathBuf {
    let counter = TEST_DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dirname = format!("tabml_test_{}_{}_{}", test_name, std::process::id(), counter);
    get_temp_dir().join(dirname)
}

/// Directory removed with its contents on drop
pub struct TempTestDir {
    path: PathBuf,
}

impl TempTestDir {
    pub fn new(test_name: &str) -> Self {
        let path = test_temp_dir(test_name);
        fs::create_dir_all(&path).expect("failed to create test directory");
        TempTestDir { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for TempTestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

pub fn write_text(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create parent directory");
    }
    fs::write(path, text).expect("failed to write fixture");
}

/// Writes `headers` and `rows` as a comma separated file under `dir`
pub fn write_csv_fixture(dir: &TempTestDir, name: &str, headers: &[&str], rows: &[Vec<String>]) -> PathBuf {
    let mut text = headers.join(",");
    text.push('\n');
    for row in rows {
        text.push_str(&row.join(","));
        text.push('\n');
    }
    let path = dir.join(name);
    write_text(&path, &text);
    path
}

/// Credit-scoring style table: `id,income,debt,age,class` with `class`
/// either `bad` (every fourth row) or `good`. Bad applicants have low
/// income and high debt; every ninth age is missing (`?`).
pub fn credit_csv(dir: &TempTestDir, n_rows: usize) -> PathBuf {
    let rows: Vec<Vec<String>> = (0..n_rows)
        .map(|i| {
            let bad = i % 4 == 0;
            let income = if bad { 20 + i % 5 } else { 60 + i % 7 };
            let debt = if bad { 30 + i % 3 } else { 5 + i % 4 };
            let age = if i % 9 == 0 {
                "?".to_string()
            } else {
                (25 + i % 30).to_string()
            };
            vec![
                format!("r{}", i),
                income.to_string(),
                debt.to_string(),
                age,
                if bad { "bad" } else { "good" }.to_string(),
            ]
        })
        .collect();
    write_csv_fixture(dir, "credit.csv", &["id", "income", "debt", "age", "class"], &rows)
}

/// Network-flow style records, several per source computer. Computers
/// listed in the returned label file scan many ports with small packets.
/// Returns `(flows, labels)`.
pub fn flow_csv(dir: &TempTestDir, n_hosts: usize) -> (PathBuf, PathBuf) {
    let mut rows = Vec::new();
    let mut compromised = Vec::new();
    for h in 0..n_hosts {
        let bad = h % 3 == 0;
        if bad {
            compromised.push(vec![format!("C{}", h)]);
        }
        for r in 0..6 {
            let (port, bytes, packets) = if bad {
                (1000 + r * 17 + h, 60 + r, 1 + r % 2)
            } else {
                (443 + (r % 2) * 37, 1500 + 100 * r + h, 10 + r)
            };
            rows.push(vec![
                format!("C{}", h),
                port.to_string(),
                bytes.to_string(),
                packets.to_string(),
            ]);
        }
    }
    let flows = write_csv_fixture(dir, "flows.csv", &["src", "dst_port", "bytes", "packets"], &rows);
    let labels = write_csv_fixture(dir, "redteam.csv", &["computer"], &compromised);
    (flows, labels)
}
