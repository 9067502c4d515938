//! Common test utilities and helpers

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create an empty serving root.
pub fn create_test_root() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// Write `contents` to `name` under the root, creating parent directories
/// as needed. Returns the full path.
pub fn write_file(root: &Path, name: &str, contents: &str) -> PathBuf {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
    }
    std::fs::write(&path, contents).expect("Failed to write test file");
    path
}

/// Produce `count` numbered lines: `line1\n` through `line<count>\n`.
pub fn numbered_lines(count: usize) -> String {
    (1..=count).map(|i| format!("line{}\n", i)).collect()
}

/// Write a file with `count` numbered lines under the root.
#[allow(dead_code)]
pub fn write_numbered_file(root: &Path, name: &str, count: usize) -> PathBuf {
    let path = root.join(name);
    let mut file = BufWriter::new(File::create(&path).expect("Failed to create log file"));
    for i in 1..=count {
        writeln!(file, "line{}", i).expect("Failed to write line");
    }
    file.flush().expect("Failed to flush file");
    path
}
