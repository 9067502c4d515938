//! Numbered-line log file generator
//!
//! Small utility mode for producing predictable files to point the server
//! at while testing by hand.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write `lines` numbered lines to `path`, replacing any existing file.
pub fn generate(path: &Path, lines: u64) -> Result<()> {
    tracing::info!("generating file at {} with {} lines", path.display(), lines);

    let file = File::create(path)
        .with_context(|| format!("failed to open file at {} for writing", path.display()))?;
    let mut output = BufWriter::new(file);

    for i in 0..lines {
        writeln!(output, "I'm line number {} of {}", i, lines)?;
    }
    output.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generates_the_requested_line_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("generated.log");
        generate(&path, 25).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 25);
        assert!(contents.starts_with("I'm line number 0 of 25\n"));
        assert!(contents.ends_with("I'm line number 24 of 25\n"));
    }

    #[test]
    fn zero_lines_makes_an_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.log");
        generate(&path, 0).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no-such-dir").join("generated.log");
        assert!(generate(&path, 5).is_err());
    }
}
