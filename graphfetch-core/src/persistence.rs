//! Atomic file replacement for checkpoints and final artifacts.
//!
//! Every durable write in the pipeline goes through [`atomic_write`]: the
//! bytes land in a `.tmp` sibling which is then renamed over the target, so a
//! reader sees either the previous file or the new one, never a torn write.

use crate::table::Table;
use std::io;
use std::path::{Path, PathBuf};

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replace `path` with `data`, creating parent directories.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling(path);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Atomically replace `path` with the CSV form of `table`.
pub fn atomic_write_table(path: &Path, table: &Table) -> io::Result<()> {
    let bytes = table.to_csv_bytes().map_err(io::Error::other)?;
    atomic_write(path, &bytes)
}

/// Remove a file, treating "already gone" as success.
///
/// Returns whether a file was actually removed.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Record;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoints").join("run_checkpoint_offset.txt");

        atomic_write(&path, b"2000").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2000");
    }

    #[test]
    fn test_atomic_write_no_tmp_leftover() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.csv");

        atomic_write(&path, b"item\n").unwrap();
        assert!(!tmp_sibling(&path).exists());
    }

    #[test]
    fn test_tmp_sibling_keeps_extension() {
        let tmp = tmp_sibling(Path::new("data/checkpoints/a_checkpoint.csv"));
        assert_eq!(tmp, Path::new("data/checkpoints/a_checkpoint.csv.tmp"));
    }

    #[test]
    fn test_atomic_write_table_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");

        let mut table = Table::new();
        table.push(Record::new().with("item", Some("Q1")));
        atomic_write_table(&path, &table).unwrap();
        table.push(Record::new().with("item", Some("Q2")));
        atomic_write_table(&path, &table).unwrap();

        let loaded = Table::read_csv(&path).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.txt");
        assert!(!remove_if_exists(&path).unwrap());
        std::fs::write(&path, "x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!path.exists());
    }
}
