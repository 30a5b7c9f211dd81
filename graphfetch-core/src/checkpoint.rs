//! Durable (table, cursor) snapshots for resumable runs.
//!
//! A paginated run named `paintings` under `data/` keeps
//! `data/checkpoints/paintings_checkpoint.csv` next to a small cursor file
//! `paintings_checkpoint_offset.txt`. A batched run uses
//! `<name>_batch_checkpoint.csv` and `<name>_batch_index_checkpoint.txt`, so
//! the two modes never share files under one name. Both files are
//! replaced by rename. The table is always written first; a crash between
//! the two renames leaves a newer table with an older cursor, so the resumed
//! run re-fetches rows it already holds and finalization drops them again.

use crate::error::CheckpointError;
use crate::persistence::{atomic_write, atomic_write_table, remove_if_exists};
use crate::table::Table;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Which driver owns the checkpoint; decides file names and cursor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Paginated,
    Batched,
}

/// Resume position in the unit the driver advances by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Next row offset to request.
    Offset(u64),
    /// Indices of batches whose rows are already in the table.
    Batches(BTreeSet<usize>),
}

impl Cursor {
    pub fn offset(&self) -> Option<u64> {
        match self {
            Cursor::Offset(offset) => Some(*offset),
            Cursor::Batches(_) => None,
        }
    }

    fn encode(&self) -> String {
        match self {
            Cursor::Offset(offset) => offset.to_string(),
            Cursor::Batches(done) => done
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    fn decode(mode: RunMode, text: &str) -> Result<Cursor, String> {
        let text = text.trim();
        match mode {
            RunMode::Paginated => text
                .parse::<u64>()
                .map(Cursor::Offset)
                .map_err(|e| format!("offset '{text}' is not a number: {e}")),
            RunMode::Batched => text
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<usize>()
                        .map_err(|e| format!("batch index '{s}' is not a number: {e}"))
                })
                .collect::<Result<BTreeSet<_>, _>>()
                .map(Cursor::Batches),
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Offset(offset) => write!(f, "offset {offset}"),
            Cursor::Batches(done) => write!(f, "{} completed batch(es)", done.len()),
        }
    }
}

/// Where a resumed run got its starting state from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOrigin {
    /// An in-progress checkpoint pair.
    Checkpoint,
    /// A previous run's final artifact.
    FinalArtifact,
    Fresh,
}

impl fmt::Display for ResumeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumeOrigin::Checkpoint => f.write_str("checkpoint"),
            ResumeOrigin::FinalArtifact => f.write_str("final artifact"),
            ResumeOrigin::Fresh => f.write_str("fresh"),
        }
    }
}

/// Starting state for a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resume {
    pub table: Table,
    pub cursor: Cursor,
    pub origin: ResumeOrigin,
}

/// What is on disk for a run, without resuming it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStatus {
    pub checkpoint: Option<(usize, Cursor)>,
    pub final_rows: Option<usize>,
    /// Exactly one of the two checkpoint files exists.
    pub incomplete_pair: bool,
}

/// Checkpoint and final-artifact paths for one named run.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    name: String,
    mode: RunMode,
    target_dir: PathBuf,
    final_file: String,
}

impl CheckpointStore {
    /// Store for an offset-paginated run; final artifact `<name>.csv`.
    pub fn paginated(name: &str, target_dir: &Path) -> Self {
        Self {
            name: name.to_string(),
            mode: RunMode::Paginated,
            target_dir: target_dir.to_path_buf(),
            final_file: format!("{name}.csv"),
        }
    }

    /// Store for a key-batched run; final artifact `<prefix><name>.csv`.
    pub fn batched(name: &str, target_dir: &Path, output_prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: RunMode::Batched,
            target_dir: target_dir.to_path_buf(),
            final_file: format!("{output_prefix}{name}.csv"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.target_dir.join("checkpoints")
    }

    pub fn table_path(&self) -> PathBuf {
        let file = match self.mode {
            RunMode::Paginated => format!("{}_checkpoint.csv", self.name),
            RunMode::Batched => format!("{}_batch_checkpoint.csv", self.name),
        };
        self.checkpoint_dir().join(file)
    }

    pub fn cursor_path(&self) -> PathBuf {
        let file = match self.mode {
            RunMode::Paginated => format!("{}_checkpoint_offset.txt", self.name),
            RunMode::Batched => format!("{}_batch_index_checkpoint.txt", self.name),
        };
        self.checkpoint_dir().join(file)
    }

    pub fn final_path(&self) -> PathBuf {
        self.target_dir.join(&self.final_file)
    }

    fn empty_cursor(&self) -> Cursor {
        match self.mode {
            RunMode::Paginated => Cursor::Offset(0),
            RunMode::Batched => Cursor::Batches(BTreeSet::new()),
        }
    }

    fn read_cursor(&self) -> Result<Cursor, CheckpointError> {
        let path = self.cursor_path();
        let text = std::fs::read_to_string(&path).map_err(|source| CheckpointError::Io {
            path: path.clone(),
            source,
        })?;
        Cursor::decode(self.mode, &text).map_err(|message| CheckpointError::Corrupt { path, message })
    }

    /// Resolve the starting state for a run.
    ///
    /// 1. Both checkpoint files present: resume mid-run.
    /// 2. Else a previous final artifact: its rows, cursor = its row count
    ///    (paginated) or nothing done (batched; the driver skips the run).
    /// 3. Else an empty table at cursor zero.
    pub fn load(&self) -> Result<Resume, CheckpointError> {
        let table_path = self.table_path();
        let cursor_path = self.cursor_path();

        if table_path.exists() && cursor_path.exists() {
            let table = Table::read_csv(&table_path)?;
            let cursor = self.read_cursor()?;
            info!(run = %self.name, %cursor, rows = table.len(), "Checkpoint found, resuming");
            return Ok(Resume {
                table,
                cursor,
                origin: ResumeOrigin::Checkpoint,
            });
        }
        if table_path.exists() != cursor_path.exists() {
            warn!(
                run = %self.name,
                table = table_path.exists(),
                cursor = cursor_path.exists(),
                "Ignoring incomplete checkpoint pair"
            );
        }

        let final_path = self.final_path();
        if final_path.exists() {
            let table = Table::read_csv(&final_path)?;
            let cursor = match self.mode {
                RunMode::Paginated => Cursor::Offset(table.len() as u64),
                RunMode::Batched => Cursor::Batches(BTreeSet::new()),
            };
            info!(
                run = %self.name,
                rows = table.len(),
                path = %final_path.display(),
                "Resuming from existing final artifact"
            );
            return Ok(Resume {
                table,
                cursor,
                origin: ResumeOrigin::FinalArtifact,
            });
        }

        Ok(Resume {
            table: Table::new(),
            cursor: self.empty_cursor(),
            origin: ResumeOrigin::Fresh,
        })
    }

    /// Persist `table` and `cursor`, table first.
    pub fn save(&self, table: &Table, cursor: &Cursor) -> Result<(), CheckpointError> {
        let table_path = self.table_path();
        atomic_write_table(&table_path, table).map_err(|source| CheckpointError::Io {
            path: table_path,
            source,
        })?;

        let cursor_path = self.cursor_path();
        atomic_write(&cursor_path, cursor.encode().as_bytes()).map_err(|source| {
            CheckpointError::Io {
                path: cursor_path,
                source,
            }
        })?;
        Ok(())
    }

    /// Remove both checkpoint files. Missing files are fine.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        for path in [self.table_path(), self.cursor_path()] {
            remove_if_exists(&path).map_err(|source| CheckpointError::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn status(&self) -> Result<CheckpointStatus, CheckpointError> {
        let table_exists = self.table_path().exists();
        let cursor_exists = self.cursor_path().exists();

        let checkpoint = if table_exists && cursor_exists {
            let rows = Table::read_csv(&self.table_path())?.len();
            Some((rows, self.read_cursor()?))
        } else {
            None
        };

        let final_path = self.final_path();
        let final_rows = if final_path.exists() {
            Some(Table::read_csv(&final_path)?.len())
        } else {
            None
        };

        Ok(CheckpointStatus {
            checkpoint,
            final_rows,
            incomplete_pair: table_exists != cursor_exists,
        })
    }
}
