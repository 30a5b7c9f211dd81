//! In-memory tables of string-or-null cells and their CSV representation.
//!
//! A [`Table`] is the accumulator of a harvest run: records are pushed as
//! pages or batches arrive, the schema is the union of fields seen so far in
//! first-seen order, and deduplication/joining happen only at finalization.

use crate::error::TableError;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

/// A single retrieved entity: field name to string value or null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, Option<String>)>,
}

impl Record {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.insert(field, value.map(Into::into));
        self
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Option<String>) {
        let field = field.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    /// Value of a field; `None` both when absent and when null.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A cell as it reads back from CSV: empty strings are nulls.
fn cell_key(cell: &Option<String>) -> Option<String> {
    cell.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

/// Ordered rows over a consistent set of columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty table with a fixed header.
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn require_column(&self, name: &str) -> Result<usize, TableError> {
        self.column_index(name)
            .ok_or_else(|| TableError::MissingColumn {
                column: name.to_string(),
            })
    }

    /// Cell value at `(row, column)`, `None` for null or out of range.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, column: &str) -> Result<Vec<Option<&str>>, TableError> {
        let idx = self.require_column(column)?;
        Ok(self.rows.iter().map(|row| row[idx].as_deref()).collect())
    }

    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    /// Append a record, widening the schema with any unseen fields.
    pub fn push(&mut self, record: Record) {
        let mut row = vec![None; self.columns.len()];
        for (field, value) in record.fields {
            let idx = self.ensure_column(&field);
            if idx >= row.len() {
                row.resize(idx + 1, None);
            }
            row[idx] = value;
        }
        self.rows.push(row);
    }

    pub fn extend<I: IntoIterator<Item = Record>>(&mut self, records: I) {
        for record in records {
            self.push(record);
        }
    }

    /// Drop rows identical to an earlier row. Returns the number removed.
    ///
    /// Rows are compared as they would be written, so an empty string and a
    /// null are the same cell.
    pub fn dedup_rows(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::with_capacity(before);
        self.rows
            .retain(|row| seen.insert(row.iter().map(cell_key).collect::<Vec<_>>()));
        before - self.rows.len()
    }

    /// Drop rows whose `column` value repeats an earlier row's (first wins).
    ///
    /// Nulls and empty strings compare equal to each other, so at most one
    /// row without a key survives.
    pub fn dedup_by_column(&mut self, column: &str) -> Result<usize, TableError> {
        let idx = self.require_column(column)?;
        let before = self.rows.len();
        let mut seen = HashSet::with_capacity(before);
        self.rows.retain(|row| seen.insert(cell_key(&row[idx])));
        Ok(before - self.rows.len())
    }

    /// Left join `right` onto `self` by the shared column `on`.
    ///
    /// Every left row is kept; it is repeated once per matching right row,
    /// or padded with nulls when nothing matches. Null keys never match.
    /// Right columns whose name clashes with a left column get a `_right`
    /// suffix.
    pub fn left_join(&self, right: &Table, on: &str) -> Result<Table, TableError> {
        let left_key = self.require_column(on)?;
        let right_key = right.require_column(on)?;

        let right_columns: Vec<usize> = (0..right.columns.len())
            .filter(|&i| i != right_key)
            .collect();

        let mut columns = self.columns.clone();
        for &i in &right_columns {
            let name = &right.columns[i];
            if columns.contains(name) {
                columns.push(format!("{name}_right"));
            } else {
                columns.push(name.clone());
            }
        }

        let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
        for (row_idx, row) in right.rows.iter().enumerate() {
            if let Some(key) = row[right_key].as_deref() {
                index.entry(key).or_default().push(row_idx);
            }
        }

        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let matches = row[left_key]
                .as_deref()
                .and_then(|key| index.get(key))
                .map(Vec::as_slice)
                .unwrap_or_default();
            if matches.is_empty() {
                let mut joined = row.clone();
                joined.resize(columns.len(), None);
                rows.push(joined);
                continue;
            }
            for &m in matches {
                let mut joined = row.clone();
                joined.extend(right_columns.iter().map(|&i| right.rows[m][i].clone()));
                rows.push(joined);
            }
        }

        Ok(Table { columns, rows })
    }

    /// Parse CSV with a header row. Empty cells become nulls.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Table, TableError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let row = record
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                .collect();
            rows.push(row);
        }

        Ok(Table { columns, rows })
    }

    pub fn read_csv(path: &Path) -> Result<Table, TableError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(std::io::BufReader::new(file))
    }

    /// Serialize as CSV. Nulls are written as empty cells.
    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<(), TableError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        if !self.columns.is_empty() {
            csv_writer.write_record(&self.columns)?;
        }
        for row in &self.rows {
            csv_writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, TableError> {
        let mut buf = Vec::new();
        self.write_csv_to(&mut buf)?;
        Ok(buf)
    }
}
