//! Key sets for the key-batched driver.
//!
//! Keys come from a column of entity URIs in an earlier dataset, e.g.
//! `http://www.wikidata.org/entity/Q42`. The URI is kept for the join back
//! onto the source and the trailing id (`Q42`) goes into the query.

use crate::error::TableError;
use crate::table::{Record, Table};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

static ENTITY_ID: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[A-Z]\d+$").ok());

/// One source key: the full URI and the id derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityKey {
    pub uri: String,
    pub id: String,
}

/// A fixed slice of the key list. Immutable once formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub keys: Vec<EntityKey>,
}

impl Batch {
    pub fn ids(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Id for `value` if it is under `prefix` and ends in a well-formed id.
pub fn entity_id<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if !value.starts_with(prefix) {
        return None;
    }
    let id = value.rsplit('/').next()?;
    ENTITY_ID
        .as_ref()
        .is_some_and(|re| re.is_match(id))
        .then_some(id)
}

/// Split `items` into consecutive chunks of at most `size`.
///
/// `size == 0` is treated as 1.
pub fn partition<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

/// Deduplicated, filtered keys from one column of a source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    column: String,
    keys: Vec<EntityKey>,
}

impl KeySet {
    /// Collect keys from `column`: nulls dropped, first occurrence kept,
    /// values outside `prefix` or without a valid id skipped.
    pub fn from_table(table: &Table, column: &str, prefix: &str) -> Result<Self, TableError> {
        let values = table.column_values(column)?;
        let total = values.len();

        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for value in values.into_iter().flatten() {
            if !seen.insert(value) {
                continue;
            }
            if let Some(id) = entity_id(value, prefix) {
                keys.push(EntityKey {
                    uri: value.to_string(),
                    id: id.to_string(),
                });
            }
        }

        debug!(
            column,
            total,
            distinct = seen.len(),
            kept = keys.len(),
            "Extracted keys"
        );
        Ok(Self {
            column: column.to_string(),
            keys,
        })
    }

    pub fn from_csv(path: &Path, column: &str, prefix: &str) -> Result<Self, TableError> {
        Self::from_table(&Table::read_csv(path)?, column, prefix)
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn keys(&self) -> &[EntityKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn batches(&self, batch_size: usize) -> Vec<Batch> {
        partition(&self.keys, batch_size)
            .into_iter()
            .enumerate()
            .map(|(index, keys)| Batch { index, keys })
            .collect()
    }

    /// Single-column table of key URIs, the left side of the final join.
    pub fn key_table(&self) -> Table {
        let mut table = Table::with_columns([self.column.as_str()]);
        for key in &self.keys {
            table.push(Record::new().with(self.column.as_str(), Some(key.uri.as_str())));
        }
        table
    }
}
