//! Turn an accumulated table into the final artifact and drop checkpoints.

use crate::checkpoint::CheckpointStore;
use crate::error::HarvestError;
use crate::keys::KeySet;
use crate::persistence::atomic_write_table;
use crate::table::Table;
use std::path::PathBuf;
use tracing::{info, warn};

/// What finalization wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    pub path: PathBuf,
    pub rows: usize,
    pub duplicates_removed: usize,
}

fn write_and_clear(store: &CheckpointStore, table: &Table) -> Result<PathBuf, HarvestError> {
    let path = store.final_path();
    atomic_write_table(&path, table)?;
    store.clear()?;
    Ok(path)
}

/// Offset mode: first row per `key` wins, then exact duplicates go.
pub fn finalize_paginated(
    store: &CheckpointStore,
    mut table: Table,
    key: Option<&str>,
) -> Result<Finalized, HarvestError> {
    let mut removed = 0;
    if let Some(key) = key {
        if table.column_index(key).is_some() {
            removed += table.dedup_by_column(key)?;
        } else if !table.is_empty() {
            warn!(run = store.name(), key, "Key column absent, skipping key dedup");
        }
    }
    removed += table.dedup_rows();

    let path = write_and_clear(store, &table)?;
    info!(
        run = store.name(),
        rows = table.len(),
        duplicates_removed = removed,
        path = %path.display(),
        "Final artifact written"
    );
    Ok(Finalized {
        path,
        rows: table.len(),
        duplicates_removed: removed,
    })
}

/// Batched mode: left join the detail rows onto the key table so each key
/// appears once, with nulls where its batch produced nothing.
pub fn finalize_batched(
    store: &CheckpointStore,
    mut detail: Table,
    keys: &KeySet,
) -> Result<Finalized, HarvestError> {
    let on = keys.column();
    let key_table = keys.key_table();

    let (joined, removed) = if detail.column_index(on).is_some() {
        let mut removed = detail.dedup_rows();
        removed += detail.dedup_by_column(on)?;
        (key_table.left_join(&detail, on)?, removed)
    } else {
        if !detail.is_empty() {
            warn!(run = store.name(), column = on, "Detail rows lack the join column");
        }
        (key_table, 0)
    };

    let path = write_and_clear(store, &joined)?;
    info!(
        run = store.name(),
        keys = keys.len(),
        rows = joined.len(),
        duplicates_removed = removed,
        path = %path.display(),
        "Supplement written"
    );
    Ok(Finalized {
        path,
        rows: joined.len(),
        duplicates_removed: removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Cursor;
    use crate::table::Record;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const PREFIX: &str = "http://www.wikidata.org/entity";

    fn uri(id: &str) -> String {
        format!("{PREFIX}/{id}")
    }

    #[test]
    fn test_finalize_paginated_dedups_and_clears() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::paginated("paintings", dir.path());

        let mut table = Table::new();
        table.push(Record::new().with("item", Some("A")).with("title", Some("one")));
        table.push(Record::new().with("item", Some("B")).with("title", Some("two")));
        table.push(Record::new().with("item", Some("A")).with("title", Some("other")));
        table.push(Record::new().with("item", Some("B")).with("title", Some("two")));
        store.save(&table, &Cursor::Offset(4)).unwrap();

        let done = finalize_paginated(&store, table, Some("item")).unwrap();
        assert_eq!(done.rows, 2);
        assert_eq!(done.duplicates_removed, 2);
        assert!(!store.table_path().exists());
        assert!(!store.cursor_path().exists());

        let written = Table::read_csv(&done.path).unwrap();
        assert_eq!(written.value(0, "title"), Some("one"));
        assert_eq!(written.value(1, "item"), Some("B"));
    }

    #[test]
    fn test_finalize_paginated_without_key() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::paginated("p", dir.path());
        let mut table = Table::new();
        table.push(Record::new().with("item", Some("A")));
        table.push(Record::new().with("item", Some("A")));

        let done = finalize_paginated(&store, table, None).unwrap();
        assert_eq!(done.rows, 1);
    }

    #[test]
    fn test_finalize_paginated_unbound_and_empty_label_are_one_row() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::paginated("p", dir.path());
        let mut table = Table::new();
        table.push(Record::new().with("item", Some("Q1")).with("label", None::<String>));
        table.push(Record::new().with("item", Some("Q1")).with("label", Some("")));

        let done = finalize_paginated(&store, table, None).unwrap();
        assert_eq!(done.rows, 1);
        assert_eq!(done.duplicates_removed, 1);

        let written = Table::read_csv(&done.path).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(std::fs::read_to_string(&done.path).unwrap(), "item,label\nQ1,\n");
    }

    #[test]
    fn test_finalize_batched_one_row_per_key() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::batched("authors", dir.path(), "wikidata_");

        let mut source = Table::new();
        for id in ["Q1", "Q2", "Q3"] {
            source.push(Record::new().with("author", Some(uri(id))));
        }
        let keys = KeySet::from_table(&source, "author", PREFIX).unwrap();

        // Q1 twice with different values, Q3 never returned.
        let mut detail = Table::new();
        detail.push(Record::new().with("author", Some(uri("Q1"))).with("born", Some("1853")));
        detail.push(Record::new().with("author", Some(uri("Q2"))).with("born", Some("1606")));
        detail.push(Record::new().with("author", Some(uri("Q1"))).with("born", Some("1854")));

        let done = finalize_batched(&store, detail, &keys).unwrap();
        assert_eq!(done.rows, 3);
        assert!(done.path.ends_with("wikidata_authors.csv"));

        let written = Table::read_csv(&done.path).unwrap();
        assert_eq!(written.columns(), ["author".to_string(), "born".to_string()]);
        assert_eq!(written.value(0, "born"), Some("1853"));
        assert_eq!(written.value(1, "born"), Some("1606"));
        assert_eq!(written.value(2, "born"), None);
    }

    #[test]
    fn test_finalize_batched_with_no_detail() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::batched("authors", dir.path(), "wikidata_");
        let mut source = Table::new();
        source.push(Record::new().with("author", Some(uri("Q1"))));
        let keys = KeySet::from_table(&source, "author", PREFIX).unwrap();

        let done = finalize_batched(&store, Table::new(), &keys).unwrap();
        assert_eq!(done.rows, 1);
    }
}
