//! Property-based tests for core components using proptest.

use proptest::prelude::*;
use std::collections::HashSet;

use graphfetch_core::keys::partition;
use graphfetch_core::{Record, Table};

fn table_from(keys: &[(u8, u8)]) -> Table {
    let mut table = Table::new();
    for (key, value) in keys {
        table.push(
            Record::new()
                .with("key", Some(format!("k{key}")))
                .with("value", Some(format!("v{value}"))),
        );
    }
    table
}

// --- Partitioning ---

proptest! {
    #[test]
    fn partition_covers_every_item_in_order(len in 0usize..500, size in 1usize..60) {
        let items: Vec<usize> = (0..len).collect();
        let batches = partition(&items, size);
        let flat: Vec<usize> = batches.iter().flatten().copied().collect();
        prop_assert_eq!(flat, items);
    }

    #[test]
    fn partition_sizes_are_full_except_last(len in 1usize..500, size in 1usize..60) {
        let items: Vec<usize> = (0..len).collect();
        let batches = partition(&items, size);
        prop_assert_eq!(batches.len(), len.div_ceil(size));
        let (last, full) = batches.split_last().unwrap();
        prop_assert!(full.iter().all(|b| b.len() == size));
        prop_assert!(!last.is_empty() && last.len() <= size);
    }
}

// --- Deduplication and joins ---

proptest! {
    #[test]
    fn dedup_rows_leaves_no_duplicates(rows in prop::collection::vec((0u8..8, 0u8..4), 0..80)) {
        let mut table = table_from(&rows);
        let before = table.len();
        let removed = table.dedup_rows();

        let distinct: HashSet<_> = table.rows().iter().collect();
        prop_assert_eq!(distinct.len(), table.len());
        prop_assert_eq!(before - removed, table.len());
        let expected: HashSet<_> = rows.iter().collect();
        prop_assert_eq!(table.len(), expected.len());
    }

    #[test]
    fn dedup_by_column_keeps_first_per_key(rows in prop::collection::vec((0u8..8, 0u8..4), 1..80)) {
        let mut table = table_from(&rows);
        table.dedup_by_column("key").unwrap();

        let keys: Vec<_> = table.column_values("key").unwrap();
        let distinct: HashSet<_> = keys.iter().collect();
        prop_assert_eq!(distinct.len(), keys.len());

        for row in 0..table.len() {
            let key = table.value(row, "key").unwrap();
            let first = rows.iter().find(|(k, _)| format!("k{k}") == key).unwrap();
            let expected = format!("v{}", first.1);
            prop_assert_eq!(table.value(row, "value"), Some(expected.as_str()));
        }
    }

    #[test]
    fn left_join_on_deduped_right_keeps_left_cardinality(
        left_keys in prop::collection::hash_set(0u8..30, 0..20),
        right in prop::collection::vec((0u8..30, 0u8..4), 0..60),
    ) {
        let mut left = Table::with_columns(["key"]);
        for key in &left_keys {
            left.push(Record::new().with("key", Some(format!("k{key}"))));
        }
        let mut right = table_from(&right);
        if !right.is_empty() {
            right.dedup_by_column("key").unwrap();
        } else {
            right = Table::with_columns(["key", "value"]);
        }

        let joined = left.left_join(&right, "key").unwrap();
        prop_assert_eq!(joined.len(), left.len());
        prop_assert_eq!(joined.column_values("key").unwrap(), left.column_values("key").unwrap());
    }
}
