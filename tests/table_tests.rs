//! Tests for Table
//!
//! These tests verify:
//! - Table creation and directory layout
//! - Buffered inserts and flushes at the threshold
//! - Scans unify merged and buffered rows in insertion order
//! - Bulk inserts, including a partially filled buffer
//! - Reload from the metadata descriptor
//! - Name and projection validation

use std::fs;

use runstore::config::Config;
use runstore::table::{Table, TableMetadata};
use runstore::{Datum, DatumType, Row, Schema, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_with_threshold(temp_dir: &TempDir, threshold: usize) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .flush_threshold(threshold)
        .sync_metadata(false) // Keep single-row insert tests fast
        .build()
        .unwrap()
}

fn single_int_schema() -> Schema {
    Schema::new(vec![("v", DatumType::Int64)]).unwrap()
}

fn pair_schema() -> Schema {
    Schema::new(vec![
        ("id", DatumType::Int64),
        ("score", DatumType::Float64),
        ("group", DatumType::Int64),
    ])
    .unwrap()
}

fn pair_row(id: i64) -> Row {
    vec![
        Datum::Int64(id),
        Datum::Float64(id as f64 / 4.0),
        Datum::Int64(id % 3),
    ]
}

fn setup_temp_table(threshold: usize) -> (TempDir, Config, Table) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let config = config_with_threshold(&temp_dir, threshold);
    let table = Table::create(&config, "events", pair_schema()).unwrap();
    (temp_dir, config, table)
}

fn insert_ids(table: &mut Table, ids: std::ops::Range<i64>) {
    for id in ids {
        table.insert(&pair_row(id)).unwrap();
    }
}

fn scan_ids(table: &Table) -> Vec<i64> {
    table
        .scan(&[0])
        .unwrap()
        .map(|r| r.unwrap()[0].as_i64().unwrap())
        .collect()
}

fn scan_ints(table: &Table) -> Vec<i64> {
    table
        .scan_all()
        .unwrap()
        .map(|r| r.unwrap()[0].as_i64().unwrap())
        .collect()
}

// =============================================================================
// Create Tests
// =============================================================================

#[test]
fn test_create_lays_out_directories() {
    let (_temp, config, table) = setup_temp_table(4);
    let dir = config.data_dir.join("events");

    assert_eq!(table.dir(), dir.as_path());
    assert!(dir.join("metadata").exists());
    assert!(dir.join("insert_buffer").exists());
    assert!(dir.join("c0").is_dir());
    assert!(dir.join("c1").is_dir());
    assert!(dir.join("c2").is_dir());
    assert_eq!(table.row_count(), 0);
    assert_eq!(table.flush_threshold(), 4);
}

#[test]
fn test_create_existing_table_fails() {
    let (_temp, config, _table) = setup_temp_table(4);

    let result = Table::create(&config, "events", pair_schema());

    assert!(matches!(result.err().unwrap(), StoreError::Storage(_)));
}

#[test]
fn test_create_invalid_names() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with_threshold(&temp_dir, 4);

    for name in ["", "Events", "a/b", "..", "with space"] {
        let result = Table::create(&config, name, single_int_schema());
        assert!(
            matches!(result.err().unwrap(), StoreError::InvalidName(_)),
            "name {:?} should be rejected",
            name
        );
    }
}

#[test]
fn test_create_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = config_with_threshold(&temp_dir, 4);
    config.flush_threshold = 0;

    let result = Table::create(&config, "events", single_int_schema());

    assert!(matches!(result.err().unwrap(), StoreError::Config(_)));
}

// =============================================================================
// Insert / Flush Tests
// =============================================================================

#[test]
fn test_insert_stays_buffered_below_threshold() {
    let (_temp, _config, mut table) = setup_temp_table(4);

    insert_ids(&mut table, 0..3);

    assert_eq!(table.row_count(), 3);
    assert_eq!(table.buffered_row_count(), 3);
    assert!(table.column(0).is_empty());
}

#[test]
fn test_insert_flushes_at_threshold() {
    let (_temp, _config, mut table) = setup_temp_table(4);

    insert_ids(&mut table, 0..4);

    assert_eq!(table.buffered_row_count(), 0);
    for rank in 0..3 {
        assert_eq!(table.column(rank).run_sizes(), vec![4]);
    }
    assert_eq!(table.column(1).get(2).unwrap(), Datum::Float64(0.5));
}

#[test]
fn test_insert_rejects_bad_row() {
    let (_temp, _config, mut table) = setup_temp_table(4);

    let result = table.insert(&[Datum::Int64(1)]);

    assert!(matches!(result.unwrap_err(), StoreError::SchemaMismatch(_)));
    assert_eq!(table.row_count(), 0);
}

#[test]
fn test_failed_flush_takes_row_back() {
    let (_temp, config, mut table) = setup_temp_table(4);
    insert_ids(&mut table, 0..3);
    // Occupy the name the flush stages its run under
    let blocker = table.dir().join("c0").join("4_tmp");
    fs::create_dir(&blocker).unwrap();

    assert!(table.insert(&pair_row(3)).is_err());

    assert_eq!(table.row_count(), 3);
    assert_eq!(table.buffered_row_count(), 3);
    assert_eq!(scan_ids(&table), vec![0, 1, 2]);
    assert!(table.get_row(3).is_err());
    assert!(table.column(0).is_empty());

    // Retry once the obstacle is gone
    fs::remove_dir(&blocker).unwrap();
    table.insert(&pair_row(3)).unwrap();

    assert_eq!(table.row_count(), 4);
    assert_eq!(table.buffered_row_count(), 0);
    for rank in 0..3 {
        assert_eq!(table.column(rank).len(), 4);
    }
    drop(table);

    let table = Table::load(&config, "events").unwrap();
    assert_eq!(scan_ids(&table), vec![0, 1, 2, 3]);
}

#[test]
fn test_failed_flush_leaves_every_column_untouched() {
    let (_temp, _config, mut table) = setup_temp_table(4);
    insert_ids(&mut table, 0..3);
    let blocker = table.dir().join("c2").join("4_tmp");
    fs::create_dir(&blocker).unwrap();

    assert!(table.insert(&pair_row(3)).is_err());

    // Earlier columns staged their runs, then threw them away
    for rank in 0..3 {
        assert!(table.column(rank).is_empty());
    }
    assert_eq!(fs::read_dir(table.dir().join("c0")).unwrap().count(), 0);
    assert_eq!(fs::read_dir(table.dir().join("c1")).unwrap().count(), 0);
    assert_eq!(table.buffered_row_count(), 3);
}

#[test]
fn test_4096_rows_end_in_one_run() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let config = config_with_threshold(&temp_dir, 1024);
    let mut table = Table::create(&config, "seq", single_int_schema()).unwrap();

    for v in 0..4096 {
        table.insert(&[Datum::Int64(v)]).unwrap();
    }

    assert_eq!(table.column(0).run_sizes(), vec![4096]);
    assert_eq!(table.buffered_row_count(), 0);
    assert_eq!(scan_ints(&table), (0..4096).collect::<Vec<_>>());
}

#[test]
fn test_3072_rows_point_lookup() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with_threshold(&temp_dir, 1024);
    let mut table = Table::create(&config, "seq", single_int_schema()).unwrap();

    for v in 0..3072 {
        table.insert(&[Datum::Int64(v * 10)]).unwrap();
    }

    assert_eq!(table.column(0).run_sizes(), vec![2048, 1024]);
    assert_eq!(table.column(0).get(3071).unwrap(), Datum::Int64(30710));
    assert!(matches!(
        table.column(0).get(3072).unwrap_err(),
        StoreError::OutOfBounds { .. }
    ));
}

#[test]
fn test_3071_rows_leave_895_buffered() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with_threshold(&temp_dir, 1024);
    let mut table = Table::create(&config, "seq", single_int_schema()).unwrap();

    for v in 0..3071 {
        table.insert(&[Datum::Int64(v)]).unwrap();
    }

    assert_eq!(table.buffered_row_count(), 895);
    assert_eq!(table.column(0).run_sizes(), vec![2048]);

    let values = scan_ints(&table);
    assert_eq!(values.len(), 3071);
    assert_eq!(values, (0..3071).collect::<Vec<_>>());
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_scan_unifies_columns_and_buffer() {
    let (_temp, _config, mut table) = setup_temp_table(4);

    // Every count from 0 to 3 full flushes plus a partial buffer
    for m in 0..15i64 {
        assert_eq!(scan_ids(&table), (0..m).collect::<Vec<_>>());
        table.insert(&pair_row(m)).unwrap();
    }
}

#[test]
fn test_scan_projection_order() {
    let (_temp, _config, mut table) = setup_temp_table(4);
    insert_ids(&mut table, 0..6);

    let rows: Vec<Row> = table.scan(&[2, 0]).unwrap().map(|r| r.unwrap()).collect();

    assert_eq!(rows.len(), 6);
    assert_eq!(rows[4], vec![Datum::Int64(1), Datum::Int64(4)]);
    assert_eq!(rows[5], vec![Datum::Int64(2), Datum::Int64(5)]);
}

#[test]
fn test_scan_all_returns_full_rows() {
    let (_temp, _config, mut table) = setup_temp_table(4);
    insert_ids(&mut table, 0..9);

    let rows: Vec<Row> = table.scan_all().unwrap().map(|r| r.unwrap()).collect();

    let expected: Vec<Row> = (0..9).map(pair_row).collect();
    assert_eq!(rows, expected);
}

#[test]
fn test_scan_invalid_projection() {
    let (_temp, _config, table) = setup_temp_table(4);

    assert!(matches!(
        table.scan(&[]).err().unwrap(),
        StoreError::SchemaMismatch(_)
    ));
    assert!(matches!(
        table.scan(&[0, 3]).err().unwrap(),
        StoreError::SchemaMismatch(_)
    ));
}

#[test]
fn test_get_row() {
    let (_temp, _config, mut table) = setup_temp_table(4);
    insert_ids(&mut table, 0..10);

    assert_eq!(table.get_row(0).unwrap(), pair_row(0));
    assert_eq!(table.get_row(7).unwrap(), pair_row(7)); // merged
    assert_eq!(table.get_row(9).unwrap(), pair_row(9)); // buffered
    assert!(matches!(
        table.get_row(10).unwrap_err(),
        StoreError::OutOfBounds { index: 10, len: 10 }
    ));
}

// =============================================================================
// Bulk Insert Tests
// =============================================================================

#[test]
fn test_bulk_insert_into_empty_table() {
    let (_temp, _config, mut table) = setup_temp_table(4);

    table.bulk_insert((0..14).map(pair_row), 14).unwrap();

    assert_eq!(table.row_count(), 14);
    assert_eq!(table.buffered_row_count(), 2);
    for rank in 0..3 {
        assert_eq!(table.column(rank).run_sizes(), vec![8, 4]);
    }
    assert_eq!(scan_ids(&table), (0..14).collect::<Vec<_>>());
}

#[test]
fn test_bulk_insert_after_partial_buffer() {
    let (_temp, _config, mut table) = setup_temp_table(4);
    insert_ids(&mut table, 0..3);

    table.bulk_insert((3..20).map(pair_row), 17).unwrap();

    assert_eq!(table.row_count(), 20);
    assert_eq!(table.buffered_row_count(), 0);
    assert_eq!(table.column(0).run_sizes(), vec![16, 4]);
    assert_eq!(scan_ids(&table), (0..20).collect::<Vec<_>>());
}

#[test]
fn test_bulk_insert_smaller_than_threshold() {
    let (_temp, _config, mut table) = setup_temp_table(4);
    insert_ids(&mut table, 0..1);

    table.bulk_insert((1..3).map(pair_row), 2).unwrap();

    assert_eq!(table.buffered_row_count(), 3);
    assert_eq!(scan_ids(&table), vec![0, 1, 2]);
}

#[test]
fn test_bulk_insert_large_load() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with_threshold(&temp_dir, 1024);
    let mut table = Table::create(&config, "bulk", pair_schema()).unwrap();

    table.bulk_insert((0..5000).map(pair_row), 5000).unwrap();

    assert_eq!(table.column(0).run_sizes(), vec![4096]);
    assert_eq!(table.buffered_row_count(), 904);
    let rows: Vec<Row> = table.scan_all().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 5000);
    assert_eq!(rows[4999], pair_row(4999));
    assert_eq!(rows[1234], pair_row(1234));
}

#[test]
fn test_bulk_insert_too_few_rows() {
    let (_temp, _config, mut table) = setup_temp_table(4);

    let result = table.bulk_insert((0..7).map(pair_row), 8);

    assert!(matches!(result.unwrap_err(), StoreError::SizeMismatch { .. }));
    assert_eq!(table.row_count(), 0);
    assert!(table.column(0).is_empty());
}

#[test]
fn test_bulk_insert_too_many_rows() {
    let (_temp, _config, mut table) = setup_temp_table(4);

    let result = table.bulk_insert((0..10).map(pair_row), 8);

    assert!(matches!(
        result.unwrap_err(),
        StoreError::SizeMismatch { expected: 8, actual: 10 }
    ));
    // Nothing was committed before the extra rows were found
    assert_eq!(table.row_count(), 0);
    for rank in 0..3 {
        assert!(table.column(rank).is_empty());
    }
    assert_eq!(fs::read_dir(table.dir().join("c0")).unwrap().count(), 0);
}

#[test]
fn test_bulk_insert_too_many_rows_keeps_buffer() {
    let (_temp, _config, mut table) = setup_temp_table(4);
    insert_ids(&mut table, 0..2);

    let result = table.bulk_insert((2..9).map(pair_row), 6);

    assert!(matches!(
        result.unwrap_err(),
        StoreError::SizeMismatch { expected: 6, actual: 7 }
    ));
    assert_eq!(table.row_count(), 2);
    assert_eq!(table.buffered_row_count(), 2);
    assert!(table.column(0).is_empty());
    assert_eq!(scan_ids(&table), vec![0, 1]);
}

#[test]
fn test_bulk_insert_too_many_small_rows() {
    let (_temp, _config, mut table) = setup_temp_table(4);

    let result = table.bulk_insert((0..3).map(pair_row), 2);

    assert!(matches!(result.unwrap_err(), StoreError::SizeMismatch { .. }));
    assert_eq!(table.row_count(), 0);
    assert_eq!(table.buffered_row_count(), 0);
}

#[test]
fn test_bulk_insert_bad_tail_row() {
    let (_temp, _config, mut table) = setup_temp_table(4);
    let mut rows: Vec<Row> = (0..6).map(pair_row).collect();
    rows[5] = vec![Datum::Float64(5.0)];

    let result = table.bulk_insert(rows, 6);

    assert!(matches!(result.unwrap_err(), StoreError::SchemaMismatch(_)));
    assert_eq!(table.row_count(), 0);
    assert!(table.column(0).is_empty());
}

#[test]
fn test_bulk_insert_bad_row() {
    let (_temp, _config, mut table) = setup_temp_table(4);
    let mut rows: Vec<Row> = (0..8).map(pair_row).collect();
    rows[5] = vec![Datum::Int64(5)];

    let result = table.bulk_insert(rows, 8);

    assert!(matches!(result.unwrap_err(), StoreError::SchemaMismatch(_)));
    // No column committed a partial bulk
    for rank in 0..3 {
        assert!(table.column(rank).is_empty());
    }
}

// =============================================================================
// Reload Tests
// =============================================================================

#[test]
fn test_load_restores_state() {
    let (_temp, config, mut table) = setup_temp_table(4);
    insert_ids(&mut table, 0..11);
    let before: Vec<Row> = table.scan_all().unwrap().map(|r| r.unwrap()).collect();
    drop(table);

    let table = Table::load(&config, "events").unwrap();

    assert_eq!(table.row_count(), 11);
    assert_eq!(table.buffered_row_count(), 3);
    assert_eq!(table.column(0).run_sizes(), vec![8]);
    let after: Vec<Row> = table.scan_all().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(after, before);
}

#[test]
fn test_load_then_continue_inserting() {
    let (_temp, config, mut table) = setup_temp_table(4);
    insert_ids(&mut table, 0..6);
    drop(table);

    let mut table = Table::load(&config, "events").unwrap();
    insert_ids(&mut table, 6..13);

    assert_eq!(table.column(0).run_sizes(), vec![8, 4]);
    assert_eq!(scan_ids(&table), (0..13).collect::<Vec<_>>());
}

#[test]
fn test_load_keeps_persisted_threshold() {
    let (temp, _config, mut table) = setup_temp_table(4);
    insert_ids(&mut table, 0..6);
    drop(table);

    let other = config_with_threshold(&temp, 1024);
    let table = Table::load(&other, "events").unwrap();

    assert_eq!(table.flush_threshold(), 4);
    assert_eq!(table.buffered_row_count(), 2);
}

#[test]
fn test_synced_inserts_reload() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .flush_threshold(4)
        .sync_metadata(true)
        .build()
        .unwrap();
    let mut table = Table::create(&config, "events", pair_schema()).unwrap();

    insert_ids(&mut table, 0..6);
    table.bulk_insert((6..11).map(pair_row), 5).unwrap();
    drop(table);

    let table = Table::load(&config, "events").unwrap();
    assert_eq!(table.row_count(), 11);
    assert_eq!(table.buffered_row_count(), 3);
    assert_eq!(table.column(0).run_sizes(), vec![8]);
    assert_eq!(scan_ids(&table), (0..11).collect::<Vec<_>>());
}

#[test]
fn test_metadata_persisted_after_every_insert() {
    let (_temp, config, mut table) = setup_temp_table(4);
    let meta_path = config.data_dir.join("events").join("metadata");

    for id in 0..5 {
        table.insert(&pair_row(id)).unwrap();
        let meta = TableMetadata::load(&meta_path).unwrap();
        assert_eq!(meta.total_row_count, id as u64 + 1);
    }
}

#[test]
fn test_load_missing_table() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with_threshold(&temp_dir, 4);

    let result = Table::load(&config, "nope");

    assert!(matches!(result.err().unwrap(), StoreError::File { .. }));
}

#[test]
fn test_load_detects_missing_run() {
    let (_temp, config, mut table) = setup_temp_table(4);
    insert_ids(&mut table, 0..4);
    drop(table);
    fs::remove_file(config.data_dir.join("events").join("c1").join("4")).unwrap();

    let result = Table::load(&config, "events");

    assert!(matches!(result.err().unwrap(), StoreError::Storage(_)));
}

#[test]
fn test_load_detects_corrupt_metadata() {
    let (_temp, config, table) = setup_temp_table(4);
    drop(table);
    let meta_path = config.data_dir.join("events").join("metadata");
    let mut bytes = fs::read(&meta_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&meta_path, bytes).unwrap();

    let result = Table::load(&config, "events");

    assert!(matches!(result.err().unwrap(), StoreError::Corruption(_)));
}
