use std::sync::Arc;
use std::thread;

use std::path::Path;

use hps_core::config::{StorageMode, TableConfig};
use hps_core::errors::{ConfigError, HpsError, HpsResult, LoadError};
use hps_core::traits::DataSource;
use hps_fixtures::{write_raw_table, write_sparse_table, TableFixture};
use hps_store::{LocalFileSource, SparseTableStore};
use proptest::prelude::*;

fn open(fixture: &TableFixture, storage: StorageMode) -> SparseTableStore {
    let mut table = fixture.table_config(0, 1, 4);
    table.storage = storage;
    SparseTableStore::open("naive_dnn", &table).unwrap()
}

// ── Round-trip through both storage modes ─────────────────────────────────

#[test]
fn every_written_row_reads_back_exactly() {
    let fixture = TableFixture::sequential(500, 16);
    for storage in [StorageMode::Mmap, StorageMode::Memory] {
        let store = open(&fixture, storage);
        assert_eq!(store.row_count(), 500);
        assert_eq!(store.dimension(), 16);
        for &key in &fixture.keys {
            let got = store.get(key).unwrap();
            assert_eq!(got.as_slice(), fixture.expected(key).unwrap());
        }
    }
}

#[test]
fn storage_modes_report_their_kind() {
    let fixture = TableFixture::three_rows();
    assert_eq!(open(&fixture, StorageMode::Mmap).storage_kind(), "mmap");
    let owned = open(&fixture, StorageMode::Memory);
    assert_eq!(owned.storage_kind(), "memory");
    assert_eq!(owned.resident_bytes(), 6 * 4);
}

#[test]
fn missing_key_is_not_found_not_error() {
    let fixture = TableFixture::three_rows();
    let store = open(&fixture, StorageMode::Mmap);
    assert_eq!(store.get(999), None);
    assert_eq!(
        store.bulk_get(&[2, 999, 0]),
        vec![Some(vec![3.0, 3.0]), None, Some(vec![1.0, 1.0])]
    );
}

#[test]
fn negative_and_sparse_keys_are_indexed() {
    let keys = vec![-9_000_000_000, -1, 42, i64::MAX];
    let values: Vec<f32> = (0..8).map(|v| v as f32).collect();
    let fixture = TableFixture::new(keys, values, 2);
    let store = open(&fixture, StorageMode::Memory);
    assert_eq!(store.get(-9_000_000_000), Some(vec![0.0, 1.0]));
    assert_eq!(store.get(i64::MAX), Some(vec![6.0, 7.0]));
    assert_eq!(store.keys(), fixture.keys.as_slice());
}

#[test]
fn empty_table_loads() {
    let fixture = TableFixture::new(vec![], vec![], 4);
    let store = open(&fixture, StorageMode::Mmap);
    assert_eq!(store.row_count(), 0);
    assert_eq!(store.get(0), None);
}

// ── Load-time validation ──────────────────────────────────────────────────

#[test]
fn dimension_mismatch_fails_at_load_naming_the_table() {
    // File rows are 8 floats; config declares 16.
    let fixture = TableFixture::sequential(10, 8);
    let mut table = fixture.table_config(0, 3, 4);
    table.embedding_vec_size = 16;

    let err = SparseTableStore::open("naive_dnn", &table).unwrap_err();
    match &err {
        HpsError::ConfigError(ConfigError::DimensionMismatch {
            table, expected, actual, ..
        }) => {
            assert_eq!(table, "naive_dnn[0]");
            assert_eq!(*expected, 16);
            assert_eq!(*actual, 8);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn row_count_mismatch_fails_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let table_dir = dir.path().join("t");
    // 3 keys, 2 rows of dim 4.
    write_sparse_table(&table_dir, &[0, 1], &[0.0; 8]);
    let keys: Vec<u8> = [0i64, 1, 2].iter().flat_map(|k| k.to_ne_bytes()).collect();
    std::fs::write(table_dir.join("key"), keys).unwrap();

    let table = TableConfig::new(0, &table_dir, 4, 1);
    let err = SparseTableStore::open("m", &table).unwrap_err();
    assert!(
        matches!(
            err,
            HpsError::LoadError(LoadError::RowCountMismatch {
                key_rows: 3,
                vector_rows: 2,
                ..
            })
        ),
        "{err}"
    );
}

/// Reports a fixed size for every file and reads through to local disk.
struct FixedSizeSource(u64);

impl DataSource for FixedSizeSource {
    fn name(&self) -> &str {
        "fixed-size"
    }

    fn file_size(&self, _path: &Path) -> HpsResult<u64> {
        Ok(self.0)
    }

    fn read_at(&self, path: &Path, offset: u64, buf: &mut [u8]) -> HpsResult<usize> {
        LocalFileSource.read_at(path, offset, buf)
    }
}

#[test]
fn vector_file_shorter_than_reported_fails_at_load() {
    // Source claims 3 rows of dim 2; the vector file on disk holds one row.
    let dir = tempfile::tempdir().unwrap();
    let table_dir = dir.path().join("t");
    write_sparse_table(&table_dir, &[0], &[1.0, 1.0]);
    let keys: Vec<u8> = [0i64, 1, 2].iter().flat_map(|k| k.to_ne_bytes()).collect();
    std::fs::write(table_dir.join("key"), keys).unwrap();

    for storage in [StorageMode::Mmap, StorageMode::Memory] {
        let mut table = TableConfig::new(0, &table_dir, 2, 1);
        table.storage = storage;
        let err = SparseTableStore::open_with_source("m", &table, &FixedSizeSource(24))
            .unwrap_err();
        assert!(matches!(err, HpsError::LoadError(_)), "{storage:?}: {err}");
    }

    let mut table = TableConfig::new(0, &table_dir, 2, 1);
    table.storage = StorageMode::Mmap;
    let err = SparseTableStore::open_with_source("m", &table, &FixedSizeSource(24)).unwrap_err();
    assert!(
        matches!(
            err,
            HpsError::LoadError(LoadError::RowCountMismatch {
                key_rows: 3,
                vector_rows: 1,
                ..
            })
        ),
        "{err}"
    );
}

#[test]
fn truncated_key_record_fails_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let table_dir = write_raw_table(&dir.path().join("t"), &[0u8; 12], &[0u8; 8]);
    let table = TableConfig::new(0, &table_dir, 2, 1);
    let err = SparseTableStore::open("m", &table).unwrap_err();
    assert!(matches!(
        err,
        HpsError::LoadError(LoadError::TruncatedRecord { record_bytes: 8, .. })
    ));
    assert!(err.to_string().contains("key"));
}

#[test]
fn missing_vector_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let table_dir = write_sparse_table(&dir.path().join("t"), &[1], &[1.0, 2.0]);
    std::fs::remove_file(table_dir.join("emb_vector")).unwrap();
    let table = TableConfig::new(0, &table_dir, 2, 1);
    let err = SparseTableStore::open("m", &table).unwrap_err();
    assert!(err.to_string().contains("emb_vector"), "{err}");
}

#[test]
fn duplicate_keys_fail_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let table_dir = write_sparse_table(&dir.path().join("t"), &[3, 4, 3], &[0.0; 6]);
    let table = TableConfig::new(0, &table_dir, 2, 1);
    assert!(matches!(
        SparseTableStore::open("m", &table),
        Err(HpsError::LoadError(LoadError::DuplicateKey { key: 3, .. }))
    ));
}

#[test]
fn custom_file_names_are_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let table_dir = dir.path().join("t");
    std::fs::create_dir_all(&table_dir).unwrap();
    std::fs::write(table_dir.join("ids.bin"), 7i64.to_ne_bytes()).unwrap();
    let floats: Vec<u8> = [0.25f32, 0.75].iter().flat_map(|v| v.to_ne_bytes()).collect();
    std::fs::write(table_dir.join("vecs.bin"), floats).unwrap();

    let mut table = TableConfig::new(0, &table_dir, 2, 1);
    table.key_file_name = "ids.bin".to_string();
    table.vector_file_name = "vecs.bin".to_string();
    let store = SparseTableStore::open("m", &table).unwrap();
    assert_eq!(store.get(7), Some(vec![0.25, 0.75]));
}

// ── Concurrent reads ──────────────────────────────────────────────────────

#[test]
fn concurrent_bulk_and_point_reads_agree() {
    let fixture = TableFixture::sequential(2000, 8);
    let store = Arc::new(open(&fixture, StorageMode::Mmap));
    let expected: Arc<Vec<f32>> = Arc::new(fixture.values.clone());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            let expected = Arc::clone(&expected);
            thread::spawn(move || {
                let keys: Vec<i64> = (0..2000).filter(|k| k % 4 == t).collect();
                let mut out = vec![0.0; keys.len() * 8];
                let mut found = vec![false; keys.len()];
                assert_eq!(store.bulk_read_into(&keys, &mut out, &mut found), keys.len());
                for (i, &k) in keys.iter().enumerate() {
                    let row = k as usize;
                    assert_eq!(&out[i * 8..(i + 1) * 8], &expected[row * 8..(row + 1) * 8]);
                    assert_eq!(store.get(k).unwrap(), &expected[row * 8..(row + 1) * 8]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

// ── Property: any unique key set round-trips bit-for-bit ──────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn arbitrary_tables_round_trip(
        keys in proptest::collection::hash_set(any::<i64>(), 0..64),
        dim in 1usize..8,
        seed in any::<u32>(),
    ) {
        let keys: Vec<i64> = keys.into_iter().collect();
        let values: Vec<f32> = (0..keys.len() * dim)
            .map(|i| f32::from_bits(seed.wrapping_add(i as u32) % 0x7f00_0000))
            .collect();
        let fixture = TableFixture::new(keys.clone(), values.clone(), dim);
        let store = open(&fixture, StorageMode::Mmap);
        for (row, &key) in keys.iter().enumerate() {
            let got = store.get(key).unwrap();
            let want = &values[row * dim..(row + 1) * dim];
            prop_assert!(got.iter().zip(want).all(|(a, b)| a.to_bits() == b.to_bits()));
        }
    }
}
