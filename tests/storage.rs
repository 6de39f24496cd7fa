mod util;

use std::collections::HashSet;

use lshash_store::config::{SqliteConfig, StorageConfig};
use lshash_store::storage::{Level, SerializerKind, SqliteStorage, Storage, open_storage};
use lshash_store::StoredValue;
use proptest::prelude::*;
use serde_json::json;

use util::{TempFixtureDir, TestTracing, VectorFixtures};

// =============================================================================
// Backend matrix
// =============================================================================

fn backends() -> Vec<(&'static str, Box<dyn Storage>)> {
    let mut out: Vec<(&'static str, Box<dyn Storage>)> = Vec::new();
    out.push((
        "dict",
        open_storage(&StorageConfig::default(), 0).expect("dict"),
    ));
    out.push((
        "sqlite",
        Box::new(SqliteStorage::open(&SqliteConfig::default(), 0).expect("sqlite")),
    ));
    out.push((
        "sqlite+json",
        Box::new(
            SqliteStorage::open(
                &SqliteConfig::default().with_serializer(SerializerKind::Json),
                0,
            )
            .expect("sqlite json"),
        ),
    ));
    out.push((
        "sqlite+levels",
        Box::new(
            SqliteStorage::open(&SqliteConfig::default().with_levels(true), 0)
                .expect("sqlite levels"),
        ),
    ));
    #[cfg(feature = "redis")]
    out.push((
        "redis",
        Box::new(lshash_store::storage::RedisStorage::with_client(
            lshash_store::storage::MemoryKeyValue::new(),
            0,
        )),
    ));
    out
}

fn as_set(values: Vec<StoredValue>) -> HashSet<StoredValue> {
    values.into_iter().collect()
}

// =============================================================================
// Shared contract
// =============================================================================

#[test]
fn repeated_append_is_stored_once_on_every_backend() {
    for (name, mut store) in backends() {
        let value = StoredValue::vector(vec![1.0, 2.0, 3.0]);
        for _ in 0..5 {
            store.append_val("10110", value.clone()).unwrap();
        }
        assert_eq!(store.get_list("10110", None).unwrap(), vec![value], "{name}");
        assert_eq!(store.keys(None).unwrap(), vec!["10110".to_string()], "{name}");
    }
}

#[test]
fn fresh_store_has_no_keys_and_empty_buckets() {
    for (name, mut store) in backends() {
        assert!(store.keys(None).unwrap().is_empty(), "{name}");
        assert!(store.get_list("0101", None).unwrap().is_empty(), "{name}");

        store
            .append_val("0101", StoredValue::vector(vec![0.5]))
            .unwrap();
        assert!(store.get_list("0100", None).unwrap().is_empty(), "{name}");
    }
}

#[test]
fn labeled_values_round_trip_on_every_backend() {
    for (name, mut store) in backends() {
        let mut fixtures = VectorFixtures::new(42, 6);
        let mut expected = HashSet::new();
        for id in 0..20 {
            let value = if id % 3 == 0 {
                fixtures.vector()
            } else {
                fixtures.labeled(id)
            };
            store.append_val("0011", value.clone()).unwrap();
            expected.insert(value);
        }
        assert_eq!(as_set(store.get_list("0011", None).unwrap()), expected, "{name}");
    }
}

#[test]
fn vector_and_labeled_forms_are_distinct_values() {
    for (name, mut store) in backends() {
        store
            .append_val("1", StoredValue::vector(vec![1.0, 2.0]))
            .unwrap();
        store
            .append_val("1", StoredValue::labeled(vec![1.0, 2.0], json!(null)))
            .unwrap();
        store
            .append_val("1", StoredValue::labeled(vec![1.0, 2.0], "x"))
            .unwrap();
        assert_eq!(store.get_list("1", None).unwrap().len(), 3, "{name}");
    }
}

#[test]
fn keys_lists_every_populated_bucket() {
    for (name, mut store) in backends() {
        let mut fixtures = VectorFixtures::new(7, 3);
        let mut expected = HashSet::new();
        for _ in 0..12 {
            let key = fixtures.bucket_key(8);
            store.append_val(&key, fixtures.vector()).unwrap();
            expected.insert(key);
        }
        let keys: HashSet<String> = store.keys(None).unwrap().into_iter().collect();
        assert_eq!(keys, expected, "{name}");
    }
}

#[test]
fn non_finite_components_never_corrupt_a_bucket() {
    for (name, mut store) in backends() {
        store
            .append_val("0110", StoredValue::vector(vec![1.0, 2.0]))
            .unwrap();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            // JSON-encoded backends refuse the value; the others store it.
            let _ = store.append_val("0110", StoredValue::labeled(vec![bad, 1.0], "x"));
        }
        let read = store.get_list("0110", None).unwrap();
        assert!(read.contains(&StoredValue::vector(vec![1.0, 2.0])), "{name}");
    }
}

#[test]
fn read_back_values_do_not_grow_a_bucket() {
    for (name, mut store) in backends() {
        let mut fixtures = VectorFixtures::new(11, 8);
        for id in 0..10 {
            store.append_val("1001", fixtures.labeled(id)).unwrap();
        }
        let first = store.get_list("1001", None).unwrap();
        for value in &first {
            store.append_val("1001", value.clone()).unwrap();
        }
        let second = store.get_list("1001", None).unwrap();
        assert_eq!(second.len(), 10, "{name}");
        assert_eq!(as_set(second), as_set(first), "{name}");
    }
}

// =============================================================================
// Namespacing
// =============================================================================

#[test]
fn sqlite_indices_sharing_a_file_are_isolated() {
    let dir = TempFixtureDir::new();
    let cfg = SqliteConfig::default().with_database(dir.path().join("buckets.db"));
    let mut a = SqliteStorage::open(&cfg, 1).unwrap();
    let mut b = SqliteStorage::open(&cfg, 2).unwrap();

    a.append_val("00", StoredValue::vector(vec![1.0])).unwrap();
    b.append_val("00", StoredValue::vector(vec![2.0])).unwrap();

    assert_eq!(a.get_list("00", None).unwrap(), vec![StoredValue::vector(vec![1.0])]);
    assert_eq!(b.get_list("00", None).unwrap(), vec![StoredValue::vector(vec![2.0])]);
    assert_ne!(a.table(), b.table());
}

#[test]
fn sqlite_file_store_survives_reopen() {
    let dir = TempFixtureDir::new();
    let cfg = SqliteConfig::default()
        .with_database(dir.path().join("nested").join("buckets.db"))
        .with_levels(true);
    {
        let mut store = SqliteStorage::open(&cfg, 0).unwrap();
        store
            .append_val("10110100", StoredValue::labeled(vec![0.25], "kept"))
            .unwrap();
        store.close().unwrap();
    }
    let mut store = SqliteStorage::open(&cfg, 0).unwrap();
    store
        .append_val("10110100", StoredValue::labeled(vec![0.25], "kept"))
        .unwrap();
    assert_eq!(store.len().unwrap(), 1);
    assert_eq!(
        store.get_list("1100", Some(Level::Low)).unwrap(),
        vec![StoredValue::labeled(vec![0.25], "kept")]
    );
}

#[cfg(feature = "redis")]
#[test]
fn redis_tables_sharing_a_server_are_isolated() {
    use lshash_store::storage::{MemoryKeyValue, RedisStorage};

    let server = MemoryKeyValue::new();
    let mut a = RedisStorage::with_client(server.clone(), 3);
    let mut b = RedisStorage::with_client(server.clone(), 12);
    a.append_val("01", StoredValue::vector(vec![1.0])).unwrap();
    b.append_val("10", StoredValue::vector(vec![2.0])).unwrap();

    assert_eq!(a.keys(None).unwrap(), vec!["01".to_string()]);
    assert_eq!(b.keys(None).unwrap(), vec!["10".to_string()]);
    assert_eq!(server.raw_members("h03.01").len(), 1);
    assert_eq!(server.raw_members("h12.10").len(), 1);
}

// =============================================================================
// Levels
// =============================================================================

#[test]
fn levelled_store_merges_buckets_at_coarse_levels() {
    let mut store = SqliteStorage::open(&SqliteConfig::default().with_levels(true), 0).unwrap();
    // Both keys derive to "1100" at the low level but differ at medium.
    store
        .append_val("10110100", StoredValue::vector(vec![1.0]))
        .unwrap();
    store
        .append_val("11100000", StoredValue::vector(vec![2.0]))
        .unwrap();

    assert_eq!(Level::Low.derive_key("10110100"), "1100");
    assert_eq!(Level::Low.derive_key("11100000"), "1100");
    assert_ne!(
        Level::Medium.derive_key("10110100"),
        Level::Medium.derive_key("11100000")
    );

    assert_eq!(store.keys(Some(Level::Low)).unwrap(), vec!["1100".to_string()]);
    assert_eq!(store.keys(Some(Level::Medium)).unwrap().len(), 2);
    assert_eq!(store.get_list("1100", Some(Level::Low)).unwrap().len(), 2);
    assert_eq!(
        store
            .get_list(&Level::Medium.derive_key("10110100"), Some(Level::Medium))
            .unwrap(),
        vec![StoredValue::vector(vec![1.0])]
    );
}

#[test]
fn levels_are_ignored_by_unlevelled_backends() {
    for (name, mut store) in backends() {
        if name == "sqlite+levels" {
            continue;
        }
        store
            .append_val("10110100", StoredValue::vector(vec![1.0]))
            .unwrap();
        assert_eq!(
            store.get_list("10110100", Some(Level::Low)).unwrap().len(),
            1,
            "{name}"
        );
        assert_eq!(
            store.keys(Some(Level::Low)).unwrap(),
            vec!["10110100".to_string()],
            "{name}"
        );
    }
}

// =============================================================================
// Configuration files
// =============================================================================

#[test]
fn toml_descriptor_opens_levelled_sqlite() {
    let dir = TempFixtureDir::new();
    let db = dir.path().join("lsh.db");
    let cfg_path = dir.write(
        "storage.toml",
        &format!(
            "[sqlite]\ndatabase = {:?}\ntable = \"vectors\"\nserializer = \"json\"\nenabled_levels = true\n",
            db.display().to_string()
        ),
    );
    let cfg = StorageConfig::load(&cfg_path).unwrap();
    let mut store = open_storage(&cfg, 5).unwrap();
    assert_eq!(store.name(), "sqlite");
    store
        .append_val("10110100", StoredValue::vector(vec![1.0]))
        .unwrap();
    assert_eq!(
        store.keys(Some(Level::Medium)).unwrap(),
        vec!["110001".to_string()]
    );
    assert!(db.exists());
}

#[test]
fn json_descriptor_with_unknown_backend_is_rejected() {
    let dir = TempFixtureDir::new();
    let cfg_path = dir.write("storage.json", r#"{"cassandra": {}}"#);
    let err = StorageConfig::load(&cfg_path).unwrap_err();
    assert!(err.to_string().contains("cassandra"), "{err}");
}

// =============================================================================
// Logging
// =============================================================================

#[test]
fn sqlite_logs_open_and_duplicate_inserts() {
    let tracing = TestTracing::new();
    let _guard = tracing.install();

    let mut store = SqliteStorage::open(&SqliteConfig::default(), 9).unwrap();
    store
        .append_val("01", StoredValue::vector(vec![1.0]))
        .unwrap();
    store
        .append_val("01", StoredValue::vector(vec![1.0]))
        .unwrap();

    tracing.assert_contains("opened SQLite bucket store");
    tracing.assert_contains("lshash_9");
    assert_eq!(tracing.lines_containing("duplicate value ignored").len(), 1);
}

// =============================================================================
// Properties
// =============================================================================

fn finite_f64() -> impl Strategy<Value = f64> {
    any::<f64>().prop_filter("finite", |c| c.is_finite())
}

fn small_value() -> impl Strategy<Value = StoredValue> {
    (
        prop::collection::vec(finite_f64(), 1..4),
        prop::option::of(finite_f64()),
    )
        .prop_map(|(components, label)| match label {
            Some(score) => StoredValue::labeled(components, json!({ "score": score })),
            None => StoredValue::vector(components),
        })
}

fn bucket_key() -> impl Strategy<Value = String> {
    "[01]{8}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn bucket_contents_equal_the_distinct_appended_values(
        appends in prop::collection::vec((0usize..3, small_value()), 1..24)
    ) {
        let keys = ["000", "101", "111"];
        for (name, mut store) in backends() {
            let mut expected: Vec<HashSet<StoredValue>> = vec![HashSet::new(); keys.len()];
            for (k, value) in &appends {
                store.append_val(keys[*k], value.clone()).unwrap();
                // Re-appending must never grow a bucket.
                store.append_val(keys[*k], value.clone()).unwrap();
                expected[*k].insert(value.clone());
            }
            for (k, key) in keys.iter().enumerate() {
                let got = store.get_list(key, None).unwrap();
                prop_assert_eq!(got.len(), expected[k].len(), "{} {}", name, key);
                prop_assert_eq!(as_set(got), expected[k].clone(), "{} {}", name, key);
            }
        }
    }

    #[test]
    fn coarser_levels_contain_finer_buckets(
        entries in prop::collection::vec((bucket_key(), small_value()), 1..20)
    ) {
        let mut store =
            SqliteStorage::open(&SqliteConfig::default().with_levels(true), 0).unwrap();
        for (key, value) in &entries {
            store.append_val(key, value.clone()).unwrap();
        }
        for (key, _) in &entries {
            let high = as_set(store.get_list(key, Some(Level::High)).unwrap());
            let medium = as_set(
                store
                    .get_list(&Level::Medium.derive_key(key), Some(Level::Medium))
                    .unwrap(),
            );
            let low = as_set(
                store
                    .get_list(&Level::Low.derive_key(key), Some(Level::Low))
                    .unwrap(),
            );
            prop_assert!(high.is_subset(&medium), "{}", key);
            prop_assert!(medium.is_subset(&low), "{}", key);
        }
    }
}
