use std::io::Write;

use hps_core::config::*;
use hps_core::errors::{ConfigError, HpsError};
use proptest::prelude::*;

#[test]
fn config_loads_from_empty_toml_with_all_defaults() {
    let config = HpsConfig::from_toml("").unwrap();

    assert_eq!(config.global_batch_size, 1024);
    assert!(config.ps_config_file.is_none());
    assert!(config.ps.is_none());
    assert!(config.worker_threads.is_none());
    assert_eq!(config.max_inflight_lookups, 64);
    assert!(config.max_cache_bytes.is_none());
    assert_eq!(config.refresh_queue_depth, 4096);
    assert_eq!(config.observability.log_level, "info");
    assert!(!config.observability.json_logs);
}

#[test]
fn config_loads_partial_toml_with_overrides() {
    let toml = r#"
global_batch_size = 16384
ps_config_file = "naive_dnn.json"
worker_threads = 4

[observability]
json_logs = true
"#;
    let config = HpsConfig::from_toml(toml).unwrap();
    assert_eq!(config.global_batch_size, 16384);
    assert_eq!(config.resolved_worker_threads(), 4);
    assert!(config.observability.json_logs);
    // Non-overridden fields keep defaults
    assert_eq!(config.observability.log_level, "info");
    assert_eq!(config.max_inflight_lookups, 64);
}

#[test]
fn config_rejects_zero_batch_size() {
    let err = HpsConfig::from_toml("global_batch_size = 0").unwrap_err();
    assert!(err.to_string().contains("global_batch_size"));
}

#[test]
fn derived_worker_threads_scale_with_batch_size() {
    let small = HpsConfig::with_ps_config(16, PsConfig::default());
    assert_eq!(small.resolved_worker_threads(), 1);

    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let large = HpsConfig::with_ps_config(1 << 20, PsConfig::default());
    assert_eq!(large.resolved_worker_threads(), available);
}

#[test]
fn missing_ps_config_is_a_config_error() {
    let config = HpsConfig::default();
    assert!(matches!(
        config.load_ps_config(),
        Err(HpsError::ConfigError(ConfigError::MissingPsConfig))
    ));
}

#[test]
fn ps_config_file_json_resolves_relative_paths() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("naive_dnn.json");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        r#"{{"models":[{{"model":"naive_dnn","tables":[{{"table_id":0,"sparse_file":"sparse.model","embedding_vec_size":16,"slot_num":3}}]}}]}}"#
    )
    .unwrap();

    let config = HpsConfig::new(16384, &path);
    let ps = config.load_ps_config().unwrap();
    let table = &ps.models[0].tables[0];
    assert_eq!(table.sparse_file, dir.path().join("sparse.model"));
    // A table without tiers gets one ratio-sized tier.
    assert_eq!(table.tiers.len(), 1);
    assert_eq!(table.tiers[0].capacity_ratio, Some(0.5));
}

#[test]
fn ps_config_file_toml_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ps.toml");
    std::fs::write(
        &path,
        r#"
[[models]]
model = "wdl"

[[models.tables]]
table_id = 1
sparse_file = "/abs/wdl_1"
embedding_vec_size = 8
slot_num = 2
promotion = "fastest"
storage = "memory"

[[models.tables.tiers]]
name = "device"
capacity = 128
policy = "bucketed_lfu"
"#,
    )
    .unwrap();

    let ps = PsConfig::from_file(&path).unwrap();
    ps.validate().unwrap();
    let table = &ps.models[0].tables[0];
    assert_eq!(table.sparse_file, std::path::PathBuf::from("/abs/wdl_1"));
    assert_eq!(table.promotion, PromotionMode::Fastest);
    assert_eq!(table.storage, StorageMode::Memory);
    assert_eq!(table.tiers[0].policy, EvictionPolicyKind::BucketedLfu);
    assert_eq!(table.tiers[0].resolve_capacity(1_000_000), 128);
}

#[test]
fn unreadable_ps_config_names_the_file() {
    let err = PsConfig::from_file(std::path::Path::new("/nonexistent/ps.json")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/ps.json"));
}

#[test]
fn malformed_ps_config_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ models: ").unwrap();
    let err = PsConfig::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("broken.json"), "{err}");
}

#[test]
fn ps_config_serde_roundtrip() {
    let config = PsConfig {
        models: vec![ModelConfig {
            model: "naive_dnn".to_string(),
            max_batch_size: Some(16384),
            tables: vec![TableConfig::new(0, "/tmp/t", 16, 3)],
        }],
    };
    let json = serde_json::to_string(&config).unwrap();
    let roundtripped = PsConfig::from_json(&json).unwrap();
    assert_eq!(roundtripped.models[0].tables[0].embedding_vec_size, 16);
    assert_eq!(roundtripped.models[0].max_batch_size, Some(16384));
}

// ── properties ──────────────────────────────────────────────────

fn arb_tier(index: usize) -> impl Strategy<Value = TierConfig> {
    (
        prop_oneof![
            (1usize..1_000_000).prop_map(Some),
            Just(None),
        ],
        0.001f64..=1.0,
        1usize..=64,
        1usize..=64,
        prop_oneof![
            Just(EvictionPolicyKind::BucketedLru),
            Just(EvictionPolicyKind::BucketedLfu),
            Just(EvictionPolicyKind::TinyLfu),
        ],
    )
        .prop_map(move |(capacity, ratio, shards, ways, policy)| {
            let name = format!("tier{index}");
            let tier = match capacity {
                Some(capacity) => TierConfig::with_capacity(name, capacity),
                None => TierConfig::with_ratio(name, ratio),
            };
            tier.policy(policy).layout(shards, ways)
        })
}

fn arb_table(table_id: u32) -> impl Strategy<Value = TableConfig> {
    (
        1usize..512,
        1usize..32,
        0.0f64..=1.0,
        prop_oneof![Just(StorageMode::Mmap), Just(StorageMode::Memory)],
        0usize..3,
    )
        .prop_flat_map(move |(dim, slots, threshold, storage, tier_count)| {
            let tiers: Vec<_> = (0..tier_count).map(arb_tier).collect();
            tiers.prop_map(move |tiers| {
                let mut table = TableConfig::new(table_id, format!("/models/t{table_id}"), dim, slots);
                table.hit_rate_threshold = threshold;
                table.storage = storage;
                table.tiers = tiers;
                table
            })
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn generated_ps_configs_validate_and_survive_json(
        tables in (1u32..4).prop_flat_map(|count| (0..count).map(arb_table).collect::<Vec<_>>()),
    ) {
        let config = PsConfig {
            models: vec![ModelConfig {
                model: "naive_dnn".to_string(),
                max_batch_size: None,
                tables,
            }],
        };
        prop_assert!(config.validate().is_ok());

        let json = serde_json::to_string(&config).unwrap();
        let parsed = PsConfig::from_json(&json).unwrap();
        prop_assert!(parsed.validate().is_ok());
        for ((_, want), (_, got)) in config.tables().zip(parsed.tables()) {
            prop_assert_eq!(got.embedding_vec_size, want.embedding_vec_size);
            prop_assert_eq!(got.storage, want.storage);
            prop_assert_eq!(got.tiers.len(), want.tiers.len());
            for (a, b) in want.tiers.iter().zip(&got.tiers) {
                prop_assert_eq!(a.resolve_capacity(10_000), b.resolve_capacity(10_000));
                prop_assert_eq!(a.policy, b.policy);
            }
        }
    }

    #[test]
    fn ratio_capacity_never_exceeds_table_rows(
        rows in 0usize..50_000_000,
        ratio in 0.0001f64..=1.0,
    ) {
        let capacity = TierConfig::with_ratio("host", ratio).resolve_capacity(rows);
        prop_assert!(capacity <= rows);
        prop_assert!(capacity as f64 >= rows as f64 * ratio);
        if rows > 0 {
            prop_assert!(capacity > 0);
        }
    }
}
