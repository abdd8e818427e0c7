//! Layered configuration: defaults, TOML file and CLI overrides.

use std::io::Write;

use ringfinder::rules::RuleKind;
use ringfinder::{
    ClusteringStrategy, ConfigOverrides, DefaultsOverrides, EngineConfig, RuleEngine, RulePreset,
};
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn file_values_override_defaults() {
    let file = config_file(
        r#"
[defaults]
threshold = 4
similarity_threshold = 90
strategy = "connected-components"

[columns]
recipient_name = "item_name"
"#,
    );
    let config = EngineConfig::from_env(Some(file.path())).unwrap();
    assert_eq!(config.defaults.threshold, 4);
    assert_eq!(config.defaults.similarity_threshold, 90);
    assert_eq!(config.defaults.strategy, ClusteringStrategy::ConnectedComponents);
    // untouched keys keep their defaults
    assert_eq!(config.defaults.voucher_threshold, 5);
    assert_eq!(config.columns.recipient_name, "item_name");
    assert_eq!(config.columns.buyer_id, "buyer_id");

    let rule = RulePreset::SimilarNameAddress.build(&config);
    assert_eq!(rule.threshold, 4);
    match rule.kind {
        RuleKind::FuzzyCluster(spec) => {
            assert_eq!(spec.name_column.as_deref(), Some("item_name"));
            assert_eq!(spec.strategy, ClusteringStrategy::ConnectedComponents);
        }
        other => panic!("unexpected kind {}", other.label()),
    }
}

#[test]
fn cli_overrides_beat_the_file() {
    let file = config_file("[defaults]\nthreshold = 4\nsimilarity_threshold = 90\n");
    let overrides = ConfigOverrides::with_defaults(DefaultsOverrides {
        threshold: Some(6),
        ..DefaultsOverrides::default()
    });
    let config = EngineConfig::load(Some(file.path()), overrides).unwrap();
    assert_eq!(config.defaults.threshold, 6);
    assert_eq!(config.defaults.similarity_threshold, 90);
}

#[test]
fn custom_rules_load_from_toml() {
    let file = config_file(
        r#"
[[rules]]
name = "same-ip-same-promo"
kind = "exact-key"
threshold = 2
keys = [{ column = "ip_checkout" }, { column = "pv_promotion_id" }]
"#,
    );
    let config = EngineConfig::from_env(Some(file.path())).unwrap();
    let engine = RuleEngine::new(config);
    let rule = engine.rule("same-ip-same-promo").unwrap();
    assert_eq!(rule.threshold, 2);
    assert_eq!(rule.output_header, "ID");
    assert_eq!(engine.rules().len(), RulePreset::ALL.len() + 1);
}

#[test]
fn invalid_files_are_rejected() {
    let file = config_file("[defaults]\nsimilarity_threshold = 150\n");
    assert!(EngineConfig::from_env(Some(file.path())).is_err());

    let file = config_file(
        r#"
[[rules]]
name = "twice"
kind = "exact-key"
keys = [{ column = "a" }]

[[rules]]
name = "twice"
kind = "exact-key"
keys = [{ column = "b" }]
"#,
    );
    let err = EngineConfig::from_env(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("twice"));

    let file = config_file("[[rules]]\nname = \"no-keys\"\nkind = \"exact-key\"\nkeys = []\n");
    assert!(EngineConfig::from_env(Some(file.path())).is_err());

    let file = config_file(
        "[[rules]]\nname = \"../outside\"\nkind = \"exact-key\"\nkeys = [{ column = \"a\" }]\n",
    );
    let err = EngineConfig::from_env(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("../outside"));

    let file = config_file("[defaults]\nthreshold = \"many\"\n");
    assert!(EngineConfig::from_env(Some(file.path())).is_err());
}
