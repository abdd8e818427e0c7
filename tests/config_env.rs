//! Environment layer; kept in its own test binary since it mutates the process environment.

use ringfinder::rules::{AnchorPolicy, RuleKind};
use ringfinder::{ConfigOverrides, DefaultsOverrides, EngineConfig, RulePreset};

#[test]
fn env_sits_between_file_and_cli() {
    std::env::set_var("RINGFINDER_DEFAULTS__WINDOW_SECS", "1800");
    std::env::set_var("RINGFINDER_DEFAULTS__ANCHOR", "rolling");
    std::env::set_var("RINGFINDER_DEFAULTS__THRESHOLD", "4");

    let config = EngineConfig::from_env(None).unwrap();
    assert_eq!(config.defaults.window_secs, 1800);
    assert_eq!(config.defaults.anchor, AnchorPolicy::Rolling);
    assert_eq!(config.defaults.threshold, 4);
    match RulePreset::CheckoutIpBurst.build(&config).kind {
        RuleKind::TemporalWindow(spec) => {
            assert_eq!(spec.window_secs, 1800);
            assert_eq!(spec.anchor, AnchorPolicy::Rolling);
        }
        other => panic!("unexpected kind {}", other.label()),
    }

    let overrides = ConfigOverrides::with_defaults(DefaultsOverrides {
        threshold: Some(7),
        ..DefaultsOverrides::default()
    });
    let config = EngineConfig::load(None, overrides).unwrap();
    assert_eq!(config.defaults.threshold, 7);
    assert_eq!(config.defaults.window_secs, 1800);
}
