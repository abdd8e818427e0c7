//! Unified configuration for the rule engine.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Defaults
//!
//! # Example config file (ringfinder.toml)
//! ```toml
//! [defaults]
//! threshold = 3
//! similarity_threshold = 85
//! strategy = "connected-components"
//!
//! [columns]
//! recipient_name = "item_name"
//! order_value = "Order Value (Checkout Amount)"
//!
//! [[rules]]
//! name = "same-ip-same-promo"
//! kind = "exact-key"
//! keys = [{ column = "ip_checkout" }, { column = "pv_promotion_id" }]
//! ```
//!
//! Environment variables use the `RINGFINDER_` prefix and `__` between nesting levels,
//! e.g. `RINGFINDER_DEFAULTS__WINDOW_SECS=1800`.

mod defaults;

pub use defaults::*;

use crate::rules::{AdvancePolicy, AnchorPolicy, ClusteringStrategy, Rule, RulePreset};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Main configuration for the engine and CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parameters shared by the preset rules
    pub defaults: RuleDefaults,
    /// Column names the presets read
    pub columns: ColumnNames,
    /// Additional fully specified rules
    pub rules: Vec<Rule>,
}

impl EngineConfig {
    /// Load configuration with precedence: CLI args > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - CLI overrides to apply on top
    pub fn load(
        config_path: Option<&Path>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(EngineConfig::default()));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables with RINGFINDER_ prefix
        figment = figment.merge(Env::prefixed("RINGFINDER_").split("__"));

        // Layer 3: CLI overrides
        figment = figment.merge(Serialized::defaults(overrides));

        let config: EngineConfig = figment.extract()?;
        config.check()?;
        Ok(config)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    /// Every preset followed by the custom rules.
    pub fn all_rules(&self) -> Vec<Rule> {
        RulePreset::ALL
            .iter()
            .map(|preset| preset.build(self))
            .chain(self.rules.iter().cloned())
            .collect()
    }

    /// Look up a rule by name; custom rules shadow presets of the same name.
    pub fn rule(&self, name: &str) -> Option<Rule> {
        if let Some(rule) = self.rules.iter().find(|rule| rule.name == name) {
            return Some(rule.clone());
        }
        name.parse::<RulePreset>()
            .ok()
            .map(|preset| preset.build(self))
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.defaults.similarity_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "similarity_threshold {} is above 100",
                self.defaults.similarity_threshold
            )));
        }
        let duplicates = crate::rules::duplicate_rule_names(&self.rules);
        if !duplicates.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "custom rules defined more than once: {}",
                duplicates.join(", ")
            )));
        }
        for rule in &self.rules {
            rule.validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }
}

/// Parameters shared across the preset rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleDefaults {
    pub threshold: usize,
    pub shared_phone_threshold: usize,
    pub voucher_threshold: usize,
    pub window_secs: i64,
    pub similarity_threshold: u8,
    pub value_tolerance: f64,
    pub name_block_words: usize,
    pub address_block_words: usize,
    pub strategy: ClusteringStrategy,
    pub anchor: AnchorPolicy,
    pub advance: AdvancePolicy,
}

impl Default for RuleDefaults {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DISTINCT_THRESHOLD,
            shared_phone_threshold: DEFAULT_SHARED_PHONE_THRESHOLD,
            voucher_threshold: DEFAULT_VOUCHER_THRESHOLD,
            window_secs: DEFAULT_WINDOW_SECS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            value_tolerance: DEFAULT_VALUE_TOLERANCE,
            name_block_words: DEFAULT_NAME_BLOCK_WORDS,
            address_block_words: DEFAULT_ADDRESS_BLOCK_WORDS,
            strategy: ClusteringStrategy::default(),
            anchor: AnchorPolicy::default(),
            advance: AdvancePolicy::default(),
        }
    }
}

/// Canonical column names after the ingestion layer has mapped vendor headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub buyer_id: String,
    pub device_phone: String,
    pub recipient_phone: String,
    pub promotion: String,
    pub voucher: String,
    pub district: String,
    pub checkout_ip: String,
    pub create_time: String,
    pub registration_time: String,
    pub recipient_name: String,
    pub order_value: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            buyer_id: DEFAULT_BUYER_ID_COLUMN.to_string(),
            device_phone: DEFAULT_DEVICE_PHONE_COLUMN.to_string(),
            recipient_phone: DEFAULT_RECIPIENT_PHONE_COLUMN.to_string(),
            promotion: DEFAULT_PROMOTION_COLUMN.to_string(),
            voucher: DEFAULT_VOUCHER_COLUMN.to_string(),
            district: DEFAULT_DISTRICT_COLUMN.to_string(),
            checkout_ip: DEFAULT_CHECKOUT_IP_COLUMN.to_string(),
            create_time: DEFAULT_CREATE_TIME_COLUMN.to_string(),
            registration_time: DEFAULT_REGISTRATION_TIME_COLUMN.to_string(),
            recipient_name: DEFAULT_RECIPIENT_NAME_COLUMN.to_string(),
            order_value: DEFAULT_ORDER_VALUE_COLUMN.to_string(),
        }
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ClusteringStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<AnchorPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advance: Option<AdvancePolicy>,
}

impl DefaultsOverrides {
    pub fn is_empty(&self) -> bool {
        self.threshold.is_none()
            && self.window_secs.is_none()
            && self.similarity_threshold.is_none()
            && self.strategy.is_none()
            && self.anchor.is_none()
            && self.advance.is_none()
    }
}

impl ConfigOverrides {
    pub fn with_defaults(defaults: DefaultsOverrides) -> Self {
        Self {
            defaults: (!defaults.is_empty()).then_some(defaults),
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),
    #[error("configuration error: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Figment(Box::new(e))
    }
}
