//! # Rules Module
//!
//! A rule is a configuration value: which columns identify a buyer, which columns link
//! records, how large a group must be, and which of the three grouping algorithms applies.
//! Every rule declares its required columns and is validated against the table once,
//! before any grouping starts.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{Table, Value};
use crate::normalize::normalize_phone;
use crate::similarity::{Score, SimilarityMetric};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

fn default_output_header() -> String {
    crate::config::ID_HEADER.to_string()
}

fn default_identity_column() -> String {
    crate::config::DEFAULT_BUYER_ID_COLUMN.to_string()
}

fn default_threshold() -> usize {
    crate::config::DEFAULT_DISTINCT_THRESHOLD
}

fn default_window_secs() -> i64 {
    crate::config::DEFAULT_WINDOW_SECS
}

/// A declared grouping rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Human-readable name, also the provenance tag on clusters
    pub name: String,
    /// Header of the single-column output
    #[serde(default = "default_output_header")]
    pub output_header: String,
    /// Column holding the buyer identifier
    #[serde(default = "default_identity_column")]
    pub identity_column: String,
    /// Minimum distinct identities a group needs to be flagged
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    #[serde(flatten)]
    pub kind: RuleKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RuleKind {
    ExactKey(ExactKeySpec),
    TemporalWindow(TemporalSpec),
    FuzzyCluster(FuzzySpec),
}

impl RuleKind {
    pub fn label(&self) -> &'static str {
        match self {
            RuleKind::ExactKey(_) => "exact-key",
            RuleKind::TemporalWindow(_) => "temporal-window",
            RuleKind::FuzzyCluster(_) => "fuzzy-cluster",
        }
    }
}

/// How a key column's raw value becomes part of a grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KeyTransform {
    /// Trimmed text, canonical numbers
    #[default]
    Verbatim,
    /// Digits only
    PhoneDigits,
}

impl KeyTransform {
    pub fn apply(self, value: &Value) -> Option<String> {
        match self {
            KeyTransform::Verbatim => value.key_text(),
            KeyTransform::PhoneDigits => normalize_phone(value.as_text().as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyColumn {
    pub column: String,
    #[serde(default)]
    pub transform: KeyTransform,
}

impl KeyColumn {
    pub fn verbatim(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            transform: KeyTransform::Verbatim,
        }
    }

    pub fn phone(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            transform: KeyTransform::PhoneDigits,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactKeySpec {
    pub keys: Vec<KeyColumn>,
}

/// Which record the window span is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AnchorPolicy {
    /// The group's first record; the whole group fits inside one span.
    #[default]
    Fixed,
    /// The most recently absorbed record; groups may chain past one span.
    Rolling,
}

/// Where the scan resumes after a candidate group is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AdvancePolicy {
    /// The first record outside the group.
    #[default]
    SkipPast,
    /// The record after the anchor, re-seeding from every group member.
    ByOne,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalSpec {
    /// Records only group with others sharing this key
    pub partition: KeyColumn,
    /// One or two time columns; the first is the sort key
    pub time_columns: Vec<String>,
    #[serde(default = "default_window_secs")]
    pub window_secs: i64,
    #[serde(default)]
    pub anchor: AnchorPolicy,
    #[serde(default)]
    pub advance: AdvancePolicy,
}

/// How clusters are formed inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ClusteringStrategy {
    /// One pass per seed; members only need to match the seed.
    #[default]
    Star,
    /// Transitive closure of the pairwise predicate.
    ConnectedComponents,
}

impl fmt::Display for ClusteringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusteringStrategy::Star => f.write_str("star"),
            ClusteringStrategy::ConnectedComponents => f.write_str("connected-components"),
        }
    }
}

impl FromStr for ClusteringStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "star" => Ok(ClusteringStrategy::Star),
            "connected-components" => Ok(ClusteringStrategy::ConnectedComponents),
            other => Err(format!(
                "unknown clustering strategy `{other}` (expected `star` or `connected-components`)"
            )),
        }
    }
}

/// Leading-token truncation used to build block keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingSpec {
    #[serde(default)]
    pub name_words: usize,
    pub address_words: usize,
    /// Append the canonical order value to the key
    #[serde(default)]
    pub include_value: bool,
}

/// `metric(a, b) >= threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityClause {
    pub metric: SimilarityMetric,
    pub threshold: Score,
}

impl SimilarityClause {
    pub fn new(metric: SimilarityMetric, threshold: Score) -> Self {
        Self { metric, threshold }
    }

    pub fn holds(&self, a: &str, b: &str) -> bool {
        self.metric.score(a, b) >= self.threshold
    }
}

/// Order-value agreement between two records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ValueMatch {
    Exact,
    Within { tolerance: f64 },
}

impl ValueMatch {
    pub fn matches(&self, a: f64, b: f64) -> bool {
        match self {
            ValueMatch::Exact => a == b,
            ValueMatch::Within { tolerance } => (a - b).abs() <= *tolerance,
        }
    }
}

/// Normalized fields of one record, as seen by the predicate.
#[derive(Debug, Clone, Copy)]
pub struct Comparable<'a> {
    pub name: Option<&'a str>,
    pub address: &'a str,
    pub value: Option<f64>,
}

/// Pairwise predicate deciding whether a record joins a seed's cluster.
///
/// `((name similar, if a name clause is set) AND address similar) OR
/// (shortcut enabled AND addresses identical)`, then AND the value match if one is set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompoundPredicate {
    #[serde(default)]
    pub name: Option<SimilarityClause>,
    pub address: SimilarityClause,
    #[serde(default)]
    pub exact_address_shortcut: bool,
    #[serde(default)]
    pub value: Option<ValueMatch>,
}

impl CompoundPredicate {
    pub fn matches(&self, a: &Comparable<'_>, b: &Comparable<'_>) -> bool {
        let exact = self.exact_address_shortcut && a.address == b.address;
        let similar = exact || (self.names_similar(a, b) && self.address.holds(a.address, b.address));
        if !similar {
            return false;
        }
        match (&self.value, a.value, b.value) {
            (None, _, _) => true,
            (Some(rule), Some(x), Some(y)) => rule.matches(x, y),
            (Some(_), _, _) => false,
        }
    }

    fn names_similar(&self, a: &Comparable<'_>, b: &Comparable<'_>) -> bool {
        match (&self.name, a.name, b.name) {
            (None, _, _) => true,
            (Some(clause), Some(x), Some(y)) => clause.holds(x, y),
            (Some(_), _, _) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzySpec {
    #[serde(default)]
    pub name_column: Option<String>,
    pub address_column: String,
    #[serde(default)]
    pub value_column: Option<String>,
    pub blocking: BlockingSpec,
    pub predicate: CompoundPredicate,
    #[serde(default)]
    pub strategy: ClusteringStrategy,
}

/// What a required column must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnKind {
    Identity,
    Key,
    Time,
    Text,
    Numeric,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequiredColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl Rule {
    fn with_kind(name: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            output_header: default_output_header(),
            identity_column: default_identity_column(),
            threshold: default_threshold(),
            kind,
        }
    }

    pub fn exact_key(name: impl Into<String>, keys: Vec<KeyColumn>) -> Self {
        Self::with_kind(name, RuleKind::ExactKey(ExactKeySpec { keys }))
    }

    pub fn temporal_window(name: impl Into<String>, spec: TemporalSpec) -> Self {
        Self::with_kind(name, RuleKind::TemporalWindow(spec))
    }

    pub fn fuzzy_cluster(name: impl Into<String>, spec: FuzzySpec) -> Self {
        Self::with_kind(name, RuleKind::FuzzyCluster(spec))
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_output_header(mut self, header: impl Into<String>) -> Self {
        self.output_header = header.into();
        self
    }

    pub fn with_identity_column(mut self, column: impl Into<String>) -> Self {
        self.identity_column = column.into();
        self
    }

    /// Declared columns, identity first, each listed once.
    pub fn required_columns(&self) -> Vec<RequiredColumn> {
        let mut columns = vec![RequiredColumn {
            name: self.identity_column.clone(),
            kind: ColumnKind::Identity,
        }];
        let mut push = |name: &str, kind: ColumnKind| {
            if !columns.iter().any(|c| c.name == name) {
                columns.push(RequiredColumn {
                    name: name.to_string(),
                    kind,
                });
            }
        };
        match &self.kind {
            RuleKind::ExactKey(spec) => {
                for key in &spec.keys {
                    push(&key.column, ColumnKind::Key);
                }
            }
            RuleKind::TemporalWindow(spec) => {
                push(&spec.partition.column, ColumnKind::Key);
                for column in &spec.time_columns {
                    push(column, ColumnKind::Time);
                }
            }
            RuleKind::FuzzyCluster(spec) => {
                if let Some(name) = &spec.name_column {
                    push(name, ColumnKind::Text);
                }
                push(&spec.address_column, ColumnKind::Text);
                if let Some(value) = &spec.value_column {
                    push(value, ColumnKind::Numeric);
                }
            }
        }
        columns
    }

    /// Structural checks that do not depend on the table.
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: &str| Err(EngineError::invalid_rule(&self.name, reason));
        if self.name.trim().is_empty() {
            return invalid("rule name is empty");
        }
        if !is_file_stem(&self.name) {
            return invalid("rule name may only use letters, digits, '-', '_' and inner '.'");
        }
        if self.threshold == 0 {
            return invalid("threshold must be at least 1");
        }
        match &self.kind {
            RuleKind::ExactKey(spec) => {
                if spec.keys.is_empty() {
                    return invalid("exact-key rule needs at least one key column");
                }
            }
            RuleKind::TemporalWindow(spec) => {
                if spec.time_columns.is_empty() || spec.time_columns.len() > 2 {
                    return invalid("temporal rule needs one or two time columns");
                }
                if spec.window_secs < 0 {
                    return invalid("window span must not be negative");
                }
            }
            RuleKind::FuzzyCluster(spec) => {
                let predicate = &spec.predicate;
                if predicate.name.is_some() && spec.name_column.is_none() {
                    return invalid("name similarity clause without a name column");
                }
                if (predicate.value.is_some() || spec.blocking.include_value)
                    && spec.value_column.is_none()
                {
                    return invalid("order-value matching without a value column");
                }
                let mut thresholds = predicate
                    .name
                    .iter()
                    .chain(std::iter::once(&predicate.address))
                    .map(|clause| clause.threshold);
                if thresholds.any(|t| t > 100) {
                    return invalid("similarity thresholds are on a 0-100 scale");
                }
                if let Some(ValueMatch::Within { tolerance }) = predicate.value {
                    if !tolerance.is_finite() || tolerance < 0.0 {
                        return invalid("value tolerance must be a non-negative number");
                    }
                }
            }
        }
        Ok(())
    }

    /// Reject the table when any declared column is absent, naming every missing one.
    pub fn validate_schema(&self, table: &Table) -> Result<(), EngineError> {
        let missing: Vec<String> = self
            .required_columns()
            .into_iter()
            .filter(|column| !table.has_column(&column.name))
            .map(|column| column.name)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::missing_columns(&self.name, missing))
        }
    }
}

/// Rule names double as output file stems, so path separators and leading dots are out.
fn is_file_stem(name: &str) -> bool {
    !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// The report catalogue, each a parameterisation of one of the three groupers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RulePreset {
    PhoneRegistrationBurst,
    SamePromotionPhone,
    SameFreeShippingVoucher,
    CheckoutIpBurst,
    CheckoutIpDualBurst,
    SharedRecipientPhone,
    SimilarNameAddress,
    SamePromotionPhoneDistrict,
    SameRecipientPhone,
    SameOrderValueSimilarAddress,
    TolerantOrderValueAddress,
}

impl RulePreset {
    pub const ALL: [RulePreset; 11] = [
        RulePreset::PhoneRegistrationBurst,
        RulePreset::SamePromotionPhone,
        RulePreset::SameFreeShippingVoucher,
        RulePreset::CheckoutIpBurst,
        RulePreset::CheckoutIpDualBurst,
        RulePreset::SharedRecipientPhone,
        RulePreset::SimilarNameAddress,
        RulePreset::SamePromotionPhoneDistrict,
        RulePreset::SameRecipientPhone,
        RulePreset::SameOrderValueSimilarAddress,
        RulePreset::TolerantOrderValueAddress,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RulePreset::PhoneRegistrationBurst => "phone-registration-burst",
            RulePreset::SamePromotionPhone => "same-promotion-phone",
            RulePreset::SameFreeShippingVoucher => "same-free-shipping-voucher",
            RulePreset::CheckoutIpBurst => "checkout-ip-burst",
            RulePreset::CheckoutIpDualBurst => "checkout-ip-dual-burst",
            RulePreset::SharedRecipientPhone => "shared-recipient-phone",
            RulePreset::SimilarNameAddress => "similar-name-address",
            RulePreset::SamePromotionPhoneDistrict => "same-promotion-phone-district",
            RulePreset::SameRecipientPhone => "same-recipient-phone",
            RulePreset::SameOrderValueSimilarAddress => "same-order-value-similar-address",
            RulePreset::TolerantOrderValueAddress => "tolerant-order-value-address",
        }
    }

    /// Materialize the preset with the configured columns and defaults.
    pub fn build(self, config: &EngineConfig) -> Rule {
        let c = &config.columns;
        let d = &config.defaults;
        let burst = |partition: &str, time_columns: Vec<String>| TemporalSpec {
            partition: KeyColumn::verbatim(partition),
            time_columns,
            window_secs: d.window_secs,
            anchor: d.anchor,
            advance: d.advance,
        };
        let address_clause =
            SimilarityClause::new(SimilarityMetric::TokenSortRatio, d.similarity_threshold);
        let value_rule = |value: ValueMatch, include_value: bool| FuzzySpec {
            name_column: None,
            address_column: c.district.clone(),
            value_column: Some(c.order_value.clone()),
            blocking: BlockingSpec {
                name_words: 0,
                address_words: d.address_block_words,
                include_value,
            },
            predicate: CompoundPredicate {
                name: None,
                address: address_clause,
                exact_address_shortcut: true,
                value: Some(value),
            },
            strategy: d.strategy,
        };

        let rule = match self {
            RulePreset::PhoneRegistrationBurst => Rule::temporal_window(
                self.name(),
                burst(&c.device_phone, vec![c.registration_time.clone()]),
            ),
            RulePreset::SamePromotionPhone => Rule::exact_key(
                self.name(),
                vec![
                    KeyColumn::verbatim(&c.recipient_phone),
                    KeyColumn::verbatim(&c.promotion),
                ],
            ),
            RulePreset::SameFreeShippingVoucher => Rule::exact_key(
                self.name(),
                vec![
                    KeyColumn::verbatim(&c.recipient_phone),
                    KeyColumn::verbatim(&c.voucher),
                    KeyColumn::verbatim(&c.district),
                ],
            ),
            RulePreset::CheckoutIpBurst => Rule::temporal_window(
                self.name(),
                burst(&c.checkout_ip, vec![c.create_time.clone()]),
            ),
            RulePreset::CheckoutIpDualBurst => Rule::temporal_window(
                self.name(),
                burst(
                    &c.checkout_ip,
                    vec![c.create_time.clone(), c.registration_time.clone()],
                ),
            ),
            RulePreset::SharedRecipientPhone => {
                Rule::exact_key(self.name(), vec![KeyColumn::phone(&c.recipient_phone)])
                    .with_output_header(crate::config::BUYER_ID_HEADER)
            }
            RulePreset::SimilarNameAddress => Rule::fuzzy_cluster(
                self.name(),
                FuzzySpec {
                    name_column: Some(c.recipient_name.clone()),
                    address_column: c.district.clone(),
                    value_column: None,
                    blocking: BlockingSpec {
                        name_words: d.name_block_words,
                        address_words: d.address_block_words,
                        include_value: false,
                    },
                    predicate: CompoundPredicate {
                        name: Some(SimilarityClause::new(
                            SimilarityMetric::Ratio,
                            d.similarity_threshold,
                        )),
                        address: address_clause,
                        exact_address_shortcut: true,
                        value: None,
                    },
                    strategy: d.strategy,
                },
            )
            .with_output_header(crate::config::BUYER_ID_HEADER),
            RulePreset::SamePromotionPhoneDistrict => Rule::exact_key(
                self.name(),
                vec![
                    KeyColumn::verbatim(&c.recipient_phone),
                    KeyColumn::verbatim(&c.promotion),
                    KeyColumn::verbatim(&c.district),
                ],
            ),
            RulePreset::SameRecipientPhone => {
                Rule::exact_key(self.name(), vec![KeyColumn::verbatim(&c.recipient_phone)])
            }
            RulePreset::SameOrderValueSimilarAddress => {
                Rule::fuzzy_cluster(self.name(), value_rule(ValueMatch::Exact, true))
                    .with_output_header(crate::config::BUYER_ID_HEADER)
            }
            RulePreset::TolerantOrderValueAddress => Rule::fuzzy_cluster(
                self.name(),
                value_rule(
                    ValueMatch::Within {
                        tolerance: d.value_tolerance,
                    },
                    false,
                ),
            )
            .with_output_header(crate::config::BUYER_ID_HEADER),
        };

        let threshold = match self {
            RulePreset::SameFreeShippingVoucher => d.voucher_threshold,
            RulePreset::SharedRecipientPhone => d.shared_phone_threshold,
            _ => d.threshold,
        };
        rule.with_identity_column(&c.buyer_id)
            .with_threshold(threshold)
    }
}

impl fmt::Display for RulePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RulePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RulePreset::ALL
            .into_iter()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = RulePreset::ALL.iter().map(|p| p.name()).collect();
                format!("unknown rule `{s}`; known rules: {}", known.join(", "))
            })
    }
}

/// Names that appear more than once in a rule list.
pub fn duplicate_rule_names(rules: &[Rule]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for rule in rules {
        if !seen.insert(rule.name.as_str()) && !duplicates.contains(&rule.name) {
            duplicates.push(rule.name.clone());
        }
    }
    duplicates
}
