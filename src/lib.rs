//! # Ringfinder
//!
//! A rule-driven grouping engine over order tables. Each rule partitions, windows or
//! fuzzily clusters records and flags every buyer identity found in a group with enough
//! distinct buyers, a signal that those buyers may belong to one fraud ring.
//!
//! ```no_run
//! use ringfinder::{RuleEngine, RulePreset};
//!
//! # fn main() -> anyhow::Result<()> {
//! let table = ringfinder::source::load_json_table("orders.json".as_ref())?;
//! let engine = RuleEngine::default();
//! let rule = RulePreset::SameRecipientPhone.build(engine.config());
//! let evaluation = engine.evaluate(&rule, &table);
//! println!("{}", ringfinder::sink::export_text_summary(&evaluation));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dsu;
pub mod engine;
pub mod error;
pub mod grouper;
pub mod index;
pub mod model;
pub mod normalize;
pub mod partition;
pub mod progress;
pub mod rules;
pub mod similarity;
pub mod sink;
pub mod source;
pub mod temporal;
pub mod test_support;

// Re-export main types for convenience
pub use config::{ConfigOverrides, DefaultsOverrides, EngineConfig};
pub use engine::{Completion, Evaluation, EvaluationStats, RuleEngine};
pub use error::EngineError;
pub use model::{Cluster, ClusterId, FlaggedIdSet, IdentityKey, RecordId, Table, Value};
pub use progress::{EngineEvent, ProgressReporter};
pub use rules::{ClusteringStrategy, Rule, RuleKind, RulePreset};
pub use temporal::{Instant, TimeWindow};
pub use tokio_util::sync::CancellationToken;
