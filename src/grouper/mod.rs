//! # Groupers
//!
//! The three generic grouping algorithms. Each reads the table, never mutates it, and
//! reports qualifying clusters through a [`GroupingContext`] owned by one evaluation.

pub mod exact;
pub mod fuzzy;
pub mod window;

pub use exact::ExactKeyGrouper;
pub use fuzzy::FuzzyClusterGrouper;
pub use window::{candidate_windows, TemporalWindowGrouper};

use crate::error::EngineError;
use crate::model::{Cluster, ClusterId, ColumnRef, FlaggedIdSet, IdentityKey, RecordId, Table};
use crate::progress::ProgressTracker;
use crate::rules::{Rule, RuleKind};
use tokio_util::sync::CancellationToken;

/// A grouping algorithm bound to one rule's parameters.
pub trait Grouper {
    fn group(&self, table: &Table, ctx: &mut GroupingContext<'_>) -> Result<(), EngineError>;
}

/// Pick the grouper for a rule.
pub fn grouper_for(rule: &Rule) -> Box<dyn Grouper + '_> {
    match &rule.kind {
        RuleKind::ExactKey(spec) => Box::new(ExactKeyGrouper::new(spec)),
        RuleKind::TemporalWindow(spec) => Box::new(TemporalWindowGrouper::new(spec)),
        RuleKind::FuzzyCluster(spec) => Box::new(FuzzyClusterGrouper::new(spec)),
    }
}

/// What a grouper produced.
#[derive(Debug, Clone, Default)]
pub struct GroupOutcome {
    pub flagged: FlaggedIdSet,
    pub clusters: Vec<Cluster>,
    /// Rows dropped for missing or unusable required fields
    pub excluded_rows: usize,
    /// Partitions or buckets scanned
    pub units: usize,
}

/// Mutable state of a single evaluation: the accumulating result, progress and cancellation.
pub struct GroupingContext<'a> {
    rule: &'a Rule,
    tracker: &'a mut ProgressTracker,
    cancel: &'a CancellationToken,
    outcome: GroupOutcome,
}

impl<'a> GroupingContext<'a> {
    pub fn new(
        rule: &'a Rule,
        tracker: &'a mut ProgressTracker,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            rule,
            tracker,
            cancel,
            outcome: GroupOutcome::default(),
        }
    }

    pub fn rule(&self) -> &'a Rule {
        self.rule
    }

    pub fn threshold(&self) -> usize {
        self.rule.threshold
    }

    pub fn new_cluster(&self) -> Cluster {
        Cluster::new(
            ClusterId(self.outcome.clusters.len() as u32),
            self.rule.name.as_str(),
        )
    }

    /// Keep the cluster if it meets the threshold, flagging all of its identities.
    pub fn offer(&mut self, cluster: Cluster) -> bool {
        if !cluster.meets(self.rule.threshold) {
            return false;
        }
        self.outcome.flagged.absorb_cluster(&cluster);
        self.outcome.clusters.push(cluster);
        true
    }

    pub fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled {
                rule: self.rule.name.clone(),
            });
        }
        Ok(())
    }

    pub fn step(&mut self, done: usize, total: usize) {
        self.tracker.step(done, total);
    }

    pub fn set_units(&mut self, units: usize) {
        self.outcome.units = units;
    }

    /// Count excluded rows and say so on the log channel.
    pub fn exclude(&mut self, rows: usize, reason: &str) {
        if rows == 0 {
            return;
        }
        self.outcome.excluded_rows += rows;
        self.tracker.log(format!("excluded {rows} rows: {reason}"));
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.tracker.log(message);
    }

    pub fn flagged_count(&self) -> usize {
        self.outcome.flagged.len()
    }

    pub fn into_outcome(self) -> GroupOutcome {
        self.outcome
    }

    /// Resolve a declared column; absence is a schema error.
    pub(crate) fn column(&self, table: &Table, name: &str) -> Result<ColumnRef, EngineError> {
        table
            .column(name)
            .ok_or_else(|| EngineError::missing_columns(&self.rule.name, vec![name.to_string()]))
    }
}

/// Identity of every row, `None` where the identity cell is missing.
pub(crate) fn identities(table: &Table, column: ColumnRef) -> Vec<Option<IdentityKey>> {
    table
        .record_ids()
        .map(|id| IdentityKey::from_value(table.value(id, column)))
        .collect()
}

pub(crate) fn identity_at(identities: &[Option<IdentityKey>], id: RecordId) -> Option<&IdentityKey> {
    identities.get(id.index()).and_then(Option::as_ref)
}
