//! # Rule Engine
//!
//! Drives one rule evaluation end to end: structural and schema validation, the grouper
//! run behind a panic boundary, progress bookkeeping and the tri-state completion.
//! Evaluations share nothing mutable, so several can run at once against one table.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::grouper::{grouper_for, GroupOutcome, GroupingContext};
use crate::model::{Cluster, FlaggedIdSet, Table};
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::rules::Rule;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// How an evaluation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// At least one identity was flagged.
    Flagged(FlaggedIdSet),
    /// The evaluation ran to the end and nothing met the threshold.
    Empty,
    /// Schema, rule, cancellation or internal failure; no identities are reported.
    Failed(EngineError),
}

impl Completion {
    pub fn is_flagged(&self) -> bool {
        matches!(self, Completion::Flagged(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Completion::Empty)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Completion::Failed(_))
    }

    pub fn flagged(&self) -> Option<&FlaggedIdSet> {
        match self {
            Completion::Flagged(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&EngineError> {
        match self {
            Completion::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Collapse to a result; an empty completion is an empty set.
    pub fn into_result(self) -> Result<FlaggedIdSet, EngineError> {
        match self {
            Completion::Flagged(ids) => Ok(ids),
            Completion::Empty => Ok(FlaggedIdSet::new()),
            Completion::Failed(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationStats {
    pub rows: usize,
    pub excluded_rows: usize,
    /// Partitions or buckets scanned
    pub units: usize,
    pub clusters_flagged: usize,
}

/// Result of evaluating one rule against one table.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub rule: String,
    pub output_header: String,
    pub completion: Completion,
    /// Qualifying clusters, in discovery order
    pub clusters: Vec<Cluster>,
    pub stats: EvaluationStats,
}

impl Evaluation {
    fn failed(rule: &Rule, error: EngineError, rows: usize) -> Self {
        Self {
            rule: rule.name.clone(),
            output_header: rule.output_header.clone(),
            completion: Completion::Failed(error),
            clusters: Vec::new(),
            stats: EvaluationStats {
                rows,
                ..EvaluationStats::default()
            },
        }
    }

    fn completed(rule: &Rule, outcome: GroupOutcome, rows: usize) -> Self {
        let stats = EvaluationStats {
            rows,
            excluded_rows: outcome.excluded_rows,
            units: outcome.units,
            clusters_flagged: outcome.clusters.len(),
        };
        let completion = if outcome.flagged.is_empty() {
            Completion::Empty
        } else {
            Completion::Flagged(outcome.flagged)
        };
        Self {
            rule: rule.name.clone(),
            output_header: rule.output_header.clone(),
            completion,
            clusters: outcome.clusters,
            stats,
        }
    }

    pub fn flagged(&self) -> Option<&FlaggedIdSet> {
        self.completion.flagged()
    }

    pub fn flagged_count(&self) -> usize {
        self.flagged().map_or(0, FlaggedIdSet::len)
    }

    pub fn is_failed(&self) -> bool {
        self.completion.is_failed()
    }
}

/// Main API: evaluates rules against order tables.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    config: EngineConfig,
}

impl RuleEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A preset or custom rule by name.
    pub fn rule(&self, name: &str) -> Option<Rule> {
        self.config.rule(name)
    }

    /// Every preset followed by the configured custom rules.
    pub fn rules(&self) -> Vec<Rule> {
        self.config.all_rules()
    }

    /// Evaluate without progress reporting or cancellation.
    pub fn evaluate(&self, rule: &Rule, table: &Table) -> Evaluation {
        self.evaluate_with(rule, table, &ProgressReporter::silent(), &CancellationToken::new())
    }

    /// Evaluate one rule.
    ///
    /// Validation failures abort before any grouping. A failed evaluation discards whatever
    /// the grouper accumulated and never reports 100%; success and empty results both do.
    #[instrument(skip_all, fields(rule = %rule.name, kind = rule.kind.label()))]
    pub fn evaluate_with(
        &self,
        rule: &Rule,
        table: &Table,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Evaluation {
        let rows = table.len();
        let mut tracker = reporter.tracker(&rule.name);
        if let Err(err) = rule.validate().and_then(|()| rule.validate_schema(table)) {
            tracker.warn(err.to_string());
            return Evaluation::failed(rule, err, rows);
        }

        tracker.report(0);
        tracker.log(format!("evaluating {} rule over {rows} rows", rule.kind.label()));
        match run_guarded(rule, table, &mut tracker, cancel) {
            Ok(outcome) => {
                tracker.finish();
                let evaluation = Evaluation::completed(rule, outcome, rows);
                match &evaluation.completion {
                    Completion::Flagged(ids) => tracker.log(format!(
                        "flagged {} identities in {} clusters",
                        ids.len(),
                        evaluation.stats.clusters_flagged
                    )),
                    _ => tracker.log("no groups found"),
                }
                info!(
                    flagged = evaluation.flagged_count(),
                    excluded = evaluation.stats.excluded_rows,
                    units = evaluation.stats.units,
                    "evaluation complete"
                );
                evaluation
            }
            Err(err) => {
                tracker.warn(format!("evaluation failed: {err}"));
                Evaluation::failed(rule, err, rows)
            }
        }
    }

    /// Evaluate several rules concurrently; results keep the order of `rules`.
    pub fn evaluate_all(&self, rules: &[Rule], table: &Table) -> Vec<Evaluation> {
        self.evaluate_all_with(rules, table, &ProgressReporter::silent(), &CancellationToken::new())
    }

    pub fn evaluate_all_with(
        &self,
        rules: &[Rule],
        table: &Table,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Vec<Evaluation> {
        rules
            .par_iter()
            .map(|rule| self.evaluate_with(rule, table, reporter, cancel))
            .collect()
    }

    /// Offload one evaluation to the blocking pool of the current tokio runtime.
    pub fn spawn_evaluation(
        &self,
        rule: Rule,
        table: Arc<Table>,
        reporter: ProgressReporter,
        cancel: CancellationToken,
    ) -> JoinHandle<Evaluation> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.evaluate_with(&rule, &table, &reporter, &cancel))
    }
}

/// Run the rule's grouper, converting a panic into [`EngineError::Internal`].
fn run_guarded(
    rule: &Rule,
    table: &Table,
    tracker: &mut ProgressTracker,
    cancel: &CancellationToken,
) -> Result<GroupOutcome, EngineError> {
    guard(&rule.name, || {
        let mut ctx = GroupingContext::new(rule, tracker, cancel);
        grouper_for(rule).group(table, &mut ctx)?;
        Ok(ctx.into_outcome())
    })
}

fn guard<F>(rule: &str, run: F) -> Result<GroupOutcome, EngineError>
where
    F: FnOnce() -> Result<GroupOutcome, EngineError>,
{
    panic::catch_unwind(AssertUnwindSafe(run))
        .unwrap_or_else(|payload| Err(EngineError::internal(rule, panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "grouper panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;
    use crate::progress::EngineEvent;
    use crate::rules::{KeyColumn, RulePreset};

    fn phone_table(rows: &[(&str, &str)]) -> Table {
        Table::with_rows(
            ["recipient_phone_", "buyer_id"],
            rows.iter()
                .map(|(phone, buyer)| vec![Value::text(*phone), Value::text(*buyer)])
                .collect(),
        )
        .unwrap()
    }

    fn percents(events: &[EngineEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|event| match event {
                EngineEvent::Progress { percent, .. } => Some(*percent),
                EngineEvent::Log { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_flagged_and_empty_are_distinct() {
        let engine = RuleEngine::default();
        let rule = RulePreset::SameRecipientPhone.build(engine.config());

        let table = phone_table(&[("1", "a"), ("1", "b"), ("1", "c"), ("2", "d")]);
        let evaluation = engine.evaluate(&rule, &table);
        assert_eq!(evaluation.flagged().unwrap().to_strings(), vec!["a", "b", "c"]);
        assert_eq!(evaluation.stats.units, 2);
        assert_eq!(evaluation.stats.clusters_flagged, 1);

        let table = phone_table(&[("1", "a"), ("2", "b")]);
        let evaluation = engine.evaluate(&rule, &table);
        assert!(evaluation.completion.is_empty());
        assert_eq!(evaluation.flagged_count(), 0);
    }

    #[test]
    fn test_progress_ends_at_100_only_on_completion() {
        let engine = RuleEngine::default();
        let rule = RulePreset::SameRecipientPhone.build(engine.config());
        let (reporter, receiver) = ProgressReporter::channel();

        let table = phone_table(&[("1", "a"), ("2", "b")]);
        engine.evaluate_with(&rule, &table, &reporter, &CancellationToken::new());
        let events: Vec<_> = receiver.try_iter().collect();
        let progress = percents(&events);
        assert_eq!(progress.first(), Some(&0));
        assert_eq!(progress.last(), Some(&100));
        assert!(progress.windows(2).all(|w| w[0] < w[1]));

        let missing = Table::new(["buyer_id"]).unwrap();
        let evaluation = engine.evaluate_with(&rule, &missing, &reporter, &CancellationToken::new());
        assert!(evaluation.is_failed());
        let events: Vec<_> = receiver.try_iter().collect();
        assert!(!percents(&events).contains(&100));
    }

    #[test]
    fn test_schema_error_names_missing_columns() {
        let engine = RuleEngine::default();
        let rule = RulePreset::SamePromotionPhone.build(engine.config());
        let table = Table::new(["recipient_phone_", "pv_promotion_id"]).unwrap();
        let evaluation = engine.evaluate(&rule, &table);
        match evaluation.completion.error() {
            Some(EngineError::MissingColumns { missing, .. }) => {
                assert_eq!(missing, &vec!["buyer_id".to_string()])
            }
            other => panic!("unexpected completion {other:?}"),
        }
        assert!(evaluation.clusters.is_empty());
    }

    #[test]
    fn test_cancelled_evaluation_discards_results() {
        let engine = RuleEngine::default();
        let rule = RulePreset::SameRecipientPhone.build(engine.config());
        let table = phone_table(&[("1", "a"), ("1", "b"), ("1", "c")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let evaluation = engine.evaluate_with(&rule, &table, &ProgressReporter::silent(), &cancel);
        assert!(matches!(
            evaluation.completion,
            Completion::Failed(EngineError::Cancelled { .. })
        ));
        assert_eq!(evaluation.flagged_count(), 0);
    }

    #[test]
    fn test_panic_becomes_internal_error() {
        let result = guard("boom", || panic!("index out of range"));
        assert_eq!(
            result.unwrap_err(),
            EngineError::internal("boom", "index out of range")
        );
    }

    #[test]
    fn test_evaluate_all_keeps_rule_order() {
        let engine = RuleEngine::default();
        let rules = vec![
            Rule::exact_key("phone", vec![KeyColumn::verbatim("recipient_phone_")]),
            RulePreset::SamePromotionPhone.build(engine.config()),
        ];
        let table = phone_table(&[("1", "a"), ("1", "b"), ("1", "c")]);
        let evaluations = engine.evaluate_all(&rules, &table);
        assert_eq!(evaluations[0].rule, "phone");
        assert!(evaluations[0].completion.is_flagged());
        assert!(evaluations[1].is_failed());
    }

    #[test]
    fn test_custom_rule_lookup() {
        let mut config = EngineConfig::default();
        config.rules.push(Rule::exact_key(
            "same-ip",
            vec![KeyColumn::verbatim("ip_checkout")],
        ));
        let engine = RuleEngine::new(config);
        assert!(engine.rule("same-ip").is_some());
        assert!(engine.rule("checkout-ip-burst").is_some());
        assert!(engine.rule("unknown").is_none());
        assert_eq!(engine.rules().len(), RulePreset::ALL.len() + 1);
    }
}
