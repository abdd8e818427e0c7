//! Exact-key aggregation: a partition is flagged whole when it holds enough distinct buyers.

use super::{identities, identity_at, GroupingContext, Grouper};
use crate::error::EngineError;
use crate::model::Table;
use crate::partition::Partitioner;
use crate::rules::ExactKeySpec;
use tracing::debug;

pub struct ExactKeyGrouper<'a> {
    spec: &'a ExactKeySpec,
}

impl<'a> ExactKeyGrouper<'a> {
    pub fn new(spec: &'a ExactKeySpec) -> Self {
        Self { spec }
    }
}

impl Grouper for ExactKeyGrouper<'_> {
    fn group(&self, table: &Table, ctx: &mut GroupingContext<'_>) -> Result<(), EngineError> {
        let rule = ctx.rule();
        let identity_column = ctx.column(table, &rule.identity_column)?;
        let partitioner = Partitioner::new(table, &rule.name, &self.spec.keys)?;
        let ids = identities(table, identity_column);

        let eligible: Vec<_> = table
            .record_ids()
            .filter(|id| identity_at(&ids, *id).is_some())
            .collect();
        ctx.exclude(table.len() - eligible.len(), "missing buyer identifier");

        let partitioning = partitioner.partition(eligible);
        ctx.exclude(partitioning.excluded, "missing key value");

        let total = partitioning.len();
        ctx.set_units(total);
        ctx.log(format!("grouping {total} partitions"));

        for (done, partition) in partitioning.partitions.iter().enumerate() {
            ctx.check_cancelled()?;
            let mut cluster = ctx.new_cluster();
            for id in &partition.members {
                if let Some(identity) = identity_at(&ids, *id) {
                    cluster.absorb(*id, identity);
                }
            }
            let distinct = cluster.distinct_count();
            if ctx.offer(cluster) {
                debug!(rule = %rule.name, key = ?partition.key, distinct, "partition flagged");
            }
            ctx.step(done + 1, total);
        }
        Ok(())
    }
}
