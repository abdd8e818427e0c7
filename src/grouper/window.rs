//! Temporal burst detection.
//!
//! Inside each partition, records sorted by time are cut into candidate groups whose
//! members all fall within one span of an anchor. Groups with enough distinct buyers
//! are flagged.

use super::{identities, identity_at, GroupingContext, Grouper};
use crate::error::EngineError;
use crate::model::{RecordId, Table};
use crate::partition::Partitioner;
use crate::rules::{AdvancePolicy, AnchorPolicy, TemporalSpec};
use crate::temporal::{Instant, TimeWindow};
use std::ops::Range;
use tracing::debug;

pub struct TemporalWindowGrouper<'a> {
    spec: &'a TemporalSpec,
}

impl<'a> TemporalWindowGrouper<'a> {
    pub fn new(spec: &'a TemporalSpec) -> Self {
        Self { spec }
    }

    fn window(&self) -> TimeWindow {
        TimeWindow::new(self.spec.window_secs)
    }
}

/// Cut a time-sorted sequence into candidate groups.
///
/// `times[k]` holds one instant per time column for the k-th record. A group starts at the
/// cursor and extends while the next record fits the span of the reference times: the
/// group's first record under [`AnchorPolicy::Fixed`], the last absorbed one under
/// [`AnchorPolicy::Rolling`]. The cursor then moves past the group or by one record,
/// per `advance`. Every returned range is non-empty.
pub fn candidate_windows(
    times: &[&[Instant]],
    window: TimeWindow,
    anchor: AnchorPolicy,
    advance: AdvancePolicy,
) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    while start < times.len() {
        let mut reference = times[start];
        let mut end = start + 1;
        while end < times.len() && window.admits_all(reference, times[end]) {
            if anchor == AnchorPolicy::Rolling {
                reference = times[end];
            }
            end += 1;
        }
        groups.push(start..end);
        start = match advance {
            AdvancePolicy::SkipPast => end,
            AdvancePolicy::ByOne => start + 1,
        };
    }
    groups
}

impl Grouper for TemporalWindowGrouper<'_> {
    fn group(&self, table: &Table, ctx: &mut GroupingContext<'_>) -> Result<(), EngineError> {
        let rule = ctx.rule();
        let identity_column = ctx.column(table, &rule.identity_column)?;
        let time_columns = self
            .spec
            .time_columns
            .iter()
            .map(|name| ctx.column(table, name))
            .collect::<Result<Vec<_>, _>>()?;
        let partitioner =
            Partitioner::new(table, &rule.name, std::slice::from_ref(&self.spec.partition))?;
        let ids = identities(table, identity_column);

        // Empty where the row is ineligible; never read for those rows.
        let mut times: Vec<Vec<Instant>> = vec![Vec::new(); table.len()];
        let mut eligible = Vec::with_capacity(table.len());
        let mut missing_identity = 0;
        let mut bad_time = 0;
        for id in table.record_ids() {
            if identity_at(&ids, id).is_none() {
                missing_identity += 1;
                continue;
            }
            let parsed: Option<Vec<Instant>> = time_columns
                .iter()
                .map(|column| table.value(id, *column).as_instant())
                .collect();
            match parsed {
                Some(parsed) => {
                    times[id.index()] = parsed;
                    eligible.push(id);
                }
                None => bad_time += 1,
            }
        }
        ctx.exclude(missing_identity, "missing buyer identifier");
        ctx.exclude(bad_time, "missing or unparseable time");

        let mut partitioning = partitioner.partition(eligible);
        ctx.exclude(partitioning.excluded, "missing partition key");
        partitioning.sort_members_by_key(|id| times[id.index()].clone());

        let total = partitioning.len();
        ctx.set_units(total);
        ctx.log(format!(
            "scanning {total} partitions with a {} window ({:?} anchor, {:?} advance)",
            self.window(),
            self.spec.anchor,
            self.spec.advance
        ));

        for (done, partition) in partitioning.partitions.iter().enumerate() {
            ctx.check_cancelled()?;
            let member_times: Vec<&[Instant]> = partition
                .members
                .iter()
                .map(|id| times[id.index()].as_slice())
                .collect();
            let groups = candidate_windows(
                &member_times,
                self.window(),
                self.spec.anchor,
                self.spec.advance,
            );
            for range in groups {
                if range.len() < ctx.threshold() {
                    continue;
                }
                let members: &[RecordId] = &partition.members[range];
                let mut cluster = ctx.new_cluster();
                for id in members {
                    if let Some(identity) = identity_at(&ids, *id) {
                        cluster.absorb(*id, identity);
                    }
                }
                let distinct = cluster.distinct_count();
                if ctx.offer(cluster) {
                    debug!(rule = %rule.name, key = ?partition.key, distinct, "burst flagged");
                }
            }
            ctx.step(done + 1, total);
        }
        Ok(())
    }
}
