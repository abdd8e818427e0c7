//! Fuzzy clustering over blocked, normalized name/address/value fields.
//!
//! Records are normalized once, bucketed by a coarse block key, and compared pairwise only
//! inside a bucket. Clusters form either around a seed (star) or as the transitive closure
//! of the pairwise predicate (connected components).

use super::{identities, identity_at, GroupingContext, Grouper};
use crate::dsu::DisjointSet;
use crate::error::EngineError;
use crate::index::{leading_tokens, BlockKey, BlockingIndex};
use crate::model::{canonical_number, ColumnRef, IdentityKey, RecordId, Table};
use crate::normalize::{normalize_address, normalize_name};
use crate::rules::{ClusteringStrategy, Comparable, FuzzySpec};
use rustc_hash::FxHashSet;
use tracing::debug;

pub struct FuzzyClusterGrouper<'a> {
    spec: &'a FuzzySpec,
}

/// A record reduced to the fields the predicate reads.
#[derive(Debug, Clone)]
struct Entry {
    id: RecordId,
    identity: IdentityKey,
    name: Option<String>,
    address: String,
    value: Option<f64>,
}

impl Entry {
    fn comparable(&self) -> Comparable<'_> {
        Comparable {
            name: self.name.as_deref(),
            address: &self.address,
            value: self.value,
        }
    }
}

struct Columns {
    identity: ColumnRef,
    name: Option<ColumnRef>,
    address: ColumnRef,
    value: Option<ColumnRef>,
}

#[derive(Default)]
struct Exclusions {
    identity: usize,
    raw: usize,
    normalized: usize,
}

impl<'a> FuzzyClusterGrouper<'a> {
    pub fn new(spec: &'a FuzzySpec) -> Self {
        Self { spec }
    }

    fn resolve(&self, table: &Table, ctx: &GroupingContext<'_>) -> Result<Columns, EngineError> {
        let identity = ctx.column(table, &ctx.rule().identity_column)?;
        let name = match &self.spec.name_column {
            Some(name) => Some(ctx.column(table, name)?),
            None => None,
        };
        let address = ctx.column(table, &self.spec.address_column)?;
        let value = match &self.spec.value_column {
            Some(value) => Some(ctx.column(table, value)?),
            None => None,
        };
        Ok(Columns {
            identity,
            name,
            address,
            value,
        })
    }

    /// Normalize every eligible record.
    fn entries(&self, table: &Table, columns: &Columns) -> (Vec<Entry>, Exclusions) {
        let ids = identities(table, columns.identity);
        let mut entries = Vec::with_capacity(table.len());
        let mut excluded = Exclusions::default();
        for id in table.record_ids() {
            let Some(identity) = identity_at(&ids, id) else {
                excluded.identity += 1;
                continue;
            };
            let raw_name = columns.name.map(|c| table.value(id, c).as_text());
            let raw_address = table.value(id, columns.address).as_text();
            let value = columns.value.map(|c| table.value(id, c).as_number());
            if matches!(raw_name, Some(None)) || raw_address.is_none() || matches!(value, Some(None)) {
                excluded.raw += 1;
                continue;
            }
            let name = match raw_name {
                Some(raw) => match normalize_name(raw.as_deref()) {
                    Some(name) => Some(name),
                    None => {
                        excluded.normalized += 1;
                        continue;
                    }
                },
                None => None,
            };
            let Some(address) = normalize_address(raw_address.as_deref()) else {
                excluded.normalized += 1;
                continue;
            };
            entries.push(Entry {
                id,
                identity: identity.clone(),
                name,
                address,
                value: value.flatten(),
            });
        }
        (entries, excluded)
    }

    fn block_key(&self, entry: &Entry) -> BlockKey {
        let blocking = &self.spec.blocking;
        let mut parts = Vec::with_capacity(3);
        if let Some(name) = &entry.name {
            if blocking.name_words > 0 {
                parts.push(leading_tokens(name, blocking.name_words));
            }
        }
        parts.push(leading_tokens(&entry.address, blocking.address_words));
        if blocking.include_value {
            if let Some(value) = entry.value {
                parts.push(canonical_number(value));
            }
        }
        BlockKey(parts)
    }

    /// Seeds in bucket order; every unclaimed record matching the seed joins its cluster.
    fn star(
        &self,
        entries: &[Entry],
        members: &[usize],
        claimed: &mut FxHashSet<RecordId>,
        ctx: &mut GroupingContext<'_>,
    ) {
        let predicate = &self.spec.predicate;
        for &seed_at in members {
            let seed = &entries[seed_at];
            if claimed.contains(&seed.id) {
                continue;
            }
            let mut cluster = ctx.new_cluster();
            cluster.absorb(seed.id, &seed.identity);
            for &other_at in members {
                let other = &entries[other_at];
                if other_at == seed_at || claimed.contains(&other.id) {
                    continue;
                }
                if predicate.matches(&seed.comparable(), &other.comparable()) {
                    cluster.absorb(other.id, &other.identity);
                }
            }
            if cluster.meets(ctx.threshold()) {
                claimed.extend(cluster.records.iter().copied());
                debug!(rule = %ctx.rule().name, seed = %seed.id, distinct = cluster.distinct_count(), "star cluster flagged");
                ctx.offer(cluster);
            }
        }
    }

    /// Transitive closure of the predicate inside one bucket.
    fn components(&self, entries: &[Entry], members: &[usize], ctx: &mut GroupingContext<'_>) {
        let predicate = &self.spec.predicate;
        let mut dsu = DisjointSet::new(members.len());
        for (i, &a) in members.iter().enumerate() {
            for (j, &b) in members.iter().enumerate().skip(i + 1) {
                if predicate.matches(&entries[a].comparable(), &entries[b].comparable()) {
                    dsu.union(i, j);
                }
            }
        }
        for group in dsu.groups() {
            if group.len() < ctx.threshold() {
                continue;
            }
            let mut cluster = ctx.new_cluster();
            for position in group {
                let entry = &entries[members[position]];
                cluster.absorb(entry.id, &entry.identity);
            }
            let distinct = cluster.distinct_count();
            if ctx.offer(cluster) {
                debug!(rule = %ctx.rule().name, distinct, "component flagged");
            }
        }
    }
}

impl Grouper for FuzzyClusterGrouper<'_> {
    fn group(&self, table: &Table, ctx: &mut GroupingContext<'_>) -> Result<(), EngineError> {
        let columns = self.resolve(table, ctx)?;
        let (entries, excluded) = self.entries(table, &columns);
        ctx.exclude(excluded.identity, "missing buyer identifier");
        ctx.exclude(excluded.raw, "missing name, address or order value");
        ctx.exclude(excluded.normalized, "name or address empty after normalization");

        let mut index: BlockingIndex<usize> = BlockingIndex::new();
        for (position, entry) in entries.iter().enumerate() {
            index.insert(self.block_key(entry), position);
        }
        let total = index.len();
        ctx.set_units(total);
        ctx.log(format!(
            "built {total} blocks over {} records ({} clustering)",
            index.record_count(),
            self.spec.strategy
        ));

        let mut claimed: FxHashSet<RecordId> = FxHashSet::default();
        for (done, bucket) in index.buckets().iter().enumerate() {
            ctx.check_cancelled()?;
            if bucket.members.len() >= ctx.threshold() {
                match self.spec.strategy {
                    ClusteringStrategy::Star => {
                        self.star(&entries, &bucket.members, &mut claimed, ctx)
                    }
                    ClusteringStrategy::ConnectedComponents => {
                        self.components(&entries, &bucket.members, ctx)
                    }
                }
            }
            ctx.step(done + 1, total);
        }
        Ok(())
    }
}
