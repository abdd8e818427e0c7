//! # Partitioner
//!
//! Groups records by a tuple of key columns. Partitions come out in first-seen order and
//! members keep table order unless re-sorted, so every downstream scan is deterministic.

use crate::error::EngineError;
use crate::model::{ColumnRef, RecordId, Table};
use crate::rules::{KeyColumn, KeyTransform};
use hashbrown::HashMap;

/// One value per key column, already transformed.
pub type GroupingKey = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub key: GroupingKey,
    pub members: Vec<RecordId>,
}

#[derive(Debug, Clone, Default)]
pub struct Partitioning {
    pub partitions: Vec<Partition>,
    /// Records dropped because a key column was null or transformed to nothing
    pub excluded: usize,
}

impl Partitioning {
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Stable sort of every partition's members.
    pub fn sort_members_by_key<K, F>(&mut self, mut sort_key: F)
    where
        K: Ord,
        F: FnMut(RecordId) -> K,
    {
        for partition in &mut self.partitions {
            partition.members.sort_by_key(|id| sort_key(*id));
        }
    }
}

pub struct Partitioner<'a> {
    table: &'a Table,
    keys: Vec<(ColumnRef, KeyTransform)>,
}

impl<'a> Partitioner<'a> {
    /// Resolve the key columns against the table.
    pub fn new(table: &'a Table, rule: &str, keys: &[KeyColumn]) -> Result<Self, EngineError> {
        let mut resolved = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for key in keys {
            match table.column(&key.column) {
                Some(column) => resolved.push((column, key.transform)),
                None => missing.push(key.column.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(EngineError::missing_columns(rule, missing));
        }
        Ok(Self {
            table,
            keys: resolved,
        })
    }

    /// The record's key tuple, or `None` if any component is missing.
    pub fn key_of(&self, id: RecordId) -> Option<GroupingKey> {
        self.keys
            .iter()
            .map(|(column, transform)| transform.apply(self.table.value(id, *column)))
            .collect()
    }

    pub fn partition(&self, ids: impl IntoIterator<Item = RecordId>) -> Partitioning {
        let mut slots: HashMap<GroupingKey, usize> = HashMap::new();
        let mut result = Partitioning::default();
        for id in ids {
            let Some(key) = self.key_of(id) else {
                result.excluded += 1;
                continue;
            };
            match slots.get(&key) {
                Some(&slot) => result.partitions[slot].members.push(id),
                None => {
                    slots.insert(key.clone(), result.partitions.len());
                    result.partitions.push(Partition {
                        key,
                        members: vec![id],
                    });
                }
            }
        }
        result
    }
}
