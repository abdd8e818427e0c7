//! # Blocking Index
//!
//! Buckets records under a coarse key so that pairwise comparison only happens between
//! records that already share a prefix of their normalized fields.

use crate::model::RecordId;
use hashbrown::HashMap;
use std::fmt;

/// Coarse bucketing key, one component per blocked field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey(pub Vec<String>);

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(" | "))
    }
}

/// First `words` whitespace tokens of an already normalized string.
pub fn leading_tokens(text: &str, words: usize) -> String {
    text.split_whitespace()
        .take(words)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket<T = RecordId> {
    pub key: BlockKey,
    pub members: Vec<T>,
}

/// Buckets in first-seen key order, members in insertion order.
#[derive(Debug, Clone)]
pub struct BlockingIndex<T = RecordId> {
    buckets: Vec<Bucket<T>>,
    slots: HashMap<BlockKey, usize>,
}

impl<T> Default for BlockingIndex<T> {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

impl<T> BlockingIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: BlockKey, record: T) {
        match self.slots.get(&key) {
            Some(&slot) => self.buckets[slot].members.push(record),
            None => {
                self.slots.insert(key.clone(), self.buckets.len());
                self.buckets.push(Bucket {
                    key,
                    members: vec![record],
                });
            }
        }
    }

    pub fn bucket(&self, key: &BlockKey) -> Option<&Bucket<T>> {
        self.slots.get(key).map(|&slot| &self.buckets[slot])
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.buckets.iter().map(|b| b.members.len()).sum()
    }

    pub fn buckets(&self) -> &[Bucket<T>] {
        &self.buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(parts: &[&str]) -> BlockKey {
        BlockKey(parts.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn test_leading_tokens() {
        assert_eq!(leading_tokens("nguyen van an binh", 2), "nguyen van");
        assert_eq!(leading_tokens("le loi", 7), "le loi");
        assert_eq!(leading_tokens("le loi", 0), "");
    }

    #[test]
    fn test_buckets_keep_first_seen_order() {
        let mut index: BlockingIndex = BlockingIndex::new();
        index.insert(key(&["b"]), RecordId(0));
        index.insert(key(&["a"]), RecordId(1));
        index.insert(key(&["b"]), RecordId(2));

        assert_eq!(index.len(), 2);
        assert_eq!(index.record_count(), 3);
        assert_eq!(index.buckets()[0].key, key(&["b"]));
        assert_eq!(
            index.bucket(&key(&["b"])).unwrap().members,
            vec![RecordId(0), RecordId(2)]
        );
        assert!(index.bucket(&key(&["c"])).is_none());
        assert_eq!(key(&["le loi", "500"]).to_string(), "(le loi | 500)");
    }
}
