//! # Data Model
//!
//! The order table handed to the engine, typed cell values, buyer identities and the
//! clusters and flagged-identifier sets the groupers produce.

use crate::error::EngineError;
use crate::temporal::{self, Instant};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Position of a record in the source table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u32);

impl RecordId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Identifier of a cluster, local to one rule evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub u32);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// A typed cell value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Number(f64),
    Timestamp(Instant),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    /// Null, blank text and NaN all count as missing.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(n) => n.is_nan(),
            Value::Timestamp(_) => false,
        }
    }

    /// Canonical string form used for grouping keys and identities.
    ///
    /// Integral numbers render without a fractional part so that a phone number read as
    /// `84900000001.0` keys the same as the text `"84900000001"`.
    pub fn key_text(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(canonical_number(*n)),
            Value::Timestamp(t) => Some(t.to_string()),
        }
    }

    /// Raw text for normalization; numbers are rendered canonically.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Text(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(_) => self.key_text(),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Text(s) => {
                let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
                cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
            }
            Value::Timestamp(t) => Some(*t as f64),
            _ => None,
        }
    }

    /// Interpret the value as a point in time. Numbers are Unix epoch seconds.
    pub fn as_instant(&self) -> Option<Instant> {
        match self {
            Value::Timestamp(t) => Some(*t),
            Value::Number(n) if n.is_finite() => Some(n.trunc() as Instant),
            Value::Text(s) => temporal::parse_timestamp(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Text(b.to_string()),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }
}

/// Render a number the way it should appear inside a key.
pub fn canonical_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Resolved position of a column inside a [`Table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnRef(usize);

/// An immutable, row-oriented table of named columns.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    lookup: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table. Duplicate column names are rejected.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Result<Self, EngineError> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut lookup = HashMap::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            if lookup.insert(name.clone(), idx).is_some() {
                return Err(EngineError::Table(format!("duplicate column `{name}`")));
            }
        }
        Ok(Self {
            columns,
            lookup,
            rows: Vec::new(),
        })
    }

    pub fn with_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, EngineError> {
        let mut table = Self::new(columns)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Append a row; it must have exactly one value per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<RecordId, EngineError> {
        if row.len() != self.columns.len() {
            return Err(EngineError::Table(format!(
                "row {} has {} values, expected {}",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        let id = u32::try_from(self.rows.len())
            .map_err(|_| EngineError::Table("table exceeds u32::MAX rows".to_string()))?;
        self.rows.push(row);
        Ok(RecordId(id))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<ColumnRef> {
        self.lookup.get(name).copied().map(ColumnRef)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, id: RecordId, column: ColumnRef) -> &Value {
        &self.rows[id.index()][column.0]
    }

    pub fn record(&self, id: RecordId) -> Option<Record<'_>> {
        self.rows.get(id.index()).map(|values| Record {
            id,
            values,
            table: self,
        })
    }

    pub fn record_ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        (0..self.rows.len() as u32).map(RecordId)
    }
}

/// A borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub id: RecordId,
    values: &'a [Value],
    table: &'a Table,
}

impl<'a> Record<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.table.column(column).map(|c| &self.values[c.0])
    }
}

/// The buyer identifier of a record; the unit that gets flagged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey(pub String);

impl IdentityKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        value.key_text().map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A working set of records linked by one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub rule: String,
    pub records: Vec<RecordId>,
    pub identities: BTreeSet<IdentityKey>,
}

impl Cluster {
    pub fn new(id: ClusterId, rule: impl Into<String>) -> Self {
        Self {
            id,
            rule: rule.into(),
            records: Vec::new(),
            identities: BTreeSet::new(),
        }
    }

    pub fn absorb(&mut self, record: RecordId, identity: &IdentityKey) {
        self.records.push(record);
        if !self.identities.contains(identity) {
            self.identities.insert(identity.clone());
        }
    }

    /// Distinct identities, not records: a repeated buyer counts once.
    pub fn distinct_count(&self) -> usize {
        self.identities.len()
    }

    pub fn meets(&self, threshold: usize) -> bool {
        self.distinct_count() >= threshold
    }
}

/// Deduplicated set of flagged identities.
///
/// Insert-only: once an identity is flagged during an evaluation it stays flagged.
/// Iteration is in sorted order so sinks produce stable output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedIdSet {
    ids: BTreeSet<IdentityKey>,
}

impl FlaggedIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: IdentityKey) -> bool {
        self.ids.insert(id)
    }

    /// Union every identity of a qualifying cluster.
    pub fn absorb_cluster(&mut self, cluster: &Cluster) {
        self.ids.extend(cluster.identities.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdentityKey> {
        self.ids.iter()
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.ids.iter().map(|id| id.0.clone()).collect()
    }
}

impl Extend<IdentityKey> for FlaggedIdSet {
    fn extend<I: IntoIterator<Item = IdentityKey>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}

impl FromIterator<IdentityKey> for FlaggedIdSet {
    fn from_iter<I: IntoIterator<Item = IdentityKey>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FlaggedIdSet {
    type Item = &'a IdentityKey;
    type IntoIter = std::collections::btree_set::Iter<'a, IdentityKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_text_canonicalizes_numbers() {
        assert_eq!(
            Value::Number(84900000001.0).key_text().as_deref(),
            Some("84900000001")
        );
        assert_eq!(Value::Number(1.5).key_text().as_deref(), Some("1.5"));
        assert_eq!(Value::text("  P1 ").key_text().as_deref(), Some("P1"));
        assert_eq!(Value::text("   ").key_text(), None);
        assert_eq!(Value::Number(f64::NAN).key_text(), None);
        assert_eq!(Value::Null.key_text(), None);
    }

    #[test]
    fn test_as_number_reads_thousands_separators() {
        assert_eq!(Value::text("1,250,000").as_number(), Some(1_250_000.0));
        assert_eq!(Value::text("abc").as_number(), None);
        assert_eq!(Value::Number(42.0).as_number(), Some(42.0));
    }

    #[test]
    fn test_as_instant() {
        assert_eq!(Value::Timestamp(7).as_instant(), Some(7));
        assert_eq!(Value::Number(3600.9).as_instant(), Some(3600));
        assert_eq!(
            Value::text("1970-01-01 01:00:00").as_instant(),
            Some(3600)
        );
        assert_eq!(Value::text("soon").as_instant(), None);
    }

    #[test]
    fn test_table_rejects_bad_shapes() {
        assert!(Table::new(["a", "a"]).is_err());
        let mut table = Table::new(["a", "b"]).unwrap();
        assert!(table.push_row(vec![Value::Null]).is_err());
        let id = table.push_row(vec!["x".into(), 1.0.into()]).unwrap();
        assert_eq!(id, RecordId(0));
        let record = table.record(id).unwrap();
        assert_eq!(record.get("a"), Some(&Value::text("x")));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_cluster_counts_distinct_identities() {
        let mut cluster = Cluster::new(ClusterId(0), "rule");
        cluster.absorb(RecordId(0), &IdentityKey::new("1"));
        cluster.absorb(RecordId(1), &IdentityKey::new("2"));
        cluster.absorb(RecordId(2), &IdentityKey::new("2"));
        assert_eq!(cluster.records.len(), 3);
        assert_eq!(cluster.distinct_count(), 2);
        assert!(cluster.meets(2));
        assert!(!cluster.meets(3));
    }

    #[test]
    fn test_flagged_set_is_sorted_and_deduplicated() {
        let mut flagged = FlaggedIdSet::new();
        assert!(flagged.insert(IdentityKey::new("b")));
        assert!(flagged.insert(IdentityKey::new("a")));
        assert!(!flagged.insert(IdentityKey::new("a")));
        assert_eq!(flagged.to_strings(), vec!["a", "b"]);
    }
}
