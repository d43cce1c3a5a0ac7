//! Core Data Models
//!
//! Data structures shared across the reporting pipeline, from source
//! fetch results to reconciled per-entity records.
//!
//! ## Data Flow
//!
//! 1. **Catalog listing**: each source yields `(display_name, entity_id)`
//!    pairs which become [`EntityKey`]s after normalization
//! 2. **Fetch**: each source returns a [`FetchOutcome`] per entity and
//!    period window
//! 3. **Reconciliation**: per-key results are merged into
//!    [`ReconciledRecord`]s with one [`MetricVector`] per period
//! 4. **Reporting**: records are turned into typed report rows by the
//!    row builder (see [`crate::rows`])
//!
//! The invariant carried throughout: both period vectors of a record
//! always have the arity of the report's [`MetricSchema`], with absent
//! data contributing a zero vector, never a missing one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Composite identifier for a reporting subject: account+property for
/// analytics, provider+collection for storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub group: String,
    pub name: String,
}

impl EntityKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// The synthetic whole-dataset aggregate emitted by the storage
    /// report parser. Excluded from per-entity iteration, retained for
    /// the totals cross-check.
    pub fn aggregate() -> Self {
        Self::new("all", "all")
    }

    pub fn is_aggregate(&self) -> bool {
        self.group == "all" && self.name == "all"
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

/// Identifies which backend contributed a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceTag(pub String);

impl SourceTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a metric column is displayed in report rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Plain count, rendered as a thousands-grouped integer.
    Count,
    /// Byte size, rendered as gigabytes with two decimals.
    Bytes,
}

#[derive(Debug, Clone)]
pub struct MetricColumn {
    pub name: &'static str,
    pub kind: MetricKind,
}

/// Fixed, ordered shape of the metric vectors for one report type.
#[derive(Debug, Clone)]
pub struct MetricSchema {
    pub columns: Vec<MetricColumn>,
}

impl MetricSchema {
    pub fn new(columns: Vec<MetricColumn>) -> Self {
        Self { columns }
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }
}

/// Ordered, fixed-size sequence of non-negative metric values.
///
/// Two vectors of the same arity can be summed element-wise; summing
/// mismatched arities is a programming error caught in debug builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricVector(pub Vec<u64>);

impl MetricVector {
    pub fn zero(arity: usize) -> Self {
        Self(vec![0; arity])
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, i: usize) -> u64 {
        self.0[i]
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0)
    }

    /// Element-wise sum, used when an entity legitimately exists in
    /// more than one source.
    pub fn add_assign(&mut self, other: &MetricVector) {
        debug_assert_eq!(self.arity(), other.arity(), "metric arity mismatch");
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a += b;
        }
    }
}

impl From<Vec<u64>> for MetricVector {
    fn from(values: Vec<u64>) -> Self {
        Self(values)
    }
}

/// Result of one source fetch for one entity and window.
///
/// An absent result is kept distinct from an explicit zero for
/// diagnostics; arithmetic treats both as a zero vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Present(MetricVector),
    Empty,
}

impl FetchOutcome {
    pub fn into_vector(self, arity: usize) -> MetricVector {
        match self {
            FetchOutcome::Present(v) => v,
            FetchOutcome::Empty => MetricVector::zero(arity),
        }
    }
}

/// One entity after reconciliation across all configured sources.
#[derive(Debug, Clone)]
pub struct ReconciledRecord {
    pub key: EntityKey,
    pub present_in: BTreeSet<SourceTag>,
    pub current: MetricVector,
    pub previous: MetricVector,
    pub display_title: Option<String>,
    pub link: Option<String>,
    /// Set when a fetch for this entity was abandoned after retries and
    /// a zero vector was substituted.
    pub partial: bool,
}

impl ReconciledRecord {
    pub fn new(key: EntityKey, arity: usize) -> Self {
        Self {
            key,
            present_in: BTreeSet::new(),
            current: MetricVector::zero(arity),
            previous: MetricVector::zero(arity),
            display_title: None,
            link: None,
            partial: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_sum() {
        let mut a = MetricVector::from(vec![10, 20, 30]);
        a.add_assign(&MetricVector::from(vec![1, 2, 3]));
        assert_eq!(a, MetricVector::from(vec![11, 22, 33]));
    }

    #[test]
    fn test_empty_outcome_yields_zero_vector() {
        let v = FetchOutcome::Empty.into_vector(3);
        assert_eq!(v, MetricVector::zero(3));
        assert!(v.is_zero());
    }

    #[test]
    fn test_aggregate_key() {
        assert!(EntityKey::aggregate().is_aggregate());
        assert!(!EntityKey::new("cornell", "aco").is_aggregate());
    }

    #[test]
    fn test_key_ordering_is_deterministic() {
        let mut keys = vec![
            EntityKey::new("b", "x"),
            EntityKey::new("a", "y"),
            EntityKey::new("a", "x"),
        ];
        keys.sort();
        assert_eq!(keys[0], EntityKey::new("a", "x"));
        assert_eq!(keys[2], EntityKey::new("b", "x"));
    }
}
