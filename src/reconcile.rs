//! Entity reconciliation across sources
//!
//! Builds one ordered key space from the current-period results of
//! every configured source, then merges per-key metric vectors for both
//! periods. The key union is current-driven: a key missing from the
//! previous period contributes a zero vector for that period rather
//! than being excluded, so an entity that disappeared still shows up
//! with a -100% change.
//!
//! When more than one source is configured, keys reported by exactly
//! one of them are collected into a side audit. The audit never affects
//! totals.

use crate::models::{EntityKey, MetricVector, ReconciledRecord, SourceTag};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// One source's contribution to a reconciliation pass: per-key metric
/// vectors for both period windows, plus the keys whose fetch was
/// abandoned and zero-substituted.
#[derive(Debug, Clone)]
pub struct SourceResult {
    pub tag: SourceTag,
    pub current: BTreeMap<EntityKey, MetricVector>,
    pub previous: BTreeMap<EntityKey, MetricVector>,
    pub partial: BTreeSet<EntityKey>,
}

impl SourceResult {
    pub fn new(tag: SourceTag) -> Self {
        Self {
            tag,
            current: BTreeMap::new(),
            previous: BTreeMap::new(),
            partial: BTreeSet::new(),
        }
    }
}

#[derive(Debug)]
pub struct Reconciliation {
    /// Per-entity records in key order; the aggregate key is excluded.
    pub records: Vec<ReconciledRecord>,
    /// The synthetic aggregate record, kept for the totals cross-check.
    pub aggregate: Option<ReconciledRecord>,
    /// Keys reported by exactly one source, with that source's tag.
    /// Empty unless more than one source is configured.
    pub single_source: Vec<(EntityKey, SourceTag)>,
}

impl Reconciliation {
    /// Element-wise totals over the per-entity records (aggregate row
    /// excluded), current and previous.
    pub fn summed_totals(&self, arity: usize) -> (MetricVector, MetricVector) {
        let mut current = MetricVector::zero(arity);
        let mut previous = MetricVector::zero(arity);
        for record in &self.records {
            current.add_assign(&record.current);
            previous.add_assign(&record.previous);
        }
        (current, previous)
    }
}

/// Merge the per-source result sets into one ordered record set.
pub fn reconcile(sources: &[SourceResult], arity: usize) -> Reconciliation {
    let mut keys: BTreeSet<EntityKey> = BTreeSet::new();
    for source in sources {
        keys.extend(source.current.keys().cloned());
    }

    let mut records = Vec::with_capacity(keys.len());
    let mut aggregate = None;
    let mut single_source = Vec::new();

    for key in keys {
        let mut record = ReconciledRecord::new(key.clone(), arity);
        for source in sources {
            if let Some(vector) = source.current.get(&key) {
                record.current.add_assign(vector);
                record.present_in.insert(source.tag.clone());
            }
            // previous-period values are looked up by the current key
            // set, never unioned independently
            if let Some(vector) = source.previous.get(&key) {
                record.previous.add_assign(vector);
            }
            if source.partial.contains(&key) {
                record.partial = true;
            }
        }

        if sources.len() > 1 && record.present_in.len() == 1 && !key.is_aggregate() {
            let tag = record
                .present_in
                .iter()
                .next()
                .cloned()
                .unwrap_or_else(|| SourceTag::new("unknown"));
            single_source.push((key.clone(), tag));
        }

        if key.is_aggregate() {
            aggregate = Some(record);
        } else {
            records.push(record);
        }
    }

    debug!(
        entities = records.len(),
        single_source = single_source.len(),
        has_aggregate = aggregate.is_some(),
        "Reconciled source result sets"
    );

    Reconciliation {
        records,
        aggregate,
        single_source,
    }
}
