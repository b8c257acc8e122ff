//! Three-way difference between desired and current record sets

use std::collections::HashSet;

use crate::record::{DnsRecord, Operation, RecordSet};

/// Records each apply phase has to push to the provider
///
/// The domain names of the three lists are pairwise disjoint. A name present
/// in both inputs with equal value sets appears in none of them and is
/// counted in `unchanged`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSetDiff {
    /// Desired records missing from the provider
    pub to_add: Vec<DnsRecord>,
    /// Provider records no longer desired
    pub to_remove: Vec<DnsRecord>,
    /// Desired records whose values differ from the provider's
    pub to_update: Vec<DnsRecord>,
    /// Names present on both sides with equal value sets
    pub unchanged: usize,
}

impl RecordSetDiff {
    /// Whether the provider already matches the desired state
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_update.is_empty()
    }

    /// Records for one phase
    pub fn records_for(&self, operation: Operation) -> &[DnsRecord] {
        match operation {
            Operation::Add => &self.to_add,
            Operation::Remove => &self.to_remove,
            Operation::Update => &self.to_update,
        }
    }
}

/// Compute the records to add, remove and update
///
/// TTL and record type are not compared.
pub fn diff(desired: &RecordSet, current: &RecordSet) -> RecordSetDiff {
    let mut result = RecordSetDiff::default();

    for record in desired.iter() {
        match current.get(&record.domain_name) {
            None => result.to_add.push(record.clone()),
            Some(existing) if !same_values(&record.values, &existing.values) => {
                result.to_update.push(record.clone())
            }
            Some(_) => result.unchanged += 1,
        }
    }

    result.to_remove = current
        .iter()
        .filter(|record| !desired.contains(&record.domain_name))
        .cloned()
        .collect();

    result
}

/// Set equality over record values: order and duplicates are ignored
fn same_values(a: &[String], b: &[String]) -> bool {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}
