//! Record model shared by every stage of a reconciliation pass
//!
//! - [`DnsRecord`]: one DNS name with all of its values
//! - [`RecordSet`]: records keyed by domain name, one entry per name
//! - [`ServiceInstance`]: a running instance reported by a metadata source
//! - [`Operation`]: the provider mutation an apply phase performs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The only record type this system manages
pub const RECORD_TYPE_A: &str = "A";

/// TTL applied to every managed record unless configured otherwise
pub const DEFAULT_TTL: u32 = 300;

/// A DNS record owned by this system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Fully-qualified, lower-cased domain name
    pub domain_name: String,
    /// Record values (IP addresses) in first-seen order
    pub values: Vec<String>,
    /// Record type tag (always "A")
    pub record_type: String,
    /// Time-to-live in seconds
    pub ttl: u32,
}

impl DnsRecord {
    /// Create an A record with the default TTL
    pub fn new(domain_name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            values,
            record_type: RECORD_TYPE_A.to_string(),
            ttl: DEFAULT_TTL,
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }
}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}]",
            self.domain_name,
            self.record_type,
            self.ttl,
            self.values.join(", ")
        )
    }
}

/// Records keyed by domain name
///
/// Iteration is ordered by domain name so passes, logs and tests are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: BTreeMap<String, DnsRecord>,
}

impl RecordSet {
    /// Create an empty record set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any record with the same domain name
    pub fn insert(&mut self, record: DnsRecord) -> Option<DnsRecord> {
        self.records.insert(record.domain_name.clone(), record)
    }

    /// Merge a record into the set
    ///
    /// When the name is already present, the incoming values are appended to
    /// the values accumulated so far. Otherwise the record is inserted as is.
    pub fn merge(&mut self, record: DnsRecord) {
        match self.records.get_mut(&record.domain_name) {
            Some(existing) => existing.values.extend(record.values),
            None => {
                self.records.insert(record.domain_name.clone(), record);
            }
        }
    }

    /// Look up a record by domain name
    pub fn get(&self, domain_name: &str) -> Option<&DnsRecord> {
        self.records.get(domain_name)
    }

    /// Whether a record exists for the domain name
    pub fn contains(&self, domain_name: &str) -> bool {
        self.records.contains_key(domain_name)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records in domain name order
    pub fn iter(&self) -> impl Iterator<Item = &DnsRecord> {
        self.records.values()
    }

    /// Iterate over domain names in order
    pub fn domain_names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

impl FromIterator<DnsRecord> for RecordSet {
    fn from_iter<I: IntoIterator<Item = DnsRecord>>(iter: I) -> Self {
        let mut set = RecordSet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

impl IntoIterator for RecordSet {
    type Item = DnsRecord;
    type IntoIter = std::collections::btree_map::IntoValues<String, DnsRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_values()
    }
}

/// A running service instance reported by a metadata source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Instance (container) name, used for logging only
    #[serde(default)]
    pub name: String,
    /// Service the instance belongs to; empty for standalone instances
    #[serde(default)]
    pub service_name: String,
    /// Stack the service belongs to
    #[serde(default)]
    pub stack_name: String,
    /// Identifier of the host running the instance
    #[serde(default)]
    pub host_id: String,
}

impl ServiceInstance {
    /// Create a service instance descriptor
    pub fn new(
        name: impl Into<String>,
        service_name: impl Into<String>,
        stack_name: impl Into<String>,
        host_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_name: service_name.into(),
            stack_name: stack_name.into(),
            host_id: host_id.into(),
        }
    }
}

/// Provider mutation performed by one apply phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a record that does not exist yet
    Add,
    /// Delete a record that is no longer desired
    Remove,
    /// Replace the values of an existing record
    Update,
}

impl Operation {
    /// Lower-case phase name used in logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Remove => "remove",
            Operation::Update => "update",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
