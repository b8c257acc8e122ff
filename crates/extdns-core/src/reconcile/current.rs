//! Current state: the provider records owned by this system

use tracing::{debug, info};

use crate::config::ReconcileConfig;
use crate::record::{DnsRecord, RecordSet};

/// Filters the provider's records down to the ones this system owns
///
/// A record is owned when its name ends with `.environment.root_domain`,
/// compared case-insensitively. Kept names are lower-cased and stripped of a
/// trailing root dot so they key identically to desired names.
#[derive(Debug, Clone)]
pub struct ProviderStateReader {
    suffix: String,
}

impl ProviderStateReader {
    /// Create a reader for the configured environment and root domain
    pub fn new(config: &ReconcileConfig) -> Self {
        Self {
            suffix: config.owned_suffix(),
        }
    }

    /// Whether a provider record name belongs to this system
    pub fn owns(&self, domain_name: &str) -> bool {
        normalize(domain_name).ends_with(&self.suffix)
    }

    /// Build the current record set from the provider's full record list
    pub fn read(&self, provider_records: Vec<DnsRecord>) -> RecordSet {
        let total = provider_records.len();
        let mut records = RecordSet::new();

        for mut record in provider_records {
            let name = normalize(&record.domain_name);
            if !name.ends_with(&self.suffix) {
                continue;
            }
            debug!("Owned provider record: {}", record);
            record.domain_name = name;
            records.insert(record);
        }

        info!(
            "Current state: {} of {} provider record(s) owned",
            records.len(),
            total
        );
        records
    }
}

fn normalize(domain_name: &str) -> String {
    domain_name.trim_end_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, values: &[&str]) -> DnsRecord {
        DnsRecord::new(name, values.iter().map(|v| v.to_string()).collect())
    }

    fn reader() -> ProviderStateReader {
        ProviderStateReader::new(&ReconcileConfig::new("env", "example.com"))
    }

    #[test]
    fn test_keeps_only_owned_suffix() {
        let records = reader().read(vec![
            record("web.stack.env.example.com", &["10.0.0.1"]),
            record("www.example.com", &["1.2.3.4"]),
            record("web.stack.other.example.com", &["10.0.0.2"]),
            record("web.stack.xenv.example.com", &["10.0.0.3"]),
        ]);

        let names: Vec<&str> = records.domain_names().collect();
        assert_eq!(names, vec!["web.stack.env.example.com"]);
    }

    #[test]
    fn test_suffix_match_is_case_insensitive() {
        let records = reader().read(vec![
            record("Web.Stack.ENV.Example.com", &["10.0.0.1"]),
            record("api.stack.env.example.com.", &["10.0.0.2"]),
        ]);

        assert_eq!(records.len(), 2);
        assert!(records.contains("web.stack.env.example.com"));
        assert!(records.contains("api.stack.env.example.com"));
    }

    #[test]
    fn test_owns() {
        let reader = reader();
        assert!(reader.owns("a.b.env.example.com"));
        assert!(!reader.owns("env.example.com"));
        assert!(!reader.owns("example.com"));
    }
}
