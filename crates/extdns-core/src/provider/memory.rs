// # Memory Provider
//
// In-memory implementation of DnsProvider.
//
// ## Purpose
//
// Holds a zone in a map instead of talking to a real DNS service.
// Useful for testing, for dry runs against a live metadata source, and for
// embedding the reconciler where another component publishes the records.
//
// ## Crash Behavior
//
// - All records are lost on restart
// - The first pass after a restart re-adds every desired record

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::ProviderConfig;
use crate::record::{DnsRecord, RecordSet};
use crate::traits::{DnsProvider, DnsProviderFactory};
use crate::Error;

/// In-memory DNS provider
///
/// Records are stored in a map protected by a RwLock. Clones share the same
/// zone, so a test can keep a handle while the reconciler owns another.
///
/// # Example
///
/// ```rust,no_run
/// use extdns_core::{DnsProvider, DnsRecord, MemoryProvider};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let provider = MemoryProvider::new();
///
///     let record = DnsRecord::new("web.stack.env.example.com", vec!["10.0.0.1".into()]);
///     provider.add_record(&record).await?;
///
///     assert_eq!(provider.list_records().await?, vec![record]);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    inner: Arc<RwLock<BTreeMap<String, DnsRecord>>>,
}

impl MemoryProvider {
    /// Create an empty memory provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider pre-populated with records
    pub fn with_records(records: impl IntoIterator<Item = DnsRecord>) -> Self {
        let zone = records
            .into_iter()
            .map(|r| (r.domain_name.clone(), r))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(zone)),
        }
    }

    /// Get the number of records in the zone
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the zone is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Copy of the zone as a record set
    pub async fn snapshot(&self) -> RecordSet {
        self.inner.read().await.values().cloned().collect()
    }

    /// Remove all records from the zone
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl DnsProvider for MemoryProvider {
    async fn list_records(&self) -> Result<Vec<DnsRecord>, Error> {
        Ok(self.inner.read().await.values().cloned().collect())
    }

    async fn add_record(&self, record: &DnsRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(record.domain_name.clone(), record.clone());
        Ok(())
    }

    async fn remove_record(&self, record: &DnsRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.remove(&record.domain_name);
        Ok(())
    }

    async fn update_record(&self, record: &DnsRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(record.domain_name.clone(), record.clone());
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for creating memory providers
pub struct MemoryProviderFactory;

impl DnsProviderFactory for MemoryProviderFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>, Error> {
        match config {
            ProviderConfig::Memory => Ok(Box::new(MemoryProvider::new())),
            _ => Err(Error::config("Invalid config for memory provider")),
        }
    }
}

/// Register the memory provider with a registry
pub fn register(registry: &crate::Registry) {
    registry.register_provider("memory", Box::new(MemoryProviderFactory));
}
