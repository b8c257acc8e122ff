// # DNS Provider Trait
//
// Defines the interface for reading and mutating DNS records via provider APIs.
//
// ## Implementations
//
// - Cloudflare: `extdns-provider-cloudflare` crate
// - In-memory: `extdns_core::provider::MemoryProvider`
//
// ## Usage
//
// ```rust,ignore
// use extdns_core::{DnsProvider, DnsRecord};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let record = DnsRecord::new("web.stack.env.example.com", vec!["10.0.0.1".into()]);
//     provider.add_record(&record).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::record::DnsRecord;

/// Trait for DNS provider implementations
///
/// A [`DnsRecord`] carries every value of one name. Providers that store one
/// entry per value are responsible for fanning a record out and grouping
/// entries back into records in [`list_records`](DnsProvider::list_records).
///
/// # Thread Safety
///
/// Implementations must be thread-safe: the applier issues concurrent calls
/// for distinct domain names from separate tasks.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry logic or backoff
/// - ❌ Decide which records need to change (owned by the reconciler)
/// - ❌ Cache state beyond a single call
///
/// # Idempotency
///
/// All three mutations must be safe to repeat: adding a record that already
/// has the given values, removing a record that is gone, or updating a
/// record to values it already has must all succeed without side effects.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List every A record in the provider's zone
    ///
    /// The result may contain records not owned by this system; the
    /// reconciler filters them by domain suffix.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<DnsRecord>)`: One record per domain name
    /// - `Err(Error)`: If the provider could not be read
    async fn list_records(&self) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Create a record with all of its values
    async fn add_record(&self, record: &DnsRecord) -> Result<(), crate::Error>;

    /// Delete a record and all of its values
    async fn remove_record(&self, record: &DnsRecord) -> Result<(), crate::Error>;

    /// Replace the values of an existing record with `record.values`
    async fn update_record(&self, record: &DnsRecord) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    ///
    /// # Returns
    ///
    /// A static string identifying the provider (e.g., "cloudflare", "memory")
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this provider
    ///
    /// # Returns
    ///
    /// A boxed DnsProvider trait object
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
