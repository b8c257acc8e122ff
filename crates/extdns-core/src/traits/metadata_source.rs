// # Metadata Source Trait
//
// Defines the interface for discovering running service instances.
//
// ## Implementations
//
// - Rancher metadata service: `extdns-metadata-rancher` crate
//
// ## Usage
//
// ```rust,ignore
// use extdns_core::MetadataSource;
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* MetadataSource implementation */;
//
//     for instance in source.list_service_instances().await? {
//         let ip = source.resolve_host(&instance.host_id).await?;
//         println!("{} -> {}", instance.name, ip);
//     }
//
//     // Wait for topology changes
//     let mut changes = source.watch();
//     while let Some(change) = changes.next().await {
//         println!("metadata changed: {}", change.version);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::record::ServiceInstance;

/// Notification that the metadata source's view of the topology changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataChange {
    /// Opaque version identifier reported by the source
    pub version: String,
}

impl MetadataChange {
    /// Create a change notification
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

/// Trait for metadata source implementations
///
/// A metadata source is the source of truth for desired state. It is
/// **semi-trusted**: it may perform I/O against its service and spawn a task
/// for change notifications, but it never talks to DNS providers and never
/// decides what to change.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// List every running service instance
    ///
    /// A failure here aborts the reconciliation pass: a partial listing would
    /// cause records of healthy services to be removed.
    async fn list_service_instances(&self) -> Result<Vec<ServiceInstance>, crate::Error>;

    /// Resolve a host identifier to the IP address records should point at
    ///
    /// Failures are per-instance; the caller skips the instance.
    async fn resolve_host(&self, host_id: &str) -> Result<IpAddr, crate::Error>;

    /// Watch for topology changes
    ///
    /// Each item asks the caller to run a reconciliation pass. Dropping the
    /// stream must release any resources held for it.
    ///
    /// The default implementation never yields, leaving the caller on its
    /// periodic schedule.
    fn watch(&self) -> Pin<Box<dyn Stream<Item = MetadataChange> + Send + 'static>> {
        Box::pin(tokio_stream::pending())
    }

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing metadata sources from configuration
pub trait MetadataSourceFactory: Send + Sync {
    /// Create a MetadataSource instance from configuration
    fn create(
        &self,
        config: &crate::config::MetadataConfig,
    ) -> Result<Box<dyn MetadataSource>, crate::Error>;
}
