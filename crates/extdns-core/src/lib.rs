// # extdns-core
//
// Core library for keeping a DNS zone in sync with running service instances.
//
// ## Architecture Overview
//
// - **MetadataSource**: Trait for discovering service instances and resolving hosts
// - **DnsProvider**: Trait for listing and mutating records at a DNS provider
// - **Reconciler**: One reconciliation pass (desired → current → diff → apply)
// - **ReconcileEngine**: Runs passes on a timer and on metadata change notifications
// - **Registry**: Plugin-based registry for providers and metadata sources
//
// ## Reconciliation Pipeline
//
// 1. `DesiredStateBuilder` turns discovered instances into a `RecordSet`
// 2. `ProviderStateReader` keeps the provider records owned by this system
// 3. `diff` splits the two sets into records to add, remove and update
// 4. `ConcurrentApplier` pushes each list to the provider, one phase at a time

pub mod traits;
pub mod record;
pub mod reconcile;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;
pub mod provider;

// Re-export core types for convenience
pub use traits::{DnsProvider, MetadataSource};
pub use record::{DnsRecord, Operation, RecordSet, ServiceInstance};
pub use reconcile::{
    ApplyError, ConcurrentApplier, DesiredStateBuilder, ProviderStateReader, ReconcileReport,
    Reconciler, RecordFailure, RecordSetDiff,
};
pub use engine::{EngineEvent, ReconcileEngine};
pub use registry::Registry;
pub use config::{EngineConfig, ExtDnsConfig, MetadataConfig, ProviderConfig, ReconcileConfig};
pub use error::{Error, Result};
pub use provider::MemoryProvider;
