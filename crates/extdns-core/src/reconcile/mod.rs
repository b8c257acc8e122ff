//! Reconciliation pass
//!
//! One pass brings the provider in line with the metadata source:
//!
//! ```text
//! MetadataSource ──▶ DesiredStateBuilder ──▶ desired ─┐
//!                                                      ├─▶ diff ──▶ add ──▶ remove ──▶ update
//! DnsProvider ─────▶ ProviderStateReader ──▶ current ─┘                (ConcurrentApplier)
//! ```
//!
//! Phases run strictly in order; the records of one phase are applied
//! concurrently. The first failing phase stops the pass.

pub mod apply;
pub mod current;
pub mod desired;
pub mod diff;

pub use apply::{ApplyError, ConcurrentApplier, RecordFailure};
pub use current::ProviderStateReader;
pub use desired::DesiredStateBuilder;
pub use diff::{RecordSetDiff, diff};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{EngineConfig, ReconcileConfig};
use crate::error::{Error, Result};
use crate::record::{Operation, RecordSet};
use crate::traits::{DnsProvider, MetadataSource};

/// Order in which apply phases run
pub const PHASES: [Operation; 3] = [Operation::Add, Operation::Remove, Operation::Update];

/// Outcome of a successful pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Records derived from the metadata source
    pub desired: usize,
    /// Owned records found at the provider
    pub current: usize,
    /// Records created
    pub added: usize,
    /// Records deleted
    pub removed: usize,
    /// Records whose values were replaced
    pub updated: usize,
    /// Records already in sync
    pub unchanged: usize,
    /// When the pass started
    pub started_at: DateTime<Utc>,
    /// When the pass finished
    pub finished_at: DateTime<Utc>,
}

impl ReconcileReport {
    /// Whether the pass changed anything at the provider
    pub fn changed(&self) -> bool {
        self.added + self.removed + self.updated > 0
    }
}

/// Runs reconciliation passes against injected collaborators
pub struct Reconciler {
    metadata: Arc<dyn MetadataSource>,
    provider: Arc<dyn DnsProvider>,
    desired: DesiredStateBuilder,
    current: ProviderStateReader,
    applier: ConcurrentApplier,
}

impl Reconciler {
    /// Create a reconciler with default engine limits
    pub fn new(
        metadata: Arc<dyn MetadataSource>,
        provider: Arc<dyn DnsProvider>,
        config: &ReconcileConfig,
    ) -> Self {
        Self::with_limits(metadata, provider, config, &EngineConfig::default())
    }

    /// Create a reconciler using the engine's concurrency and deadline limits
    pub fn with_limits(
        metadata: Arc<dyn MetadataSource>,
        provider: Arc<dyn DnsProvider>,
        config: &ReconcileConfig,
        limits: &EngineConfig,
    ) -> Self {
        let applier = ConcurrentApplier::new(Arc::clone(&provider), limits.max_concurrency)
            .with_timeout(limits.apply_timeout());

        Self {
            metadata,
            provider,
            desired: DesiredStateBuilder::new(config),
            current: ProviderStateReader::new(config),
            applier,
        }
    }

    /// Override the per-phase deadline
    pub fn with_apply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.applier = self.applier.with_timeout(timeout);
        self
    }

    /// Read the desired record set from the metadata source
    pub async fn desired_state(&self) -> Result<RecordSet> {
        self.desired
            .read(self.metadata.as_ref())
            .await
            .map_err(|e| Error::DesiredState(Box::new(e)))
    }

    /// Read the owned record set from the provider
    pub async fn current_state(&self) -> Result<RecordSet> {
        let records = self
            .provider
            .list_records()
            .await
            .map_err(|e| Error::CurrentState(Box::new(e)))?;
        Ok(self.current.read(records))
    }

    /// Compute what a pass would change without touching the provider
    pub async fn plan(&self) -> Result<RecordSetDiff> {
        let desired = self.desired_state().await?;
        debug!("DNS records from metadata: {:?}", desired);

        let current = self.current_state().await?;
        debug!("DNS records from provider: {:?}", current);

        Ok(diff(&desired, &current))
    }

    /// Run one reconciliation pass
    ///
    /// # Errors
    ///
    /// - [`Error::DesiredState`] / [`Error::CurrentState`]: a read failed and
    ///   the provider was not touched
    /// - [`Error::Phase`]: a phase had failing records; it names every one of
    ///   them and later phases were not run
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let started_at = Utc::now();

        let desired = self.desired_state().await?;
        let current = self.current_state().await?;
        let changes = diff(&desired, &current);

        for phase in PHASES {
            let records = changes.records_for(phase);
            if records.is_empty() {
                debug!("No DNS records to {}", phase);
                continue;
            }

            info!("DNS records to {}: {}", phase, records.len());
            self.applier
                .apply(records, phase)
                .await
                .map_err(|source| Error::Phase { phase, source })?;
        }

        let report = ReconcileReport {
            desired: desired.len(),
            current: current.len(),
            added: changes.to_add.len(),
            removed: changes.to_remove.len(),
            updated: changes.to_update.len(),
            unchanged: changes.unchanged,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            "Reconciled with {}: {} added, {} removed, {} updated, {} unchanged",
            self.provider.provider_name(),
            report.added,
            report.removed,
            report.updated,
            report.unchanged
        );
        Ok(report)
    }
}
