//! Reconcile engine
//!
//! The ReconcileEngine decides *when* passes run:
//! - Once at startup
//! - On every tick of the configured interval
//! - Whenever the metadata source reports a topology change
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐
//! │ MetadataSource │─── MetadataChange ───┐
//! └────────────────┘                      │
//! ┌────────────────┐                      ▼
//! │ interval timer │─── tick ──────▶ ┌─────────────────┐
//! └────────────────┘                 │ ReconcileEngine │
//!                                    └─────────────────┘
//!                                             │
//!                          ┌──────────────────┴──────────────┐
//!                          ▼                                 ▼
//!                  ┌──────────────┐                  ┌─────────────┐
//!                  │  Reconciler  │                  │   Events    │
//!                  │  (one pass)  │                  │  (notify)   │
//!                  └──────────────┘                  └─────────────┘
//! ```
//!
//! A failing pass is logged and reported as an event; the engine keeps
//! running and retries on the next trigger.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::ExtDnsConfig;
use crate::error::Result;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::traits::{DnsProvider, MetadataSource};

/// What caused a pass to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassTrigger {
    /// Periodic timer (the first tick fires at startup)
    Interval,
    /// The metadata source reported a new version
    MetadataChange {
        version: String,
    },
}

/// Events emitted by the ReconcileEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        interval_secs: u64,
    },

    /// A pass is about to run
    PassStarted {
        trigger: PassTrigger,
    },

    /// A pass completed
    PassSucceeded {
        added: usize,
        removed: usize,
        updated: usize,
        unchanged: usize,
    },

    /// A pass failed
    PassFailed {
        error: String,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// Core reconcile engine
///
/// ## Lifecycle
///
/// 1. Create with [`ReconcileEngine::new()`]
/// 2. Start with [`ReconcileEngine::run()`]
/// 3. Engine runs until a shutdown signal is received
///
/// ## Load Resistance
///
/// - Passes never overlap: triggers arriving during a pass are handled after it
/// - Missed ticks are delayed, not bursted
/// - Bounded event channel: events are dropped (logged) when full
pub struct ReconcileEngine {
    /// Runs the actual passes
    reconciler: Reconciler,

    /// Source of change notifications
    metadata: Arc<dyn MetadataSource>,

    /// Interval between periodic passes
    interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconcileEngine {
    /// Create a new reconcile engine
    ///
    /// # Parameters
    ///
    /// - `metadata`: Metadata source implementation
    /// - `provider`: DNS provider implementation
    /// - `config`: extdns configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        metadata: Arc<dyn MetadataSource>,
        provider: Arc<dyn DnsProvider>,
        config: ExtDnsConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let reconciler = Reconciler::with_limits(
            Arc::clone(&metadata),
            provider,
            &config.reconcile,
            &config.engine,
        );

        let engine = Self {
            reconciler,
            metadata,
            interval: Duration::from_secs(config.engine.interval_secs),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Override the interval between periodic passes
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Access the underlying reconciler
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Run a single pass outside the loop
    pub async fn reconcile_once(&self) -> Result<ReconcileReport> {
        self.reconciler.reconcile().await
    }

    /// Run the engine
    ///
    /// This method runs passes until SIGINT is received.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine until the given oneshot fires (or its sender is dropped)
    ///
    /// Used by embedders and tests that own the shutdown decision.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.emit_event(EngineEvent::Started {
            interval_secs: self.interval.as_secs(),
        });
        info!("Reconcile engine started (interval: {:?})", self.interval);

        let mut changes = self.metadata.watch();

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }

                Some(change) = changes.next() => {
                    debug!("Metadata changed (version {})", change.version);
                    self.run_pass(PassTrigger::MetadataChange { version: change.version }).await;
                    ticker.reset();
                }

                _ = ticker.tick() => {
                    self.run_pass(PassTrigger::Interval).await;
                }
            }
        }

        info!("Reconcile engine stopped");
        Ok(())
    }

    /// Run one pass and report its outcome
    async fn run_pass(&self, trigger: PassTrigger) {
        self.emit_event(EngineEvent::PassStarted { trigger });

        match self.reconciler.reconcile().await {
            Ok(report) => {
                self.emit_event(EngineEvent::PassSucceeded {
                    added: report.added,
                    removed: report.removed,
                    updated: report.updated,
                    unchanged: report.unchanged,
                });
            }
            Err(e) => {
                error!("Reconciliation failed: {}", e);
                self.emit_event(EngineEvent::PassFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // A full channel means the consumer is slower than passes; drop rather than block.
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_equality() {
        let event = EngineEvent::PassStarted {
            trigger: PassTrigger::MetadataChange {
                version: "42".to_string(),
            },
        };

        assert_eq!(event.clone(), event);
        assert_ne!(
            event,
            EngineEvent::PassStarted {
                trigger: PassTrigger::Interval
            }
        );
    }
}
