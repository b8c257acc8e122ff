//! Concurrent application of one phase's records to the provider

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::record::{DnsRecord, Operation};
use crate::traits::DnsProvider;

/// Executes one operation for a list of records with bounded concurrency
///
/// ## Guarantees
///
/// - Every record is dispatched, whatever happens to the others
/// - [`apply`](Self::apply) returns only after every spawned task is joined,
///   so no task outlives the call
/// - Every failure is reported in the returned [`ApplyError`]
/// - Each task performs at most one provider call, and a call once issued is
///   never cancelled
///
/// ## Deadline
///
/// With a timeout, all records of the phase share one deadline. A record
/// still waiting for a concurrency permit at the deadline is not started and
/// is reported as an [`Error::Timeout`] failure. A call already issued runs to
/// completion; if it finishes after the deadline its record is listed in
/// [`ApplyError::overran`]. Either way the phase reports a timeout.
pub struct ConcurrentApplier {
    provider: Arc<dyn DnsProvider>,
    max_concurrency: usize,
    timeout: Option<Duration>,
}

/// What one spawned task reports back
struct TaskOutcome {
    index: usize,
    record: DnsRecord,
    result: Result<()>,
    overran: bool,
}

impl ConcurrentApplier {
    /// Create an applier allowing `max_concurrency` provider calls in flight
    pub fn new(provider: Arc<dyn DnsProvider>, max_concurrency: usize) -> Self {
        Self {
            provider,
            max_concurrency: max_concurrency.max(1),
            timeout: None,
        }
    }

    /// Set the default per-phase deadline
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Apply `operation` to every record using the configured deadline
    pub async fn apply(
        &self,
        records: &[DnsRecord],
        operation: Operation,
    ) -> std::result::Result<(), ApplyError> {
        self.apply_within(records, operation, self.timeout).await
    }

    /// Apply `operation` to every record within a caller-supplied deadline
    pub async fn apply_within(
        &self,
        records: &[DnsRecord],
        operation: Operation,
        timeout: Option<Duration>,
    ) -> std::result::Result<(), ApplyError> {
        if records.is_empty() {
            return Ok(());
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, record) in records.iter().cloned().enumerate() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let acquired = match deadline {
                    Some(deadline) => tokio::time::timeout_at(deadline, semaphore.acquire_owned())
                        .await
                        .ok(),
                    None => Some(semaphore.acquire_owned().await),
                };

                let permit = match acquired {
                    Some(Ok(permit)) if !deadline.is_some_and(|d| Instant::now() >= d) => permit,
                    Some(Err(e)) => {
                        return TaskOutcome {
                            index,
                            result: Err(Error::Other(format!("Concurrency limiter closed: {}", e))),
                            record,
                            overran: false,
                        };
                    }
                    // Deadline reached before a permit: the call is never issued
                    _ => {
                        let result = Err(Error::timeout(format!(
                            "{} of {} was not started before the phase deadline",
                            operation, record.domain_name
                        )));
                        return TaskOutcome {
                            index,
                            record,
                            result,
                            overran: false,
                        };
                    }
                };

                let result = dispatch(provider.as_ref(), operation, &record).await;
                drop(permit);

                let overran = deadline.is_some_and(|d| Instant::now() > d);
                TaskOutcome {
                    index,
                    record,
                    result,
                    overran,
                }
            });
        }

        let mut pending: BTreeSet<usize> = (0..records.len()).collect();
        let mut failures = Vec::new();
        let mut overran = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    pending.remove(&outcome.index);
                    if outcome.overran {
                        warn!(
                            "{} of {} completed after the phase deadline",
                            operation, outcome.record.domain_name
                        );
                        overran.push((outcome.index, outcome.record.domain_name.clone()));
                    }
                    match outcome.result {
                        Ok(()) => debug!("{} succeeded for {}", operation, outcome.record.domain_name),
                        Err(cause) => {
                            warn!("Failed to {} DNS record {}: {}", operation, outcome.record, cause);
                            failures.push(RecordFailure {
                                index: outcome.index,
                                record: outcome.record,
                                cause,
                            });
                        }
                    }
                }
                Err(e) => error!("{} task aborted: {}", operation, e),
            }
        }

        // Tasks that panicked never reported back.
        for index in pending {
            failures.push(RecordFailure {
                index,
                record: records[index].clone(),
                cause: Error::Other(format!("{} task aborted before completing", operation)),
            });
        }

        let timed_out = !overran.is_empty()
            || failures.iter().any(|f| matches!(f.cause, Error::Timeout(_)));

        if failures.is_empty() && !timed_out {
            info!("Applied {} to {} record(s)", operation, records.len());
            return Ok(());
        }

        failures.sort_by_key(|f| f.index);
        overran.sort();

        Err(ApplyError {
            operation,
            attempted: records.len(),
            failures,
            overran: overran.into_iter().map(|(_, name)| name).collect(),
            timeout: if timed_out { timeout } else { None },
        })
    }
}

async fn dispatch(provider: &dyn DnsProvider, operation: Operation, record: &DnsRecord) -> Result<()> {
    match operation {
        Operation::Add => {
            info!("Adding dns record: {}", record);
            provider.add_record(record).await
        }
        Operation::Remove => {
            info!("Removing dns record: {}", record);
            provider.remove_record(record).await
        }
        Operation::Update => {
            info!("Updating dns record: {}", record);
            provider.update_record(record).await
        }
    }
}

/// A record whose provider call failed
#[derive(Debug, thiserror::Error)]
#[error("{record}: {cause}")]
pub struct RecordFailure {
    /// Position of the record in the phase's input list
    pub index: usize,
    /// The record that was being applied
    pub record: DnsRecord,
    /// Why the call failed
    pub cause: Error,
}

/// Every failure of one apply phase
#[derive(Debug, thiserror::Error)]
#[error(
    "{} of {attempted} {operation} operation(s) failed{}: {}",
    .failures.len(),
    deadline_note(.timeout, .overran),
    join_failures(.failures)
)]
pub struct ApplyError {
    operation: Operation,
    attempted: usize,
    failures: Vec<RecordFailure>,
    overran: Vec<String>,
    timeout: Option<Duration>,
}

fn deadline_note(timeout: &Option<Duration>, overran: &[String]) -> String {
    match timeout {
        None => String::new(),
        Some(timeout) if overran.is_empty() => {
            format!(" (phase deadline of {:?} exceeded)", timeout)
        }
        Some(timeout) => format!(
            " (phase deadline of {:?} exceeded; completed late: {})",
            timeout,
            overran.join(", ")
        ),
    }
}

fn join_failures(failures: &[RecordFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ApplyError {
    /// Operation the phase performed
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Number of records the phase dispatched
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// Failed records, ordered by their position in the input list
    pub fn failures(&self) -> &[RecordFailure] {
        &self.failures
    }

    /// Domain names of the failed records
    pub fn failed_domain_names(&self) -> Vec<&str> {
        self.failures
            .iter()
            .map(|f| f.record.domain_name.as_str())
            .collect()
    }

    /// Records whose issued call completed after the phase deadline
    pub fn overran(&self) -> &[String] {
        &self.overran
    }

    /// Whether the phase deadline expired before every call finished
    pub fn timed_out(&self) -> bool {
        self.timeout.is_some()
    }
}
