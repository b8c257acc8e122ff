//! Contract Test: Phase Ordering & Fail-Fast
//!
//! Constraints verified:
//! - Every add completes before any remove starts, and every remove before any update
//! - A phase with failures still attempts all of its records
//! - A failing phase stops the pass: later phases make no provider calls
//! - The returned error names the phase and every failed record
//! - A phase deadline never cancels a provider call already issued

mod common;

use common::*;
use extdns_core::record::Operation;
use extdns_core::{Error, Reconciler};
use std::sync::Arc;
use std::time::Duration;

/// Topology needing two adds, two removes and two updates
fn mixed_fixture() -> (Arc<TestMetadataSource>, Arc<RecordingProvider>) {
    let source = Arc::new(
        TestMetadataSource::new()
            .with_host("h1", [10, 0, 0, 1])
            .with_instance("new-a", "new-a", "s", "h1")
            .with_instance("new-b", "new-b", "s", "h1")
            .with_instance("chg-a", "chg-a", "s", "h1")
            .with_instance("chg-b", "chg-b", "s", "h1"),
    );
    let provider = Arc::new(
        RecordingProvider::new()
            .with_record(&fqdn("chg-a", "s"), &["10.9.9.9"])
            .with_record(&fqdn("chg-b", "s"), &["10.9.9.9"])
            .with_record(&fqdn("gone-a", "s"), &["10.9.9.9"])
            .with_record(&fqdn("gone-b", "s"), &["10.9.9.9"]),
    );
    (source, provider)
}

fn reconciler(source: &Arc<TestMetadataSource>, provider: &Arc<RecordingProvider>) -> Reconciler {
    let config = minimal_config();
    Reconciler::with_limits(
        source.clone(),
        provider.clone(),
        &config.reconcile,
        &config.engine,
    )
}

#[tokio::test]
async fn phases_run_add_then_remove_then_update() {
    let (source, provider) = mixed_fixture();
    provider.set_delay(Duration::from_millis(10));

    reconciler(&source, &provider).reconcile().await.unwrap();

    let operations: Vec<Operation> = provider.calls().into_iter().map(|(op, _)| op).collect();
    assert_eq!(
        operations,
        vec![
            Operation::Add,
            Operation::Add,
            Operation::Remove,
            Operation::Remove,
            Operation::Update,
            Operation::Update,
        ]
    );
}

#[tokio::test]
async fn failing_add_phase_stops_the_pass() {
    let (source, provider) = mixed_fixture();
    provider.fail_on(&fqdn("new-a", "s"));
    provider.fail_on(&fqdn("new-b", "s"));

    let err = reconciler(&source, &provider).reconcile().await.unwrap_err();

    match &err {
        Error::Phase { phase, source } => {
            assert_eq!(*phase, Operation::Add);
            assert_eq!(
                source.failed_domain_names(),
                vec![fqdn("new-a", "s").as_str(), fqdn("new-b", "s").as_str()]
            );
        }
        other => panic!("expected phase error, got {:?}", other),
    }

    let message = err.to_string();
    assert!(message.starts_with("Failed to add records: 2 of 2 add operation(s) failed"));
    assert!(message.contains(&fqdn("new-a", "s")));
    assert!(message.contains(&fqdn("new-b", "s")));

    assert!(
        provider.calls().iter().all(|(op, _)| *op == Operation::Add),
        "no remove or update may run after a failed add phase: {:?}",
        provider.calls()
    );
}

#[tokio::test]
async fn partial_failure_still_attempts_every_record_of_the_phase() {
    let (source, provider) = mixed_fixture();
    provider.fail_on(&fqdn("gone-a", "s"));

    let err = reconciler(&source, &provider).reconcile().await.unwrap_err();

    match err {
        Error::Phase { phase, source } => {
            assert_eq!(phase, Operation::Remove);
            assert_eq!(source.attempted(), 2);
            assert_eq!(source.failed_domain_names(), vec![fqdn("gone-a", "s").as_str()]);
        }
        other => panic!("expected phase error, got {:?}", other),
    }

    // The healthy remove went through; updates never started.
    assert_eq!(provider.values(&fqdn("gone-b", "s")), None);
    assert!(provider.calls().iter().all(|(op, _)| *op != Operation::Update));
    assert_eq!(
        provider.values(&fqdn("chg-a", "s")),
        Some(vec!["10.9.9.9".to_string()])
    );
}

#[tokio::test]
async fn phase_deadline_is_reported_and_issued_calls_complete() {
    let (source, provider) = mixed_fixture();
    provider.set_delay(Duration::from_millis(300));

    let err = reconciler(&source, &provider)
        .with_apply_timeout(Some(Duration::from_millis(50)))
        .reconcile()
        .await
        .unwrap_err();

    match err {
        Error::Phase { phase, source } => {
            assert_eq!(phase, Operation::Add);
            assert!(source.timed_out());
            assert!(source.failures().is_empty());
            assert_eq!(source.overran(), [fqdn("new-a", "s"), fqdn("new-b", "s")]);
        }
        other => panic!("expected phase error, got {:?}", other),
    }

    // Both adds were issued before the deadline and ran to completion
    assert_eq!(
        provider.values(&fqdn("new-a", "s")),
        Some(vec!["10.0.0.1".to_string()])
    );
    assert_eq!(
        provider.values(&fqdn("new-b", "s")),
        Some(vec!["10.0.0.1".to_string()])
    );
    assert!(provider.calls().iter().all(|(op, _)| *op == Operation::Add));
}
