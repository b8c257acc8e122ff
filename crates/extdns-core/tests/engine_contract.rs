//! Contract Test: Engine Scheduling & Shutdown
//!
//! Constraints verified:
//! - A pass runs at startup
//! - A metadata change notification triggers a pass
//! - A failing pass is reported and does not stop the engine
//! - The engine terminates promptly on shutdown

mod common;

use common::*;
use extdns_core::engine::{EngineEvent, PassTrigger};
use extdns_core::ReconcileEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Wait for the next event matching `pred`, failing after a timeout
async fn wait_for(
    events: &mut mpsc::Receiver<EngineEvent>,
    pred: impl Fn(&EngineEvent) -> bool,
) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("engine event channel open");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected engine event within 5 seconds")
}

#[tokio::test]
async fn startup_pass_then_change_driven_pass() {
    let source = Arc::new(
        TestMetadataSource::new()
            .with_host("h1", [10, 0, 0, 1])
            .with_host("h2", [10, 0, 0, 2])
            .with_instance("web-1", "web", "shop", "h1"),
    );
    let provider = Arc::new(RecordingProvider::new());

    let (engine, mut events) =
        ReconcileEngine::new(source.clone(), provider.clone(), minimal_config())
            .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    assert!(matches!(
        wait_for(&mut events, |e| matches!(e, EngineEvent::PassSucceeded { .. })).await,
        EngineEvent::PassSucceeded { added: 1, .. }
    ));
    assert_eq!(
        provider.values(&fqdn("web", "shop")),
        Some(vec!["10.0.0.1".to_string()])
    );

    // Scale out and notify
    source.add_instance("web-2", "web", "shop", "h2");
    source.notify_change("2");

    let started = wait_for(&mut events, |e| matches!(e, EngineEvent::PassStarted { .. })).await;
    assert_eq!(
        started,
        EngineEvent::PassStarted {
            trigger: PassTrigger::MetadataChange {
                version: "2".to_string()
            }
        }
    );
    assert!(matches!(
        wait_for(&mut events, |e| matches!(e, EngineEvent::PassSucceeded { .. })).await,
        EngineEvent::PassSucceeded { updated: 1, .. }
    ));
    assert_eq!(
        provider.values(&fqdn("web", "shop")),
        Some(vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()])
    );

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn failing_pass_does_not_stop_engine() {
    let source = Arc::new(
        TestMetadataSource::new()
            .with_host("h1", [10, 0, 0, 1])
            .with_instance("web-1", "web", "shop", "h1"),
    );
    source.set_fail_listing(true);
    let provider = Arc::new(RecordingProvider::new());

    let (engine, mut events) =
        ReconcileEngine::new(source.clone(), provider.clone(), minimal_config())
            .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    match wait_for(&mut events, |e| matches!(e, EngineEvent::PassFailed { .. })).await {
        EngineEvent::PassFailed { error } => {
            assert!(error.contains("metadata service unavailable"), "{}", error)
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(provider.mutation_count(), 0);

    // Source recovers; the next notification converges the zone.
    source.set_fail_listing(false);
    source.notify_change("2");

    wait_for(&mut events, |e| matches!(e, EngineEvent::PassSucceeded { .. })).await;
    assert_eq!(provider.names(), vec![fqdn("web", "shop")]);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_signal_terminates_engine() {
    let source = Arc::new(TestMetadataSource::new());
    let provider = Arc::new(RecordingProvider::new());

    let (engine, mut events) = ReconcileEngine::new(source, provider, minimal_config())
        .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    wait_for(&mut events, |e| matches!(e, EngineEvent::PassSucceeded { .. })).await;
    shutdown_tx.send(()).expect("shutdown signal send succeeds");

    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(result.is_ok(), "Engine should terminate within 5 seconds");
    assert!(result.unwrap().unwrap().is_ok());

    wait_for(&mut events, |e| matches!(e, EngineEvent::Stopped { .. })).await;
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let mut config = minimal_config();
    config.reconcile.environment_name.clear();

    let result = ReconcileEngine::new(
        Arc::new(TestMetadataSource::new()),
        Arc::new(RecordingProvider::new()),
        config,
    );
    assert!(result.is_err());
}
