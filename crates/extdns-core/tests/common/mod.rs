//! Test doubles and common utilities for contract tests
//!
//! These doubles record every call so tests can assert on what the
//! reconciler did, and can be scripted to fail or stall.

#![allow(dead_code)]

use extdns_core::error::{Error, Result};
use extdns_core::record::{DnsRecord, Operation, ServiceInstance};
use extdns_core::traits::{DnsProvider, MetadataChange, MetadataSource};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::Stream;

pub const ENV: &str = "env";
pub const ROOT: &str = "example.com";

/// A metadata source with a fixed topology and on-demand change events
pub struct TestMetadataSource {
    instances: Mutex<Vec<ServiceInstance>>,
    hosts: Mutex<HashMap<String, IpAddr>>,
    fail_listing: AtomicBool,
    list_call_count: AtomicUsize,
    change_tx: mpsc::UnboundedSender<MetadataChange>,
    change_rx: Mutex<Option<mpsc::UnboundedReceiver<MetadataChange>>>,
}

impl TestMetadataSource {
    pub fn new() -> Self {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        Self {
            instances: Mutex::new(Vec::new()),
            hosts: Mutex::new(HashMap::new()),
            fail_listing: AtomicBool::new(false),
            list_call_count: AtomicUsize::new(0),
            change_tx,
            change_rx: Mutex::new(Some(change_rx)),
        }
    }

    /// Register a host and its IP
    pub fn with_host(self, host_id: &str, ip: [u8; 4]) -> Self {
        self.hosts
            .lock()
            .unwrap()
            .insert(host_id.to_string(), IpAddr::from(ip));
        self
    }

    /// Add a running instance of `service` in `stack` on `host_id`
    pub fn with_instance(self, name: &str, service: &str, stack: &str, host_id: &str) -> Self {
        self.add_instance(name, service, stack, host_id);
        self
    }

    pub fn add_instance(&self, name: &str, service: &str, stack: &str, host_id: &str) {
        self.instances
            .lock()
            .unwrap()
            .push(ServiceInstance::new(name, service, stack, host_id));
    }

    pub fn clear_instances(&self) {
        self.instances.lock().unwrap().clear();
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    /// Emit a change notification on the watch stream
    pub fn notify_change(&self, version: &str) {
        let _ = self.change_tx.send(MetadataChange::new(version));
    }
}

#[async_trait::async_trait]
impl MetadataSource for TestMetadataSource {
    async fn list_service_instances(&self) -> Result<Vec<ServiceInstance>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::metadata("metadata service unavailable"));
        }
        Ok(self.instances.lock().unwrap().clone())
    }

    async fn resolve_host(&self, host_id: &str) -> Result<IpAddr> {
        self.hosts
            .lock()
            .unwrap()
            .get(host_id)
            .copied()
            .ok_or_else(|| Error::host_resolution(host_id, "host not found"))
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = MetadataChange> + Send + 'static>> {
        match self.change_rx.lock().unwrap().take() {
            Some(rx) => Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx)),
            None => Box::pin(tokio_stream::pending()),
        }
    }

    fn source_name(&self) -> &'static str {
        "test"
    }
}

/// A provider that keeps a zone in memory and records every call
#[derive(Default)]
pub struct RecordingProvider {
    zone: Mutex<BTreeMap<String, DnsRecord>>,
    calls: Mutex<Vec<(Operation, String)>>,
    failing: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    list_call_count: AtomicUsize,
    delay: Mutex<Duration>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the zone
    pub fn with_record(self, name: &str, values: &[&str]) -> Self {
        self.zone
            .lock()
            .unwrap()
            .insert(name.to_string(), record(name, values));
        self
    }

    /// Make every mutation of `name` fail
    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Delay every mutation
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<(Operation, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Values currently stored for `name`
    pub fn values(&self, name: &str) -> Option<Vec<String>> {
        self.zone.lock().unwrap().get(name).map(|r| r.values.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.zone.lock().unwrap().keys().cloned().collect()
    }

    async fn mutate(&self, operation: Operation, record: &DnsRecord) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((operation, record.domain_name.clone()));

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(&record.domain_name) {
            return Err(Error::provider(
                "recording",
                format!("refused {} of {}", operation, record.domain_name),
            ));
        }

        let mut zone = self.zone.lock().unwrap();
        match operation {
            Operation::Add | Operation::Update => {
                zone.insert(record.domain_name.clone(), record.clone());
            }
            Operation::Remove => {
                zone.remove(&record.domain_name);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DnsProvider for RecordingProvider {
    async fn list_records(&self) -> Result<Vec<DnsRecord>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::http("503 Service Unavailable"));
        }
        Ok(self.zone.lock().unwrap().values().cloned().collect())
    }

    async fn add_record(&self, record: &DnsRecord) -> Result<()> {
        self.mutate(Operation::Add, record).await
    }

    async fn remove_record(&self, record: &DnsRecord) -> Result<()> {
        self.mutate(Operation::Remove, record).await
    }

    async fn update_record(&self, record: &DnsRecord) -> Result<()> {
        self.mutate(Operation::Update, record).await
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// Build an A record with the default TTL
pub fn record(name: &str, values: &[&str]) -> DnsRecord {
    DnsRecord::new(name, values.iter().map(|v| v.to_string()).collect())
}

/// Fully-qualified managed name for a service in a stack
pub fn fqdn(service: &str, stack: &str) -> String {
    format!("{}.{}.{}.{}", service, stack, ENV, ROOT)
}

/// Helper to create a minimal ExtDnsConfig for testing
pub fn minimal_config() -> extdns_core::config::ExtDnsConfig {
    extdns_core::config::ExtDnsConfig {
        reconcile: extdns_core::config::ReconcileConfig::new(ENV, ROOT),
        provider: extdns_core::config::ProviderConfig::Memory,
        metadata: extdns_core::config::MetadataConfig::Rancher {
            url: "http://rancher-metadata/latest".to_string(),
            poll_interval_secs: 1,
        },
        engine: extdns_core::config::EngineConfig {
            interval_secs: 3600, // Only the startup tick fires during tests
            max_concurrency: 4,
            apply_timeout_secs: Some(5),
            event_channel_capacity: 100,
        },
    }
}
