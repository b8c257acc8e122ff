// # Rancher Metadata Source
//
// This crate provides a MetadataSource backed by a Rancher-style metadata
// service: an HTTP API, reachable from every managed host, that describes the
// containers and hosts of the environment.
//
// ## API Reference
//
// All requests send `Accept: application/json`.
//
// - List containers: GET `{url}/containers`
// - List hosts: GET `{url}/hosts`
// - Topology version: GET `{url}/version` (changes whenever anything changes)
//
// ## Change Notifications
//
// `watch()` polls the version endpoint at a configurable interval and yields
// a `MetadataChange` whenever the version string differs from the last one
// seen. The first observation only primes the state.

use extdns_core::Registry;
use extdns_core::config::MetadataConfig;
use extdns_core::record::ServiceInstance;
use extdns_core::traits::{MetadataChange, MetadataSource, MetadataSourceFactory};
use extdns_core::{Error, Result};

use serde::Deserialize;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Default interval between version checks
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default HTTP timeout for metadata requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Container entry as served by the metadata service
#[derive(Debug, Clone, Deserialize)]
struct Container {
    #[serde(default)]
    name: String,
    #[serde(default)]
    service_name: Option<String>,
    #[serde(default)]
    stack_name: Option<String>,
    #[serde(default)]
    host_uuid: Option<String>,
}

impl From<Container> for ServiceInstance {
    fn from(c: Container) -> Self {
        ServiceInstance::new(
            c.name,
            c.service_name.unwrap_or_default(),
            c.stack_name.unwrap_or_default(),
            c.host_uuid.unwrap_or_default(),
        )
    }
}

/// Host entry as served by the metadata service
#[derive(Debug, Clone, Deserialize)]
struct Host {
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    agent_ip: String,
}

/// Metadata source reading a Rancher-style metadata service
pub struct RancherMetadataSource {
    /// Base URL, without trailing slash (e.g., "http://rancher-metadata/latest")
    base_url: String,

    /// Interval between version checks in `watch()`
    poll_interval: Duration,

    /// HTTP client
    client: reqwest::Client,
}

impl RancherMetadataSource {
    /// Create a source with the default polling interval
    ///
    /// # Parameters
    ///
    /// - `url`: Base URL of the metadata API (e.g., "http://rancher-metadata/latest")
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_interval(url, Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS))
    }

    /// Create a source with a custom polling interval
    pub fn with_interval(url: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            base_url: url.into().trim_end_matches('/').to_string(),
            poll_interval,
            client: reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// GET a JSON document from the metadata service
    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path);
        get(&self.client, &url)
            .await?
            .json()
            .await
            .map_err(|e| Error::metadata(format!("Invalid response from {}: {}", url, e)))
    }

    /// Fetch the current topology version
    pub async fn version(&self) -> Result<String> {
        fetch_version(&self.client, &self.endpoint("version")).await
    }
}

/// Issue a GET against the metadata service, failing on non-success statuses
async fn get(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| Error::metadata(format!("Request to {} failed: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(Error::metadata(format!(
            "GET {} returned {}",
            url,
            response.status()
        )));
    }

    Ok(response)
}

async fn fetch_version(client: &reqwest::Client, url: &str) -> Result<String> {
    let text = get(client, url)
        .await?
        .text()
        .await
        .map_err(|e| Error::metadata(format!("Failed to read response: {}", e)))?;

    // Served either as a JSON string or as plain text
    Ok(text.trim().trim_matches('"').to_string())
}

#[async_trait::async_trait]
impl MetadataSource for RancherMetadataSource {
    async fn list_service_instances(&self) -> Result<Vec<ServiceInstance>> {
        let containers: Vec<Container> = self.fetch("containers").await?;
        tracing::debug!("Metadata service reported {} container(s)", containers.len());
        Ok(containers.into_iter().map(ServiceInstance::from).collect())
    }

    async fn resolve_host(&self, host_id: &str) -> Result<IpAddr> {
        let hosts: Vec<Host> = self
            .fetch("hosts")
            .await
            .map_err(|e| Error::host_resolution(host_id, e.to_string()))?;

        let host = hosts
            .into_iter()
            .find(|h| h.uuid == host_id)
            .ok_or_else(|| Error::host_resolution(host_id, "host not found in metadata"))?;

        host.agent_ip.parse().map_err(|_| {
            Error::host_resolution(host_id, format!("invalid agent IP '{}'", host.agent_ip))
        })
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = MetadataChange> + Send + 'static>> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let url = self.endpoint("version");
        let poll_interval = self.poll_interval;
        let client = self.client.clone();

        tokio::spawn(async move {
            tracing::info!(
                "Watching metadata version (url={}, interval={:?})",
                url,
                poll_interval
            );

            let mut last_version: Option<String> = None;

            loop {
                match fetch_version(&client, &url).await {
                    Ok(version) => {
                        if let Some(previous) = &last_version
                            && *previous != version
                        {
                            tracing::info!("Metadata version changed: {} -> {}", previous, version);
                            if tx.send(MetadataChange::new(version.clone())).is_err() {
                                break;
                            }
                        }
                        last_version = Some(version);
                    }
                    Err(e) => tracing::warn!("Failed to check metadata version: {}", e),
                }

                // Stop as soon as the stream is dropped
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }

            tracing::debug!("Metadata watch stopped");
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn source_name(&self) -> &'static str {
        "rancher"
    }
}

/// Factory for creating Rancher metadata sources
pub struct RancherFactory;

impl MetadataSourceFactory for RancherFactory {
    fn create(&self, config: &MetadataConfig) -> Result<Box<dyn MetadataSource>> {
        match config {
            MetadataConfig::Rancher {
                url,
                poll_interval_secs,
            } => {
                if url.is_empty() {
                    return Err(Error::config("Rancher metadata URL is required"));
                }

                Ok(Box::new(RancherMetadataSource::with_interval(
                    url.clone(),
                    Duration::from_secs(*poll_interval_secs),
                )))
            }
            _ => Err(Error::config("Invalid config for Rancher metadata source")),
        }
    }
}

/// Register the Rancher metadata source with a registry
pub fn register(registry: &Registry) {
    registry.register_metadata_source("rancher", Box::new(RancherFactory));
}
