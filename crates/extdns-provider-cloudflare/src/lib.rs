// # Cloudflare DNS Provider
//
// This crate provides a Cloudflare DNS provider implementation for the extdns
// system.
//
// ## Record Model
//
// An extdns record carries several values under one name. Cloudflare stores
// one A record per value, so:
//
// - `list_records` groups all A records of the zone by name
// - `add_record` creates one Cloudflare record per distinct value not yet present
// - `remove_record` deletes every A record with the name
// - `update_record` converges: missing values are created first, then surplus
//   and duplicate values are deleted, so the name never goes empty
//
// Retries and scheduling are owned by the reconciler; a failed call is
// reported and retried on the next pass.
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Provider fails fast if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=A&page=N`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`
// - List Zones: GET `/zones?name=...`

use async_trait::async_trait;
use extdns_core::Registry;
use extdns_core::config::ProviderConfig;
use extdns_core::record::{DnsRecord, RECORD_TYPE_A};
use extdns_core::traits::{DnsProvider, DnsProviderFactory};
use extdns_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records requested per page when listing
const PAGE_SIZE: u32 = 100;

/// Envelope wrapping every Cloudflare API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

/// A single Cloudflare DNS record (one value)
#[derive(Debug, Clone, Deserialize)]
struct CfRecord {
    id: String,
    name: String,
    content: String,
    #[serde(default)]
    ttl: u32,
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider performs all GET requests (zone
/// lookup, record listing) and logs the POST/DELETE requests it would have
/// sent without sending them.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone ID (optional, can be auto-detected)
    zone_id: Option<String>,

    /// Zone name used for auto-detection when no zone ID is configured
    zone_name: Option<String>,

    /// Zone ID found by auto-detection
    discovered_zone: OnceCell<String>,

    /// API base URL (overridable for tests)
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip mutations
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("zone_name", &self.zone_name)
            .field("api_base", &self.api_base)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `zone_id`: Optional zone ID (can be auto-detected)
    /// - `zone_name`: Optional zone name for auto-detection
    /// - `dry_run`: If true, perform GET requests but skip mutations
    pub fn new(
        api_token: impl Into<String>,
        zone_id: Option<String>,
        zone_name: Option<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::provider("cloudflare", format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            zone_id,
            zone_name,
            discovered_zone: OnceCell::new(),
            api_base: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the provider at a different API endpoint
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether the provider only logs mutations
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Resolve the zone ID to operate on
    ///
    /// Uses the configured zone ID if present. Otherwise looks up the zone by
    /// the configured zone name, or by the zone derived from `domain`. The
    /// result of a lookup is cached for the life of the provider.
    async fn zone_id(&self, domain: Option<&str>) -> Result<String> {
        if let Some(ref zone_id) = self.zone_id {
            return Ok(zone_id.clone());
        }

        let zone_name = match (&self.zone_name, domain) {
            (Some(name), _) => name.clone(),
            (None, Some(domain)) => zone_name_for(domain)?,
            (None, None) => {
                return Err(Error::config(
                    "Cloudflare zone_id or zone_name is required to list records",
                ));
            }
        };

        self.discovered_zone
            .get_or_try_init(|| self.lookup_zone(zone_name))
            .await
            .cloned()
    }

    /// GET /zones?name=...
    async fn lookup_zone(&self, zone_name: String) -> Result<String> {
        tracing::debug!("Looking up zone ID for domain: {}", zone_name);

        let request = self
            .client
            .get(format!("{}/zones", self.api_base))
            .query(&[("name", zone_name.as_str())]);
        let response: ApiResponse<Vec<Zone>> = self.send(request, "Zone lookup").await?;

        let zone = response
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("Zone not found: {}", zone_name)))?;

        tracing::debug!("Found zone ID: {}", zone.id);
        Ok(zone.id)
    }

    /// List A records of the zone, optionally restricted to one name
    async fn list_a_records(&self, zone_id: &str, name: Option<&str>) -> Result<Vec<CfRecord>> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let mut query = vec![
                ("type", RECORD_TYPE_A.to_string()),
                ("page", page.to_string()),
                ("per_page", PAGE_SIZE.to_string()),
            ];
            if let Some(name) = name {
                query.push(("name", name.to_string()));
            }

            let request = self.client.get(&url).query(&query);
            let response: ApiResponse<Vec<CfRecord>> = self.send(request, "Record listing").await?;

            let batch = response.result.unwrap_or_default();
            let total_pages = response.result_info.map(|i| i.total_pages).unwrap_or(1);
            let exhausted = batch.is_empty() || page >= total_pages;
            records.extend(batch);

            if exhausted {
                break;
            }
            page += 1;
        }

        Ok(records)
    }

    /// POST /zones/:zone_id/dns_records
    async fn create(&self, zone_id: &str, name: &str, content: &str, ttl: u32) -> Result<()> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
        let payload = serde_json::json!({
            "type": RECORD_TYPE_A,
            "name": name,
            "content": content,
            "ttl": ttl,
        });

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send POST request to {} with payload: {}", url, payload);
            return Ok(());
        }

        let request = self.client.post(&url).json(&payload);
        let _: ApiResponse<serde_json::Value> = self.send(request, "Record creation").await?;
        tracing::debug!("Created Cloudflare record {} -> {}", name, content);
        Ok(())
    }

    /// DELETE /zones/:zone_id/dns_records/:record_id
    async fn delete(&self, zone_id: &str, record: &CfRecord) -> Result<()> {
        let url = format!("{}/zones/{}/dns_records/{}", self.api_base, zone_id, record.id);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send DELETE request to {} ({} -> {})",
                url,
                record.name,
                record.content
            );
            return Ok(());
        }

        let request = self.client.delete(&url);
        let _: ApiResponse<serde_json::Value> = self.send(request, "Record deletion").await?;
        tracing::debug!("Deleted Cloudflare record {} -> {}", record.name, record.content);
        Ok(())
    }

    /// Create every distinct value of `record` not already in `existing`
    async fn create_missing(
        &self,
        zone_id: &str,
        record: &DnsRecord,
        existing: &[CfRecord],
    ) -> Result<()> {
        let mut present: HashSet<&str> = existing.iter().map(|r| r.content.as_str()).collect();
        for value in &record.values {
            if present.insert(value.as_str()) {
                self.create(zone_id, &record.domain_name, value, record.ttl).await?;
            }
        }
        Ok(())
    }

    /// Send an authenticated request and decode the response envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<ApiResponse<T>> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status.as_u16(), &error_text, context));
        }

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("Failed to parse response: {}", e)))?;

        if !body.success {
            let messages: Vec<String> = body
                .errors
                .iter()
                .map(|m| format!("{} (code {})", m.message, m.code))
                .collect();
            return Err(Error::provider(
                "cloudflare",
                format!("{} rejected: {}", context, messages.join("; ")),
            ));
        }

        Ok(body)
    }
}

/// Map a non-success HTTP status to an error
fn status_error(status: u16, body: &str, context: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
            status
        )),
        404 => Error::not_found(format!("{} failed: resource not found", context)),
        409 => Error::provider(
            "cloudflare",
            format!("Conflict: Record is being updated by another process. Status: {}", status),
        ),
        429 => Error::rate_limited(format!(
            "Rate limit exceeded. Please retry later. Status: {}",
            status
        )),
        500..=599 => Error::provider(
            "cloudflare",
            format!("Cloudflare server error (transient): {} - {}", status, body),
        ),
        _ => Error::provider("cloudflare", format!("{} failed: {} - {}", context, status, body)),
    }
}

/// Derive the zone name from a record name
///
/// For "sub.example.com" this is "example.com". Short second-level labels
/// such as the "co" in "co.uk" keep one more label.
fn zone_name_for(domain: &str) -> Result<String> {
    let parts: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
    if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(Error::config(format!("Invalid domain name: {}", domain)));
    }

    let n = parts.len();
    if n >= 3 && parts[n - 2].len() <= 3 {
        Ok(format!("{}.{}.{}", parts[n - 3], parts[n - 2], parts[n - 1]))
    } else {
        Ok(format!("{}.{}", parts[n - 2], parts[n - 1]))
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn list_records(&self) -> Result<Vec<DnsRecord>> {
        let zone_id = self.zone_id(None).await?;
        let records = self.list_a_records(&zone_id, None).await?;

        let mut grouped: BTreeMap<String, DnsRecord> = BTreeMap::new();
        for record in records {
            grouped
                .entry(record.name.clone())
                .or_insert_with(|| DnsRecord::new(record.name.clone(), Vec::new()).with_ttl(record.ttl))
                .values
                .push(record.content);
        }

        tracing::debug!("Cloudflare zone holds {} A record name(s)", grouped.len());
        Ok(grouped.into_values().collect())
    }

    async fn add_record(&self, record: &DnsRecord) -> Result<()> {
        tracing::info!(
            "Creating Cloudflare DNS record: {} [mode: {}]",
            record,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let zone_id = self.zone_id(Some(&record.domain_name)).await?;
        let existing = self.list_a_records(&zone_id, Some(&record.domain_name)).await?;
        self.create_missing(&zone_id, record, &existing).await
    }

    async fn remove_record(&self, record: &DnsRecord) -> Result<()> {
        tracing::info!(
            "Deleting Cloudflare DNS record: {} [mode: {}]",
            record.domain_name,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let zone_id = self.zone_id(Some(&record.domain_name)).await?;
        let existing = self.list_a_records(&zone_id, Some(&record.domain_name)).await?;
        for cf_record in &existing {
            self.delete(&zone_id, cf_record).await?;
        }
        Ok(())
    }

    async fn update_record(&self, record: &DnsRecord) -> Result<()> {
        tracing::info!(
            "Updating Cloudflare DNS record: {} [mode: {}]",
            record,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let zone_id = self.zone_id(Some(&record.domain_name)).await?;
        let existing = self.list_a_records(&zone_id, Some(&record.domain_name)).await?;

        self.create_missing(&zone_id, record, &existing).await?;

        // Surplus values and duplicates go last
        let wanted: HashSet<&str> = record.values.iter().map(String::as_str).collect();
        let mut kept: HashSet<&str> = HashSet::new();
        for cf_record in &existing {
            if wanted.contains(cf_record.content.as_str()) && kept.insert(cf_record.content.as_str()) {
                continue;
            }
            self.delete(&zone_id, cf_record).await?;
        }

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                zone_id,
                zone_name,
            } => {
                if api_token.is_empty() {
                    return Err(Error::config("Cloudflare API token is required"));
                }

                // Check for dry-run mode environment variable
                let dry_run = std::env::var("EXTDNS_MODE")
                    .unwrap_or_default()
                    .eq_ignore_ascii_case("dry-run");

                if dry_run {
                    tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
                }

                Ok(Box::new(CloudflareProvider::new(
                    api_token.clone(),
                    zone_id.clone(),
                    zone_name.clone(),
                    dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use extdns_core::Registry;
///
/// let registry = Registry::new();
/// extdns_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &Registry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}
