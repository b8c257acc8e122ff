//! Configuration types for the extdns system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

use crate::record::DEFAULT_TTL;

/// Metadata API reachable from every managed host
pub const DEFAULT_METADATA_URL: &str = "http://rancher-metadata/latest";

/// Main extdns configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtDnsConfig {
    /// Naming and record settings for reconciliation
    pub reconcile: ReconcileConfig,

    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// Metadata source configuration
    pub metadata: MetadataConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ExtDnsConfig {
    /// Create a configuration for the given environment and root domain
    pub fn new(environment_name: impl Into<String>, root_domain: impl Into<String>) -> Self {
        Self {
            reconcile: ReconcileConfig::new(environment_name, root_domain),
            provider: ProviderConfig::default(),
            metadata: MetadataConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.reconcile.validate()?;
        self.provider.validate()?;
        self.metadata.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Settings that shape the records a pass produces and owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Environment name, the third label from the left of every managed name
    pub environment_name: String,

    /// Root domain every managed name ends with (e.g., "example.com")
    pub root_domain: String,

    /// TTL applied to every managed record
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl ReconcileConfig {
    /// Create reconcile settings with the default TTL
    pub fn new(environment_name: impl Into<String>, root_domain: impl Into<String>) -> Self {
        Self {
            environment_name: environment_name.into(),
            root_domain: root_domain.into(),
            ttl: DEFAULT_TTL,
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Lower-cased suffix shared by every name this system owns
    ///
    /// `".env.example.com"` for environment "env" and root "example.com".
    pub fn owned_suffix(&self) -> String {
        format!(".{}.{}", self.environment_name, self.root_domain).to_lowercase()
    }

    /// Validate the reconcile settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.environment_name.is_empty() {
            return Err(crate::Error::config("Environment name cannot be empty"));
        }
        if self.environment_name.contains('.') {
            return Err(crate::Error::config(
                "Environment name must be a single DNS label",
            ));
        }
        if self.root_domain.is_empty() {
            return Err(crate::Error::config("Root domain cannot be empty"));
        }
        if self.root_domain.starts_with('.') || self.root_domain.ends_with('.') {
            return Err(crate::Error::config(
                "Root domain must not start or end with a dot",
            ));
        }
        if self.ttl == 0 {
            return Err(crate::Error::config("TTL must be > 0"));
        }
        Ok(())
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Zone ID (optional, can be auto-detected)
        zone_id: Option<String>,
        /// Zone name used for auto-detection (e.g., "example.com")
        #[serde(default)]
        zone_name: Option<String>,
    },

    /// In-memory provider (not persistent)
    Memory,

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare { api_token, .. } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Memory => Ok(()),
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Memory => "memory",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Memory
    }
}

/// Metadata source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetadataConfig {
    /// Rancher-style HTTP metadata service
    Rancher {
        /// Base URL of the metadata API (e.g., "http://rancher-metadata/latest")
        url: String,
        /// Interval between version checks for change notifications
        #[serde(default = "default_poll_interval_secs")]
        poll_interval_secs: u64,
    },

    /// Custom metadata source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl MetadataConfig {
    /// Validate the metadata source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            MetadataConfig::Rancher {
                url,
                poll_interval_secs,
            } => {
                if url.is_empty() {
                    return Err(crate::Error::config("Metadata URL cannot be empty"));
                }
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "Metadata URL must use HTTP or HTTPS scheme. Got: {}",
                        url
                    )));
                }
                if *poll_interval_secs == 0 {
                    return Err(crate::Error::config("Metadata poll interval must be > 0"));
                }
                Ok(())
            }
            MetadataConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom metadata source factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom metadata source config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the metadata source type name
    pub fn type_name(&self) -> &str {
        match self {
            MetadataConfig::Rancher { .. } => "rancher",
            MetadataConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        MetadataConfig::Rancher {
            url: DEFAULT_METADATA_URL.to_string(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between periodic reconciliation passes (in seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Maximum number of provider calls in flight within one phase
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Deadline for all provider calls of one phase (in seconds)
    ///
    /// Calls still running at the deadline are reported as failed.
    /// `None` waits indefinitely.
    #[serde(default = "default_apply_timeout_secs")]
    pub apply_timeout_secs: Option<u64>,

    /// Capacity of the internal event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Reconcile interval must be > 0"));
        }
        if self.max_concurrency == 0 {
            return Err(crate::Error::config("Max concurrency must be > 0"));
        }
        if self.apply_timeout_secs == Some(0) {
            return Err(crate::Error::config("Apply timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Apply deadline as a duration
    pub fn apply_timeout(&self) -> Option<std::time::Duration> {
        self.apply_timeout_secs.map(std::time::Duration::from_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_concurrency: default_max_concurrency(),
            apply_timeout_secs: default_apply_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_interval_secs() -> u64 {
    60
}

fn default_max_concurrency() -> usize {
    10
}

fn default_apply_timeout_secs() -> Option<u64> {
    Some(120)
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_suffix_is_lowercase() {
        let config = ReconcileConfig::new("Prod", "Example.COM");
        assert_eq!(config.owned_suffix(), ".prod.example.com");
    }

    #[test]
    fn test_validate_rejects_empty_names() {
        assert!(ReconcileConfig::new("", "example.com").validate().is_err());
        assert!(ReconcileConfig::new("env", "").validate().is_err());
        assert!(ReconcileConfig::new("a.b", "example.com").validate().is_err());
        assert!(ReconcileConfig::new("env", "example.com.").validate().is_err());
        assert!(ReconcileConfig::new("env", "example.com").validate().is_ok());
    }

    #[test]
    fn test_engine_defaults() {
        let engine = EngineConfig::default();
        assert_eq!(engine.interval_secs, 60);
        assert_eq!(engine.max_concurrency, 10);
        assert_eq!(engine.apply_timeout(), Some(std::time::Duration::from_secs(120)));
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = serde_json::json!({
            "reconcile": { "environment_name": "env", "root_domain": "example.com" },
            "provider": { "type": "cloudflare", "api_token": "token", "zone_id": null },
            "metadata": { "type": "rancher", "url": "http://rancher-metadata/latest" }
        });

        let config: ExtDnsConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.reconcile.ttl, 300);
        assert_eq!(config.provider.type_name(), "cloudflare");
        assert_eq!(config.metadata.type_name(), "rancher");
        assert_eq!(config.engine.max_concurrency, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_metadata_url_scheme_validated() {
        let config = MetadataConfig::Rancher {
            url: "rancher-metadata/latest".to_string(),
            poll_interval_secs: 5,
        };
        assert!(config.validate().is_err());
    }
}
