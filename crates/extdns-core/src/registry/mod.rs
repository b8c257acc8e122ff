//! Plugin-based registry
//!
//! The registry allows DNS providers and metadata sources to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use extdns_core::registry::Registry;
//! use extdns_core::config::ProviderConfig;
//!
//! // Create a registry with the built-in memory provider
//! let registry = Registry::with_builtins();
//!
//! // Register plugins
//! extdns_provider_cloudflare::register(&registry);
//! extdns_metadata_rancher::register(&registry);
//!
//! // Create collaborators from config
//! let provider = registry.create_provider(&config.provider)?;
//! let metadata = registry.create_metadata_source(&config.metadata)?;
//! ```

use crate::config::{MetadataConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory, MetadataSource, MetadataSourceFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Registry for plugin-based provider and metadata source creation
///
/// The registry maintains maps of type names to factory objects,
/// allowing dynamic instantiation based on configuration.
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct Registry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,

    /// Registered metadata source factories
    metadata_sources: RwLock<HashMap<String, Box<dyn MetadataSourceFactory>>>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the providers shipped in this crate
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        crate::provider::memory::register(&registry);
        registry
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "cloudflare", "memory")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(name.into(), factory);
    }

    /// Register a metadata source factory
    ///
    /// # Parameters
    ///
    /// - `name`: Metadata source type name (e.g., "rancher")
    /// - `factory`: Factory object for creating metadata source instances
    pub fn register_metadata_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn MetadataSourceFactory>,
    ) {
        let mut sources = self
            .metadata_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        sources.insert(name.into(), factory);
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error)`: If provider type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create a metadata source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn MetadataSource>)`: Created metadata source instance
    /// - `Err(Error)`: If source type is not registered or creation fails
    pub fn create_metadata_source(&self, config: &MetadataConfig) -> Result<Box<dyn MetadataSource>> {
        let source_type = config.type_name();
        let sources = self
            .metadata_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = sources.get(source_type).ok_or_else(|| {
            Error::config(format!("Unknown metadata source type: {}", source_type))
        })?;

        factory.create(config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// List all registered metadata source types
    pub fn list_metadata_sources(&self) -> Vec<String> {
        let sources = self
            .metadata_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        sources.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }

    /// Check if a metadata source type is registered
    pub fn has_metadata_source(&self, name: &str) -> bool {
        let sources = self
            .metadata_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(name)
    }
}
