// # extdnsd - External DNS Daemon
//
// This daemon is a thin integration layer. All reconciliation logic lives in
// extdns-core; the daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering providers and metadata sources
// 4. Starting the reconcile engine and stopping it on SIGTERM/SIGINT
//
// ## Configuration
//
// ### Naming
// - `EXTDNS_ENVIRONMENT_NAME`: Environment label of every managed name (required)
// - `EXTDNS_ROOT_DOMAIN`: Root domain of every managed name (required)
// - `EXTDNS_TTL`: TTL of managed records (default 300)
//
// ### DNS Provider
// - `EXTDNS_PROVIDER_TYPE`: Provider type (cloudflare, memory)
// - `EXTDNS_PROVIDER_API_TOKEN`: API token (cloudflare)
// - `EXTDNS_PROVIDER_ZONE_ID`: Zone ID (optional, looked up from the root domain)
// - `EXTDNS_MODE`: Set to `dry-run` to log provider mutations without sending them
//
// ### Metadata Source
// - `EXTDNS_METADATA_URL`: Metadata API base URL (default http://rancher-metadata/latest)
// - `EXTDNS_METADATA_POLL_INTERVAL`: Version poll interval in seconds (default 5)
//
// ### Engine
// - `EXTDNS_INTERVAL_SECS`: Periodic pass interval (default 60)
// - `EXTDNS_MAX_CONCURRENCY`: Provider calls in flight per phase (default 10)
// - `EXTDNS_APPLY_TIMEOUT_SECS`: Phase deadline, 0 disables it (default 120)
// - `EXTDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export EXTDNS_ENVIRONMENT_NAME=prod
// export EXTDNS_ROOT_DOMAIN=example.com
// export EXTDNS_PROVIDER_TYPE=cloudflare
// export EXTDNS_PROVIDER_API_TOKEN=your_token
//
// extdnsd
// ```

use anyhow::{Context, Result};
use extdns_core::engine::EngineEvent;
use extdns_core::{
    EngineConfig, ExtDnsConfig, MetadataConfig, ProviderConfig, ReconcileConfig, ReconcileEngine,
    Registry,
};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ExtDnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<ExtDnsExitCode> for ExitCode {
    fn from(code: ExtDnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    environment_name: String,
    root_domain: String,
    ttl: u32,
    provider_type: String,
    provider_api_token: String,
    provider_zone_id: Option<String>,
    metadata_url: String,
    metadata_poll_interval: u64,
    interval_secs: u64,
    max_concurrency: usize,
    apply_timeout_secs: u64,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = EngineConfig::default();

        Ok(Self {
            environment_name: lookup("EXTDNS_ENVIRONMENT_NAME").unwrap_or_default(),
            root_domain: lookup("EXTDNS_ROOT_DOMAIN").unwrap_or_default(),
            ttl: parse_var(&lookup, "EXTDNS_TTL")?.unwrap_or(extdns_core::record::DEFAULT_TTL),
            provider_type: lookup("EXTDNS_PROVIDER_TYPE")
                .unwrap_or_else(|| "cloudflare".to_string()),
            provider_api_token: lookup("EXTDNS_PROVIDER_API_TOKEN").unwrap_or_default(),
            provider_zone_id: lookup("EXTDNS_PROVIDER_ZONE_ID").filter(|s| !s.is_empty()),
            metadata_url: lookup("EXTDNS_METADATA_URL")
                .unwrap_or_else(|| extdns_core::config::DEFAULT_METADATA_URL.to_string()),
            metadata_poll_interval: parse_var(&lookup, "EXTDNS_METADATA_POLL_INTERVAL")?
                .unwrap_or(5),
            interval_secs: parse_var(&lookup, "EXTDNS_INTERVAL_SECS")?
                .unwrap_or(defaults.interval_secs),
            max_concurrency: parse_var(&lookup, "EXTDNS_MAX_CONCURRENCY")?
                .unwrap_or(defaults.max_concurrency),
            apply_timeout_secs: parse_var(&lookup, "EXTDNS_APPLY_TIMEOUT_SECS")?
                .unwrap_or(defaults.apply_timeout_secs.unwrap_or(0)),
            log_level: lookup("EXTDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Checks required variables and value ranges; the assembled
    /// [`ExtDnsConfig`] is validated again by the engine.
    fn validate(&self) -> Result<()> {
        if self.environment_name.is_empty() {
            anyhow::bail!(
                "EXTDNS_ENVIRONMENT_NAME is required. \
                Set it via: export EXTDNS_ENVIRONMENT_NAME=prod"
            );
        }

        if self.root_domain.is_empty() {
            anyhow::bail!(
                "EXTDNS_ROOT_DOMAIN is required. \
                Set it via: export EXTDNS_ROOT_DOMAIN=example.com"
            );
        }

        validate_domain_name(&self.root_domain)?;

        match self.provider_type.as_str() {
            "cloudflare" => {
                if self.provider_api_token.is_empty() {
                    anyhow::bail!(
                        "EXTDNS_PROVIDER_API_TOKEN is required when EXTDNS_PROVIDER_TYPE=cloudflare. \
                        Set it via: export EXTDNS_PROVIDER_API_TOKEN=your_token"
                    );
                }

                // Check for obvious placeholder tokens (common mistake)
                let token_lower = self.provider_api_token.to_lowercase();
                if token_lower.contains("your_token")
                    || token_lower.contains("replace_me")
                    || token_lower == "token"
                {
                    anyhow::bail!(
                        "EXTDNS_PROVIDER_API_TOKEN appears to be a placeholder. \
                        Use an actual API token from your DNS provider."
                    );
                }
            }
            "memory" => {}
            _ => anyhow::bail!(
                "EXTDNS_PROVIDER_TYPE '{}' is not supported. \
                Supported providers: cloudflare, memory",
                self.provider_type
            ),
        }

        if !self.metadata_url.starts_with("https://") && !self.metadata_url.starts_with("http://") {
            anyhow::bail!(
                "EXTDNS_METADATA_URL must use HTTP or HTTPS scheme. Got: {}",
                self.metadata_url
            );
        }

        if !(1..=3600).contains(&self.metadata_poll_interval) {
            anyhow::bail!(
                "EXTDNS_METADATA_POLL_INTERVAL must be between 1 and 3600 seconds. Got: {}",
                self.metadata_poll_interval
            );
        }

        if !(1..=86400).contains(&self.interval_secs) {
            anyhow::bail!(
                "EXTDNS_INTERVAL_SECS must be between 1 and 86400 seconds. Got: {}",
                self.interval_secs
            );
        }

        if !(1..=100).contains(&self.max_concurrency) {
            anyhow::bail!(
                "EXTDNS_MAX_CONCURRENCY must be between 1 and 100. Got: {}",
                self.max_concurrency
            );
        }

        if self.ttl == 0 {
            anyhow::bail!("EXTDNS_TTL must be greater than 0");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "EXTDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Assemble the core configuration
    fn to_extdns_config(&self) -> ExtDnsConfig {
        let provider = match self.provider_type.as_str() {
            "memory" => ProviderConfig::Memory,
            _ => ProviderConfig::Cloudflare {
                api_token: self.provider_api_token.clone(),
                zone_id: self.provider_zone_id.clone(),
                zone_name: Some(self.root_domain.clone()),
            },
        };

        ExtDnsConfig {
            reconcile: ReconcileConfig::new(&self.environment_name, &self.root_domain)
                .with_ttl(self.ttl),
            provider,
            metadata: MetadataConfig::Rancher {
                url: self.metadata_url.clone(),
                poll_interval_secs: self.metadata_poll_interval,
            },
            engine: EngineConfig {
                interval_secs: self.interval_secs,
                max_concurrency: self.max_concurrency,
                apply_timeout_secs: (self.apply_timeout_secs > 0).then_some(self.apply_timeout_secs),
                ..EngineConfig::default()
            },
        }
    }
}

/// Parse an optional numeric environment variable
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("{} is not a valid number", key))
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; catches common errors, not every one.
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExtDnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ExtDnsExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ExtDnsExitCode::ConfigError.into();
    }

    info!("Starting extdnsd daemon");
    info!(
        "Managing *.{}.{} (provider: {})",
        config.environment_name, config.root_domain, config.provider_type
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ExtDnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => ExtDnsExitCode::CleanShutdown,
            Err(e) if e.downcast_ref::<extdns_core::Error>().is_some_and(is_startup_error) => {
                error!("Startup error: {:#}", e);
                ExtDnsExitCode::ConfigError
            }
            Err(e) => {
                error!("Daemon error: {:#}", e);
                ExtDnsExitCode::RuntimeError
            }
        }
    });

    result.into()
}

fn is_startup_error(e: &extdns_core::Error) -> bool {
    matches!(e, extdns_core::Error::Config(_))
}

/// Build a registry holding every compiled-in plugin
fn build_registry() -> Registry {
    let registry = Registry::with_builtins();

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare provider");
        extdns_provider_cloudflare::register(&registry);
    }

    #[cfg(feature = "rancher")]
    {
        info!("Registering Rancher metadata source");
        extdns_metadata_rancher::register(&registry);
    }

    registry
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let extdns_config = config.to_extdns_config();
    let registry = build_registry();

    let provider = registry.create_provider(&extdns_config.provider)?;
    let metadata = registry.create_metadata_source(&extdns_config.metadata)?;
    info!(
        "Provider: {}, metadata source: {}",
        provider.provider_name(),
        metadata.source_name()
    );

    let (engine, events) =
        ReconcileEngine::new(Arc::from(metadata), Arc::from(provider), extdns_config)?;

    let event_logger = tokio::spawn(log_events(events));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let signal_waiter = tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Shutdown signal error: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    let result = engine.run_with_shutdown(Some(shutdown_rx)).await;

    signal_waiter.abort();
    drop(engine);
    // The logger ends once the engine (and its sender) is gone
    let _ = event_logger.await;

    info!("Shutting down daemon");
    result.map_err(Into::into)
}

/// Log engine events until the engine goes away
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::PassSucceeded {
                added,
                removed,
                updated,
                unchanged,
            } => {
                if added + removed + updated > 0 {
                    info!(
                        "Pass applied: {} added, {} removed, {} updated, {} unchanged",
                        added, removed, updated, unchanged
                    );
                }
            }
            EngineEvent::PassFailed { error } => warn!("Pass failed: {}", error),
            EngineEvent::Stopped { reason } => info!("Engine stopped: {}", reason),
            other => tracing::debug!("Engine event: {:?}", other),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
