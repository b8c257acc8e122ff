//! Error types for the extdns system
//!
//! This module defines all error types used throughout the crate.
//! Per-record failures of a phase are aggregated into
//! [`ApplyError`](crate::reconcile::ApplyError) and surface here as
//! [`Error::Phase`].

use crate::reconcile::ApplyError;
use crate::record::Operation;
use thiserror::Error;

/// Result type alias for extdns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the extdns system
#[derive(Error, Debug)]
pub enum Error {
    /// Metadata source could not be read
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// A single host could not be resolved to an IP address
    #[error("Failed to resolve host {host}: {message}")]
    HostResolution {
        /// Host identifier that failed to resolve
        host: String,
        /// Error message
        message: String,
    },

    /// DNS provider-related errors
    #[error("DNS provider error: {0}")]
    DnsProvider(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors (from provider or metadata APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A provider call did not finish before the phase deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Desired state could not be built; the pass is aborted
    #[error("Error reading external dns entries: {0}")]
    DesiredState(#[source] Box<Error>),

    /// Current provider state could not be read; the pass is aborted
    #[error("Provider error reading dns entries: {0}")]
    CurrentState(#[source] Box<Error>),

    /// One apply phase had failing records; later phases were not run
    #[error("Failed to {phase} records: {source}")]
    Phase {
        /// Phase that failed
        phase: Operation,
        /// Every failed record of the phase
        #[source]
        source: ApplyError,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a metadata error
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Create a host resolution error
    pub fn host_resolution(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HostResolution {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a DNS provider error
    pub fn dns_provider(msg: impl Into<String>) -> Self {
        Self::DnsProvider(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborted a pass before any provider mutation
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Self::DesiredState(_) | Self::CurrentState(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
