//! Core traits for the extdns system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`MetadataSource`]: Discover running service instances and resolve their hosts
//! - [`DnsProvider`]: List and mutate records at a DNS provider

pub mod metadata_source;
pub mod dns_provider;

pub use metadata_source::{MetadataChange, MetadataSource, MetadataSourceFactory};
pub use dns_provider::{DnsProvider, DnsProviderFactory};
