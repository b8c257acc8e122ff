//! Built-in DNS provider implementations
//!
//! - [`MemoryProvider`]: In-memory provider (dry runs and testing)

pub mod memory;

pub use memory::{MemoryProvider, MemoryProviderFactory};
