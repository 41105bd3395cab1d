//! Cache backends and the aggregate cache built on them.
//!
//! - [`MemoryCache`]: LRU key/value backend with per-namespace generations
//! - [`AggregateCache`]: single-flight, generation-checked read-through layer
//! - [`InvalidationCoordinator`]: turns committed writes into key invalidations

mod aggregate;
mod coordinator;
pub mod memory;

pub use aggregate::AggregateCache;
pub use coordinator::InvalidationCoordinator;
pub use memory::MemoryCache;
