//! Application services built on the cached stores.

mod registry;

pub use registry::RegistryCache;
