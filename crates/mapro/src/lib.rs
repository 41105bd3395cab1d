//! Cache-consistent registry services for the MaPro municipal records system.
//!
//! The crate wires the pure contracts of `mapro_core` to concrete backends:
//!
//! - [`storage`]: entity stores and their cache-invalidating decorators
//! - [`cache`]: the LRU backend, the aggregate cache and the coordinator
//! - [`services`]: the [`RegistryCache`](services::RegistryCache) read facade
//! - [`state`]: application wiring

pub mod cache;
pub mod config;
pub mod mock_data;
pub mod services;
pub mod state;
pub mod storage;
