//! Cache-invalidating store decorators.
//!
//! These decorators are the write path of the application. Each mutating
//! call is forwarded to the wrapped store and, only once it has committed,
//! handed to the [`InvalidationCoordinator`](crate::cache::InvalidationCoordinator)
//! so every aggregate derived from the write is dropped before the call
//! returns. Reads pass straight through.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let cache = AggregateCache::new(Arc::new(MemoryCache::new(10_000)), Duration::from_secs(3600));
//! let coordinator = InvalidationCoordinator::new(cache);
//!
//! let entities = CachedEntityStore::new(store.clone(), coordinator.clone());
//! let accounts = CachedAccountRepository::new(store, coordinator);
//! ```

mod account;
mod entity;

pub use account::CachedAccountRepository;
pub use entity::CachedEntityStore;
