//! In-memory storage backend.
//!
//! Stores every record in HashMaps behind `Arc<RwLock<_>>`. Used by tests
//! and by the binary when the `sqlite` feature is off.
//!
//! # Example
//!
//! ```rust,ignore
//! use mapro::storage::inmemory::InMemoryStore;
//!
//! let store = InMemoryStore::new();
//! ```

mod repository;

pub use repository::InMemoryStore;
