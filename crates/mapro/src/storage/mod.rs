//! Storage backend implementations.
//!
//! This module provides concrete implementations of the store traits
//! defined in `mapro_core::storage`, plus the decorators that keep the
//! aggregate cache consistent with them.
//!
//! # Feature Flags
//!
//! - `sqlite`: SQLite storage backend using `rusqlite` and `tokio-rusqlite`
//!
//! The in-memory backend is always compiled.
//!
//! # Examples
//!
//! Build with SQLite:
//! ```bash
//! cargo build -p mapro --features sqlite
//! ```

pub mod cached;
pub mod inmemory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use cached::{CachedAccountRepository, CachedEntityStore};
pub use inmemory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
