//! SQLite storage backend implementation.
//!
//! Uses `rusqlite` for synchronous operations and `tokio-rusqlite` for async
//! wrapping. Every record kind shares one `records` table keyed by
//! `(kind, id)`; the full record is kept as JSON next to the columns that
//! filters and ordering need.

mod conversions;
mod error;
mod repository;
mod schema;

pub use repository::SqliteStore;
