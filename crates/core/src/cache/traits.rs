use std::time::Duration;

use async_trait::async_trait;

use super::Result;

/// Snapshot of a namespace's invalidation counter.
///
/// Every invalidation touching a namespace increments its counter. A
/// computation captures the counter before reading the store and may only
/// populate the cache if the counter is unchanged when it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(pub u64);

/// Result of a generation-checked populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateOutcome {
    /// The value was written.
    Stored,
    /// An invalidation raced the computation; the value was dropped.
    StaleDiscarded,
}

/// Key/value cache backend with per-namespace generations.
///
/// The namespace of a key is the segment before its first `:`.
/// Implementations must make `set_if_generation` atomic with respect to
/// `delete`, `delete_pattern` and `clear`.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Gets an unexpired value by key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Sets a value unconditionally with an optional TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// Returns the current generation of the key's namespace.
    async fn generation(&self, key: &str) -> Result<Generation>;

    /// Sets a value only if the key's namespace is still at `generation`.
    async fn set_if_generation(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
        generation: Generation,
    ) -> Result<PopulateOutcome>;

    /// Deletes a key and bumps its namespace generation. No-op if absent.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Deletes all keys matching a glob pattern and bumps every namespace
    /// the pattern can touch.
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Deletes every key and bumps every namespace.
    async fn clear(&self) -> Result<()>;
}
