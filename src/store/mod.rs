//! Shared store abstraction
//!
//! The store is the single source of truth for cached values and in-flight
//! claims. Every coordinator, in this process or another one, goes through
//! the same two atomic primitives: `set_if_absent` and `try_claim`.

use crate::common::Result;
use async_trait::async_trait;
use std::time::Duration;

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Key-value store with expiring entries and per-key exclusive claims.
///
/// "Not found" and "already claimed" are ordinary answers (`None`, `false`),
/// never errors. An `Err` always means the store itself failed.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Current value for `key`, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` with the given TTL unless `key` already holds a value.
    /// Returns `true` if this call wrote it.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Atomically claim `key`. Returns `true` iff the caller is now the only claimant.
    async fn try_claim(&self, key: &str) -> Result<bool>;

    /// Drop the claim on `key`. Releasing an unclaimed key is a no-op.
    async fn release(&self, key: &str) -> Result<()>;
}
