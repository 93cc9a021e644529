//! `KVStore` abstraction (§4.8): the one storage primitive every other component is
//! built on top of — atomic increment-with-TTL, set-add-with-TTL, get/set-with-TTL,
//! set-membership. A real deployment backs this with Redis or similar; this crate
//! ships an in-process implementation (`memory::MemoryKvStore`) so the gateway runs
//! standalone, moka-backed the same way a revocation cache would be in production.

mod memory;

pub use memory::MemoryKvStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait KVStore: Send + Sync {
    /// Atomically increments the counter at `key` and returns the new value. If the key
    /// doesn't exist yet, it is created with value 1 and the given TTL.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, KvError>;

    /// Adds `member` to the set at `key`, (re)setting the set's TTL.
    async fn set_add_with_ttl(&self, key: &str, member: &str, ttl: Duration) -> Result<(), KvError>;

    /// Checks whether `member` is present in the set at `key`.
    async fn is_member(&self, key: &str, member: &str) -> Result<bool, KvError>;

    /// Stores `value` at `key` with the given TTL, replacing any prior value.
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError>;

    /// Reads the value at `key`, if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Deletes `key` outright (used by cancellation flags and job cleanup).
    async fn delete(&self, key: &str) -> Result<(), KvError>;
}
