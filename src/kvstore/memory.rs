use super::{KVStore, KvError};
use async_trait::async_trait;
use moka::Expiry;
use moka::sync::Cache;
use std::collections::HashSet;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};
use std::time::{Duration, Instant};

#[derive(Clone)]
enum Slot {
    Counter(Arc<AtomicU64>),
    Set(Arc<Mutex<HashSet<String>>>),
    Value(String),
}

#[derive(Clone)]
struct Stored {
    slot: Slot,
    ttl: Duration,
}

/// Reads the per-entry TTL stashed alongside each value. Unlike a cache built with a
/// fixed `time_to_live`, this lets one cache instance serve counters (short TTL),
/// revocation sets (TTL up to the refresh-token lifetime), and plain get/set values
/// (caller-chosen TTL) without three differently-tuned caches.
struct PerEntryExpiry;

impl Expiry<String, Stored> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Stored,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Stored,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process `KVStore` backed by `moka::sync::Cache`. Correct for a single-node
/// deployment and for tests; a distributed deployment swaps this for a real Redis-like
/// implementation behind the same trait.
pub struct MemoryKvStore {
    cache: Cache<String, Stored>,
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl MemoryKvStore {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryExpiry)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl KVStore for MemoryKvStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, KvError> {
        let stored = self
            .cache
            .entry_by_ref(key)
            .or_insert_with(|| Stored {
                slot: Slot::Counter(Arc::new(AtomicU64::new(0))),
                ttl,
            })
            .into_value();
        let Slot::Counter(counter) = &stored.slot else {
            return Err(KvError::Unavailable(format!(
                "key {key} already holds a non-counter value"
            )));
        };
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn set_add_with_ttl(&self, key: &str, member: &str, ttl: Duration) -> Result<(), KvError> {
        let stored = self
            .cache
            .entry_by_ref(key)
            .or_insert_with(|| Stored {
                slot: Slot::Set(Arc::new(Mutex::new(HashSet::new()))),
                ttl,
            })
            .into_value();
        let Slot::Set(set) = &stored.slot else {
            return Err(KvError::Unavailable(format!(
                "key {key} already holds a non-set value"
            )));
        };
        set.lock()
            .map_err(|_| KvError::Unavailable("set mutex poisoned".to_string()))?
            .insert(member.to_string());
        // Refresh this entry's TTL so a freshly-added member doesn't inherit a
        // soon-to-expire window from whenever the set was first created.
        self.cache.insert(
            key.to_string(),
            Stored {
                slot: Slot::Set(set.clone()),
                ttl,
            },
        );
        Ok(())
    }

    async fn is_member(&self, key: &str, member: &str) -> Result<bool, KvError> {
        match self.cache.get(key) {
            Some(Stored {
                slot: Slot::Set(set),
                ..
            }) => Ok(set
                .lock()
                .map_err(|_| KvError::Unavailable("set mutex poisoned".to_string()))?
                .contains(member)),
            Some(_) => Err(KvError::Unavailable(format!(
                "key {key} already holds a non-set value"
            ))),
            None => Ok(false),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError> {
        self.cache.insert(
            key.to_string(),
            Stored {
                slot: Slot::Value(value),
                ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        match self.cache.get(key) {
            Some(Stored {
                slot: Slot::Value(v),
                ..
            }) => Ok(Some(v)),
            Some(_) => Err(KvError::Unavailable(format!(
                "key {key} does not hold a plain value"
            ))),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.cache.invalidate(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_with_ttl_counts_up() {
        let kv = MemoryKvStore::default();
        assert_eq!(kv.incr_with_ttl("a", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(kv.incr_with_ttl("a", Duration::from_secs(60)).await.unwrap(), 2);
        assert_eq!(kv.incr_with_ttl("a", Duration::from_secs(60)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn set_membership_round_trips() {
        let kv = MemoryKvStore::default();
        assert!(!kv.is_member("revoked", "jti-1").await.unwrap());
        kv.set_add_with_ttl("revoked", "jti-1", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(kv.is_member("revoked", "jti-1").await.unwrap());
        assert!(!kv.is_member("revoked", "jti-2").await.unwrap());
    }

    #[tokio::test]
    async fn get_set_round_trips() {
        let kv = MemoryKvStore::default();
        assert_eq!(kv.get("k").await.unwrap(), None);
        kv.set_with_ttl("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some("v".to_string()));
    }
}
