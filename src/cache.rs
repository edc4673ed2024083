use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::AppError;

/// Entry stored in the in-process map with an expiry timestamp.
#[derive(Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    Memory(Arc<DashMap<String, MemoryEntry>>),
}

/// TTL'd string cache holding session fingerprints under `{kind}:{subject}`
/// keys. The cache is the source of truth for revocation: a deleted or
/// expired entry means the matching token is dead no matter what its
/// signature says.
///
/// Redis backs production. The in-process backend exists for tests and for
/// running without infrastructure; entries are checked on read and evicted
/// lazily, so expired values never escape.
#[derive(Clone)]
pub struct CredentialCache {
    backend: Backend,
}

impl CredentialCache {
    pub fn redis(conn: ConnectionManager) -> Self {
        Self {
            backend: Backend::Redis(conn),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(DashMap::new())),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let value: Option<String> = conn.get(key).await?;
                Ok(value)
            }
            Backend::Memory(map) => {
                if let Some(entry) = map.get(key) {
                    if Instant::now() < entry.expires_at {
                        return Ok(Some(entry.value.clone()));
                    }
                    // expired — drop the ref before removing
                    drop(entry);
                    map.remove(key);
                }
                Ok(None)
            }
        }
    }

    /// Stores `value` under `key` for `ttl_ms` milliseconds, replacing any
    /// previous value and its remaining TTL.
    pub async fn set(&self, key: &str, value: &str, ttl_ms: u64) -> Result<(), AppError> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(ttl_ms)
                    .query_async::<_, ()>(&mut conn)
                    .await?;
                Ok(())
            }
            Backend::Memory(map) => {
                map.insert(
                    key.to_string(),
                    MemoryEntry {
                        value: value.to_string(),
                        expires_at: Instant::now() + Duration::from_millis(ttl_ms),
                    },
                );
                Ok(())
            }
        }
    }

    /// Deleting an absent key is not an error.
    pub async fn del(&self, key: &str) -> Result<(), AppError> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                conn.del::<_, ()>(key).await?;
                Ok(())
            }
            Backend::Memory(map) => {
                map.remove(key);
                Ok(())
            }
        }
    }

    /// Remove all expired in-process entries. No-op on the Redis backend,
    /// which expires keys itself.
    pub fn evict_expired(&self) -> usize {
        match &self.backend {
            Backend::Redis(_) => 0,
            Backend::Memory(map) => {
                let now = Instant::now();
                let before = map.len();
                map.retain(|_, entry| entry.expires_at > now);
                before - map.len()
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = CredentialCache::in_memory();
        assert_ok!(cache.set("access:abc", "token-1", 60_000).await);
        let got = cache.get("access:abc").await.unwrap();
        assert_eq!(got.as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let cache = CredentialCache::in_memory();
        assert_eq!(cache.get("access:nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites_previous_value() {
        let cache = CredentialCache::in_memory();
        cache.set("refresh:u1", "old", 60_000).await.unwrap();
        cache.set("refresh:u1", "new", 60_000).await.unwrap();
        assert_eq!(cache.get("refresh:u1").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let cache = CredentialCache::in_memory();
        cache.set("access:u1", "tok", 20).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("access:u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_del_removes_and_is_idempotent() {
        let cache = CredentialCache::in_memory();
        cache.set("access:u1", "tok", 60_000).await.unwrap();
        assert_ok!(cache.del("access:u1").await);
        assert_eq!(cache.get("access:u1").await.unwrap(), None);
        // second delete of the same key succeeds
        assert_ok!(cache.del("access:u1").await);
    }

    #[tokio::test]
    async fn test_evict_expired_sweeps_only_dead_entries() {
        let cache = CredentialCache::in_memory();
        cache.set("a", "1", 10).await.unwrap();
        cache.set("b", "2", 60_000).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.get("b").await.unwrap().as_deref(), Some("2"));
    }
}
