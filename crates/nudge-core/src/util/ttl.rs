//! TTL-backed key/value map.
//!
//! Entries expire after a fixed time-to-live and are removed lazily on
//! access plus eagerly by `sweep`. Scoped to the service instance that owns
//! it; nothing here is process-global. The engine uses one as a per-user
//! claim map so overlapping ticks skip users already mid-cycle.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Async-guarded map with per-entry expiry.
pub struct TtlMap<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlMap<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Insert or refresh a key.
    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Get a live value.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert only if the key is absent or expired. Returns whether the
    /// claim succeeded.
    pub async fn try_claim(&self, key: K, value: V) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if let Some(entry) = entries.get(&key) {
            if entry.expires_at > now {
                return false;
            }
        }
        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
        true
    }

    /// Remove a key regardless of expiry.
    pub async fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().await.remove(key).map(|e| e.value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Live entry count (expired entries excluded).
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let map: TtlMap<String, u32> = TtlMap::new(Duration::from_secs(60));
        map.insert("a".to_string(), 1).await;
        assert_eq!(map.get(&"a".to_string()).await, Some(1));
        assert_eq!(map.get(&"b".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_expiry() {
        let map: TtlMap<String, u32> = TtlMap::new(Duration::from_millis(10));
        map.insert("a".to_string(), 1).await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(map.get(&"a".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_try_claim_blocks_second_claim() {
        let map: TtlMap<String, ()> = TtlMap::new(Duration::from_secs(60));
        assert!(map.try_claim("user-1".to_string(), ()).await);
        assert!(!map.try_claim("user-1".to_string(), ()).await);

        map.remove(&"user-1".to_string()).await;
        assert!(map.try_claim("user-1".to_string(), ()).await);
    }

    #[tokio::test]
    async fn test_claim_succeeds_after_expiry() {
        let map: TtlMap<String, ()> = TtlMap::new(Duration::from_millis(10));
        assert!(map.try_claim("user-1".to_string(), ()).await);
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(map.try_claim("user-1".to_string(), ()).await);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired() {
        let map: TtlMap<String, u32> = TtlMap::new(Duration::from_millis(10));
        map.insert("a".to_string(), 1).await;
        map.insert("b".to_string(), 2).await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(map.sweep().await, 2);
        assert!(map.is_empty().await);
    }
}
