use crate::modules::cache::domain::CacheBackend;
use crate::shared::errors::AppResult;
use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cached entry with TTL support
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
    size: usize,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    used_bytes: usize,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.used_bytes -= entry.size;
        Some(entry)
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryCacheStats {
    pub entries: usize,
    pub used_bytes: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_cleanups: u64,
}

impl MemoryCacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

/// Process-local fallback tier.
///
/// Bounded by a total byte budget (key + value lengths); inserts that would
/// exceed it evict least-recently-used entries first. Expired entries are
/// dropped lazily on read and by a periodic sweep.
pub struct MemoryCache {
    inner: Mutex<Inner>,
    max_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    cleanups: AtomicU64,
}

impl MemoryCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                used_bytes: 0,
            }),
            max_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            cleanups: AtomicU64::new(0),
        }
    }

    pub async fn get_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        let expired = match inner.entries.peek(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            inner.remove(key);
            self.cleanups.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Removed expired fallback entry for key: {}", key);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        // `get` promotes the entry to most recently used
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    pub async fn set_value(&self, key: &str, value: String, ttl: Duration) {
        let size = key.len() + value.len();
        let mut inner = self.inner.lock().await;

        inner.remove(key);

        if size > self.max_bytes {
            debug!(
                "Skipping fallback insert for key {}: {} bytes exceeds budget of {}",
                key, size, self.max_bytes
            );
            return;
        }

        while inner.used_bytes + size > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((evicted_key, entry)) => {
                    inner.used_bytes -= entry.size;
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!("Evicted least recently used key: {}", evicted_key);
                }
                None => break,
            }
        }

        inner.used_bytes += size;
        inner.entries.put(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
                size,
            },
        );
    }

    pub async fn remove(&self, key: &str) {
        self.inner.lock().await.remove(key);
    }

    /// Drop every expired entry; returns how many were removed
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        let expired_keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            inner.remove(key);
        }

        if !expired_keys.is_empty() {
            self.cleanups
                .fetch_add(expired_keys.len() as u64, Ordering::Relaxed);
            debug!("Cleaned up {} expired fallback entries", expired_keys.len());
        }
        expired_keys.len()
    }

    /// Start the periodic sweep; it stops when `shutdown` is cancelled
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        cache.sweep_expired().await;
                    }
                    _ = shutdown.cancelled() => {
                        debug!("Fallback cache sweeper stopped");
                        break;
                    }
                }
            }
        })
    }

    pub async fn stats(&self) -> MemoryCacheStats {
        let inner = self.inner.lock().await;
        MemoryCacheStats {
            entries: inner.entries.len(),
            used_bytes: inner.used_bytes,
            max_bytes: self.max_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_cleanups: self.cleanups.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.get_value(key).await)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()> {
        self.set_value(key, value, ttl).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.remove(key).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
