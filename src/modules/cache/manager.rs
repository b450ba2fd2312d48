use crate::modules::cache::domain::{keys, CacheBackend};
use crate::modules::cache::infrastructure::{MemoryCache, MemoryCacheStats};
use crate::shared::errors::{AppError, AppResult};
use dashmap::DashSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Invalidation counters are shared by keys hashing to the same stripe
const EPOCH_STRIPES: usize = 256;

#[derive(Debug, Clone)]
enum PrimaryState {
    Healthy,
    Degraded { retry_at: Instant, reason: String },
}

/// Health of the primary tier as reported to monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryTierStatus {
    Disabled,
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHealth {
    pub primary: PrimaryTierStatus,
    pub primary_errors: u64,
    pub pending_deletes: usize,
    pub fallback: MemoryCacheStats,
}

/// Tiered read-through cache.
///
/// Reads and writes go to the primary tier while it answers. The first
/// failure flips it to degraded: the degradation is logged once, traffic moves
/// to the fallback tier, and the primary is probed again only after the
/// cooldown. Cache failures are never returned to callers.
///
/// Invalidation deletes from both tiers. A delete that cannot reach the
/// primary is queued and replayed before the primary serves anything again.
pub struct CacheManager {
    primary: Option<Arc<dyn CacheBackend>>,
    fallback: Arc<MemoryCache>,
    default_ttl: Duration,
    cooldown: Duration,
    state: Mutex<PrimaryState>,
    pending_deletes: Mutex<HashSet<String>>,
    /// Bumped on every invalidation of a key's stripe; guards read-through
    /// repopulation
    epochs: [AtomicU64; EPOCH_STRIPES],
    /// Windowed aggregate keys currently cached
    derived_keys: DashSet<String>,
    primary_errors: AtomicU64,
}

impl CacheManager {
    pub fn new(
        primary: Option<Arc<dyn CacheBackend>>,
        fallback: Arc<MemoryCache>,
        default_ttl: Duration,
        cooldown: Duration,
    ) -> Self {
        match &primary {
            Some(backend) => info!("Cache manager using {} primary tier", backend.name()),
            None => info!("No primary cache tier configured, using local cache only"),
        }

        Self {
            primary,
            fallback,
            default_ttl,
            cooldown,
            state: Mutex::new(PrimaryState::Healthy),
            pending_deletes: Mutex::new(HashSet::new()),
            epochs: std::array::from_fn(|_| AtomicU64::new(0)),
            derived_keys: DashSet::new(),
            primary_errors: AtomicU64::new(0),
        }
    }

    /// Local-only cache manager
    pub fn local(max_bytes: usize, default_ttl: Duration) -> Self {
        Self::new(
            None,
            Arc::new(MemoryCache::new(max_bytes)),
            default_ttl,
            Duration::from_secs(30),
        )
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn fallback(&self) -> &Arc<MemoryCache> {
        &self.fallback
    }

    /// Start the fallback tier's periodic expiry sweep
    pub fn spawn_sweeper(&self, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        self.fallback.spawn_sweeper(every, shutdown)
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(primary) = self.usable_primary().await {
            match primary.get(key).await {
                Ok(value) => {
                    self.mark_primary_healthy();
                    return value;
                }
                Err(e) => self.mark_primary_degraded(primary.name(), &e),
            }
        }
        self.fallback.get_value(key).await
    }

    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        if let Some(primary) = self.usable_primary().await {
            match primary.set(key, value.clone(), ttl).await {
                Ok(()) => {
                    self.mark_primary_healthy();
                    return;
                }
                Err(e) => self.mark_primary_degraded(primary.name(), &e),
            }
        }
        self.fallback.set_value(key, value, ttl).await;
    }

    /// Delete `key` from both tiers and invalidate in-flight read-throughs
    pub async fn delete(&self, key: &str) {
        self.epoch_counter(key).fetch_add(1, Ordering::SeqCst);
        self.fallback.remove(key).await;

        let Some(primary) = self.primary.as_ref() else {
            return;
        };

        match self.usable_primary().await {
            Some(primary) => {
                if let Err(e) = primary.delete(key).await {
                    self.mark_primary_degraded(primary.name(), &e);
                    self.queue_delete(key);
                } else {
                    self.mark_primary_healthy();
                }
            }
            None => {
                debug!(
                    "Primary tier {} unavailable, deferring delete of {}",
                    primary.name(),
                    key
                );
                self.queue_delete(key);
            }
        }
    }

    /// Typed read-through: serve `key` from cache or compute it with `loader`
    /// and cache the result. Loader errors are returned and nothing is cached.
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if let Some(raw) = self.get(key).await {
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!("Cache hit for key: {}", key);
                    return Ok(value);
                }
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    self.delete(key).await;
                }
            }
        }

        debug!("Cache miss for key: {}", key);
        let epoch = self.epoch(key);
        let value = loader().await?;

        // An invalidation while loading means `value` may predate the change
        if self.epoch(key) != epoch {
            debug!("Skipping repopulation of {} invalidated during load", key);
            return Ok(value);
        }

        match serde_json::to_string(&value) {
            Ok(json) => self.set(key, json, ttl).await,
            Err(e) => {
                warn!("Not caching {}: {}", key, AppError::from(e));
                return Ok(value);
            }
        }

        // A delete that ran while the write was in flight may have landed
        // before it; take the entry out again
        if self.epoch(key) != epoch {
            debug!("Key {} invalidated during repopulation, removing", key);
            self.delete(key).await;
        }

        Ok(value)
    }

    /// Remember a windowed aggregate key so frame mutations can invalidate it
    pub fn track_derived(&self, key: &str) {
        self.derived_keys.insert(key.to_string());
    }

    /// Delete every tracked windowed aggregate
    pub async fn invalidate_derived(&self) {
        let tracked: Vec<String> = self.derived_keys.iter().map(|k| k.key().clone()).collect();
        for key in tracked {
            self.derived_keys.remove(&key);
            self.delete(&key).await;
        }
    }

    /// Invalidate everything derived from a job's record
    pub async fn invalidate_job(&self, job_id: Uuid) {
        self.delete(&keys::job_status_key(job_id)).await;
    }

    /// Invalidate everything derived from a job's frames
    pub async fn invalidate_job_frames(&self, job_id: Uuid) {
        self.delete(&keys::job_frames_key(job_id)).await;
        self.invalidate_derived().await;
    }

    pub async fn health(&self) -> CacheHealth {
        let primary = match (&self.primary, &*self.state()) {
            (None, _) => PrimaryTierStatus::Disabled,
            (Some(_), PrimaryState::Healthy) => PrimaryTierStatus::Healthy,
            (Some(_), PrimaryState::Degraded { .. }) => PrimaryTierStatus::Degraded,
        };

        let pending_deletes = self.pending().len();

        CacheHealth {
            primary,
            primary_errors: self.primary_errors.load(Ordering::Relaxed),
            pending_deletes,
            fallback: self.fallback.stats().await,
        }
    }

    fn epoch_counter(&self, key: &str) -> &AtomicU64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.epochs[(hasher.finish() % EPOCH_STRIPES as u64) as usize]
    }

    fn epoch(&self, key: &str) -> u64 {
        self.epoch_counter(key).load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, PrimaryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<String>> {
        self.pending_deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn queue_delete(&self, key: &str) {
        self.pending().insert(key.to_string());
    }

    /// The primary tier if it may be used right now. While degraded, one
    /// caller per cooldown window gets to probe it. Deferred deletes are
    /// replayed before the primary is handed out.
    async fn usable_primary(&self) -> Option<&Arc<dyn CacheBackend>> {
        let primary = self.primary.as_ref()?;

        {
            let mut state = self.state();
            if let PrimaryState::Degraded { retry_at, .. } = &mut *state {
                let now = Instant::now();
                if now < *retry_at {
                    return None;
                }
                *retry_at = now + self.cooldown;
                debug!("Probing primary cache tier {}", primary.name());
            }
        }

        if self.replay_pending_deletes(primary).await {
            Some(primary)
        } else {
            None
        }
    }

    async fn replay_pending_deletes(&self, primary: &Arc<dyn CacheBackend>) -> bool {
        let queued: Vec<String> = self.pending().iter().cloned().collect();
        if queued.is_empty() {
            return true;
        }

        for key in queued {
            if let Err(e) = primary.delete(&key).await {
                self.mark_primary_degraded(primary.name(), &e);
                return false;
            }
            self.pending().remove(&key);
        }
        debug!("Replayed deferred deletes against {}", primary.name());
        true
    }

    fn mark_primary_healthy(&self) {
        let mut state = self.state();
        if let PrimaryState::Degraded { reason, .. } = &*state {
            info!("Primary cache tier recovered (was: {})", reason);
            *state = PrimaryState::Healthy;
        }
    }

    fn mark_primary_degraded(&self, name: &str, error: &AppError) {
        self.primary_errors.fetch_add(1, Ordering::Relaxed);
        let retry_at = Instant::now() + self.cooldown;

        let mut state = self.state();
        match &mut *state {
            PrimaryState::Healthy => {
                warn!(
                    "Primary cache tier {} unavailable, serving from local fallback for {:?}: {}",
                    name, self.cooldown, error
                );
                *state = PrimaryState::Degraded {
                    retry_at,
                    reason: error.to_string(),
                };
            }
            PrimaryState::Degraded {
                retry_at: next,
                reason,
            } => {
                debug!("Primary cache tier {} still unavailable: {}", name, error);
                *next = retry_at;
                *reason = error.to_string();
            }
        }
    }
}
