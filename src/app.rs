/// Application context
///
/// Owns every long-lived component and exposes the operations the web layer
/// calls. Construct it, call `start`, and `stop` it on shutdown.
use crate::modules::cache::{CacheBackend, CacheHealth, CacheManager, MemoryCache, RedisCache};
use crate::modules::cache::PrimaryTierStatus;
use crate::modules::dashboard::DashboardService;
use crate::modules::extraction::{
    ExtractionTask, FrameMetadata, FrameSourceProvider, FrameStorage, FsFrameStorage,
};
use crate::modules::jobs::{
    CancelAck, InMemoryMetadataStore, JobRegistry, JobSnapshot, JobWorker, MetadataStore,
    PoolStatistics, Scheduler,
};
use crate::shared::utils::init_logger;
use crate::shared::{AppConfig, AppResult};
use crate::{log_error, log_info};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Overall health as reported by `FrameJobsApp::health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    /// "healthy" or "degraded"
    pub status: String,
    pub cache: CacheHealth,
    pub pool: PoolStatistics,
}

pub struct FrameJobsApp {
    config: AppConfig,
    registry: Arc<JobRegistry>,
    scheduler: Scheduler,
    dashboard: DashboardService,
    cache: Arc<CacheManager>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FrameJobsApp {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn MetadataStore>,
        provider: Arc<dyn FrameSourceProvider>,
        storage: Arc<dyn FrameStorage>,
    ) -> AppResult<Self> {
        let primary: Option<Arc<dyn CacheBackend>> = match &config.redis_url {
            Some(url) => Some(Arc::new(RedisCache::new(url, config.cache_op_timeout)?)),
            None => None,
        };
        let cache = Arc::new(CacheManager::new(
            primary,
            Arc::new(MemoryCache::new(config.max_cache_bytes())),
            config.cache_ttl,
            config.cache_retry_cooldown,
        ));

        Ok(Self::with_cache(config, store, provider, storage, cache))
    }

    /// Wire the application around an already built cache manager
    pub fn with_cache(
        config: AppConfig,
        store: Arc<dyn MetadataStore>,
        provider: Arc<dyn FrameSourceProvider>,
        storage: Arc<dyn FrameStorage>,
        cache: Arc<CacheManager>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new(Arc::clone(&store), Arc::clone(&cache)));
        let task = Arc::new(ExtractionTask::new(Arc::clone(&registry), provider, storage));
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            JobWorker::new(Arc::clone(&registry), task),
            config.max_concurrent_jobs,
            config.admission_policy,
        );
        let dashboard = DashboardService::new(store, Arc::clone(&cache), config.recent_frames_ttl);

        Self {
            config,
            registry,
            scheduler,
            dashboard,
            cache,
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
        }
    }

    /// In-memory metadata store and filesystem frame storage under
    /// `FRAMES_BASE_PATH`
    pub fn from_config(
        config: AppConfig,
        provider: Arc<dyn FrameSourceProvider>,
    ) -> AppResult<Self> {
        let storage = Arc::new(FsFrameStorage::new(config.frames_base_path.clone()));
        Self::new(
            config,
            Arc::new(InMemoryMetadataStore::new()),
            provider,
            storage,
        )
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn start(&self) {
        init_logger();
        self.scheduler.start();

        let handle = self
            .cache
            .spawn_sweeper(self.config.cache_sweep_interval, self.shutdown.child_token());
        *self.sweeper.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        log_info!("Frame jobs service started");
    }

    /// Drain running jobs and stop background tasks
    pub async fn stop(&self) {
        self.scheduler.stop().await;
        self.shutdown.cancel();

        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log_error!("Cache sweeper ended abnormally: {}", e);
            }
        }

        log_info!("Frame jobs service stopped");
    }

    pub async fn submit_job(&self, source: &str, interval_seconds: f64) -> AppResult<Uuid> {
        self.scheduler.submit(source, interval_seconds).await
    }

    pub async fn get_status(&self, job_id: Uuid) -> AppResult<JobSnapshot> {
        self.dashboard.get_status(job_id).await
    }

    pub async fn cancel_job(&self, job_id: Uuid) -> AppResult<CancelAck> {
        self.registry.request_cancel(job_id).await
    }

    pub async fn list_recent_frames(
        &self,
        since_minutes: u32,
        job_id: Option<Uuid>,
    ) -> AppResult<Vec<FrameMetadata>> {
        self.dashboard.list_recent_frames(since_minutes, job_id).await
    }

    pub async fn list_frames(&self, job_id: Uuid) -> AppResult<Vec<FrameMetadata>> {
        self.dashboard.list_frames(job_id).await
    }

    pub async fn health(&self) -> SystemHealth {
        let cache = self.cache.health().await;
        let pool = self.scheduler.statistics();

        let degraded = cache.primary == PrimaryTierStatus::Degraded || !pool.accepting;
        SystemHealth {
            status: if degraded { "degraded" } else { "healthy" }.to_string(),
            cache,
            pool,
        }
    }
}
