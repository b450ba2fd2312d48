/// Test helper functions and app builders
use super::factories::SyntheticProvider;
use frame_jobs_lib::modules::cache::CacheManager;
use frame_jobs_lib::modules::extraction::FsFrameStorage;
use frame_jobs_lib::modules::jobs::InMemoryMetadataStore;
use frame_jobs_lib::{AppConfig, FrameJobsApp, JobSnapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct TestApp {
    pub app: FrameJobsApp,
    pub store: Arc<InMemoryMetadataStore>,
    pub provider: Arc<SyntheticProvider>,
    pub frames_dir: PathBuf,
}

impl TestApp {
    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.frames_dir.join(job_id.to_string())
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.frames_dir);
    }
}

/// Config with a private frames directory and no Redis
pub fn test_config(max_concurrent_jobs: usize) -> AppConfig {
    AppConfig {
        max_concurrent_jobs,
        frames_base_path: std::env::temp_dir().join(format!("frame-jobs-test-{}", Uuid::new_v4())),
        ..AppConfig::default()
    }
}

/// Build an app around the given config; the caller starts it
pub fn build_test_app(config: AppConfig) -> TestApp {
    let cache = Arc::new(CacheManager::local(config.max_cache_bytes(), config.cache_ttl));
    build_test_app_with_cache(config, cache)
}

pub fn build_test_app_with_cache(config: AppConfig, cache: Arc<CacheManager>) -> TestApp {
    let store = Arc::new(InMemoryMetadataStore::new());
    let provider = Arc::new(SyntheticProvider::new());
    let frames_dir = config.frames_base_path.clone();
    let storage = Arc::new(FsFrameStorage::new(frames_dir.clone()));

    let app = FrameJobsApp::with_cache(config, store.clone(), provider.clone(), storage, cache);

    TestApp {
        app,
        store,
        provider,
        frames_dir,
    }
}

/// Poll the registry until the job is terminal
pub async fn wait_for_terminal(app: &FrameJobsApp, job_id: Uuid) -> JobSnapshot {
    wait_until(app, job_id, |job| job.status.is_terminal()).await
}

/// Poll the registry until `predicate` holds, failing the test after 10s
pub async fn wait_until<P>(app: &FrameJobsApp, job_id: Uuid, predicate: P) -> JobSnapshot
where
    P: Fn(&JobSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let job = app.registry().get_status(job_id).await.unwrap();
        if predicate(&job) {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting on job {} (last status: {})",
            job_id,
            job.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Number of files in `dir`; a missing directory counts as empty
pub fn count_files(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(Result::ok).count(),
        Err(_) => 0,
    }
}

/// Poll the cached read path until it reports a terminal status.
///
/// The registry flips in memory before the store write lands, so reads that
/// go through the store must wait on this rather than `wait_for_terminal`.
pub async fn wait_for_persisted_terminal(app: &FrameJobsApp, job_id: Uuid) -> JobSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let job = app.get_status(job_id).await.unwrap();
        if job.status.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting on persisted status of job {}",
            job_id
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
