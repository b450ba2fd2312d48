/// Cache behaviour with an unreachable primary tier
mod utils;

use async_trait::async_trait;
use frame_jobs_lib::modules::cache::{
    CacheBackend, CacheManager, MemoryCache, PrimaryTierStatus,
};
use frame_jobs_lib::{AppError, AppResult, JobStatus};
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use utils::factories::SourceSpec;
use utils::helpers::{build_test_app_with_cache, test_config, wait_for_persisted_terminal};

mock! {
    pub Backend {}

    #[async_trait]
    impl CacheBackend for Backend {
        async fn get(&self, key: &str) -> AppResult<Option<String>>;
        async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()>;
        async fn delete(&self, key: &str) -> AppResult<()>;
        fn name(&self) -> &'static str;
    }
}

fn refused() -> AppError {
    AppError::CacheError("Connection refused".to_string())
}

fn manager(primary: MockBackend, cooldown: Duration) -> Arc<CacheManager> {
    Arc::new(CacheManager::new(
        Some(Arc::new(primary)),
        Arc::new(MemoryCache::new(1 << 20)),
        Duration::from_secs(60),
        cooldown,
    ))
}

#[tokio::test]
async fn unreachable_primary_is_skipped_during_cooldown() {
    let mut primary = MockBackend::new();
    primary.expect_name().return_const("mock");
    primary.expect_get().times(1).returning(|_| Err(refused()));
    primary.expect_set().never();
    primary.expect_delete().never();

    let cache = manager(primary, Duration::from_secs(60));

    let value: u32 = cache
        .get_or_load("status:a", Duration::from_secs(60), || async { Ok(7) })
        .await
        .unwrap();
    assert_eq!(value, 7);

    // Served by the fallback tier without touching the primary again
    let value: u32 = cache
        .get_or_load("status:a", Duration::from_secs(60), || async {
            Err(AppError::InternalError("loader should not run".to_string()))
        })
        .await
        .unwrap();
    assert_eq!(value, 7);

    // Deletes during the cooldown are deferred, not lost
    cache.delete("status:a").await;
    let health = cache.health().await;
    assert_eq!(health.primary, PrimaryTierStatus::Degraded);
    assert_eq!(health.primary_errors, 1);
    assert_eq!(health.pending_deletes, 1);
    assert!(cache.get("status:a").await.is_none());
}

#[tokio::test]
async fn primary_recovers_after_cooldown() {
    let gets = Arc::new(AtomicUsize::new(0));
    let deletes = Arc::new(AtomicUsize::new(0));

    let mut primary = MockBackend::new();
    primary.expect_name().return_const("mock");
    {
        let gets = Arc::clone(&gets);
        primary.expect_get().returning(move |_| {
            if gets.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(refused())
            } else {
                Ok(Some("\"from-primary\"".to_string()))
            }
        });
    }
    {
        let deletes = Arc::clone(&deletes);
        primary.expect_delete().returning(move |_| {
            deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    primary.expect_set().returning(|_, _, _| Ok(()));

    let cache = manager(primary, Duration::from_millis(30));

    assert!(cache.get("k").await.is_none());
    cache.delete("k").await;
    assert_eq!(deletes.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(60)).await;

    let value: String = cache
        .get_or_load("k", Duration::from_secs(60), || async {
            Ok("from-loader".to_string())
        })
        .await
        .unwrap();
    assert_eq!(value, "from-primary");

    // The deferred delete reached the primary before the read
    assert_eq!(deletes.load(Ordering::SeqCst), 1);
    let health = cache.health().await;
    assert_eq!(health.primary, PrimaryTierStatus::Healthy);
    assert_eq!(health.pending_deletes, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn app_serves_requests_with_primary_down() {
    let mut primary = MockBackend::new();
    primary.expect_name().return_const("mock");
    primary.expect_get().returning(|_| Err(refused()));
    primary.expect_set().returning(|_, _, _| Err(refused()));
    primary.expect_delete().returning(|_| Err(refused()));

    let t = build_test_app_with_cache(test_config(2), manager(primary, Duration::from_millis(20)));
    t.provider.register("clip.mp4", SourceSpec::clip(2.0, 3.0));
    t.app.start();

    let id = t.app.submit_job("clip.mp4", 1.0).await.unwrap();
    let status = wait_for_persisted_terminal(&t.app, id).await;
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(t.app.list_frames(id).await.unwrap().len(), 3);
    assert_eq!(t.app.list_recent_frames(60, None).await.unwrap().len(), 3);
    assert_eq!(t.app.list_recent_frames(60, Some(id)).await.unwrap().len(), 3);

    let health = t.app.health().await;
    assert_eq!(health.status, "degraded");
    assert_eq!(health.cache.primary, PrimaryTierStatus::Degraded);
    assert!(health.cache.fallback.entries > 0);

    t.app.stop().await;
}
