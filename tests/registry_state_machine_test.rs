/// Job registry invariants under concurrent callers

use frame_jobs_lib::modules::cache::CacheManager;
use frame_jobs_lib::modules::jobs::{InMemoryMetadataStore, JobRegistry};
use frame_jobs_lib::{AppError, JobStatus, MetadataStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn registry() -> (Arc<JobRegistry>, Arc<InMemoryMetadataStore>) {
    let store = Arc::new(InMemoryMetadataStore::new());
    let cache = Arc::new(CacheManager::local(1 << 20, Duration::from_secs(60)));
    (Arc::new(JobRegistry::new(store.clone(), cache)), store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_terminal_transitions_commit_once() {
    let (registry, store) = registry();
    let id = assert_ok!(registry.submit("video.mp4", 1.0).await);
    assert_ok!(registry.begin_processing(id).await);

    let targets = [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled];
    let handles: Vec<_> = (0..24)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let status = targets[i % targets.len()];
            tokio::spawn(async move {
                registry
                    .mark_terminal(id, status, Some(format!("attempt {}", i)))
                    .await
            })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            committed += 1;
        }
    }
    assert_eq!(committed, 1);

    // The store holds the same terminal state as the registry
    let in_memory = registry.get_status(id).await.unwrap();
    let stored = store.get_job(id).await.unwrap().unwrap();
    assert!(in_memory.status.is_terminal());
    assert_eq!(stored.status, in_memory.status);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn progress_from_racing_writers_never_regresses() {
    let (registry, store) = registry();
    let id = registry.submit("video.mp4", 1.0).await.unwrap();
    registry.begin_processing(id).await.unwrap();

    let handles: Vec<_> = (1..=50u64)
        .map(|processed| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.update_progress(id, processed, None).await })
        })
        .collect();
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    let job = registry.get_status(id).await.unwrap();
    assert_eq!(job.processed_frames, 50);
    assert_eq!(store.get_job(id).await.unwrap().unwrap().processed_frames, 50);
}

#[tokio::test]
async fn store_mirrors_every_transition() {
    let (registry, store) = registry();
    let id = registry.submit("video.mp4", 2.0).await.unwrap();

    let stored = |status| {
        let store = Arc::clone(&store);
        async move {
            assert_eq!(
                store.get_job(id).await.unwrap().unwrap().status,
                status
            );
        }
    };

    stored(JobStatus::Pending).await;
    registry.begin_processing(id).await.unwrap();
    stored(JobStatus::Processing).await;
    registry.update_progress(id, 1, Some(5)).await.unwrap();
    registry
        .mark_terminal(id, JobStatus::Completed, None)
        .await
        .unwrap();
    stored(JobStatus::Completed).await;

    let job = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.processed_frames, 1);
    assert_eq!(job.total_frames, Some(5));
}

#[tokio::test]
async fn invalid_paths_are_rejected() {
    let (registry, _) = registry();
    let id = registry.submit("video.mp4", 1.0).await.unwrap();

    // Pending cannot complete without processing
    let err = assert_err!(registry.mark_terminal(id, JobStatus::Completed, None).await);
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(
        registry.get_status(id).await.unwrap().status,
        JobStatus::Pending
    );

    registry.request_cancel(id).await.unwrap();
    assert!(registry.begin_processing(id).await.unwrap().is_none());
    assert_err!(registry.update_progress(id, 1, None).await);
    assert!(!registry
        .mark_terminal(id, JobStatus::Failed, None)
        .await
        .unwrap());
    assert_eq!(
        registry.get_status(id).await.unwrap().status,
        JobStatus::Cancelled
    );
}
