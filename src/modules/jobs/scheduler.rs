/// Bounded worker pool
///
/// Submissions go through a FIFO queue. A single dispatcher takes a permit
/// from a semaphore sized to the pool capacity, then the oldest queued job,
/// and hands both to a worker task. The permit is released when the worker
/// finishes, so at most `capacity` jobs are ever Processing at once.
use crate::modules::jobs::domain::JobStatus;
use crate::modules::jobs::registry::JobRegistry;
use crate::modules::jobs::worker::JobWorker;
use crate::shared::config::AdmissionPolicy;
use crate::shared::errors::{AppError, AppResult};
use crate::{log_debug, log_error, log_info, log_warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// Pool occupancy for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatistics {
    pub capacity: usize,
    pub running: usize,
    pub queued: usize,
    pub accepting: bool,
}

struct PoolShared {
    registry: Arc<JobRegistry>,
    worker: JobWorker,
    capacity: usize,
    policy: AdmissionPolicy,
    slots: Arc<Semaphore>,
    queue_tx: mpsc::UnboundedSender<Uuid>,
    queued: AtomicUsize,
    running: AtomicUsize,
    accepting: AtomicBool,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

pub struct Scheduler {
    shared: Arc<PoolShared>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<Uuid>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<JobRegistry>,
        worker: JobWorker,
        capacity: usize,
        policy: AdmissionPolicy,
    ) -> Self {
        let capacity = capacity.max(1);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(PoolShared {
                registry,
                worker,
                capacity,
                policy,
                slots: Arc::new(Semaphore::new(capacity)),
                queue_tx,
                queued: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                accepting: AtomicBool::new(true),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
            queue_rx: Mutex::new(Some(queue_rx)),
            dispatcher: Mutex::new(None),
        }
    }

    /// Spawn the dispatcher. Jobs submitted before this call wait in the queue.
    pub fn start(&self) {
        let Some(queue_rx) = self
            .queue_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            log_warn!("Scheduler already started");
            return;
        };

        log_info!(
            "Starting scheduler (capacity: {}, policy: {:?})",
            self.shared.capacity,
            self.shared.policy
        );
        let handle = tokio::spawn(PoolShared::dispatch(Arc::clone(&self.shared), queue_rx));
        *self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Stop admitting work and wait for running workers to finish.
    /// Jobs still queued stay Pending.
    pub async fn stop(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.shared.shutdown.cancel();

        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log_error!("Dispatcher ended abnormally: {}", e);
            }
        }

        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        log_info!(
            "Scheduler stopped ({} jobs left pending)",
            self.shared.queued.load(Ordering::SeqCst)
        );
    }

    /// Register a job and queue it for execution
    pub async fn submit(&self, source: &str, interval_seconds: f64) -> AppResult<Uuid> {
        let shared = &self.shared;
        if !shared.accepting.load(Ordering::SeqCst) {
            return Err(AppError::Conflict(
                "Scheduler is shutting down and no longer accepts jobs".to_string(),
            ));
        }

        shared.reserve_slot()?;

        let job_id = match shared.registry.submit(source, interval_seconds).await {
            Ok(id) => id,
            Err(e) => {
                shared.queued.fetch_sub(1, Ordering::SeqCst);
                return Err(e);
            }
        };

        if shared.queue_tx.send(job_id).is_err() {
            shared.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::Conflict(format!(
                "Job {} registered but the scheduler has stopped",
                job_id
            )));
        }

        log_debug!("Job {} queued", job_id);
        Ok(job_id)
    }

    pub fn statistics(&self) -> PoolStatistics {
        PoolStatistics {
            capacity: self.shared.capacity,
            running: self.shared.running.load(Ordering::SeqCst),
            queued: self.shared.queued.load(Ordering::SeqCst),
            accepting: self.shared.accepting.load(Ordering::SeqCst),
        }
    }
}

impl PoolShared {
    /// Count a submission against the queue, refusing it under the reject
    /// policy when running plus queued jobs already fill the pool
    fn reserve_slot(&self) -> AppResult<()> {
        match self.policy {
            AdmissionPolicy::Queue => {
                self.queued.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            AdmissionPolicy::Reject => self
                .queued
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |queued| {
                    let running = self.running.load(Ordering::SeqCst);
                    (queued + running < self.capacity).then_some(queued + 1)
                })
                .map(|_| ())
                .map_err(|_| {
                    AppError::CapacityExceeded(format!(
                        "All {} worker slots are busy",
                        self.capacity
                    ))
                }),
        }
    }

    async fn dispatch(self: Arc<Self>, mut queue_rx: mpsc::UnboundedReceiver<Uuid>) {
        loop {
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job_id = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = queue_rx.recv() => match next {
                    Some(job_id) => job_id,
                    None => break,
                },
            };

            // Count as running before leaving the queue so the sum never dips
            self.running.fetch_add(1, Ordering::SeqCst);
            self.queued.fetch_sub(1, Ordering::SeqCst);

            let shared = Arc::clone(&self);
            self.tracker.spawn(shared.execute(job_id, permit));
        }

        log_debug!("Dispatcher stopped");
    }

    async fn execute(self: Arc<Self>, job_id: Uuid, permit: OwnedSemaphorePermit) {
        let worker = self.worker.clone();
        // Separate task so a panicking worker surfaces as a JoinError here
        let result = tokio::spawn(async move { worker.run(job_id).await }).await;

        let failure = match result {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(e),
            Err(join_error) => {
                let error = AppError::from(join_error);
                log_error!("Worker for job {} crashed: {}", job_id, error);
                Some(error)
            }
        };

        if let Some(error) = failure {
            match self
                .registry
                .mark_terminal(job_id, JobStatus::Failed, Some(error.to_string()))
                .await
            {
                Ok(_) => {}
                Err(e) => log_error!("Could not mark job {} as failed: {}", job_id, e),
            }
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        drop(permit);
    }
}
