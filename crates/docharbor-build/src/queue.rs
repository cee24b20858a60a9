//! Build queue and worker pool
//!
//! The persistent build table is the queue: enqueue inserts a `queued`
//! row and nudges the workers through a bounded in-memory channel so
//! they do not poll the store on every tick. A fixed pool of workers
//! claims jobs FIFO, subject to the per-target running exclusion the
//! store enforces in its claim transaction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use docharbor_core::{BuildJob, BuildStatus, BuildTrigger};
use docharbor_store::{Store, StoreError};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::executor::{BuildExecutor, CancelFlag};

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of concurrent workers; fixed at startup
    pub workers: usize,
    /// Fallback interval at which idle workers re-check the store in
    /// case a wakeup was dropped on the bounded channel
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { workers: 5, poll_interval: Duration::from_secs(5) }
    }
}

/// Outcome of a cancellation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was still queued and is now terminally cancelled
    CancelledQueued,
    /// The job is running; the executor will stop at the next step
    /// boundary unless publication has already begun
    SignalledRunning,
    /// The job had already reached a terminal state
    AlreadyFinished,
}

#[derive(Default)]
struct CancelRegistry {
    flags: StdMutex<HashMap<i64, CancelFlag>>,
}

impl CancelRegistry {
    fn register(&self, build_id: i64) -> CancelFlag {
        let flag = CancelFlag::new();
        self.lock().insert(build_id, flag.clone());
        flag
    }

    fn deregister(&self, build_id: i64) {
        self.lock().remove(&build_id);
    }

    fn signal(&self, build_id: i64) -> bool {
        if let Some(flag) = self.lock().get(&build_id) {
            flag.cancel();
            true
        } else {
            false
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, CancelFlag>> {
        self.flags.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Queue facade shared by the CLI, the monitor, and the workers
pub struct BuildQueue {
    store: Arc<Store>,
    executor: Arc<BuildExecutor>,
    config: QueueConfig,
    wakeup_tx: mpsc::Sender<()>,
    wakeup_rx: Arc<Mutex<mpsc::Receiver<()>>>,
    cancels: CancelRegistry,
    shutdown_tx: watch::Sender<bool>,
    handles: StdMutex<Vec<JoinHandle<()>>>,
}

impl BuildQueue {
    pub fn new(store: Arc<Store>, executor: Arc<BuildExecutor>, config: QueueConfig) -> Arc<Self> {
        let (wakeup_tx, wakeup_rx) = mpsc::channel(64);
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            store,
            executor,
            config,
            wakeup_tx,
            wakeup_rx: Arc::new(Mutex::new(wakeup_rx)),
            cancels: CancelRegistry::default(),
            shutdown_tx,
            handles: StdMutex::new(Vec::new()),
        })
    }

    /// Spawn the worker pool
    pub fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock().unwrap_or_else(|p| p.into_inner());
        if !handles.is_empty() {
            return;
        }
        info!(workers = self.config.workers, "starting build workers");
        for index in 0..self.config.workers {
            let queue = Arc::clone(self);
            handles.push(tokio::spawn(async move { queue.worker_loop(index).await }));
        }
    }

    /// Receiver that flips to `true` when shutdown begins; the monitor
    /// shares it.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Persist a job in `queued` and wake a worker. Enqueueing is
    /// non-blocking and always succeeds when the store does.
    pub fn enqueue(&self, target_id: i64, trigger: BuildTrigger) -> Result<BuildJob, StoreError> {
        let job = self.store.enqueue_build(target_id, trigger)?;
        // A full channel means workers already have wakeups pending.
        let _ = self.wakeup_tx.try_send(());
        Ok(job)
    }

    /// Request cancellation of a build
    pub fn cancel(&self, build_id: i64) -> Result<CancelOutcome, StoreError> {
        if self.store.cancel_queued(build_id)? {
            info!(build = build_id, "queued build cancelled");
            return Ok(CancelOutcome::CancelledQueued);
        }
        let job = self.store.build(build_id)?;
        if job.status == BuildStatus::Running && self.cancels.signal(build_id) {
            info!(build = build_id, "running build signalled for cancellation");
            return Ok(CancelOutcome::SignalledRunning);
        }
        Ok(CancelOutcome::AlreadyFinished)
    }

    /// Stop accepting work and wait for workers to drain their current
    /// builds.
    pub async fn shutdown(&self) {
        info!("shutting down build queue");
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<_> =
            std::mem::take(&mut *self.handles.lock().unwrap_or_else(|p| p.into_inner()));
        for handle in handles {
            if let Err(e) = handle.await {
                error!(%e, "worker task panicked");
            }
        }
    }

    async fn worker_loop(self: Arc<Self>, index: usize) {
        debug!(worker = index, "worker started");
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.store.claim_next_queued() {
                Ok(Some(job)) => {
                    let build_id = job.id;
                    debug!(worker = index, build = build_id, "claimed job");
                    let flag = self.cancels.register(build_id);
                    self.executor.run(job, flag).await;
                    self.cancels.deregister(build_id);
                    // Look for more work immediately; a finished build
                    // may have unblocked its target.
                }
                Ok(None) => {
                    let rx = Arc::clone(&self.wakeup_rx);
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = async {
                            let mut rx = rx.lock().await;
                            rx.recv().await
                        } => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    error!(worker = index, %e, "failed to poll the queue");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
        debug!(worker = index, "worker stopped");
    }
}
