//! Bounded concurrent dequeue-and-execute pool with a secondary heavy-job
//! gate (§4.7).
//!
//! Grounded on `kernel/jobs/worker.rs`'s `JobWorker::run` poll loop
//! (claim-or-sleep, cooperative shutdown via `CancellationToken`). The
//! heavy-job gate is a `tokio::sync::Semaphore`, the idiomatic primitive for
//! "N concurrent of a subset" the teacher's async stack uses the same way
//! elsewhere.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::event_bus::EventBus;
use super::events::{JobEvent, JobEventKind};
use super::executor::Executor;
use super::job::JobStatus;
use super::job_store::JobStore;

/// Worker-pool configuration (§6 `max_concurrent`, `heavy_job_limit`).
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_concurrent: usize,
    pub heavy_job_limit: usize,
    /// Sleep between empty-queue poll attempts.
    pub idle_poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            heavy_job_limit: 1,
            idle_poll_interval: Duration::from_millis(500),
        }
    }
}

/// Bounded concurrent executor pool (§4.7).
pub struct Pool {
    store: Arc<dyn JobStore>,
    executor: Arc<Executor>,
    events: EventBus,
    config: PoolConfig,
    heavy_gate: Arc<Semaphore>,
}

impl Pool {
    pub fn new(store: Arc<dyn JobStore>, executor: Arc<Executor>, events: EventBus, config: PoolConfig) -> Self {
        Self {
            store,
            executor,
            events,
            heavy_gate: Arc::new(Semaphore::new(config.heavy_job_limit)),
            config,
        }
    }

    /// Run `max_concurrent` worker loops until `shutdown` fires. In-flight
    /// jobs are allowed to finish; no new claims are attempted after
    /// shutdown (§4.7 "Shutdown is cooperative").
    pub async fn run(&self, shutdown: CancellationToken) {
        let workers = (0..self.config.max_concurrent).map(|id| self.worker_loop(id, shutdown.clone()));
        futures::future::join_all(workers).await;
    }

    async fn worker_loop(&self, worker_id: usize, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            match self.store.claim_next().await {
                Ok(Some(job)) => {
                    let heavy = job.job_type.is_heavy();
                    let _permit = if heavy {
                        match self.heavy_gate.acquire().await {
                            Ok(permit) => Some(permit),
                            Err(_) => return, // semaphore closed: shutting down
                        }
                    } else {
                        None
                    };

                    info!(worker_id, job_id = %job.id, job_type = %job.job_type, heavy, "dispatching job");
                    self.events.publish(JobEvent::new(JobEventKind::Started, job.clone()));

                    match self.executor.execute(&job).await {
                        Ok(()) => {
                            if let Err(e) = self.store.mark_completed(job.id).await {
                                error!(job_id = %job.id, error = %e, "failed to mark job completed");
                            } else {
                                let mut completed = job.clone();
                                completed.status = JobStatus::Completed;
                                completed.completed_at = Some(Utc::now());
                                self.events.publish(JobEvent::new(JobEventKind::Completed, completed));
                            }
                        }
                        Err(e) => {
                            let message = e.to_string();
                            if let Err(store_err) = self.store.mark_failed(job.id, message.clone()).await {
                                error!(job_id = %job.id, error = %store_err, "failed to mark job failed");
                            } else {
                                let mut failed = job.clone();
                                failed.status = JobStatus::Failed;
                                failed.completed_at = Some(Utc::now());
                                failed.error = Some(message);
                                failed.attempts += 1;
                                self.events.publish(JobEvent::new(JobEventKind::Failed, failed));
                            }
                        }
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.idle_poll_interval) => {}
                        _ = shutdown.cancelled() => return,
                    }
                }
                Err(e) => {
                    error!(worker_id, error = %e, "store error while claiming job");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.idle_poll_interval) => {}
                        _ = shutdown.cancelled() => return,
                    }
                }
            }
        }
    }
}
