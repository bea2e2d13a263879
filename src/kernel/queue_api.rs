//! Single entry point for enqueueing work; coordinates dedup and events (§4.4).
//!
//! Grounded on `kernel/jobs/queue.rs`'s `JobQueue` trait surface
//! (enqueue/cancel/priority helpers), re-targeted at the fixed job-type set
//! from §6 instead of the teacher's generic `CommandMeta` serialization.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::Result;

use super::event_bus::EventBus;
use super::events::{JobEvent, JobEventKind};
use super::job::{priority, Job, JobType};
use super::job_store::JobStore;

/// Thin coordination layer over `JobStore` + `EventBus` (§4.4).
///
/// All observable enqueues must go through this type so that emitted events
/// stay consistent with the store (§4.4 "Contract").
pub struct QueueApi {
    store: Arc<dyn JobStore>,
    events: EventBus,
}

impl QueueApi {
    pub fn new(store: Arc<dyn JobStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Enqueue unless a pending job of the same `(job_type, ticker)` already
    /// exists. Returns the existing job's id without emitting when a
    /// duplicate was found.
    pub async fn enqueue_if_needed(&self, job_type: JobType, ticker: &str, priority: i32) -> Result<Uuid> {
        let job = Job::with_priority(job_type, ticker, priority);

        match self.store.enqueue_if_absent(job).await? {
            Some(created) => {
                info!(job_id = %created.id, %job_type, ticker, priority, "job queued");
                self.events.publish(JobEvent::new(JobEventKind::Queued, created.clone()));
                Ok(created.id)
            }
            None => {
                let existing = self
                    .store
                    .list_by_ticker(ticker)
                    .await?
                    .into_iter()
                    .find(|j| j.job_type == job_type && j.status == super::job::JobStatus::Pending)
                    .expect("enqueue_if_absent returned None only because a pending duplicate exists");
                Ok(existing.id)
            }
        }
    }

    /// Bump `id`'s priority to `max(GetMaxPriority() + 1, Urgent)` (§3
    /// `PriorityScheme::Urgent`).
    pub async fn push_to_top(&self, id: Uuid) -> Result<()> {
        let job = self.store.get(id).await?;
        let max_pending = self.store.max_pending_priority().await?.unwrap_or(0);
        let new_priority = (max_pending + 1).max(priority::URGENT);

        if self.store.set_priority(id, new_priority).await? {
            let mut updated = job;
            updated.priority = new_priority;
            info!(job_id = %id, new_priority, "job pushed to top");
            self.events
                .publish(JobEvent::new(JobEventKind::PriorityChanged, updated));
        }
        Ok(())
    }

    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        let cancelled = self.store.cancel(id).await?;
        if cancelled {
            let mut job = self.store.get(id).await?;
            job.status = super::job::JobStatus::Cancelled;
            info!(job_id = %id, "job cancelled");
            self.events.publish(JobEvent::new(JobEventKind::Cancelled, job));
        }
        Ok(cancelled)
    }
}
