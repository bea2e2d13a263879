//! In-memory fakes for unit and property tests (§8).
//!
//! Grounded on `kernel/jobs/manager.rs`'s `TestJobManager`/`MockJobHandler`:
//! a `Mutex`/`RwLock`-guarded `HashMap` standing in for the store, with the
//! same poison-recovery idiom (`.unwrap_or_else(|e| e.into_inner())`) the
//! teacher uses so a panicking test doesn't cascade-poison every other test
//! sharing the fake.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CollectorError, Result};

use super::executor::{JobOutcome, MarketService, SignalService};
use super::job::{Job, JobStatus, JobType};
use super::job_store::JobStore;
use super::stock_index::{CollectibleField, StockIndex, StockIndexEntry};

/// In-memory `JobStore`, exercising the same claim/cancel/priority contract
/// as `PostgresJobStore` without a database.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue_if_absent(&self, job: Job) -> Result<Option<Job>> {
        let mut jobs = self.lock();
        let duplicate = jobs
            .values()
            .any(|j| j.job_type == job.job_type && j.ticker == job.ticker && j.status == JobStatus::Pending);
        if duplicate {
            return Ok(None);
        }
        jobs.insert(job.id, job.clone());
        Ok(Some(job))
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let mut jobs = self.lock();
        let claimed_id = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)))
            .map(|j| j.id);

        match claimed_id {
            Some(id) => {
                let job = jobs.get_mut(&id).expect("id came from this map");
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_completed(&self, id: Uuid) -> Result<()> {
        let mut jobs = self.lock();
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Completed;
                job.completed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: String) -> Result<()> {
        let mut jobs = self.lock();
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                job.error = Some(error);
                job.attempts += 1;
            }
        }
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> Result<bool> {
        let mut jobs = self.lock();
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn cancel_by_ticker(&self, ticker: &str) -> Result<u64> {
        let mut jobs = self.lock();
        let mut count = 0;
        for job in jobs.values_mut() {
            if job.ticker == ticker && job.status == JobStatus::Pending {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                count += 1;
            }
        }
        Ok(count)
    }

    async fn set_priority(&self, id: Uuid, priority: i32) -> Result<bool> {
        let mut jobs = self.lock();
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == JobStatus::Pending {
                job.priority = priority;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn max_pending_priority(&self) -> Result<Option<i32>> {
        let jobs = self.lock();
        Ok(jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| j.priority)
            .max())
    }

    async fn has_pending_job(&self, job_type: JobType, ticker: &str) -> Result<bool> {
        let jobs = self.lock();
        Ok(jobs
            .values()
            .any(|j| j.job_type == job_type && j.ticker == ticker && j.status == JobStatus::Pending))
    }

    async fn count_pending(&self) -> Result<i64> {
        let jobs = self.lock();
        Ok(jobs.values().filter(|j| j.status == JobStatus::Pending).count() as i64)
    }

    async fn list_pending(&self) -> Result<Vec<Job>> {
        let jobs = self.lock();
        let mut pending: Vec<Job> = jobs.values().filter(|j| j.status == JobStatus::Pending).cloned().collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(pending)
    }

    async fn list_by_ticker(&self, ticker: &str) -> Result<Vec<Job>> {
        let jobs = self.lock();
        Ok(jobs.values().filter(|j| j.ticker == ticker).cloned().collect())
    }

    async fn get(&self, id: Uuid) -> Result<Job> {
        self.lock().get(&id).cloned().ok_or(CollectorError::NotFound(id))
    }

    async fn purge_completed(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, j| {
            let terminal = matches!(j.status, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled);
            !(terminal && j.completed_at.map(|t| t < cutoff).unwrap_or(false))
        });
        Ok((before - jobs.len()) as u64)
    }
}

/// In-memory `StockIndex`, mirroring `PostgresStockIndex`'s upsert-merge
/// semantics.
#[derive(Default)]
pub struct InMemoryStockIndex {
    entries: Mutex<HashMap<String, StockIndexEntry>>,
}

impl InMemoryStockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StockIndexEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StockIndex for InMemoryStockIndex {
    async fn upsert(&self, entry: StockIndexEntry) -> Result<()> {
        let mut entries = self.lock();
        match entries.get_mut(&entry.ticker) {
            Some(existing) => {
                existing.source = entry.source;
                existing.name = entry.name;
                existing.last_seen_at = entry.last_seen_at;
            }
            None => {
                entries.insert(entry.ticker.clone(), entry);
            }
        }
        Ok(())
    }

    async fn get(&self, ticker: &str) -> Result<Option<StockIndexEntry>> {
        Ok(self.lock().get(ticker).cloned())
    }

    async fn list(&self) -> Result<Vec<StockIndexEntry>> {
        Ok(self.lock().values().cloned().collect())
    }

    async fn delete(&self, ticker: &str) -> Result<()> {
        self.lock().remove(ticker);
        Ok(())
    }

    async fn update_timestamp(&self, ticker: &str, field: CollectibleField, t: DateTime<Utc>) -> Result<()> {
        let mut entries = self.lock();
        let entry = entries.get_mut(ticker).ok_or_else(|| CollectorError::Precondition(format!("unknown ticker: {ticker}")))?;
        match field {
            CollectibleField::Eod => entry.eod_collected_at = Some(t),
            CollectibleField::Fundamentals => entry.fundamentals_collected_at = Some(t),
            CollectibleField::Filings => entry.filings_collected_at = Some(t),
            CollectibleField::News => entry.news_collected_at = Some(t),
            CollectibleField::FilingSummaries => entry.filing_summaries_collected_at = Some(t),
            CollectibleField::Timeline => entry.timeline_collected_at = Some(t),
            CollectibleField::Signals => entry.signals_collected_at = Some(t),
            CollectibleField::NewsIntelligence => entry.news_intelligence_collected_at = Some(t),
        }
        Ok(())
    }
}

/// Mock collaborator: `MarketService`. Tracks invocations and lets tests
/// force a specific ticker/job to fail, the same knob
/// `MockJobHandler::should_fail` provides in the teacher.
#[derive(Default)]
pub struct MockMarketService {
    pub failing_tickers: Mutex<Vec<String>>,
    pub eod_calls: Mutex<Vec<String>>,
    pub bulk_calls: Mutex<Vec<String>>,
}

impl MockMarketService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, ticker: impl Into<String>) {
        self.failing_tickers.lock().unwrap_or_else(|e| e.into_inner()).push(ticker.into());
    }

    fn should_fail(&self, ticker: &str) -> bool {
        self.failing_tickers.lock().unwrap_or_else(|e| e.into_inner()).iter().any(|t| t == ticker)
    }
}

#[async_trait]
impl MarketService for MockMarketService {
    async fn collect_eod(&self, ticker: &str) -> JobOutcome {
        self.eod_calls.lock().unwrap_or_else(|e| e.into_inner()).push(ticker.to_string());
        if self.should_fail(ticker) {
            JobOutcome::Failed("simulated market service failure".to_string())
        } else {
            JobOutcome::Success
        }
    }

    async fn collect_bulk_eod(&self, exchange: &str, _index: &dyn StockIndex) -> JobOutcome {
        self.bulk_calls.lock().unwrap_or_else(|e| e.into_inner()).push(exchange.to_string());
        if self.should_fail(exchange) {
            JobOutcome::Failed("simulated bulk EOD failure".to_string())
        } else {
            JobOutcome::Success
        }
    }

    async fn collect_fundamentals(&self, ticker: &str) -> JobOutcome {
        self.fail_or_success(ticker)
    }

    async fn collect_filings(&self, ticker: &str) -> JobOutcome {
        self.fail_or_success(ticker)
    }

    async fn collect_news(&self, ticker: &str) -> JobOutcome {
        self.fail_or_success(ticker)
    }

    async fn collect_filing_summaries(&self, ticker: &str) -> JobOutcome {
        self.fail_or_success(ticker)
    }

    async fn collect_timeline(&self, ticker: &str) -> JobOutcome {
        self.fail_or_success(ticker)
    }

    async fn collect_news_intelligence(&self, ticker: &str) -> JobOutcome {
        self.fail_or_success(ticker)
    }
}

impl MockMarketService {
    fn fail_or_success(&self, ticker: &str) -> JobOutcome {
        if self.should_fail(ticker) {
            JobOutcome::Failed("simulated market service failure".to_string())
        } else {
            JobOutcome::Success
        }
    }
}

/// Mock collaborator: `SignalService`. Honors the `compute_signals`
/// precondition test scenario (S2) by returning an error when told to.
#[derive(Default)]
pub struct MockSignalService {
    pub fail_missing_eod: Mutex<bool>,
}

impl MockSignalService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalService for MockSignalService {
    async fn compute(&self, _ticker: &str) -> JobOutcome {
        if *self.fail_missing_eod.lock().unwrap_or_else(|e| e.into_inner()) {
            JobOutcome::Failed("no EOD data available".to_string())
        } else {
            JobOutcome::Success
        }
    }
}
