//! Per-job-type dispatch: calls the external collaborator, updates
//! `StockIndex` on success (§4.6).
//!
//! Grounded on `kernel/jobs/worker.rs`'s `process_job` dispatch-then-mark
//! structure, collapsed from the teacher's generic
//! `SeesawCommandHandler`/`CommandRegistry` indirection (an external,
//! proprietary dispatch framework not reused here — see DESIGN.md) into a
//! direct `match` over the fixed nine-entry `JobType` table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, warn};

use crate::error::Result;

use super::job::{Job, JobType};
use super::job_store::JobStore;
use super::stock_index::{CollectibleField, StockIndex};

/// Outcome of a single job's dispatch, translated into `JobStore::Complete`
/// (§4.6 "Failure semantics").
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Success,
    Failed(String),
}

/// External market-data collaborator. Out of scope to implement here (§1) —
/// this crate only defines the boundary it calls across.
#[async_trait]
pub trait MarketService: Send + Sync {
    async fn collect_eod(&self, ticker: &str) -> JobOutcome;

    /// Bulk per-exchange EOD collection. The service owns per-ticker merge
    /// and per-ticker timestamp updates against `index`; the Executor does
    /// not loop over tickers itself (§4.6 "collect_eod_bulk... Executor does
    /// not loop").
    async fn collect_bulk_eod(&self, exchange: &str, index: &dyn StockIndex) -> JobOutcome;

    async fn collect_fundamentals(&self, ticker: &str) -> JobOutcome;
    async fn collect_filings(&self, ticker: &str) -> JobOutcome;
    async fn collect_news(&self, ticker: &str) -> JobOutcome;
    async fn collect_filing_summaries(&self, ticker: &str) -> JobOutcome;
    async fn collect_timeline(&self, ticker: &str) -> JobOutcome;
    async fn collect_news_intelligence(&self, ticker: &str) -> JobOutcome;
}

/// External signal-computation collaborator (§4.6 `compute_signals`).
#[async_trait]
pub trait SignalService: Send + Sync {
    /// Must return `JobOutcome::Failed` when market data or EOD is absent
    /// (§4.6 "compute_signals must return an error when market data or EOD
    /// is absent"), preventing silent timestamp advancement.
    async fn compute(&self, ticker: &str) -> JobOutcome;
}

/// Per-job-deadline dispatcher (§4.6, §5 "Timeouts").
pub struct Executor {
    market: Arc<dyn MarketService>,
    signals: Arc<dyn SignalService>,
    index: Arc<dyn StockIndex>,
    job_timeout: Duration,
}

impl Executor {
    pub fn new(
        market: Arc<dyn MarketService>,
        signals: Arc<dyn SignalService>,
        index: Arc<dyn StockIndex>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            market,
            signals,
            index,
            job_timeout,
        }
    }

    /// Dispatch `job` and, on success, advance the matching `StockIndex`
    /// timestamp. Never advances freshness on failure (§4.6 "Rules").
    pub async fn execute(&self, job: &Job) -> Result<()> {
        let outcome = match tokio::time::timeout(self.job_timeout, self.dispatch(job)).await {
            Ok(outcome) => outcome,
            Err(_) => JobOutcome::Failed(format!("job exceeded {:?} deadline", self.job_timeout)),
        };

        match outcome {
            JobOutcome::Success => {
                if let Some(field) = success_field(job.job_type) {
                    self.index.update_timestamp(&job.ticker, field, Utc::now()).await?;
                }
                Ok(())
            }
            JobOutcome::Failed(message) => {
                warn!(job_id = %job.id, job_type = %job.job_type, ticker = %job.ticker, error = %message, "job failed");
                Err(crate::error::CollectorError::Precondition(message))
            }
        }
    }

    async fn dispatch(&self, job: &Job) -> JobOutcome {
        match job.job_type {
            JobType::CollectEod => self.market.collect_eod(&job.ticker).await,
            JobType::CollectEodBulk => self.market.collect_bulk_eod(&job.ticker, self.index.as_ref()).await,
            JobType::CollectFundamentals => self.market.collect_fundamentals(&job.ticker).await,
            JobType::CollectFilings => self.market.collect_filings(&job.ticker).await,
            JobType::CollectNews => self.market.collect_news(&job.ticker).await,
            JobType::CollectFilingSummaries => self.market.collect_filing_summaries(&job.ticker).await,
            JobType::CollectTimeline => self.market.collect_timeline(&job.ticker).await,
            JobType::CollectNewsIntelligence => self.market.collect_news_intelligence(&job.ticker).await,
            JobType::ComputeSignals => match self.check_signals_precondition(&job.ticker).await {
                Ok(()) => self.signals.compute(&job.ticker).await,
                Err(outcome) => outcome,
            },
        }
    }

    /// `compute_signals` may only run once EOD has been collected at least
    /// once (§4.5 step 4, §4.6 "Rules").
    async fn check_signals_precondition(&self, ticker: &str) -> std::result::Result<(), JobOutcome> {
        match self.index.get(ticker).await {
            Ok(Some(entry)) if entry.eod_collected_at.is_some() => Ok(()),
            Ok(_) => Err(JobOutcome::Failed(format!(
                "compute_signals precondition failed: no EOD data collected for {ticker}"
            ))),
            Err(e) => {
                error!(%ticker, error = %e, "store error checking signals precondition");
                Err(JobOutcome::Failed(e.to_string()))
            }
        }
    }
}

/// The `StockIndex` field a successful job of this type advances (§4.6
/// dispatch table). `collect_eod_bulk` updates per-ticker inside
/// `MarketService::collect_bulk_eod`, so it has no single field here.
fn success_field(job_type: JobType) -> Option<CollectibleField> {
    match job_type {
        JobType::CollectEod => Some(CollectibleField::Eod),
        JobType::CollectEodBulk => None,
        JobType::CollectFundamentals => Some(CollectibleField::Fundamentals),
        JobType::CollectFilings => Some(CollectibleField::Filings),
        JobType::CollectNews => Some(CollectibleField::News),
        JobType::CollectFilingSummaries => Some(CollectibleField::FilingSummaries),
        JobType::CollectTimeline => Some(CollectibleField::Timeline),
        JobType::CollectNewsIntelligence => Some(CollectibleField::NewsIntelligence),
        JobType::ComputeSignals => Some(CollectibleField::Signals),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::stock_index::StockIndexEntry;
    use crate::kernel::testing::{InMemoryStockIndex, MockMarketService, MockSignalService};

    fn executor(
        market: Arc<MockMarketService>,
        signals: Arc<MockSignalService>,
        index: Arc<InMemoryStockIndex>,
    ) -> Executor {
        Executor::new(market, signals, index, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn success_advances_matching_timestamp() {
        let index = Arc::new(InMemoryStockIndex::new());
        index.upsert(StockIndexEntry::new("AAPL", "NASDAQ", "test")).await.unwrap();
        let executor = executor(Arc::new(MockMarketService::new()), Arc::new(MockSignalService::new()), index.clone());

        let job = Job::new(JobType::CollectEod, "AAPL");
        executor.execute(&job).await.unwrap();

        let entry = index.get("AAPL").await.unwrap().unwrap();
        assert!(entry.eod_collected_at.is_some());
    }

    #[tokio::test]
    async fn failure_does_not_advance_timestamp() {
        let index = Arc::new(InMemoryStockIndex::new());
        index.upsert(StockIndexEntry::new("AAPL", "NASDAQ", "test")).await.unwrap();
        let market = Arc::new(MockMarketService::new());
        market.fail_for("AAPL");
        let executor = executor(market, Arc::new(MockSignalService::new()), index.clone());

        let job = Job::new(JobType::CollectFundamentals, "AAPL");
        assert!(executor.execute(&job).await.is_err());

        let entry = index.get("AAPL").await.unwrap().unwrap();
        assert!(entry.fundamentals_collected_at.is_none());
    }

    #[tokio::test]
    async fn compute_signals_fails_without_prior_eod() {
        let index = Arc::new(InMemoryStockIndex::new());
        index.upsert(StockIndexEntry::new("AAPL", "NASDAQ", "test")).await.unwrap();
        let executor = executor(Arc::new(MockMarketService::new()), Arc::new(MockSignalService::new()), index.clone());

        let job = Job::new(JobType::ComputeSignals, "AAPL");
        assert!(executor.execute(&job).await.is_err());

        let entry = index.get("AAPL").await.unwrap().unwrap();
        assert!(entry.signals_collected_at.is_none());
    }

    #[tokio::test]
    async fn compute_signals_succeeds_after_eod_present() {
        let index = Arc::new(InMemoryStockIndex::new());
        let mut entry = StockIndexEntry::new("AAPL", "NASDAQ", "test");
        entry.eod_collected_at = Some(Utc::now());
        index.upsert(entry).await.unwrap();
        let executor = executor(Arc::new(MockMarketService::new()), Arc::new(MockSignalService::new()), index.clone());

        let job = Job::new(JobType::ComputeSignals, "AAPL");
        executor.execute(&job).await.unwrap();

        let entry = index.get("AAPL").await.unwrap().unwrap();
        assert!(entry.signals_collected_at.is_some());
    }

    #[tokio::test]
    async fn bulk_eod_does_not_loop_over_tickers_itself() {
        let index = Arc::new(InMemoryStockIndex::new());
        let market = Arc::new(MockMarketService::new());
        let executor = executor(market.clone(), Arc::new(MockSignalService::new()), index);

        let job = Job::new(JobType::CollectEodBulk, "NASDAQ");
        executor.execute(&job).await.unwrap();

        assert_eq!(market.bulk_calls.lock().unwrap().as_slice(), ["NASDAQ"]);
        assert!(market.eod_calls.lock().unwrap().is_empty());
    }
}
