//! Periodic freshness scan over the `StockIndex`, converting staleness into
//! enqueue intents (§4.5).
//!
//! Grounded on `kernel/scheduled_tasks.rs`'s periodic-tick structure
//! (`tokio::time::sleep` loop, per-entry error isolation, log-and-continue)
//! and, for the domain shape (iterate tickers, dispatch one job per stale
//! data class), the `other_examples` reference file
//! `jeremycod-rustfolio/.../job_scheduler_service.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::job::{priority, JobType};
use super::queue_api::QueueApi;
use super::stock_index::{CollectibleField, StockIndex, StockIndexEntry};

/// Configuration for the periodic scan (§6 `watcher_interval`,
/// `watcher_startup_delay`).
#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    pub startup_delay: Duration,
    pub interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(10),
            interval: Duration::from_secs(60),
        }
    }
}

/// TTL per per-ticker collectible component (§4.5). `EOD` is intentionally
/// absent — it is handled separately as a per-exchange bulk job (step 5).
fn ttl_for(field: CollectibleField) -> ChronoDuration {
    match field {
        CollectibleField::Eod => ChronoDuration::hours(1),
        CollectibleField::Fundamentals => ChronoDuration::days(7),
        CollectibleField::News => ChronoDuration::hours(6),
        CollectibleField::Signals => ChronoDuration::hours(1),
        CollectibleField::NewsIntelligence => ChronoDuration::days(30),
        CollectibleField::Filings => ChronoDuration::days(30),
        // No TTL is listed in §4.5's table for Timeline; resolved in
        // DESIGN.md (Open Question 2) to match Filings' 30-day cadence.
        CollectibleField::Timeline => ChronoDuration::days(30),
        CollectibleField::FilingSummaries => ChronoDuration::days(90),
    }
}

/// The per-ticker collectible components the watcher checks every tick,
/// excluding `Eod` (bulk, handled separately) and `Signals` (has its own
/// precondition, handled separately).
const PER_TICKER_FIELDS: [CollectibleField; 6] = [
    CollectibleField::Fundamentals,
    CollectibleField::Filings,
    CollectibleField::News,
    CollectibleField::FilingSummaries,
    CollectibleField::Timeline,
    CollectibleField::NewsIntelligence,
];

fn job_type_for(field: CollectibleField) -> JobType {
    match field {
        CollectibleField::Eod => JobType::CollectEod,
        CollectibleField::Fundamentals => JobType::CollectFundamentals,
        CollectibleField::Filings => JobType::CollectFilings,
        CollectibleField::News => JobType::CollectNews,
        CollectibleField::FilingSummaries => JobType::CollectFilingSummaries,
        CollectibleField::Timeline => JobType::CollectTimeline,
        CollectibleField::NewsIntelligence => JobType::CollectNewsIntelligence,
        CollectibleField::Signals => JobType::ComputeSignals,
    }
}

fn is_stale(timestamp: Option<DateTime<Utc>>, ttl: ChronoDuration, now: DateTime<Utc>) -> bool {
    match timestamp {
        // A missing collection timestamp is equivalent to the original
        // spec's "zero timestamp is stale" (DESIGN.md Open Question 4).
        None => true,
        Some(t) => now - t >= ttl,
    }
}

/// Drives collection demand by periodically scanning the `StockIndex` (§4.5).
pub struct Watcher {
    index: Arc<dyn StockIndex>,
    queue: Arc<QueueApi>,
    config: WatcherConfig,
}

impl Watcher {
    pub fn new(index: Arc<dyn StockIndex>, queue: Arc<QueueApi>, config: WatcherConfig) -> Self {
        Self { index, queue, config }
    }

    /// Run ticks until `shutdown` is triggered.
    pub async fn run(&self, shutdown: CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.startup_delay) => {}
            _ = shutdown.cancelled() => return,
        }

        loop {
            if shutdown.is_cancelled() {
                return;
            }

            if let Err(e) = self.tick().await {
                error!(error = %e, "watcher tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.cancelled() => return,
            }
        }
    }

    /// One scan-and-enqueue pass (§4.5 "Algorithm (per tick)").
    pub async fn tick(&self) -> crate::error::Result<()> {
        let now = Utc::now();
        let entries = self.index.list().await?;

        // Per exchange: does any contributing stale ticker qualify for
        // PriorityNewStock? If so the bulk job is enqueued at that priority
        // (§3 PriorityScheme, S1 "All at PriorityNewStock = 15").
        let mut stale_by_exchange: HashMap<String, bool> = HashMap::new();

        for entry in &entries {
            if let Err(e) = self.scan_entry(entry, now).await {
                error!(ticker = %entry.ticker, error = %e, "watcher failed to process entry, continuing");
                continue;
            }

            if is_stale(entry.eod_collected_at, ttl_for(CollectibleField::Eod), now) {
                let contains_new = stale_by_exchange.entry(entry.exchange.clone()).or_insert(false);
                *contains_new |= entry.is_new(now);
            }
        }

        // EOD is grouped per exchange into one `collect_eod_bulk` job (§4.5
        // step 5) — one bulk job per exchange per tick, regardless of how
        // many tickers on that exchange are stale.
        for (exchange, contains_new) in &stale_by_exchange {
            let job_priority = if *contains_new {
                priority::NEW_STOCK
            } else {
                JobType::CollectEodBulk.default_priority()
            };
            self.queue.enqueue_if_needed(JobType::CollectEodBulk, exchange, job_priority).await?;
        }

        info!(tickers = entries.len(), stale_exchanges = stale_by_exchange.len(), "watcher tick complete");
        Ok(())
    }

    async fn scan_entry(&self, entry: &StockIndexEntry, now: DateTime<Utc>) -> crate::error::Result<()> {
        let is_new = entry.is_new(now);

        for field in PER_TICKER_FIELDS {
            if is_stale(entry.timestamp_for(field), ttl_for(field), now) {
                let job_type = job_type_for(field);
                let job_priority = if is_new { priority::NEW_STOCK } else { job_type.default_priority() };
                self.queue.enqueue_if_needed(job_type, &entry.ticker, job_priority).await?;
            }
        }

        // `compute_signals` has an extra precondition (§4.5 step 4): only
        // enqueue once EOD has ever been collected.
        if entry.eod_collected_at.is_some() && is_stale(entry.signals_collected_at, ttl_for(CollectibleField::Signals), now) {
            let job_priority = if is_new { priority::NEW_STOCK } else { JobType::ComputeSignals.default_priority() };
            self.queue.enqueue_if_needed(JobType::ComputeSignals, &entry.ticker, job_priority).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::event_bus::EventBus;
    use crate::kernel::job::JobStatus;
    use crate::kernel::testing::{InMemoryJobStore, InMemoryStockIndex};

    fn watcher(index: Arc<InMemoryStockIndex>, store: Arc<InMemoryJobStore>) -> Watcher {
        let queue = Arc::new(QueueApi::new(store, EventBus::new()));
        Watcher::new(index, queue, WatcherConfig::default())
    }

    #[tokio::test]
    async fn new_ticker_burst_enqueues_every_component_but_signals() {
        let index = Arc::new(InMemoryStockIndex::new());
        let store = Arc::new(InMemoryJobStore::new());

        for ticker in ["AAA", "BBB", "CCC"] {
            index.upsert(StockIndexEntry::new(ticker, "NASDAQ", "test")).await.unwrap();
        }

        let w = watcher(index, store.clone());
        w.tick().await.unwrap();

        let pending = store.list_pending().await.unwrap();
        // 1 collect_eod_bulk (shared exchange) + 3 * 6 per-ticker fields = 19.
        assert_eq!(pending.len(), 19);
        assert!(!pending.iter().any(|j| j.job_type == JobType::ComputeSignals));
        assert!(pending.iter().all(|j| j.priority == priority::NEW_STOCK));
    }

    #[tokio::test]
    async fn signals_precondition_blocks_until_eod_collected() {
        let index = Arc::new(InMemoryStockIndex::new());
        let store = Arc::new(InMemoryJobStore::new());
        index.upsert(StockIndexEntry::new("AAPL", "NASDAQ", "test")).await.unwrap();

        let w = watcher(index.clone(), store.clone());
        w.tick().await.unwrap();
        assert!(!store
            .list_pending()
            .await
            .unwrap()
            .iter()
            .any(|j| j.job_type == JobType::ComputeSignals));

        index.update_timestamp("AAPL", CollectibleField::Eod, Utc::now()).await.unwrap();

        w.tick().await.unwrap();
        let signals_jobs: Vec<_> = store
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .filter(|j| j.job_type == JobType::ComputeSignals)
            .collect();
        assert_eq!(signals_jobs.len(), 1);
    }

    #[tokio::test]
    async fn dedup_prevents_unbounded_growth_on_repeated_ticks() {
        let index = Arc::new(InMemoryStockIndex::new());
        let store = Arc::new(InMemoryJobStore::new());
        index.upsert(StockIndexEntry::new("AAPL", "NASDAQ", "test")).await.unwrap();

        let w = watcher(index, store.clone());
        w.tick().await.unwrap();
        let after_first = store.count_pending().await.unwrap();
        w.tick().await.unwrap();
        let after_second = store.count_pending().await.unwrap();

        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn non_new_ticker_uses_default_priority() {
        let index = Arc::new(InMemoryStockIndex::new());
        let store = Arc::new(InMemoryJobStore::new());
        let mut entry = StockIndexEntry::new("AAPL", "NASDAQ", "test");
        entry.created_at = Utc::now() - ChronoDuration::hours(1);
        index.upsert(entry).await.unwrap();

        let w = watcher(index, store.clone());
        w.tick().await.unwrap();

        let fundamentals_job = store
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .find(|j| j.job_type == JobType::CollectFundamentals)
            .unwrap();
        assert_eq!(fundamentals_job.priority, JobType::CollectFundamentals.default_priority());
        assert_eq!(fundamentals_job.status, JobStatus::Pending);
    }
}
