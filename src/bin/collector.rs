//! Process entrypoint: loads configuration, connects to Postgres, runs
//! migrations, and wires the Watcher and Pool behind a `ctrl_c` shutdown.
//!
//! Grounded on `packages/server/src/server/main.rs`'s
//! `Config::from_env` -> connect -> migrate -> run sequence.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use collector_kernel::config::CollectorConfig;
use collector_kernel::kernel::{
    EventBus, Executor, JobStore, Pool, PoolConfig, PostgresJobStore, PostgresStockIndex, QueueApi, Watcher,
    WatcherConfig,
};

/// Placeholder `MarketService`/`SignalService` wiring point. The real
/// implementations live in the embedding application, which calls across
/// the opaque collaborator boundary described in §1/§4.6; this binary
/// cannot construct them on its own.
mod collaborators {
    use async_trait::async_trait;
    use collector_kernel::kernel::{JobOutcome, MarketService, SignalService, StockIndex};

    /// Fails every job with a descriptive error instead of panicking, so an
    /// operator who runs this binary without wiring real collaborators sees
    /// the jobs fail (and the Watcher re-enqueue) rather than the process
    /// aborting.
    pub struct UnconfiguredMarketService;

    #[async_trait]
    impl MarketService for UnconfiguredMarketService {
        async fn collect_eod(&self, _ticker: &str) -> JobOutcome {
            unconfigured()
        }
        async fn collect_bulk_eod(&self, _exchange: &str, _index: &dyn StockIndex) -> JobOutcome {
            unconfigured()
        }
        async fn collect_fundamentals(&self, _ticker: &str) -> JobOutcome {
            unconfigured()
        }
        async fn collect_filings(&self, _ticker: &str) -> JobOutcome {
            unconfigured()
        }
        async fn collect_news(&self, _ticker: &str) -> JobOutcome {
            unconfigured()
        }
        async fn collect_filing_summaries(&self, _ticker: &str) -> JobOutcome {
            unconfigured()
        }
        async fn collect_timeline(&self, _ticker: &str) -> JobOutcome {
            unconfigured()
        }
        async fn collect_news_intelligence(&self, _ticker: &str) -> JobOutcome {
            unconfigured()
        }
    }

    pub struct UnconfiguredSignalService;

    #[async_trait]
    impl SignalService for UnconfiguredSignalService {
        async fn compute(&self, _ticker: &str) -> JobOutcome {
            unconfigured()
        }
    }

    fn unconfigured() -> JobOutcome {
        JobOutcome::Failed("no MarketService/SignalService wired into this binary".to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = CollectorConfig::from_env()?;

    if !config.enabled {
        info!("collector disabled via configuration, exiting");
        return Ok(());
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_concurrent as u32 + 2)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let store: Arc<dyn JobStore> = Arc::new(PostgresJobStore::new(pool.clone()));
    let index = Arc::new(PostgresStockIndex::new(pool.clone()));
    let events = EventBus::new();
    let queue = Arc::new(QueueApi::new(store.clone(), events.clone()));

    let executor = Arc::new(Executor::new(
        Arc::new(collaborators::UnconfiguredMarketService),
        Arc::new(collaborators::UnconfiguredSignalService),
        index.clone(),
        Duration::from_secs(120),
    ));

    let watcher = Watcher::new(
        index,
        queue,
        WatcherConfig {
            startup_delay: config.watcher_startup_delay,
            interval: config.watcher_interval,
        },
    );

    let worker_pool = Pool::new(
        store,
        executor,
        events,
        PoolConfig {
            max_concurrent: config.max_concurrent,
            heavy_job_limit: config.heavy_job_limit,
            idle_poll_interval: Duration::from_millis(500),
        },
    );

    let shutdown = CancellationToken::new();

    let watcher_shutdown = shutdown.clone();
    let watcher_handle = tokio::spawn(async move { watcher.run(watcher_shutdown).await });

    let pool_shutdown = shutdown.clone();
    let pool_handle = tokio::spawn(async move { worker_pool.run(pool_shutdown).await });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining in-flight jobs");
    shutdown.cancel();

    let _ = tokio::join!(watcher_handle, pool_handle);
    info!("collector stopped");

    Ok(())
}
