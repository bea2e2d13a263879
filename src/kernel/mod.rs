//! The background data-collection subsystem (see `SPEC_FULL.md` §2 for the
//! component map). Mirrors `packages/server/src/kernel/jobs/` in the
//! teacher repo, one module per component.

pub mod event_bus;
pub mod events;
pub mod executor;
pub mod job;
pub mod job_store;
pub mod pool;
pub mod queue_api;
pub mod stock_index;
pub mod watcher;

/// In-memory fakes, exported unconditionally (not `cfg(test)`-gated) so
/// that both unit tests here and integration tests under `tests/` can use
/// them, matching `kernel/jobs/manager.rs`'s unconditionally-exported
/// `TestJobManager`.
pub mod testing;

pub use event_bus::{EventBus, Subscription};
pub use events::{JobEvent, JobEventKind};
pub use executor::{Executor, JobOutcome, MarketService, SignalService};
pub use job::{priority, Job, JobStatus, JobType};
pub use job_store::{JobStore, PostgresJobStore};
pub use pool::{Pool, PoolConfig};
pub use queue_api::QueueApi;
pub use stock_index::{CollectibleField, PostgresStockIndex, StockIndex, StockIndexEntry};
pub use watcher::{Watcher, WatcherConfig};
