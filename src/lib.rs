//! Background data-collection subsystem for a portfolio analytics server:
//! a durable priority job queue, a freshness watcher over a shared stock
//! index, a bounded concurrent processor pool, and a live event bus for
//! admin clients. See `SPEC_FULL.md` for the full component map.

pub mod config;
pub mod error;
pub mod kernel;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
