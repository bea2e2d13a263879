//! Canonical ticker registry with per-component freshness timestamps (§3, §4.2).
//!
//! Grounded on the original spec's Upsert-preserves-timestamps invariant and
//! the "Ticker record IDs" note in §9 (translate `.` -> `_` for the primary
//! key, keep `ticker` itself intact). The allow-list check in
//! `UpdateTimestamp` is realized as a closed `CollectibleField` enum rather
//! than a runtime string allow-list, following the same "reject at the type
//! boundary, not at the store" approach `job.rs::JobType::parse` takes for
//! job types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::error::{CollectorError, Result};

/// The eight collection-timestamp fields a `StockIndexEntry` tracks.
/// Closed by construction: there is no way to reference an unknown field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectibleField {
    Eod,
    Fundamentals,
    Filings,
    News,
    FilingSummaries,
    Timeline,
    Signals,
    NewsIntelligence,
}

impl CollectibleField {
    pub const ALL: [CollectibleField; 8] = [
        CollectibleField::Eod,
        CollectibleField::Fundamentals,
        CollectibleField::Filings,
        CollectibleField::News,
        CollectibleField::FilingSummaries,
        CollectibleField::Timeline,
        CollectibleField::Signals,
        CollectibleField::NewsIntelligence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectibleField::Eod => "eod_collected_at",
            CollectibleField::Fundamentals => "fundamentals_collected_at",
            CollectibleField::Filings => "filings_collected_at",
            CollectibleField::News => "news_collected_at",
            CollectibleField::FilingSummaries => "filing_summaries_collected_at",
            CollectibleField::Timeline => "timeline_collected_at",
            CollectibleField::Signals => "signals_collected_at",
            CollectibleField::NewsIntelligence => "news_intelligence_collected_at",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| CollectorError::UnknownField(s.to_string()))
    }
}

/// A tracked ticker and its collection freshness (§3 `StockIndexEntry`).
#[derive(Debug, Clone, FromRow)]
pub struct StockIndexEntry {
    pub ticker: String,
    pub code: String,
    pub exchange: String,
    pub name: String,
    pub source: String,
    /// Set once at first insert, preserved across every `Upsert`. Used by
    /// the Watcher's `PriorityNewStock` rule (see DESIGN.md Open Question 1).
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub eod_collected_at: Option<DateTime<Utc>>,
    pub fundamentals_collected_at: Option<DateTime<Utc>>,
    pub filings_collected_at: Option<DateTime<Utc>>,
    pub news_collected_at: Option<DateTime<Utc>>,
    pub filing_summaries_collected_at: Option<DateTime<Utc>>,
    pub timeline_collected_at: Option<DateTime<Utc>>,
    pub signals_collected_at: Option<DateTime<Utc>>,
    pub news_intelligence_collected_at: Option<DateTime<Utc>>,
}

impl StockIndexEntry {
    /// A freshly-seen ticker with no collection history yet.
    pub fn new(ticker: impl Into<String>, exchange: impl Into<String>, source: impl Into<String>) -> Self {
        let now = Utc::now();
        let ticker = ticker.into();
        Self {
            code: ticker.clone(),
            ticker,
            exchange: exchange.into(),
            name: String::new(),
            source: source.into(),
            created_at: now,
            last_seen_at: now,
            eod_collected_at: None,
            fundamentals_collected_at: None,
            filings_collected_at: None,
            news_collected_at: None,
            filing_summaries_collected_at: None,
            timeline_collected_at: None,
            signals_collected_at: None,
            news_intelligence_collected_at: None,
        }
    }

    /// Primary-key-safe record id: `.` replaced with `_` (§9 "Ticker record IDs").
    /// The canonical `ticker` field itself is left untouched.
    pub fn record_id(&self) -> String {
        sanitize_ticker(&self.ticker)
    }

    pub fn timestamp_for(&self, field: CollectibleField) -> Option<DateTime<Utc>> {
        match field {
            CollectibleField::Eod => self.eod_collected_at,
            CollectibleField::Fundamentals => self.fundamentals_collected_at,
            CollectibleField::Filings => self.filings_collected_at,
            CollectibleField::News => self.news_collected_at,
            CollectibleField::FilingSummaries => self.filing_summaries_collected_at,
            CollectibleField::Timeline => self.timeline_collected_at,
            CollectibleField::Signals => self.signals_collected_at,
            CollectibleField::NewsIntelligence => self.news_intelligence_collected_at,
        }
    }

    /// True if the entry was first tracked less than 5 minutes ago (§3
    /// `PriorityScheme::NewStock`).
    pub fn is_new(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at < chrono::Duration::minutes(5)
    }
}

pub fn sanitize_ticker(ticker: &str) -> String {
    ticker.replace('.', "_")
}

/// Registry of tracked tickers (§4.2).
#[async_trait]
pub trait StockIndex: Send + Sync {
    /// Insert a new entry, or merge into an existing one. On merge, every
    /// collection timestamp plus `created_at` is preserved; only `source`,
    /// `name`, and `last_seen_at` are overwritten.
    async fn upsert(&self, entry: StockIndexEntry) -> Result<()>;

    async fn get(&self, ticker: &str) -> Result<Option<StockIndexEntry>>;

    async fn list(&self) -> Result<Vec<StockIndexEntry>>;

    async fn delete(&self, ticker: &str) -> Result<()>;

    /// Update exactly one collection-timestamp field. Rejects unknown field
    /// names before any store call (§4.2 invariants, §7 "Invalid input").
    async fn update_timestamp(&self, ticker: &str, field: CollectibleField, t: DateTime<Utc>) -> Result<()>;
}

/// Postgres-backed `StockIndex`.
#[derive(Clone)]
pub struct PostgresStockIndex {
    pool: PgPool,
}

impl PostgresStockIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StockIndex for PostgresStockIndex {
    async fn upsert(&self, entry: StockIndexEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_index (id, ticker, code, exchange, name, source, created_at, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (ticker) DO UPDATE SET
                source = EXCLUDED.source,
                name = EXCLUDED.name,
                last_seen_at = EXCLUDED.last_seen_at
            "#,
        )
        .bind(entry.record_id())
        .bind(&entry.ticker)
        .bind(&entry.code)
        .bind(&entry.exchange)
        .bind(&entry.name)
        .bind(&entry.source)
        .bind(entry.created_at)
        .bind(entry.last_seen_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, ticker: &str) -> Result<Option<StockIndexEntry>> {
        let entry = sqlx::query_as::<_, StockIndexEntry>(
            "SELECT ticker, code, exchange, name, source, created_at, last_seen_at, \
             eod_collected_at, fundamentals_collected_at, filings_collected_at, news_collected_at, \
             filing_summaries_collected_at, timeline_collected_at, signals_collected_at, \
             news_intelligence_collected_at \
             FROM stock_index WHERE ticker = $1",
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn list(&self) -> Result<Vec<StockIndexEntry>> {
        let entries = sqlx::query_as::<_, StockIndexEntry>(
            "SELECT ticker, code, exchange, name, source, created_at, last_seen_at, \
             eod_collected_at, fundamentals_collected_at, filings_collected_at, news_collected_at, \
             filing_summaries_collected_at, timeline_collected_at, signals_collected_at, \
             news_intelligence_collected_at \
             FROM stock_index ORDER BY ticker",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn delete(&self, ticker: &str) -> Result<()> {
        sqlx::query("DELETE FROM stock_index WHERE ticker = $1")
            .bind(ticker)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_timestamp(&self, ticker: &str, field: CollectibleField, t: DateTime<Utc>) -> Result<()> {
        let column = field.as_str();
        // `column` is one of a fixed, compile-time-closed set of literals
        // (`CollectibleField::as_str`), never caller-provided, so this is
        // not susceptible to the injection §7 warns against.
        let query = format!("UPDATE stock_index SET {column} = $2 WHERE ticker = $1");
        sqlx::query(&query).bind(ticker).bind(t).execute(&self.pool).await?;
        Ok(())
    }
}
