//! Job model: types, statuses, and priority constants (§3, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::error::CollectorError;

/// Stable job-type identifiers and their default priorities (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    CollectEod,
    CollectEodBulk,
    CollectFundamentals,
    ComputeSignals,
    CollectFilings,
    CollectNews,
    CollectFilingSummaries,
    CollectTimeline,
    CollectNewsIntelligence,
}

impl JobType {
    pub const ALL: [JobType; 9] = [
        JobType::CollectEod,
        JobType::CollectEodBulk,
        JobType::CollectFundamentals,
        JobType::ComputeSignals,
        JobType::CollectFilings,
        JobType::CollectNews,
        JobType::CollectFilingSummaries,
        JobType::CollectTimeline,
        JobType::CollectNewsIntelligence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::CollectEod => "collect_eod",
            JobType::CollectEodBulk => "collect_eod_bulk",
            JobType::CollectFundamentals => "collect_fundamentals",
            JobType::ComputeSignals => "compute_signals",
            JobType::CollectFilings => "collect_filings",
            JobType::CollectNews => "collect_news",
            JobType::CollectFilingSummaries => "collect_filing_summaries",
            JobType::CollectTimeline => "collect_timeline",
            JobType::CollectNewsIntelligence => "collect_news_intelligence",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CollectorError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CollectorError::UnknownJobType(s.to_string()))
    }

    /// Default priority per §6.
    pub fn default_priority(&self) -> i32 {
        match self {
            JobType::CollectEod => 10,
            JobType::CollectEodBulk => 10,
            JobType::CollectFundamentals => 8,
            JobType::ComputeSignals => 7,
            JobType::CollectFilings => 5,
            JobType::CollectNews => 5,
            JobType::CollectFilingSummaries => 3,
            JobType::CollectTimeline => 3,
            JobType::CollectNewsIntelligence => 3,
        }
    }

    /// Heavy jobs (PDF/AI-bearing) are subject to the Pool's secondary
    /// concurrency gate (§4.7).
    pub fn is_heavy(&self) -> bool {
        matches!(
            self,
            JobType::CollectFilingSummaries | JobType::CollectTimeline | JobType::CollectNewsIntelligence
        )
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job status lifecycle (§3): `pending -> running -> {completed | failed}`,
/// or `pending -> cancelled`. No backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Priority constants from the scheme in §3.
pub mod priority {
    pub const NEW_STOCK: i32 = 15;
    pub const MANUAL: i32 = 20;
    pub const URGENT: i32 = 50;
}

/// A queued unit of collection work.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub job_type: JobType,
    /// For bulk-EOD jobs, this carries the exchange code instead of a ticker.
    pub ticker: String,
    #[builder(default)]
    pub priority: i32,
    #[builder(default = JobStatus::Pending)]
    pub status: JobStatus,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub error: Option<String>,
    #[builder(default = 0)]
    pub attempts: i32,
}

impl Job {
    /// Build a new pending job with the job type's default priority.
    pub fn new(job_type: JobType, ticker: impl Into<String>) -> Self {
        Self::builder()
            .job_type(job_type)
            .ticker(ticker.into())
            .priority(job_type.default_priority())
            .build()
    }

    /// Build a new pending job with an explicit priority override.
    pub fn with_priority(job_type: JobType, ticker: impl Into<String>, priority: i32) -> Self {
        Self::builder()
            .job_type(job_type)
            .ticker(ticker.into())
            .priority(priority)
            .build()
    }
}

/// Raw row shape for `sqlx::query_as`, decoupled from `Job` because
/// `job_type` is stored as `TEXT` and parsed through `JobType::parse` rather
/// than relying on an sqlx enum mapping (keeps the allow-list validation in
/// one place, §7 "Invalid input").
#[derive(FromRow)]
pub(crate) struct JobRow {
    pub id: Uuid,
    pub job_type: String,
    pub ticker: String,
    pub priority: i32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub attempts: i32,
}

impl TryFrom<JobRow> for Job {
    type Error = CollectorError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            job_type: JobType::parse(&row.job_type)?,
            ticker: row.ticker,
            priority: row.priority,
            status: row.status,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error: row.error,
            attempts: row.attempts,
        })
    }
}
