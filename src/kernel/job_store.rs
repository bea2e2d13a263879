//! Persistent job queue storage (§4.1 `JobStore`).
//!
//! Grounded on `kernel/jobs/job.rs`'s `claim_jobs` (`FOR UPDATE SKIP LOCKED`
//! + `UPDATE ... RETURNING`) for atomic claiming, and `kernel/jobs/queue.rs`'s
//! `PostgresJobQueue` for the enqueue/cancel/heartbeat-shaped CRUD. Ordering
//! is `priority DESC, created_at ASC` per §3's strict-descending priority
//! requirement (the teacher orders ascending by a numeric priority where
//! lower sorts first; this subsystem's priority scale runs the other way).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{CollectorError, Result};

use super::job::{Job, JobRow, JobType};

/// Storage and claiming operations for jobs (§4.1).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job unless a pending job of the same `(job_type, ticker)`
    /// already exists. Returns `None` when the insert was skipped as a
    /// duplicate (§3 "Deduplication").
    async fn enqueue_if_absent(&self, job: Job) -> Result<Option<Job>>;

    /// Atomically claim the single highest-priority pending job, marking it
    /// `running`. `priority DESC, created_at ASC` (§3).
    async fn claim_next(&self) -> Result<Option<Job>>;

    async fn mark_completed(&self, id: Uuid) -> Result<()>;

    async fn mark_failed(&self, id: Uuid, error: String) -> Result<()>;

    /// Cancel a pending job. No-op (returns `Ok(false)`) if the job is not
    /// pending or does not exist.
    async fn cancel(&self, id: Uuid) -> Result<bool>;

    /// Cancel every pending job for a ticker, returning the count cancelled.
    async fn cancel_by_ticker(&self, ticker: &str) -> Result<u64>;

    async fn set_priority(&self, id: Uuid, priority: i32) -> Result<bool>;

    /// Highest priority across *all* current pending jobs, regardless of
    /// ticker (§4.1 `GetMaxPriority`; push-to-top must beat every pending
    /// job, not just ones for the same ticker).
    async fn max_pending_priority(&self) -> Result<Option<i32>>;

    async fn has_pending_job(&self, job_type: JobType, ticker: &str) -> Result<bool>;

    async fn count_pending(&self) -> Result<i64>;

    async fn list_pending(&self) -> Result<Vec<Job>>;

    async fn list_by_ticker(&self, ticker: &str) -> Result<Vec<Job>>;

    async fn get(&self, id: Uuid) -> Result<Job>;

    /// Delete terminal (completed/failed/cancelled) jobs completed before
    /// `cutoff`. Returns the count purged.
    async fn purge_completed(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Postgres-backed `JobStore`.
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn enqueue_if_absent(&self, job: Job) -> Result<Option<Job>> {
        // The partial unique index `jobs_pending_dedup_idx` backstops this at
        // the DB level; the `WHERE NOT EXISTS` makes the common case a
        // silent no-op instead of a constraint-violation error.
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (id, job_type, ticker, priority, status, created_at, attempts)
            SELECT $1, $2, $3, $4, 'pending', $5, 0
            WHERE NOT EXISTS (
                SELECT 1 FROM jobs
                WHERE job_type = $2 AND ticker = $3 AND status = 'pending'
            )
            RETURNING id, job_type, ticker, priority, status, created_at,
                      started_at, completed_at, error, attempts
            "#,
        )
        .bind(job.id)
        .bind(job.job_type.as_str())
        .bind(&job.ticker)
        .bind(job.priority)
        .bind(job.created_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            WITH next_job AS (
                SELECT id FROM jobs
                WHERE status = 'pending'
                ORDER BY priority DESC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running', started_at = NOW()
            WHERE id IN (SELECT id FROM next_job)
            RETURNING id, job_type, ticker, priority, status, created_at,
                      started_at, completed_at, error, attempts
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn mark_completed(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', completed_at = NOW() WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: String) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', completed_at = NOW(), error = $2, attempts = attempts + 1
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'cancelled', completed_at = NOW() WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel_by_ticker(&self, ticker: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'cancelled', completed_at = NOW() WHERE ticker = $1 AND status = 'pending'",
        )
        .bind(ticker)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_priority(&self, id: Uuid, priority: i32) -> Result<bool> {
        let result = sqlx::query("UPDATE jobs SET priority = $2 WHERE id = $1 AND status = 'pending'")
            .bind(id)
            .bind(priority)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn max_pending_priority(&self) -> Result<Option<i32>> {
        // MAX(...) over zero pending rows yields one row with a NULL
        // aggregate, not zero rows, so the column itself must be Option<i32>
        // rather than the query_as row being Option.
        let (max,): (Option<i32>,) =
            sqlx::query_as("SELECT MAX(priority) FROM jobs WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(max)
    }

    async fn has_pending_job(&self, job_type: JobType, ticker: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM jobs WHERE job_type = $1 AND ticker = $2 AND status = 'pending'",
        )
        .bind(job_type.as_str())
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn count_pending(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_pending(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, job_type, ticker, priority, status, created_at,
                   started_at, completed_at, error, attempts
            FROM jobs
            WHERE status = 'pending'
            ORDER BY priority DESC, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn list_by_ticker(&self, ticker: &str) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, job_type, ticker, priority, status, created_at,
                   started_at, completed_at, error, attempts
            FROM jobs
            WHERE ticker = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn get(&self, id: Uuid) -> Result<Job> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, job_type, ticker, priority, status, created_at,
                   started_at, completed_at, error, attempts
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CollectorError::NotFound(id))?;

        Job::try_from(row)
    }

    async fn purge_completed(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'failed', 'cancelled')
              AND completed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
