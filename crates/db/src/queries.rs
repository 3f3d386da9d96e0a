// crates/db/src/queries.rs
// Job store operations: admission insert, candidate selection, and the
// status-guarded lifecycle transitions.

use std::collections::HashMap;

use crate::{Database, DbError, DbResult};
use quotient_core::{BackendKind, Job, JobStatus, JobType, NewJob};

#[derive(Debug)]
struct JobRow {
    id: String,
    owner_id: String,
    job_type: String,
    params: String,
    status: String,
    priority: i64,
    progress_percentage: i64,
    retry_count: i64,
    max_retries: i64,
    result: Option<String>,
    error_message: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    failed_at: Option<i64>,
    cancelled_at: Option<i64>,
    not_before: Option<i64>,
    backend_kind: String,
    backend_ref: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for JobRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            job_type: row.try_get("job_type")?,
            params: row.try_get("params")?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            progress_percentage: row.try_get("progress_percentage")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            result: row.try_get("result")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            failed_at: row.try_get("failed_at")?,
            cancelled_at: row.try_get("cancelled_at")?,
            not_before: row.try_get("not_before")?,
            backend_kind: row.try_get("backend_kind")?,
            backend_ref: row.try_get("backend_ref")?,
        })
    }
}

impl JobRow {
    fn into_job(self) -> DbResult<Job> {
        let job_type = JobType::from_db_str(&self.job_type)
            .ok_or_else(|| DbError::Corrupt(format!("unknown job_type '{}'", self.job_type)))?;
        let status = JobStatus::from_db_str(&self.status)
            .ok_or_else(|| DbError::Corrupt(format!("unknown status '{}'", self.status)))?;
        let backend_kind = BackendKind::from_db_str(&self.backend_kind).ok_or_else(|| {
            DbError::Corrupt(format!("unknown backend_kind '{}'", self.backend_kind))
        })?;
        let params = serde_json::from_str(&self.params)
            .map_err(|e| DbError::Corrupt(format!("params for job {}: {e}", self.id)))?;
        let result = self
            .result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| DbError::Corrupt(format!("result for job {}: {e}", self.id)))?;

        Ok(Job {
            id: self.id,
            owner_id: self.owner_id,
            job_type,
            params,
            status,
            priority: self.priority,
            progress_percentage: self.progress_percentage,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            result,
            error_message: self.error_message,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            failed_at: self.failed_at,
            cancelled_at: self.cancelled_at,
            not_before: self.not_before,
            backend_kind,
            backend_ref: self.backend_ref,
        })
    }
}

impl Database {
    // ========================================================================
    // Admission
    // ========================================================================

    /// Insert a new queued job unless the owner is already at their active
    /// quota. The count and the insert are a single statement, so two
    /// concurrent admissions cannot both squeeze under the limit — the race
    /// resolves conservatively, never by under-counting.
    ///
    /// Returns `true` if the job was admitted.
    pub async fn insert_job_if_under_quota(
        &self,
        job: &NewJob,
        max_concurrent_jobs: i64,
    ) -> DbResult<bool> {
        let params = serde_json::to_string(&job.params)
            .map_err(|e| DbError::Corrupt(format!("params for new job: {e}")))?;
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, owner_id, job_type, params, status, priority,
                              retry_count, max_retries, created_at, backend_kind)
            SELECT ?1, ?2, ?3, ?4, 'queued', ?5, 0, ?6, ?7, ?8
            WHERE (SELECT COUNT(*) FROM jobs
                   WHERE owner_id = ?2 AND status IN ('queued', 'running')) < ?9
            "#,
        )
        .bind(&job.id)
        .bind(&job.owner_id)
        .bind(job.job_type.as_db_str())
        .bind(&params)
        .bind(job.priority)
        .bind(job.max_retries)
        .bind(job.created_at)
        .bind(job.backend_kind.as_db_str())
        .bind(max_concurrent_jobs)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Count the owner's jobs currently holding quota (queued or running).
    pub async fn count_active_jobs(&self, owner_id: &str) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM jobs WHERE owner_id = ?1 AND status IN ('queued', 'running')",
        )
        .bind(owner_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row.0)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fetch a job by id.
    pub async fn get_job(&self, id: &str) -> DbResult<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    /// Fetch a job by id, scoped to its owner. Used by the API so callers
    /// cannot observe other users' jobs.
    pub async fn get_job_for_owner(&self, id: &str, owner_id: &str) -> DbResult<Option<Job>> {
        let row: Option<JobRow> =
            sqlx::query_as("SELECT * FROM jobs WHERE id = ?1 AND owner_id = ?2")
                .bind(id)
                .bind(owner_id)
                .fetch_optional(self.pool())
                .await?;
        row.map(JobRow::into_job).transpose()
    }

    /// All jobs belonging to one owner, highest priority first, newest first
    /// within equal priority.
    pub async fn list_jobs_for_owner(&self, owner_id: &str) -> DbResult<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM jobs WHERE owner_id = ?1 ORDER BY priority DESC, created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Eligible queued candidates for one scheduling pass: highest priority
    /// first, FIFO within equal priority. Jobs parked behind a retry
    /// backoff (`not_before` in the future) are invisible here.
    pub async fn next_queued(&self, now: i64, limit: i64) -> DbResult<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE status = 'queued' AND (not_before IS NULL OR not_before <= ?1)
            ORDER BY priority DESC, created_at ASC
            LIMIT ?2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Running-job counts grouped by backend kind, for capacity checks.
    /// Claimed-but-not-yet-submitted jobs count as running — over-counting
    /// is the safe direction for capacity.
    pub async fn running_counts_by_backend(&self) -> DbResult<HashMap<BackendKind, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT backend_kind, COUNT(*) FROM jobs WHERE status = 'running' GROUP BY backend_kind",
        )
        .fetch_all(self.pool())
        .await?;
        let mut counts = HashMap::new();
        for (kind, count) in rows {
            let kind = BackendKind::from_db_str(&kind)
                .ok_or_else(|| DbError::Corrupt(format!("unknown backend_kind '{kind}'")))?;
            counts.insert(kind, count);
        }
        Ok(counts)
    }

    // ========================================================================
    // Lifecycle transitions (status-guarded compare-and-swap)
    //
    // Each returns whether a row actually changed. A `false` means the job
    // was no longer in the expected state — the caller treats that as "lost
    // the race", never as an error.
    // ========================================================================

    /// queued → running, before the backend submit. A failed claim means
    /// another pass took the job or the user cancelled it.
    pub async fn claim_for_dispatch(&self, id: &str, now: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'running', started_at = ?2
             WHERE id = ?1 AND status = 'queued'",
        )
        .bind(id)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record the opaque backend handle once the submit call returned.
    pub async fn attach_backend_ref(&self, id: &str, backend_ref: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET backend_ref = ?2 WHERE id = ?1 AND status = 'running'",
        )
        .bind(id)
        .bind(backend_ref)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// running → queued after a dispatch-time failure. The backend never
    /// accepted the job, so the claim is undone: `started_at` is cleared
    /// and `retry_count` is untouched.
    pub async fn release_claim(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'queued', started_at = NULL, backend_ref = NULL
             WHERE id = ?1 AND status = 'running'",
        )
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Progress write: only while running, only non-decreasing. A stale or
    /// out-of-order report simply affects zero rows.
    pub async fn update_progress(&self, id: &str, percentage: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET progress_percentage = ?2
             WHERE id = ?1 AND status = 'running' AND progress_percentage <= ?2",
        )
        .bind(id)
        .bind(percentage)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// running → completed. Idempotent: a second completion (or one arriving
    /// after a cancel) affects zero rows because the status guard fails.
    pub async fn mark_completed(
        &self,
        id: &str,
        result_doc: &serde_json::Value,
        now: i64,
    ) -> DbResult<bool> {
        let result_json = serde_json::to_string(result_doc)
            .map_err(|e| DbError::Corrupt(format!("result for job {id}: {e}")))?;
        let result = sqlx::query(
            "UPDATE jobs SET status = 'completed', completed_at = ?2, result = ?3,
                             progress_percentage = 100, backend_ref = NULL
             WHERE id = ?1 AND status = 'running'",
        )
        .bind(id)
        .bind(now)
        .bind(&result_json)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// running → failed (not yet terminal; the retry manager decides).
    pub async fn mark_failed(&self, id: &str, error_message: &str, now: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'failed', failed_at = ?2, error_message = ?3,
                             backend_ref = NULL
             WHERE id = ?1 AND status = 'running'",
        )
        .bind(id)
        .bind(now)
        .bind(error_message)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// failed → queued for a retry, guarded by the attempts ceiling. The
    /// job stays invisible to candidate selection until `not_before`.
    pub async fn requeue_for_retry(&self, id: &str, not_before: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'queued', retry_count = retry_count + 1,
                             not_before = ?2, started_at = NULL, backend_ref = NULL,
                             progress_percentage = 0
             WHERE id = ?1 AND status = 'failed' AND retry_count < max_retries",
        )
        .bind(id)
        .bind(not_before)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// {queued, running} → cancelled. Authoritative and immediate; late
    /// backend callbacks against a cancelled job find the status guard
    /// closed and become no-ops.
    pub async fn mark_cancelled(&self, id: &str, now: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'cancelled', cancelled_at = ?2, backend_ref = NULL
             WHERE id = ?1 AND status IN ('queued', 'running')",
        )
        .bind(id)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
