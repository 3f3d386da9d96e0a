// crates/server/src/retry.rs
//! Retry manager: decides what happens to a job that just failed.
//!
//! Re-queueing never sleeps: the job gets a `not_before` timestamp and the
//! scheduler's candidate selection skips it until the backoff has elapsed.
//! No timer outlives a process restart because there is no timer.

use quotient_core::{backoff_delay, epoch_ms, JobStatus};
use quotient_db::{Database, DbResult};

/// What the retry manager decided for a failed job.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Attempts remain: back in the queue, eligible at `not_before`.
    Requeued { not_before: i64 },
    /// Ceiling reached: the job stays terminally failed.
    Exhausted,
    /// The job moved out of `failed` concurrently (e.g. cancelled); nothing
    /// to do.
    Superseded,
}

pub struct RetryManager {
    db: Database,
}

impl RetryManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Apply retry policy to a job that was just marked failed.
    pub async fn handle_failure(&self, job_id: &str) -> DbResult<RetryDecision> {
        let Some(job) = self.db.get_job(job_id).await? else {
            return Ok(RetryDecision::Superseded);
        };
        if job.status != JobStatus::Failed {
            return Ok(RetryDecision::Superseded);
        }
        if job.retry_count >= job.max_retries {
            return Ok(RetryDecision::Exhausted);
        }

        let not_before = epoch_ms() + backoff_delay(job.retry_count);
        if self.db.requeue_for_retry(job_id, not_before).await? {
            Ok(RetryDecision::Requeued { not_before })
        } else {
            Ok(RetryDecision::Superseded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotient_core::{BackendKind, JobType, NewJob, BACKOFF_BASE_MS};

    async fn failed_job(db: &Database) -> String {
        let job = NewJob::create(
            "u1",
            JobType::AnomalyDetection,
            serde_json::json!({"symbol": "AAPL"}),
            1,
            BackendKind::Lightweight,
        );
        db.insert_job_if_under_quota(&job, 10).await.unwrap();
        db.claim_for_dispatch(&job.id, epoch_ms()).await.unwrap();
        db.mark_failed(&job.id, "boom", epoch_ms()).await.unwrap();
        job.id
    }

    #[tokio::test]
    async fn test_first_failure_requeues_with_base_backoff() {
        let db = Database::new_in_memory().await.unwrap();
        let job_id = failed_job(&db).await;
        let manager = RetryManager::new(db.clone());

        let before = epoch_ms();
        let decision = manager.handle_failure(&job_id).await.unwrap();
        let RetryDecision::Requeued { not_before } = decision else {
            panic!("expected requeue, got {decision:?}");
        };
        assert!(not_before >= before + BACKOFF_BASE_MS);

        let stored = db.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Queued);
        assert_eq!(stored.retry_count, 1);
    }

    #[tokio::test]
    async fn test_exhausted_after_max_retries() {
        let db = Database::new_in_memory().await.unwrap();
        let job_id = failed_job(&db).await;
        let manager = RetryManager::new(db.clone());

        for _ in 0..3 {
            assert!(matches!(
                manager.handle_failure(&job_id).await.unwrap(),
                RetryDecision::Requeued { .. }
            ));
            db.claim_for_dispatch(&job_id, epoch_ms()).await.unwrap();
            db.mark_failed(&job_id, "boom", epoch_ms()).await.unwrap();
        }

        assert_eq!(
            manager.handle_failure(&job_id).await.unwrap(),
            RetryDecision::Exhausted
        );
        let stored = db.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.retry_count, stored.max_retries);
    }

    #[tokio::test]
    async fn test_superseded_when_job_left_failed_state() {
        let db = Database::new_in_memory().await.unwrap();
        let job_id = failed_job(&db).await;
        let manager = RetryManager::new(db.clone());

        // A cancel sneaks in after the failure — cancel is not possible from
        // `failed`, so emulate the supersede by re-queueing manually first.
        db.requeue_for_retry(&job_id, 0).await.unwrap();

        assert_eq!(
            manager.handle_failure(&job_id).await.unwrap(),
            RetryDecision::Superseded
        );
    }

    #[tokio::test]
    async fn test_missing_job_is_superseded() {
        let db = Database::new_in_memory().await.unwrap();
        let manager = RetryManager::new(db);
        assert_eq!(
            manager.handle_failure("ghost").await.unwrap(),
            RetryDecision::Superseded
        );
    }
}
