// crates/server/src/tracker.rs
//! Status tracker: the single authority over job lifecycle fields.
//!
//! Backends report progress/completion/failure here; users cancel here.
//! Every mutation is a status-guarded compare-and-swap in the store, so a
//! late callback racing a cancel (or a duplicate completion) loses cleanly
//! and becomes a logged no-op.

use std::sync::Arc;

use quotient_core::{epoch_ms, Job, JobStatus};
use quotient_db::{Database, DbResult};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::dispatch::Dispatcher;
use crate::metrics;
use crate::notify::Notifier;
use crate::retry::{RetryDecision, RetryManager};

/// Lifecycle event emitted on every accepted state/progress change.
/// Feeds the SSE stream and tests.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: String,
    pub owner_id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub progress_percentage: i64,
    pub timestamp: i64,
}

impl JobEvent {
    fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            owner_id: job.owner_id.clone(),
            job_type: job.job_type.to_string(),
            status: job.status,
            progress_percentage: job.progress_percentage,
            timestamp: epoch_ms(),
        }
    }
}

/// Outcome of a cancel request, for the DELETE handler.
#[derive(Debug)]
pub enum CancelOutcome {
    Cancelled(Job),
    AlreadyTerminal(JobStatus),
    NotFound,
}

pub struct StatusTracker {
    db: Database,
    dispatcher: Arc<Dispatcher>,
    retry: RetryManager,
    notifier: Arc<dyn Notifier>,
    events_tx: broadcast::Sender<JobEvent>,
}

impl StatusTracker {
    pub fn new(db: Database, dispatcher: Arc<Dispatcher>, notifier: Arc<dyn Notifier>) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            retry: RetryManager::new(db.clone()),
            db,
            dispatcher,
            notifier,
            events_tx,
        }
    }

    /// Subscribe to lifecycle events (for SSE streaming).
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events_tx.subscribe()
    }

    /// Progress report from a backend. Valid only while the job is running
    /// and only in the non-decreasing direction; anything else is a no-op.
    pub async fn report_progress(&self, job_id: &str, percentage: i64) {
        if !(0..=100).contains(&percentage) {
            tracing::warn!(job_id = %job_id, percentage, "Progress report out of range; ignored");
            return;
        }
        match self.db.update_progress(job_id, percentage).await {
            Ok(true) => self.emit(job_id).await,
            Ok(false) => {
                tracing::debug!(
                    job_id = %job_id,
                    percentage,
                    "Progress report ignored (not running, or would decrease)"
                );
            }
            Err(e) => tracing::error!(job_id = %job_id, error = %e, "Progress write failed"),
        }
    }

    /// Completion report from a backend. Idempotent: a duplicate report, or
    /// one arriving after a cancel, affects nothing — cancelled always wins
    /// over a late completion.
    pub async fn report_completion(&self, job_id: &str, result: serde_json::Value) {
        match self.db.mark_completed(job_id, &result, epoch_ms()).await {
            Ok(true) => {
                if let Some(job) = self.fetch(job_id).await {
                    let duration_secs = match (job.started_at, job.completed_at) {
                        (Some(start), Some(end)) if end >= start => {
                            Some((end - start) as f64 / 1000.0)
                        }
                        _ => None,
                    };
                    metrics::record_completed(job.job_type.as_db_str(), duration_secs);
                    self.broadcast(&job);
                    self.notify_terminal(&job);
                }
            }
            Ok(false) => {
                tracing::debug!(job_id = %job_id, "Completion report ignored (job not running)");
            }
            Err(e) => tracing::error!(job_id = %job_id, error = %e, "Completion write failed"),
        }
    }

    /// Execution-failure report from a backend. Transitions running → failed
    /// and hands the job to the retry manager; `failed` only becomes
    /// terminal once retries are exhausted.
    pub async fn report_failure(&self, job_id: &str, error_message: &str) {
        match self.db.mark_failed(job_id, error_message, epoch_ms()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(job_id = %job_id, "Failure report ignored (job not running)");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failure write failed");
                return;
            }
        }

        if let Some(job) = self.fetch(job_id).await {
            metrics::record_failed(job.job_type.as_db_str());
            self.broadcast(&job);
        }

        match self.retry.handle_failure(job_id).await {
            Ok(RetryDecision::Requeued { not_before }) => {
                if let Some(job) = self.fetch(job_id).await {
                    metrics::record_retried(job.job_type.as_db_str());
                    tracing::info!(
                        job_id = %job_id,
                        retry_count = job.retry_count,
                        not_before,
                        "Job re-queued with backoff"
                    );
                    self.broadcast(&job);
                }
            }
            Ok(RetryDecision::Exhausted) => {
                if let Some(job) = self.fetch(job_id).await {
                    tracing::warn!(
                        job_id = %job_id,
                        retry_count = job.retry_count,
                        "Retries exhausted; job is terminally failed"
                    );
                    self.notify_terminal(&job);
                }
            }
            Ok(RetryDecision::Superseded) => {
                tracing::debug!(job_id = %job_id, "Retry skipped (job state changed concurrently)");
            }
            Err(e) => tracing::error!(job_id = %job_id, error = %e, "Retry handling failed"),
        }
    }

    /// User-requested cancellation. Authoritative against the store
    /// immediately; the backend is signalled best-effort afterwards and may
    /// still run to completion, in which case its late report is ignored.
    pub async fn cancel(&self, job_id: &str, requested_by: &str) -> DbResult<CancelOutcome> {
        let Some(job) = self.db.get_job(job_id).await? else {
            return Ok(CancelOutcome::NotFound);
        };

        if !self.db.mark_cancelled(job_id, epoch_ms()).await? {
            // The guard failed: the job already reached a terminal state.
            let status = self
                .db
                .get_job(job_id)
                .await?
                .map(|j| j.status)
                .unwrap_or(job.status);
            return Ok(CancelOutcome::AlreadyTerminal(status));
        }

        tracing::info!(
            job_id = %job_id,
            requested_by = %requested_by,
            was_running = job.status == JobStatus::Running,
            "Job cancelled"
        );
        metrics::record_cancelled(job.job_type.as_db_str());

        if let Some(backend_ref) = &job.backend_ref {
            self.dispatcher.cancel(job.backend_kind, backend_ref);
        }

        match self.db.get_job(job_id).await? {
            Some(cancelled) => {
                self.broadcast(&cancelled);
                self.notify_terminal(&cancelled);
                Ok(CancelOutcome::Cancelled(cancelled))
            }
            None => Ok(CancelOutcome::NotFound),
        }
    }

    async fn fetch(&self, job_id: &str) -> Option<Job> {
        match self.db.get_job(job_id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job read failed");
                None
            }
        }
    }

    async fn emit(&self, job_id: &str) {
        if let Some(job) = self.fetch(job_id).await {
            self.broadcast(&job);
        }
    }

    fn broadcast(&self, job: &Job) {
        // Ignore send errors (no subscribers is fine).
        let _ = self.events_tx.send(JobEvent::from_job(job));
    }

    /// Fire-and-forget terminal notification; failures never touch job state.
    fn notify_terminal(&self, job: &Job) {
        if let Err(e) = self.notifier.job_finished(job) {
            tracing::warn!(job_id = %job.id, error = %e, "Notifier failed (ignored)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use quotient_core::{BackendKind, JobType, NewJob};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNotifier {
        calls: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn job_finished(&self, _job: &Job) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("delivery channel down")
        }
    }

    async fn tracker_with_db() -> (StatusTracker, Database, NewJob) {
        let db = Database::new_in_memory().await.unwrap();
        let job = NewJob::create(
            "u1",
            JobType::SentimentAnalysis,
            serde_json::json!({"symbols": ["AAPL"]}),
            1,
            BackendKind::Lightweight,
        );
        db.insert_job_if_under_quota(&job, 10).await.unwrap();
        let tracker = StatusTracker::new(
            db.clone(),
            Arc::new(Dispatcher::new(vec![])),
            Arc::new(LogNotifier),
        );
        (tracker, db, job)
    }

    #[tokio::test]
    async fn test_progress_requires_running() {
        let (tracker, db, job) = tracker_with_db().await;

        // Still queued: report is a no-op
        tracker.report_progress(&job.id, 50).await;
        assert_eq!(
            db.get_job(&job.id).await.unwrap().unwrap().progress_percentage,
            0
        );

        db.claim_for_dispatch(&job.id, epoch_ms()).await.unwrap();
        tracker.report_progress(&job.id, 50).await;
        tracker.report_progress(&job.id, 30).await; // decrease ignored
        tracker.report_progress(&job.id, 150).await; // out of range ignored

        assert_eq!(
            db.get_job(&job.id).await.unwrap().unwrap().progress_percentage,
            50
        );
    }

    #[tokio::test]
    async fn test_completion_sets_result_and_emits_event() {
        let (tracker, db, job) = tracker_with_db().await;
        db.claim_for_dispatch(&job.id, epoch_ms()).await.unwrap();

        let mut rx = tracker.subscribe();
        tracker
            .report_completion(&job.id, serde_json::json!({"score": 1}))
            .await;

        let stored = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.result, Some(serde_json::json!({"score": 1})));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id, job.id);
        assert_eq!(event.status, JobStatus::Completed);
        assert_eq!(event.progress_percentage, 100);
    }

    #[tokio::test]
    async fn test_failure_requeues_until_exhausted() {
        let (tracker, db, job) = tracker_with_db().await;

        // Three failures re-queue (max_retries = 3), the fourth is terminal.
        for expected_retry in 1..=3 {
            db.claim_for_dispatch(&job.id, epoch_ms()).await.unwrap();
            tracker.report_failure(&job.id, "transient blowup").await;
            let stored = db.get_job(&job.id).await.unwrap().unwrap();
            assert_eq!(stored.status, JobStatus::Queued);
            assert_eq!(stored.retry_count, expected_retry);
            assert!(stored.not_before.unwrap() > epoch_ms() - 1_000);
        }

        db.claim_for_dispatch(&job.id, epoch_ms()).await.unwrap();
        tracker.report_failure(&job.id, "final blowup").await;
        let stored = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.retry_count, 3);
        assert_eq!(stored.error_message.as_deref(), Some("final blowup"));
    }

    #[tokio::test]
    async fn test_cancel_precedes_late_callbacks() {
        let (tracker, db, job) = tracker_with_db().await;
        db.claim_for_dispatch(&job.id, epoch_ms()).await.unwrap();

        let outcome = tracker.cancel(&job.id, "u1").await.unwrap();
        assert!(matches!(outcome, CancelOutcome::Cancelled(_)));

        // Late backend callbacks after the cancel are all ignored
        tracker
            .report_completion(&job.id, serde_json::json!({"late": true}))
            .await;
        tracker.report_failure(&job.id, "late failure").await;
        tracker.report_progress(&job.id, 90).await;

        let stored = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert!(stored.result.is_none());
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_conflicts() {
        let (tracker, db, job) = tracker_with_db().await;
        db.claim_for_dispatch(&job.id, epoch_ms()).await.unwrap();
        tracker
            .report_completion(&job.id, serde_json::json!({}))
            .await;

        let outcome = tracker.cancel(&job.id, "u1").await.unwrap();
        assert!(matches!(
            outcome,
            CancelOutcome::AlreadyTerminal(JobStatus::Completed)
        ));
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let (tracker, _db, _job) = tracker_with_db().await;
        let outcome = tracker.cancel("no-such-job", "u1").await.unwrap();
        assert!(matches!(outcome, CancelOutcome::NotFound));
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_affect_job_state() {
        let db = Database::new_in_memory().await.unwrap();
        let job = NewJob::create(
            "u1",
            JobType::SentimentAnalysis,
            serde_json::json!({"symbols": ["AAPL"]}),
            1,
            BackendKind::Lightweight,
        );
        db.insert_job_if_under_quota(&job, 10).await.unwrap();
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
        });
        let tracker = StatusTracker::new(
            db.clone(),
            Arc::new(Dispatcher::new(vec![])),
            notifier.clone(),
        );

        db.claim_for_dispatch(&job.id, epoch_ms()).await.unwrap();
        tracker
            .report_completion(&job.id, serde_json::json!({}))
            .await;

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
        let stored = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed, "job state unaffected");
    }
}
