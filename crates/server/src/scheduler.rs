// crates/server/src/scheduler.rs
//! Scheduler: the control loop that turns queued jobs into running ones.
//!
//! Each pass takes a capacity snapshot per backend kind, walks the eligible
//! queued candidates in priority order (FIFO within equal priority), and
//! dispatches every candidate whose backend kind has a free slot. A full
//! backend kind skips only its own candidates — no head-of-line blocking
//! across kinds.
//!
//! Dispatch is claim-first: the queued → running CAS happens before the
//! backend submit, then the opaque ref is attached. A dispatch-time failure
//! releases the claim, leaving the job queued with `retry_count` untouched
//! — the backend never attempted it. Per-job failures are caught and
//! logged; nothing escapes a pass and kills the loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use quotient_core::{capacity_limit, epoch_ms};
use quotient_db::{Database, DbResult};
use tokio::sync::Notify;

use crate::dispatch::Dispatcher;
use crate::metrics;
use crate::tracker::StatusTracker;

/// Upper bound on candidates examined per pass.
const CANDIDATE_BATCH: i64 = 64;

pub struct Scheduler {
    db: Database,
    dispatcher: Arc<Dispatcher>,
    tracker: Arc<StatusTracker>,
    nudge: Arc<Notify>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(
        db: Database,
        dispatcher: Arc<Dispatcher>,
        tracker: Arc<StatusTracker>,
        nudge: Arc<Notify>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            db,
            dispatcher,
            tracker,
            nudge,
            poll_interval,
        }
    }

    /// Run the scheduling loop until the task is aborted. Wakes on the poll
    /// interval or earlier when admission nudges it.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                poll_interval_ms = self.poll_interval.as_millis() as u64,
                "Scheduler loop started"
            );
            loop {
                let start = Instant::now();
                match self.run_pass().await {
                    Ok(dispatched) => {
                        metrics::record_scheduler_pass(start.elapsed().as_secs_f64(), dispatched);
                        if dispatched > 0 {
                            tracing::debug!(dispatched, "Scheduling pass dispatched jobs");
                        }
                    }
                    Err(e) => {
                        // A store hiccup fails the pass, never the loop.
                        tracing::error!(error = %e, "Scheduling pass failed");
                    }
                }

                tokio::select! {
                    _ = self.nudge.notified() => {}
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        })
    }

    /// One scheduling pass. Returns how many jobs were dispatched.
    pub async fn run_pass(&self) -> DbResult<usize> {
        let now = epoch_ms();
        let mut running = self.db.running_counts_by_backend().await?;
        let candidates = self.db.next_queued(now, CANDIDATE_BATCH).await?;

        let mut dispatched = 0;
        for job in candidates {
            let kind = job.backend_kind;
            let used = running.entry(kind).or_insert(0);
            if *used >= capacity_limit(kind) {
                // This kind is saturated; later candidates for other kinds
                // still get their chance.
                continue;
            }

            if !self.db.claim_for_dispatch(&job.id, epoch_ms()).await? {
                // Lost the claim — cancelled or taken by a concurrent pass.
                continue;
            }

            match self.dispatcher.dispatch(&job, self.tracker.clone()) {
                Ok(backend_ref) => {
                    if self.db.attach_backend_ref(&job.id, &backend_ref).await? {
                        *used += 1;
                        dispatched += 1;
                        metrics::record_dispatched(kind.as_db_str());
                        tracing::debug!(
                            job_id = %job.id,
                            backend_kind = %kind,
                            backend_ref = %backend_ref,
                            "Job dispatched"
                        );
                    } else {
                        // Cancelled between claim and attach: tell the
                        // backend to stop the work it just accepted.
                        tracing::debug!(job_id = %job.id, "Job cancelled mid-dispatch");
                        self.dispatcher.cancel(kind, &backend_ref);
                    }
                }
                Err(e) => {
                    // Transient submit failure: undo the claim so the next
                    // pass tries again without touching retry_count.
                    metrics::record_dispatch_error(kind.as_db_str());
                    tracing::warn!(
                        job_id = %job.id,
                        backend_kind = %kind,
                        error = %e,
                        "Dispatch failed; job stays queued"
                    );
                    self.db.release_claim(&job.id).await?;
                }
            }
        }

        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ComputeBackend;
    use crate::notify::LogNotifier;
    use quotient_core::{BackendKind, Job, JobStatus, JobType, NewJob, OrchestrationError};
    use std::sync::Mutex;

    /// Records submit order; never completes anything on its own.
    struct RecordingBackend {
        kind: BackendKind,
        submitted: Mutex<Vec<String>>,
        fail_submits: bool,
    }

    impl RecordingBackend {
        fn new(kind: BackendKind) -> Self {
            Self {
                kind,
                submitted: Mutex::new(Vec::new()),
                fail_submits: false,
            }
        }

        fn failing(kind: BackendKind) -> Self {
            Self {
                fail_submits: true,
                ..Self::new(kind)
            }
        }

        fn submitted_ids(&self) -> Vec<String> {
            self.submitted.lock().unwrap().clone()
        }
    }

    impl ComputeBackend for RecordingBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn submit(
            &self,
            job: &Job,
            _tracker: Arc<StatusTracker>,
        ) -> Result<String, OrchestrationError> {
            if self.fail_submits {
                return Err(OrchestrationError::Dispatch("backend unreachable".into()));
            }
            self.submitted.lock().unwrap().push(job.id.clone());
            Ok(format!("{}-test-ref", self.kind))
        }

        fn cancel(&self, _backend_ref: &str) {}
    }

    struct Harness {
        db: Database,
        scheduler: Scheduler,
        backend: Arc<RecordingBackend>,
    }

    async fn harness(backend: RecordingBackend) -> Harness {
        let db = Database::new_in_memory().await.unwrap();
        let backend = Arc::new(backend);
        let dispatcher = Arc::new(Dispatcher::new(vec![backend.clone()]));
        let tracker = Arc::new(StatusTracker::new(
            db.clone(),
            dispatcher.clone(),
            Arc::new(LogNotifier),
        ));
        let scheduler = Scheduler::new(
            db.clone(),
            dispatcher,
            tracker,
            Arc::new(Notify::new()),
            Duration::from_millis(50),
        );
        Harness {
            db,
            scheduler,
            backend,
        }
    }

    async fn queue_job(db: &Database, owner: &str, priority: i64, created_at: i64) -> String {
        let mut job = NewJob::create(
            owner,
            JobType::SentimentAnalysis,
            serde_json::json!({"symbols": ["AAPL"]}),
            priority,
            BackendKind::Lightweight,
        );
        job.created_at = created_at;
        db.insert_job_if_under_quota(&job, 100).await.unwrap();
        job.id
    }

    #[tokio::test]
    async fn test_pass_dispatches_in_priority_order() {
        let h = harness(RecordingBackend::new(BackendKind::Lightweight)).await;

        // Lower-priority job is older; higher-priority job is newer.
        let low = queue_job(&h.db, "basic", 1, 1_000).await;
        let high = queue_job(&h.db, "pro", 10, 2_000).await;

        let dispatched = h.scheduler.run_pass().await.unwrap();
        assert_eq!(dispatched, 2);
        assert_eq!(h.backend.submitted_ids(), vec![high.clone(), low.clone()]);

        for id in [&high, &low] {
            let job = h.db.get_job(id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Running);
            assert_eq!(job.backend_ref.as_deref(), Some("lightweight-test-ref"));
            assert!(job.started_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_saturated_backend_skips_without_blocking() {
        let h = harness(RecordingBackend::new(BackendKind::Lightweight)).await;

        // Fill the lightweight capacity (8) with running jobs.
        for n in 0..8 {
            let id = queue_job(&h.db, &format!("filler-{n}"), 1, n).await;
            h.db.claim_for_dispatch(&id, epoch_ms()).await.unwrap();
        }
        let waiting = queue_job(&h.db, "u1", 5, 100).await;

        let dispatched = h.scheduler.run_pass().await.unwrap();
        assert_eq!(dispatched, 0);
        assert!(h.backend.submitted_ids().is_empty());

        let job = h.db.get_job(&waiting).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued, "candidate skipped, not lost");
    }

    #[tokio::test]
    async fn test_dispatch_failure_releases_claim_without_retry_cost() {
        let h = harness(RecordingBackend::failing(BackendKind::Lightweight)).await;
        let id = queue_job(&h.db, "u1", 1, 1_000).await;

        let dispatched = h.scheduler.run_pass().await.unwrap();
        assert_eq!(dispatched, 0);

        let job = h.db.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued, "job remains queued");
        assert_eq!(job.retry_count, 0, "dispatch failure is not an attempt");
        assert!(job.started_at.is_none());

        // The next pass tries again.
        let dispatched = h.scheduler.run_pass().await.unwrap();
        assert_eq!(dispatched, 0);
        assert_eq!(
            h.db.get_job(&id).await.unwrap().unwrap().status,
            JobStatus::Queued
        );
    }

    #[tokio::test]
    async fn test_cancelled_job_is_never_dispatched() {
        let h = harness(RecordingBackend::new(BackendKind::Lightweight)).await;
        let id = queue_job(&h.db, "u1", 1, 1_000).await;

        h.db.mark_cancelled(&id, epoch_ms()).await.unwrap();

        let dispatched = h.scheduler.run_pass().await.unwrap();
        assert_eq!(dispatched, 0);
        assert!(h.backend.submitted_ids().is_empty());
        assert_eq!(
            h.db.get_job(&id).await.unwrap().unwrap().status,
            JobStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_backoff_parked_job_is_invisible_to_pass() {
        let h = harness(RecordingBackend::new(BackendKind::Lightweight)).await;
        let id = queue_job(&h.db, "u1", 1, 1_000).await;

        // Fail once so the job parks behind a future not_before.
        h.db.claim_for_dispatch(&id, epoch_ms()).await.unwrap();
        h.db.mark_failed(&id, "boom", epoch_ms()).await.unwrap();
        h.db.requeue_for_retry(&id, epoch_ms() + 60_000).await.unwrap();

        let dispatched = h.scheduler.run_pass().await.unwrap();
        assert_eq!(dispatched, 0);
        assert!(h.backend.submitted_ids().is_empty());
    }
}
