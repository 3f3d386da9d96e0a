// crates/server/src/backends.rs
//! Compute backends: the opaque executors jobs are dispatched to.
//!
//! The orchestration layer only cares about the `ComputeBackend` contract:
//! submit must not block (it spawns and returns an opaque ref), results and
//! failures come back through the status tracker, and cancellation is
//! best-effort. The in-process executors here stand in for the external
//! batch cluster / managed training environment / lightweight pool with
//! distinct step-count and latency profiles; their internal "algorithms"
//! are intentionally canned.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use quotient_core::{epoch_ms, BackendKind, Job, OrchestrationError};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::tracker::StatusTracker;

/// Uniform interface the dispatcher talks to.
///
/// `submit` starts execution asynchronously and returns an opaque handle
/// without waiting for completion; the executor pushes progress and the
/// final outcome to the tracker.
pub trait ComputeBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn submit(
        &self,
        job: &Job,
        tracker: Arc<StatusTracker>,
    ) -> Result<String, OrchestrationError>;

    /// Best-effort stop signal. The backend may still run to completion; a
    /// late report against a cancelled job is ignored by the tracker.
    fn cancel(&self, backend_ref: &str);
}

/// In-process reference executor with a fixed step/latency profile.
pub struct InProcessBackend {
    kind: BackendKind,
    steps: u32,
    step_delay: Duration,
    cancels: Arc<RwLock<HashMap<String, oneshot::Sender<()>>>>,
}

impl InProcessBackend {
    pub fn new(kind: BackendKind, steps: u32, step_delay: Duration) -> Self {
        Self {
            kind,
            steps,
            step_delay,
            cancels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fixed-resource batch profile: few coarse steps, long strides.
    pub fn batch() -> Self {
        Self::new(BackendKind::Batch, 4, Duration::from_millis(300))
    }

    /// Managed-training profile: iterative, many medium steps.
    pub fn training() -> Self {
        Self::new(BackendKind::Training, 6, Duration::from_millis(150))
    }

    /// Lightweight pool profile: fast, fine-grained.
    pub fn lightweight() -> Self {
        Self::new(BackendKind::Lightweight, 3, Duration::from_millis(40))
    }

    fn register_cancel(&self, backend_ref: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        match self.cancels.write() {
            Ok(mut map) => {
                map.insert(backend_ref.to_string(), tx);
            }
            Err(e) => tracing::error!("RwLock poisoned registering cancel channel: {e}"),
        }
        rx
    }
}

impl ComputeBackend for InProcessBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn submit(
        &self,
        job: &Job,
        tracker: Arc<StatusTracker>,
    ) -> Result<String, OrchestrationError> {
        let backend_ref = format!("{}-{}", self.kind, Uuid::new_v4());
        let mut cancel_rx = self.register_cancel(&backend_ref);

        let job_id = job.id.clone();
        let job_type = job.job_type;
        let kind = self.kind;
        let steps = self.steps.max(1);
        let step_delay = self.step_delay;
        let cancels = Arc::clone(&self.cancels);
        let ref_key = backend_ref.clone();

        tokio::spawn(async move {
            for step in 1..=steps {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        tracing::debug!(job_id = %job_id, "Backend stopped on cancel signal");
                        return;
                    }
                    _ = tokio::time::sleep(step_delay) => {
                        let pct = (step as i64 * 100) / steps as i64;
                        tracker.report_progress(&job_id, pct.min(99)).await;
                    }
                }
            }
            // Finished uncancelled: drop our cancel channel entry.
            if let Ok(mut map) = cancels.write() {
                map.remove(&ref_key);
            }
            // Opaque result document; the analysis itself lives elsewhere.
            let result = serde_json::json!({
                "jobType": job_type.as_db_str(),
                "backend": kind.as_db_str(),
                "completedSteps": steps,
                "finishedAt": epoch_ms(),
            });
            tracker.report_completion(&job_id, result).await;
        });

        Ok(backend_ref)
    }

    fn cancel(&self, backend_ref: &str) {
        let sender = match self.cancels.write() {
            Ok(mut map) => map.remove(backend_ref),
            Err(e) => {
                tracing::error!("RwLock poisoned cancelling backend work: {e}");
                None
            }
        };
        match sender {
            Some(tx) => {
                // The task may have just finished; a dead receiver is fine.
                let _ = tx.send(());
            }
            None => {
                tracing::debug!(backend_ref = %backend_ref, "Cancel signal for unknown ref");
            }
        }
    }
}

impl Drop for InProcessBackend {
    fn drop(&mut self) {
        // Dropping the senders aborts any in-flight select! on the receiver.
        if let Ok(mut map) = self.cancels.write() {
            map.clear();
        }
    }
}
