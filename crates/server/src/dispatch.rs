// crates/server/src/dispatch.rs
//! Backend dispatcher: routes a job to its backend kind's executor.
//!
//! The dispatcher presents a uniform submit/cancel surface so the scheduler
//! stays backend-agnostic. A job type without a registered backend is a
//! configuration defect (`UnroutableJobType`), not a user error — startup
//! validation of the routing table makes it unreachable in practice.

use std::collections::HashMap;
use std::sync::Arc;

use quotient_core::{BackendKind, Job, OrchestrationError};

use crate::backends::{ComputeBackend, InProcessBackend};
use crate::tracker::StatusTracker;

pub struct Dispatcher {
    backends: HashMap<BackendKind, Arc<dyn ComputeBackend>>,
}

impl Dispatcher {
    pub fn new(backends: Vec<Arc<dyn ComputeBackend>>) -> Self {
        let backends = backends.into_iter().map(|b| (b.kind(), b)).collect();
        Self { backends }
    }

    /// The three in-process reference executors, one per backend kind.
    pub fn in_process_defaults() -> Self {
        Self::new(vec![
            Arc::new(InProcessBackend::batch()),
            Arc::new(InProcessBackend::training()),
            Arc::new(InProcessBackend::lightweight()),
        ])
    }

    /// Submit a job to its backend kind's executor. Returns the opaque
    /// backend ref; does not wait for execution.
    pub fn dispatch(
        &self,
        job: &Job,
        tracker: Arc<StatusTracker>,
    ) -> Result<String, OrchestrationError> {
        let backend = self.backends.get(&job.backend_kind).ok_or_else(|| {
            tracing::error!(
                job_id = %job.id,
                backend_kind = %job.backend_kind,
                "No backend registered for kind (configuration defect)"
            );
            OrchestrationError::UnroutableJobType {
                job_type: job.job_type,
            }
        })?;
        backend.submit(job, tracker)
    }

    /// Forward a best-effort cancellation to the executing backend.
    pub fn cancel(&self, kind: BackendKind, backend_ref: &str) {
        match self.backends.get(&kind) {
            Some(backend) => backend.cancel(backend_ref),
            None => {
                tracing::warn!(backend_kind = %kind, "Cancel for unregistered backend kind")
            }
        }
    }

    /// Kinds with a registered executor. Used by startup validation to make
    /// sure every kind in the routing table is actually runnable.
    pub fn registered_kinds(&self) -> Vec<BackendKind> {
        self.backends.keys().copied().collect()
    }
}
