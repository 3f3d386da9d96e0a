// crates/server/src/admission.rs
//! Admission controller: the synchronous check-and-create step.
//!
//! Validation → tier policy → quota-guarded insert. Admission never calls a
//! backend; it only writes one `queued` row (or refuses). The quota check
//! and the insert are a single store statement, so concurrent submissions
//! cannot overshoot a quota.

use std::sync::Arc;

use quotient_core::{backend_for, resolve_tier, validate_params, JobType, NewJob, OrchestrationError};
use quotient_db::Database;
use tokio::sync::Notify;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::tier_provider::TierProvider;

pub struct AdmissionController {
    db: Database,
    tiers: Arc<dyn TierProvider>,
    scheduler_nudge: Arc<Notify>,
}

impl AdmissionController {
    pub fn new(db: Database, tiers: Arc<dyn TierProvider>, scheduler_nudge: Arc<Notify>) -> Self {
        Self {
            db,
            tiers,
            scheduler_nudge,
        }
    }

    /// Admit a submission: returns the persisted queued job, or the error
    /// that refused it. Priority is fixed here, from the tier weight in
    /// effect right now — later tier changes never re-prioritize this job.
    pub async fn submit(
        &self,
        owner_id: &str,
        job_type: JobType,
        params: serde_json::Value,
    ) -> ApiResult<NewJob> {
        validate_params(job_type, &params).inspect_err(|_| {
            metrics::record_rejected("validation");
        })?;

        let tier = self.tiers.tier_for(owner_id);
        let policy = resolve_tier(&tier).inspect_err(|_| {
            metrics::record_rejected("unknown_tier");
        })?;

        let backend_kind = backend_for(job_type)?;
        let job = NewJob::create(
            owner_id,
            job_type,
            params,
            policy.priority_weight,
            backend_kind,
        );

        let admitted = self
            .db
            .insert_job_if_under_quota(&job, policy.max_concurrent_jobs)
            .await?;
        if !admitted {
            metrics::record_rejected("quota");
            // Re-read for the error payload; the refusal itself was atomic.
            let current = self.db.count_active_jobs(owner_id).await?;
            return Err(ApiError::from(OrchestrationError::QuotaExceeded {
                current,
                limit: policy.max_concurrent_jobs,
            }));
        }

        metrics::record_submitted(job_type.as_db_str());
        tracing::info!(
            job_id = %job.id,
            owner_id = %owner_id,
            job_type = %job_type,
            tier = %tier,
            priority = job.priority,
            "Job admitted"
        );
        self.scheduler_nudge.notify_one();
        Ok(job)
    }
}
