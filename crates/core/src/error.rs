// crates/core/src/error.rs
//! Error taxonomy for the orchestration subsystem.
//!
//! Admission-time variants surface synchronously to the caller; execution
//! variants are only observable through job status. The split between
//! `Dispatch` (transient, does not consume a retry) and `Execution`
//! (consumes a retry) matters: a backend that never accepted the job has
//! not attempted it.

use thiserror::Error;

use crate::job::JobType;

#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Malformed job type or params; surfaced to the caller, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Caller's tier is not in the policy table. Configuration anomaly,
    /// surfaced as an authorization failure, never retried.
    #[error("unknown subscription tier: {tier}")]
    UnknownTier { tier: String },

    /// Caller is at their concurrency limit.
    #[error("concurrency quota exceeded: {current} of {limit} active jobs")]
    QuotaExceeded { current: i64, limit: i64 },

    /// No backend kind configured for a job type. Configuration defect,
    /// fatal/alerting, never retried.
    #[error("no backend configured for job type {job_type}")]
    UnroutableJobType { job_type: JobType },

    /// Backend unavailable at submit time. The job stays queued and the next
    /// scheduling pass retries without consuming `retry_count`.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Backend accepted the job but it failed during execution. Consumes one
    /// retry and goes through backoff.
    #[error("execution failed: {0}")]
    Execution(String),
}

impl OrchestrationError {
    /// True for errors a caller caused and can correct; false for internal
    /// or transient conditions.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            OrchestrationError::Validation(_)
                | OrchestrationError::UnknownTier { .. }
                | OrchestrationError::QuotaExceeded { .. }
        )
    }
}
