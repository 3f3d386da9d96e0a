// crates/server/src/notify.rs
//! Terminal-transition notifications.
//!
//! The notification system is an external collaborator: the tracker signals
//! it when a job reaches a terminal state and moves on. A notifier failure
//! never affects job state — it is logged and dropped.

use quotient_core::Job;

/// Collaborator interface for "your job finished" style notifications.
pub trait Notifier: Send + Sync {
    fn job_finished(&self, job: &Job) -> anyhow::Result<()>;
}

/// Default notifier: a structured log line. Deployments swap in a real
/// delivery channel (email, push, webhook) behind the same trait.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn job_finished(&self, job: &Job) -> anyhow::Result<()> {
        tracing::info!(
            job_id = %job.id,
            owner_id = %job.owner_id,
            job_type = %job.job_type,
            status = %job.status,
            "Job reached terminal state"
        );
        Ok(())
    }
}
