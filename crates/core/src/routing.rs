// crates/core/src/routing.rs
//! Static routing table from job type to backend kind.
//!
//! Routing used to be ad-hoc conditional dispatch; it is now a strategy
//! table validated once at startup, so an unroutable job type is caught
//! before any job reaches the scheduler.

use crate::error::OrchestrationError;
use crate::job::{BackendKind, JobType};

/// One backend kind's routing entry: the job types it handles and how many
/// of them may run on it at once.
#[derive(Debug, Clone, Copy)]
pub struct BackendDescriptor {
    pub kind: BackendKind,
    pub supported_job_types: &'static [JobType],
    pub capacity_limit: i64,
}

/// The routing table. Each job type appears under exactly one kind.
pub const ROUTING_TABLE: [BackendDescriptor; 3] = [
    BackendDescriptor {
        kind: BackendKind::Batch,
        supported_job_types: &[JobType::MarketDataAnalysis, JobType::CorrelationAnalysis],
        capacity_limit: 2,
    },
    BackendDescriptor {
        kind: BackendKind::Training,
        supported_job_types: &[
            JobType::PortfolioOptimization,
            JobType::FinancialForecasting,
        ],
        capacity_limit: 3,
    },
    BackendDescriptor {
        kind: BackendKind::Lightweight,
        supported_job_types: &[JobType::SentimentAnalysis, JobType::AnomalyDetection],
        capacity_limit: 8,
    },
];

/// The backend kind a job type is routed to.
pub fn backend_for(job_type: JobType) -> Result<BackendKind, OrchestrationError> {
    ROUTING_TABLE
        .iter()
        .find(|d| d.supported_job_types.contains(&job_type))
        .map(|d| d.kind)
        .ok_or(OrchestrationError::UnroutableJobType { job_type })
}

/// Concurrent-execution limit for a backend kind.
pub fn capacity_limit(kind: BackendKind) -> i64 {
    ROUTING_TABLE
        .iter()
        .find(|d| d.kind == kind)
        .map(|d| d.capacity_limit)
        .unwrap_or(0)
}

/// Startup check: every job type routes to exactly one backend kind and
/// every capacity limit is positive. A defect here is a configuration bug,
/// so callers are expected to treat an `Err` as fatal.
pub fn validate_routing_table() -> Result<(), String> {
    for job_type in JobType::ALL {
        let owners: Vec<BackendKind> = ROUTING_TABLE
            .iter()
            .filter(|d| d.supported_job_types.contains(&job_type))
            .map(|d| d.kind)
            .collect();
        match owners.len() {
            0 => return Err(format!("job type {job_type} has no backend")),
            1 => {}
            _ => {
                return Err(format!(
                    "job type {job_type} routes to multiple backends: {owners:?}"
                ))
            }
        }
    }
    for descriptor in ROUTING_TABLE {
        if descriptor.capacity_limit <= 0 {
            return Err(format!(
                "backend {} has non-positive capacity {}",
                descriptor.kind, descriptor.capacity_limit
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_table_is_valid() {
        validate_routing_table().expect("routing table must cover every job type exactly once");
    }

    #[test]
    fn test_forecasting_routes_to_training() {
        // Model-fitting work belongs on the managed training backend, never
        // the lightweight pool.
        assert_eq!(
            backend_for(JobType::FinancialForecasting).unwrap(),
            BackendKind::Training
        );
        assert_ne!(
            backend_for(JobType::FinancialForecasting).unwrap(),
            BackendKind::Lightweight
        );
    }

    #[test]
    fn test_every_job_type_routes() {
        for jt in JobType::ALL {
            backend_for(jt).unwrap();
        }
    }

    #[test]
    fn test_capacity_limits() {
        assert_eq!(capacity_limit(BackendKind::Batch), 2);
        assert_eq!(capacity_limit(BackendKind::Training), 3);
        assert_eq!(capacity_limit(BackendKind::Lightweight), 8);
    }
}
