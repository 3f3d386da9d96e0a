// crates/core/src/job.rs
//! Job record and the closed enumerations it is built from.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retry ceiling applied to every job at admission.
pub const DEFAULT_MAX_RETRIES: i64 = 3;

/// Current unix time in milliseconds. All lifecycle timestamps use this.
pub fn epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// The closed set of analytical job types callers may submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    MarketDataAnalysis,
    PortfolioOptimization,
    FinancialForecasting,
    SentimentAnalysis,
    AnomalyDetection,
    CorrelationAnalysis,
}

impl JobType {
    /// Every known job type, in declaration order. Used by the startup
    /// routing-table validation and by params tests.
    pub const ALL: [JobType; 6] = [
        JobType::MarketDataAnalysis,
        JobType::PortfolioOptimization,
        JobType::FinancialForecasting,
        JobType::SentimentAnalysis,
        JobType::AnomalyDetection,
        JobType::CorrelationAnalysis,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobType::MarketDataAnalysis => "market_data_analysis",
            JobType::PortfolioOptimization => "portfolio_optimization",
            JobType::FinancialForecasting => "financial_forecasting",
            JobType::SentimentAnalysis => "sentiment_analysis",
            JobType::AnomalyDetection => "anomaly_detection",
            JobType::CorrelationAnalysis => "correlation_analysis",
        }
    }

    pub fn from_db_str(s: &str) -> Option<JobType> {
        match s {
            "market_data_analysis" => Some(JobType::MarketDataAnalysis),
            "portfolio_optimization" => Some(JobType::PortfolioOptimization),
            "financial_forecasting" => Some(JobType::FinancialForecasting),
            "sentiment_analysis" => Some(JobType::SentimentAnalysis),
            "anomaly_detection" => Some(JobType::AnomalyDetection),
            "correlation_analysis" => Some(JobType::CorrelationAnalysis),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Lifecycle status of a job.
///
/// Transitions: `queued → running → (completed | failed | cancelled)`;
/// `failed → queued` via the retry manager while attempts remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_db_str(s: &str) -> Option<JobStatus> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Completed and cancelled admit no further transitions. Failed is
    /// terminal only once retries are exhausted; the retry manager decides.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// One of the heterogeneous execution environments jobs are dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Fixed-resource batch cluster: long-running, high-resource jobs.
    Batch,
    /// Managed training environment: iterative / model-fitting jobs.
    Training,
    /// Lightweight synchronous-style pool: fast, low-resource jobs.
    Lightweight,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Batch,
        BackendKind::Training,
        BackendKind::Lightweight,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            BackendKind::Batch => "batch",
            BackendKind::Training => "training",
            BackendKind::Lightweight => "lightweight",
        }
    }

    pub fn from_db_str(s: &str) -> Option<BackendKind> {
        match s {
            "batch" => Some(BackendKind::Batch),
            "training" => Some(BackendKind::Training),
            "lightweight" => Some(BackendKind::Lightweight),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// A persisted job record. The db crate is the only writer; everything else
/// reads snapshots of this.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub owner_id: String,
    pub job_type: JobType,
    pub params: serde_json::Value,
    pub status: JobStatus,
    /// Tier weight captured at admission; immutable afterwards.
    pub priority: i64,
    pub progress_percentage: i64,
    pub retry_count: i64,
    pub max_retries: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
    /// Earliest time a re-queued job becomes eligible for selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<i64>,
    pub backend_kind: BackendKind,
    /// Opaque handle to the executing backend instance; present only while
    /// the job is running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_ref: Option<String>,
}

/// Everything admission needs to persist a freshly accepted job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub owner_id: String,
    pub job_type: JobType,
    pub params: serde_json::Value,
    pub priority: i64,
    pub max_retries: i64,
    pub created_at: i64,
    pub backend_kind: BackendKind,
}

impl NewJob {
    /// Build a queued job record for the given owner. The id is generated
    /// here, once, and returned to the caller on 201.
    pub fn create(
        owner_id: &str,
        job_type: JobType,
        params: serde_json::Value,
        priority: i64,
        backend_kind: BackendKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            job_type,
            params,
            priority,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: epoch_ms(),
            backend_kind,
        }
    }
}
