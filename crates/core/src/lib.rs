// crates/core/src/lib.rs
//! Quotient core domain: job records, tier policies, backend routing,
//! params validation, and the retry backoff schedule.
//!
//! This crate is pure domain logic — no I/O, no persistence. The `db` crate
//! owns durability and the `server` crate owns orchestration; both speak the
//! types defined here.

pub mod backoff;
pub mod error;
pub mod job;
pub mod params;
pub mod routing;
pub mod tier;

pub use backoff::{backoff_delay, BACKOFF_BASE_MS, BACKOFF_CAP_MS};
pub use error::OrchestrationError;
pub use job::{epoch_ms, BackendKind, Job, JobStatus, JobType, NewJob, DEFAULT_MAX_RETRIES};
pub use params::validate_params;
pub use routing::{backend_for, capacity_limit, validate_routing_table, BackendDescriptor, ROUTING_TABLE};
pub use tier::{resolve_tier, TierPolicy, TIER_POLICIES};
