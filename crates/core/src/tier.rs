// crates/core/src/tier.rs
//! Static subscription-tier policy table.

use crate::error::OrchestrationError;

/// Immutable per-tier record: concurrency quota and scheduling weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    pub tier: &'static str,
    pub max_concurrent_jobs: i64,
    pub priority_weight: i64,
}

/// The policy table. Quota and weight are strictly increasing with tier.
pub const TIER_POLICIES: [TierPolicy; 3] = [
    TierPolicy {
        tier: "basic",
        max_concurrent_jobs: 2,
        priority_weight: 1,
    },
    TierPolicy {
        tier: "advanced",
        max_concurrent_jobs: 5,
        priority_weight: 5,
    },
    TierPolicy {
        tier: "professional",
        max_concurrent_jobs: 10,
        priority_weight: 10,
    },
];

/// Resolve a tier name to its policy.
///
/// An unrecognized tier blocks admission rather than silently granting the
/// lowest quota — a partial default here would be a quota-bypass bug.
pub fn resolve_tier(tier: &str) -> Result<TierPolicy, OrchestrationError> {
    TIER_POLICIES
        .iter()
        .find(|p| p.tier == tier)
        .copied()
        .ok_or_else(|| OrchestrationError::UnknownTier {
            tier: tier.to_string(),
        })
}
