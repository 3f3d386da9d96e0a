// crates/server/src/tier_provider.rs
//! Identity/tier collaborator: answers "what tier is this user on".
//!
//! The orchestration subsystem does not own subscriptions. In production the
//! provider fronts the billing service; here a static, file-loadable mapping
//! stands in behind the same trait. Whatever the provider answers still goes
//! through the policy table — a bogus assignment surfaces as `UnknownTier`
//! at admission, it is never silently downgraded.

use std::collections::HashMap;
use std::path::Path;

/// Answers the subscription tier for a user id.
pub trait TierProvider: Send + Sync {
    fn tier_for(&self, owner_id: &str) -> String;
}

/// Static user → tier assignments with a default for unassigned users.
pub struct StaticTierProvider {
    assignments: HashMap<String, String>,
    default_tier: String,
}

impl StaticTierProvider {
    pub fn new(assignments: HashMap<String, String>, default_tier: impl Into<String>) -> Self {
        Self {
            assignments,
            default_tier: default_tier.into(),
        }
    }

    /// Every user on the default tier.
    pub fn all_default(default_tier: impl Into<String>) -> Self {
        Self::new(HashMap::new(), default_tier)
    }

    /// Load assignments from a JSON file of the form
    /// `{"user-1": "professional", "user-2": "advanced"}`.
    pub fn from_file(path: &Path, default_tier: impl Into<String>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let assignments: HashMap<String, String> = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            count = assignments.len(),
            "Loaded tier assignments"
        );
        Ok(Self::new(assignments, default_tier))
    }
}

impl TierProvider for StaticTierProvider {
    fn tier_for(&self, owner_id: &str) -> String {
        self.assignments
            .get(owner_id)
            .cloned()
            .unwrap_or_else(|| self.default_tier.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_assignment_lookup_with_default() {
        let mut assignments = HashMap::new();
        assignments.insert("pro-user".to_string(), "professional".to_string());
        let provider = StaticTierProvider::new(assignments, "basic");

        assert_eq!(provider.tier_for("pro-user"), "professional");
        assert_eq!(provider.tier_for("someone-else"), "basic");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"alice": "advanced"}}"#).unwrap();

        let provider = StaticTierProvider::from_file(file.path(), "basic").unwrap();
        assert_eq!(provider.tier_for("alice"), "advanced");
        assert_eq!(provider.tier_for("bob"), "basic");
    }

    #[test]
    fn test_from_file_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(StaticTierProvider::from_file(file.path(), "basic").is_err());
    }
}
