//! Destroy summaries

use crate::handle::ResourceKind;
use serde::{Deserialize, Serialize};

/// Result of a best-effort batch destroy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyReport {
    /// Resource ids destroyed by this call
    pub destroyed: Vec<String>,

    /// Resource ids the provider no longer knew about
    pub not_found: Vec<String>,

    /// Resources whose destroy failed; they stay registered
    pub failed: Vec<DestroyFailure>,

    /// Selectors that matched no registered resource
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched: Vec<String>,
}

/// A single failed destroy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyFailure {
    pub id: String,
    pub kind: ResourceKind,
    pub error: String,
}

impl DestroyReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.destroyed.is_empty() && self.not_found.is_empty() && self.failed.is_empty()
    }

    pub fn add_destroyed(&mut self, id: impl Into<String>) {
        self.destroyed.push(id.into());
    }

    pub fn add_not_found(&mut self, id: impl Into<String>) {
        self.not_found.push(id.into());
    }

    pub fn add_failure(
        &mut self,
        id: impl Into<String>,
        kind: ResourceKind,
        error: impl Into<String>,
    ) {
        self.failed.push(DestroyFailure {
            id: id.into(),
            kind,
            error: error.into(),
        });
    }

    pub fn add_unmatched(&mut self, selector: impl Into<String>) {
        self.unmatched.push(selector.into());
    }

    /// Ids that no longer exist on the provider side
    pub fn removed_ids(&self) -> impl Iterator<Item = &String> {
        self.destroyed.iter().chain(self.not_found.iter())
    }
}

impl std::fmt::Display for DestroyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} destroyed, {} already gone, {} failed",
            self.destroyed.len(),
            self.not_found.len(),
            self.failed.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_summary() {
        let mut report = DestroyReport::new();
        assert!(report.is_empty());

        report.add_destroyed("bucket");
        report.add_not_found("rule");
        report.add_failure("role", ResourceKind::Role, "DeleteConflict");
        report.add_unmatched("ECR");

        assert!(!report.is_success());
        assert_eq!(report.removed_ids().count(), 2);
        assert_eq!(report.unmatched, vec!["ECR".to_string()]);
        assert_eq!(report.to_string(), "1 destroyed, 1 already gone, 1 failed");
    }
}
