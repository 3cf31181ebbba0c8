//! Success predicate rule

use crate::classifier::{ClassifierRule, Finding, FindingKind, Severity};
use crate::error::ClassificationError;
use crate::probe::{ProbeResult, ProbeSpec};

/// Reports probes whose response matched the configured success predicate
pub struct SuccessRule {
    severity: Severity,
}

impl SuccessRule {
    pub fn new() -> Self {
        Self {
            severity: Severity::High,
        }
    }
}

impl Default for SuccessRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassifierRule for SuccessRule {
    fn name(&self) -> &str {
        "auth-accepted"
    }

    fn evaluate(
        &self,
        result: &ProbeResult,
        spec: &ProbeSpec,
    ) -> Result<Vec<Finding>, ClassificationError> {
        if !result.success {
            return Ok(Vec::new());
        }

        let fields = spec
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(vec![Finding::new(spec.id, self.name(), FindingKind::AuthAccepted, self.severity)
            .with_description(&format!("{} {} accepted [{}]", spec.method, spec.url, fields))
            .with_evidence(&format!("HTTP {}", result.status.unwrap_or_default()))])
    }
}
