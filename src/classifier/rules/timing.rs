//! Timing anomaly rule

use crate::classifier::{ClassifierRule, Finding, FindingKind, Severity};
use crate::error::ClassificationError;
use crate::probe::{ProbeResult, ProbeSpec};

/// Fires when a response took longer than a fixed threshold
pub struct TimingRule {
    name: String,
    threshold_ms: u64,
    kind: FindingKind,
    severity: Severity,
}

impl TimingRule {
    pub fn new(name: &str, threshold_ms: u64, kind: FindingKind, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            threshold_ms,
            kind,
            severity,
        }
    }
}

impl ClassifierRule for TimingRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        result: &ProbeResult,
        spec: &ProbeSpec,
    ) -> Result<Vec<Finding>, ClassificationError> {
        // Timeouts are transport errors, not timing anomalies
        if result.status.is_none() || result.latency_ms <= self.threshold_ms {
            return Ok(Vec::new());
        }

        Ok(vec![Finding::new(spec.id, &self.name, self.kind, self.severity)
            .with_description(&format!(
                "Response took {}ms (threshold {}ms)",
                result.latency_ms, self.threshold_ms
            ))
            .with_evidence(&format!("{}ms", result.latency_ms))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::test_support::{result, spec};

    #[test]
    fn test_timing_threshold() {
        let rule = TimingRule::new("slow", 100, FindingKind::SlowResponse, Severity::Low);
        let mut slow = result(200, "");
        slow.latency_ms = 250;
        assert_eq!(rule.evaluate(&slow, &spec("x")).unwrap().len(), 1);

        slow.latency_ms = 100;
        assert!(rule.evaluate(&slow, &spec("x")).unwrap().is_empty());
    }
}
