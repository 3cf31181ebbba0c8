//! Status code rules

use std::ops::RangeInclusive;

use crate::classifier::{ClassifierRule, Finding, FindingKind, Severity};
use crate::error::ClassificationError;
use crate::probe::{ProbeResult, ProbeSpec};

/// Fires when the response status falls in a range
pub struct StatusRule {
    name: String,
    range: RangeInclusive<u16>,
    kind: FindingKind,
    severity: Severity,
    description: Option<String>,
}

impl StatusRule {
    pub fn new(name: &str, range: RangeInclusive<u16>, kind: FindingKind, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            range,
            kind,
            severity,
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// `status >= 500`
    pub fn server_errors() -> Self {
        Self::new("server-error", 500..=599, FindingKind::ServerError, Severity::Medium)
    }

    /// HTTP 429
    pub fn rate_limited() -> Self {
        Self::new("rate-limited", 429..=429, FindingKind::RateLimited, Severity::Medium)
            .with_description("The server throttled the request (HTTP 429)")
    }
}

impl ClassifierRule for StatusRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        result: &ProbeResult,
        spec: &ProbeSpec,
    ) -> Result<Vec<Finding>, ClassificationError> {
        let Some(status) = result.status else {
            return Ok(Vec::new());
        };
        if !self.range.contains(&status) {
            return Ok(Vec::new());
        }

        let description = match &self.description {
            Some(description) => description.clone(),
            None => format!("{} {} returned HTTP {}", spec.method, spec.url, status),
        };

        Ok(vec![Finding::new(spec.id, &self.name, self.kind, self.severity)
            .with_description(&description)
            .with_evidence(&format!("HTTP {}", status))])
    }
}
