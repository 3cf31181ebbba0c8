//! Header rules

use regex::Regex;

use super::{compile_pattern, excerpt};
use crate::classifier::{ClassifierRule, Finding, FindingKind, Severity};
use crate::error::{ClassificationError, ConfigError};
use crate::probe::{ProbeResult, ProbeSpec};

/// Headers advertising how many requests remain in the current window
const REMAINING_HEADERS: &[&str] = &[
    "X-RateLimit-Remaining",
    "X-Rate-Limit-Remaining",
    "RateLimit-Remaining",
];

/// Fires when a header is present, optionally matching a pattern.
///
/// A rule may watch several spellings of the same header; the first one
/// present on the response is checked.
pub struct HeaderRule {
    name: String,
    headers: Vec<String>,
    pattern: Option<Regex>,
    kind: FindingKind,
    severity: Severity,
}

impl HeaderRule {
    pub fn new(
        name: &str,
        header: &str,
        pattern: Option<&str>,
        kind: FindingKind,
        severity: Severity,
    ) -> Result<Self, ConfigError> {
        if header.trim().is_empty() {
            return Err(ConfigError::MissingField("rules.header".into()));
        }
        let pattern = pattern
            .map(|p| compile_pattern("rules.pattern", p))
            .transpose()?;

        Ok(Self {
            name: name.to_string(),
            headers: vec![header.to_string()],
            pattern,
            kind,
            severity,
        })
    }

    /// Throttling signalled through `Retry-After`
    pub fn retry_after() -> Self {
        Self {
            name: "retry-after".to_string(),
            headers: vec!["Retry-After".to_string()],
            pattern: None,
            kind: FindingKind::RateLimited,
            severity: Severity::Low,
        }
    }

    /// Rate-limit headers reporting zero requests left
    pub fn remaining_exhausted() -> Result<Self, ConfigError> {
        Ok(Self {
            name: "ratelimit-remaining".to_string(),
            headers: REMAINING_HEADERS.iter().map(|h| h.to_string()).collect(),
            pattern: Some(compile_pattern("rules.pattern", r"^\s*0+\s*$")?),
            kind: FindingKind::RateLimited,
            severity: Severity::Medium,
        })
    }
}

impl ClassifierRule for HeaderRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        result: &ProbeResult,
        spec: &ProbeSpec,
    ) -> Result<Vec<Finding>, ClassificationError> {
        let Some((header, value)) = self
            .headers
            .iter()
            .find_map(|h| result.header(h).map(|v| (h, v)))
        else {
            return Ok(Vec::new());
        };
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(value) {
                return Ok(Vec::new());
            }
        }

        Ok(vec![Finding::new(spec.id, &self.name, self.kind, self.severity)
            .with_description(&format!("Response carries header {}", header))
            .with_evidence(&format!("{}: {}", header, excerpt(value, 120)))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::test_support::{result, spec};

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut response = result(429, "");
        response.headers.insert("retry-after".into(), "30".into());

        let findings = HeaderRule::retry_after().evaluate(&response, &spec("x")).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].evidence.as_deref(), Some("Retry-After: 30"));
    }

    #[test]
    fn test_header_pattern() {
        let rule = HeaderRule::new(
            "server-version",
            "Server",
            Some(r"\d+\.\d+"),
            FindingKind::HeaderMatch,
            Severity::Low,
        )
        .unwrap();

        let mut versioned = result(200, "");
        versioned.headers.insert("Server".into(), "Apache/2.4.41".into());
        assert_eq!(rule.evaluate(&versioned, &spec("x")).unwrap().len(), 1);

        let mut plain = result(200, "");
        plain.headers.insert("Server".into(), "cloudflare".into());
        assert!(rule.evaluate(&plain, &spec("x")).unwrap().is_empty());
    }

    #[test]
    fn test_remaining_exhausted_matches_any_spelling() {
        let rule = HeaderRule::remaining_exhausted().unwrap();

        for header in ["x-ratelimit-remaining", "X-Rate-Limit-Remaining", "ratelimit-remaining"] {
            let mut response = result(200, "");
            response.headers.insert(header.into(), "0".into());
            let findings = rule.evaluate(&response, &spec("x")).unwrap();
            assert_eq!(findings.len(), 1, "{} not detected", header);
            assert_eq!(findings[0].kind, FindingKind::RateLimited);
        }

        let mut remaining = result(200, "");
        remaining.headers.insert("x-ratelimit-remaining".into(), "10".into());
        assert!(rule.evaluate(&remaining, &spec("x")).unwrap().is_empty());
        assert!(rule.evaluate(&result(200, ""), &spec("x")).unwrap().is_empty());
    }
}
