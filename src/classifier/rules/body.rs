//! Body-based rules
//!
//! These only look at complete text bodies. Binary or truncated bodies make
//! the rule skip that result.

use regex::Regex;

use super::{compile_pattern, excerpt, readable_body};
use crate::classifier::{ClassifierRule, Finding, FindingKind, Severity};
use crate::error::{ClassificationError, ConfigError};
use crate::probe::{ProbeResult, ProbeSpec};

const ERROR_DISCLOSURE_PATTERN: &str = r"(?i)(stack trace|traceback \(most recent call last\)|unhandled exception|exception in thread|sql syntax|syntax error|fatal error|internal server error)";

/// Fires when the body matches a regular expression
pub struct BodyPatternRule {
    name: String,
    pattern: Regex,
    kind: FindingKind,
    severity: Severity,
}

impl BodyPatternRule {
    pub fn new(
        name: &str,
        pattern: &str,
        kind: FindingKind,
        severity: Severity,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            name: name.to_string(),
            pattern: compile_pattern("rules.pattern", pattern)?,
            kind,
            severity,
        })
    }

    /// Error pages and stack traces leaking into responses
    pub fn error_disclosure() -> Result<Self, ConfigError> {
        Self::new(
            "error-disclosure",
            ERROR_DISCLOSURE_PATTERN,
            FindingKind::ErrorDisclosure,
            Severity::High,
        )
    }
}

impl ClassifierRule for BodyPatternRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        result: &ProbeResult,
        spec: &ProbeSpec,
    ) -> Result<Vec<Finding>, ClassificationError> {
        let Some(body) = readable_body(&self.name, result)? else {
            return Ok(Vec::new());
        };

        let Some(found) = self.pattern.find(body) else {
            return Ok(Vec::new());
        };

        Ok(vec![Finding::new(spec.id, &self.name, self.kind, self.severity)
            .with_description(&format!("Response body matched /{}/", self.pattern.as_str()))
            .with_evidence(&excerpt(found.as_str(), 120))])
    }
}

/// Fires when the injected payload comes back verbatim in the body
pub struct ReflectionRule {
    name: String,
    severity: Severity,
}

impl ReflectionRule {
    pub fn new(severity: Severity) -> Self {
        Self {
            name: "reflected-payload".to_string(),
            severity,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

impl ClassifierRule for ReflectionRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        result: &ProbeResult,
        spec: &ProbeSpec,
    ) -> Result<Vec<Finding>, ClassificationError> {
        let Some(payload) = spec.payload.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(Vec::new());
        };
        let Some(body) = readable_body(&self.name, result)? else {
            return Ok(Vec::new());
        };
        if !body.contains(payload) {
            return Ok(Vec::new());
        }

        let point = spec.injection_point.as_deref().unwrap_or("payload");
        Ok(vec![Finding::new(spec.id, &self.name, FindingKind::ReflectedPayload, self.severity)
            .with_description(&format!("Value of '{}' is reflected unencoded in the response", point))
            .with_evidence(&excerpt(payload, 120))])
    }
}

/// Parses the body as JSON and checks a JSON pointer
pub struct JsonFieldRule {
    name: String,
    pointer: String,
    equals: Option<serde_json::Value>,
    kind: FindingKind,
    severity: Severity,
}

impl JsonFieldRule {
    pub fn new(
        name: &str,
        pointer: &str,
        equals: Option<serde_json::Value>,
        kind: FindingKind,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.to_string(),
            pointer: pointer.to_string(),
            equals,
            kind,
            severity,
        }
    }
}

impl ClassifierRule for JsonFieldRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        result: &ProbeResult,
        spec: &ProbeSpec,
    ) -> Result<Vec<Finding>, ClassificationError> {
        let Some(body) = readable_body(&self.name, result)? else {
            return Ok(Vec::new());
        };

        let document: serde_json::Value =
            serde_json::from_str(body).map_err(|e| ClassificationError::MalformedBody {
                rule: self.name.clone(),
                reason: e.to_string(),
            })?;

        let Some(value) = document.pointer(&self.pointer) else {
            return Ok(Vec::new());
        };
        if let Some(expected) = &self.equals {
            if value != expected {
                return Ok(Vec::new());
            }
        }

        Ok(vec![Finding::new(spec.id, &self.name, self.kind, self.severity)
            .with_description(&format!("JSON field {} present in response", self.pointer))
            .with_evidence(&excerpt(&value.to_string(), 120))])
    }
}
