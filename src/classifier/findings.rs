//! Classifier findings

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level for findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[serde(alias = "low")]
    Low,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
    #[serde(alias = "critical")]
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a finding observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    ServerError,
    ClientError,
    RateLimited,
    AuthAccepted,
    ReflectedPayload,
    ErrorDisclosure,
    SlowResponse,
    StatusMatch,
    BodyMatch,
    HeaderMatch,
    JsonMatch,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::ServerError => "SERVER_ERROR",
            FindingKind::ClientError => "CLIENT_ERROR",
            FindingKind::RateLimited => "RATE_LIMITED",
            FindingKind::AuthAccepted => "AUTH_ACCEPTED",
            FindingKind::ReflectedPayload => "REFLECTED_PAYLOAD",
            FindingKind::ErrorDisclosure => "ERROR_DISCLOSURE",
            FindingKind::SlowResponse => "SLOW_RESPONSE",
            FindingKind::StatusMatch => "STATUS_MATCH",
            FindingKind::BodyMatch => "BODY_MATCH",
            FindingKind::HeaderMatch => "HEADER_MATCH",
            FindingKind::JsonMatch => "JSON_MATCH",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An observation about one probe result.
///
/// Carries no random id or timestamp: the same result and spec always yield
/// equal findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Originating probe spec
    pub spec_id: u64,
    /// Rule that emitted this finding
    pub rule: String,
    pub kind: FindingKind,
    pub severity: Severity,
    pub description: String,
    pub evidence: Option<String>,
}

impl Finding {
    pub fn new(spec_id: u64, rule: &str, kind: FindingKind, severity: Severity) -> Self {
        Self {
            spec_id,
            rule: rule.to_string(),
            kind,
            severity,
            description: String::new(),
            evidence: None,
        }
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    pub fn with_evidence(mut self, evidence: &str) -> Self {
        self.evidence = Some(evidence.to_string());
        self
    }
}
