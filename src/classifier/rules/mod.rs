//! Classifier rules

mod body;
mod headers;
mod status;
mod success;
mod timing;

pub use body::{BodyPatternRule, JsonFieldRule, ReflectionRule};
pub use headers::HeaderRule;
pub use status::StatusRule;
pub use success::SuccessRule;
pub use timing::TimingRule;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{BoxedRule, FindingKind, Severity};
use crate::error::{ClassificationError, ConfigError};
use crate::probe::ProbeResult;

/// A rule as declared in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleConfig {
    #[serde(rename_all = "camelCase")]
    Status {
        name: Option<String>,
        min: u16,
        max: Option<u16>,
        kind: Option<FindingKind>,
        severity: Severity,
        description: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Body {
        name: Option<String>,
        pattern: String,
        kind: Option<FindingKind>,
        severity: Severity,
    },
    #[serde(rename_all = "camelCase")]
    Header {
        name: Option<String>,
        header: String,
        pattern: Option<String>,
        kind: Option<FindingKind>,
        severity: Severity,
    },
    #[serde(rename_all = "camelCase")]
    Json {
        name: Option<String>,
        pointer: String,
        equals: Option<serde_json::Value>,
        kind: Option<FindingKind>,
        severity: Severity,
    },
    #[serde(rename_all = "camelCase")]
    Timing {
        name: Option<String>,
        threshold_ms: u64,
        kind: Option<FindingKind>,
        severity: Severity,
    },
    #[serde(rename_all = "camelCase")]
    Reflection {
        name: Option<String>,
        severity: Severity,
    },
}

impl RuleConfig {
    /// Compile into a runnable rule
    pub fn build(&self) -> Result<BoxedRule, ConfigError> {
        let rule: BoxedRule = match self {
            RuleConfig::Status {
                name,
                min,
                max,
                kind,
                severity,
                description,
            } => {
                let max = max.unwrap_or(*min);
                if max < *min {
                    return Err(ConfigError::ValidationError {
                        field: "rules.max".into(),
                        reason: format!("{} is below min {}", max, min),
                    });
                }
                let mut rule = StatusRule::new(
                    name.as_deref().unwrap_or("status"),
                    *min..=max,
                    kind.unwrap_or(FindingKind::StatusMatch),
                    *severity,
                );
                if let Some(description) = description {
                    rule = rule.with_description(description);
                }
                Box::new(rule)
            }
            RuleConfig::Body {
                name,
                pattern,
                kind,
                severity,
            } => Box::new(BodyPatternRule::new(
                name.as_deref().unwrap_or("body-pattern"),
                pattern,
                kind.unwrap_or(FindingKind::BodyMatch),
                *severity,
            )?),
            RuleConfig::Header {
                name,
                header,
                pattern,
                kind,
                severity,
            } => Box::new(HeaderRule::new(
                name.as_deref().unwrap_or("header-pattern"),
                header,
                pattern.as_deref(),
                kind.unwrap_or(FindingKind::HeaderMatch),
                *severity,
            )?),
            RuleConfig::Json {
                name,
                pointer,
                equals,
                kind,
                severity,
            } => Box::new(JsonFieldRule::new(
                name.as_deref().unwrap_or("json-field"),
                pointer,
                equals.clone(),
                kind.unwrap_or(FindingKind::JsonMatch),
                *severity,
            )),
            RuleConfig::Timing {
                name,
                threshold_ms,
                kind,
                severity,
            } => Box::new(TimingRule::new(
                name.as_deref().unwrap_or("timing"),
                *threshold_ms,
                kind.unwrap_or(FindingKind::SlowResponse),
                *severity,
            )),
            RuleConfig::Reflection { name, severity } => {
                let mut rule = ReflectionRule::new(*severity);
                if let Some(name) = name {
                    rule = rule.with_name(name);
                }
                Box::new(rule)
            }
        };

        Ok(rule)
    }
}

pub(crate) fn compile_pattern(field: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::ValidationError {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

/// Body text a body-based rule may inspect.
///
/// `Ok(None)` means there was no response at all (transport failure).
pub(crate) fn readable_body<'a>(
    rule: &str,
    result: &'a ProbeResult,
) -> Result<Option<&'a str>, ClassificationError> {
    if result.status.is_none() {
        return Ok(None);
    }
    if result.body.truncated {
        return Err(ClassificationError::TruncatedBody { rule: rule.to_string() });
    }
    match result.body.text.as_deref() {
        Some(text) => Ok(Some(text)),
        None => Err(ClassificationError::NonTextBody { rule: rule.to_string() }),
    }
}

/// Shorten evidence excerpts
pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}
