//! Probe model
//!
//! A `ProbeSpec` is one fully specified request to attempt. A `ProbeResult` is
//! the observed outcome of executing it.

mod payloads;
mod resolver;

pub use payloads::{normalize_wordlist, load_wordlist, WordlistOptions};
pub use resolver::{BodyFormat, ProbeIter, ProbePlan, ProbeSpace};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::TransportError;

/// Probe module selecting how the probe space is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    Brute,
    Fuzz,
    RateLimit,
}

impl ModuleKind {
    pub fn all() -> &'static [ModuleKind] {
        &[ModuleKind::Brute, ModuleKind::Fuzz, ModuleKind::RateLimit]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModuleKind::Brute => "brute",
            ModuleKind::Fuzz => "fuzz",
            ModuleKind::RateLimit => "rate-limit",
        }
    }

    /// Parse a module name, accepting the legacy names as well
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().replace('_', "-").as_str() {
            "brute" | "smart-brute" | "smartbrute" => Some(ModuleKind::Brute),
            "fuzz" | "api-fuzzer" | "apifuzzer" => Some(ModuleKind::Fuzz),
            "rate-limit" | "ratelimit" | "rate-limit-checker" | "ratelimitchecker" => {
                Some(ModuleKind::RateLimit)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the probe fields are placed in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Query,
    JsonBody,
    FormBody,
}

/// One probe attempt to send. Never mutated after the resolver emits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// Position in resolver order
    pub id: u64,
    pub module: ModuleKind,
    pub method: String,
    pub url: String,
    /// Field carrying the payload
    pub injection_point: Option<String>,
    pub payload: Option<String>,
    /// Every field sent with the request, payload included
    pub fields: Vec<(String, String)>,
    pub placement: Placement,
    pub headers: BTreeMap<String, String>,
}

impl ProbeSpec {
    /// Short human label used in logs and tabular export
    pub fn target_label(&self) -> String {
        match (&self.injection_point, &self.payload) {
            (Some(point), Some(payload)) => format!("{} [{}={}]", self.url, point, payload),
            _ => self.url.clone(),
        }
    }
}

/// Transport failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Dns,
    Body,
    Request,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Dns => "dns",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Request => "request",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final transport error recorded on a failed probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportFailure {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl From<TransportError> for TransportFailure {
    fn from(err: TransportError) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
        }
    }
}

/// Captured response body, capped at the configured size
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodySnapshot {
    /// Body text, `None` when the body is not valid UTF-8
    pub text: Option<String>,
    /// Bytes captured (at most the cap)
    pub size: usize,
    /// Whether the body was cut at the cap
    pub truncated: bool,
}

impl BodySnapshot {
    /// Build a snapshot from captured bytes
    pub fn from_bytes(bytes: Vec<u8>, truncated: bool) -> Self {
        let size = bytes.len();
        let text = match String::from_utf8(bytes) {
            Ok(text) => Some(text),
            Err(err) if truncated => {
                // The cap may split a multi-byte character
                let valid = err.utf8_error().valid_up_to();
                let mut bytes = err.into_bytes();
                bytes.truncate(valid);
                String::from_utf8(bytes).ok()
            }
            Err(_) => None,
        };

        Self {
            text,
            size,
            truncated,
        }
    }
}

/// Raw HTTP exchange returned by a transport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpSnapshot {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: BodySnapshot,
}

/// Outcome of executing one `ProbeSpec`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub spec_id: u64,
    /// Whether the success predicate matched
    pub success: bool,
    pub status: Option<u16>,
    pub error: Option<TransportFailure>,
    /// Attempts made, retries included
    pub attempts: u32,
    pub latency_ms: u64,
    /// Endpoint the request went through, if rotating
    pub endpoint: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: BodySnapshot,
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    pub fn from_response(
        spec: &ProbeSpec,
        response: HttpSnapshot,
        latency: Duration,
        attempts: u32,
        endpoint: Option<String>,
        criteria: &SuccessCriteria,
    ) -> Self {
        let success = criteria.matches(response.status, response.body.text.as_deref());
        Self {
            spec_id: spec.id,
            success,
            status: Some(response.status),
            error: None,
            attempts,
            latency_ms: latency.as_millis() as u64,
            endpoint,
            headers: response.headers,
            body: response.body,
            timestamp: Utc::now(),
        }
    }

    pub fn from_error(
        spec: &ProbeSpec,
        error: TransportError,
        latency: Duration,
        attempts: u32,
        endpoint: Option<String>,
    ) -> Self {
        Self {
            spec_id: spec.id,
            success: false,
            status: None,
            error: Some(error.into()),
            attempts,
            latency_ms: latency.as_millis() as u64,
            endpoint,
            headers: BTreeMap::new(),
            body: BodySnapshot::default(),
            timestamp: Utc::now(),
        }
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_transport_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Pluggable predicate deciding whether a response counts as a success
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuccessCriteria {
    /// Accepted status codes; empty means any 2xx
    pub status_codes: Vec<u16>,
    /// Body must contain this text
    pub body_contains: Option<String>,
    /// Body must not contain this text
    pub body_excludes: Option<String>,
}

impl SuccessCriteria {
    pub fn matches(&self, status: u16, body: Option<&str>) -> bool {
        let status_ok = if self.status_codes.is_empty() {
            (200..300).contains(&status)
        } else {
            self.status_codes.contains(&status)
        };
        if !status_ok {
            return false;
        }

        if let Some(needle) = &self.body_contains {
            if !body.is_some_and(|b| b.contains(needle.as_str())) {
                return false;
            }
        }

        if let Some(needle) = &self.body_excludes {
            if body.is_some_and(|b| b.contains(needle.as_str())) {
                return false;
            }
        }

        true
    }
}
