//! Target resolver
//!
//! Expands a declarative target description into an ordered, lazily produced
//! sequence of `ProbeSpec`s. Order is method first, then the outer plan
//! dimension, then the inner one, so a `max_attempts` cap always selects the
//! same prefix of the space.

use std::collections::BTreeMap;
use std::str::FromStr;
use url::Url;

use super::{ModuleKind, Placement, ProbeSpec};
use crate::error::ConfigError;

/// Body encoding for non-query placements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    #[default]
    Json,
    Form,
}

/// Module-specific dimensions of the probe space
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbePlan {
    /// injection points x payloads
    Fuzz {
        injection_points: Vec<String>,
        payloads: Vec<String>,
    },
    /// usernames x passwords, payload is the password
    Credentials {
        username_field: String,
        password_field: String,
        usernames: Vec<String>,
        passwords: Vec<String>,
    },
    /// The same request `count` times
    Repeat { count: usize },
}

impl ProbePlan {
    /// (outer, inner) dimension sizes
    fn dimensions(&self) -> (u64, u64) {
        match self {
            ProbePlan::Fuzz {
                injection_points,
                payloads,
            } => (injection_points.len() as u64, payloads.len() as u64),
            ProbePlan::Credentials {
                usernames,
                passwords,
                ..
            } => (usernames.len() as u64, passwords.len() as u64),
            ProbePlan::Repeat { count } => (*count as u64, 1),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ProbePlan::Fuzz {
                injection_points,
                payloads,
            } => {
                require_values("injectionPoints", injection_points)?;
                require_values("payloads", payloads)
            }
            ProbePlan::Credentials {
                username_field,
                password_field,
                usernames,
                passwords,
            } => {
                if username_field.is_empty() {
                    return Err(ConfigError::EmptyDimension("usernameField".into()));
                }
                if password_field.is_empty() {
                    return Err(ConfigError::EmptyDimension("passwordField".into()));
                }
                require_values("usernames", usernames)?;
                require_values("passwords", passwords)
            }
            ProbePlan::Repeat { count } => {
                if *count == 0 {
                    return Err(ConfigError::EmptyDimension("repeat".into()));
                }
                Ok(())
            }
        }
    }
}

fn require_values(name: &str, values: &[String]) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::EmptyDimension(name.into()));
    }
    Ok(())
}

/// A validated, finite probe space. Iterate it any number of times.
#[derive(Debug, Clone)]
pub struct ProbeSpace {
    module: ModuleKind,
    target: Url,
    methods: Vec<String>,
    plan: ProbePlan,
    headers: BTreeMap<String, String>,
    body_format: BodyFormat,
    max_attempts: Option<u64>,
}

impl ProbeSpace {
    pub fn new(
        module: ModuleKind,
        target_url: &str,
        methods: Vec<String>,
        plan: ProbePlan,
    ) -> Result<Self, ConfigError> {
        let target = parse_target(target_url)?;

        if methods.is_empty() {
            return Err(ConfigError::EmptyDimension("methods".into()));
        }
        let methods = methods
            .into_iter()
            .map(|m| normalize_method(&m))
            .collect::<Result<Vec<_>, _>>()?;

        plan.validate()?;

        Ok(Self {
            module,
            target,
            methods,
            plan,
            headers: BTreeMap::new(),
            body_format: BodyFormat::default(),
            max_attempts: None,
        })
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body_format(mut self, body_format: BodyFormat) -> Self {
        self.body_format = body_format;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn module(&self) -> ModuleKind {
        self.module
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Size of the full cross-product, ignoring the attempt cap
    pub fn full_size(&self) -> u64 {
        let (outer, inner) = self.plan.dimensions();
        (self.methods.len() as u64)
            .saturating_mul(outer)
            .saturating_mul(inner)
    }

    /// Number of specs the iterator yields
    pub fn len(&self) -> u64 {
        match self.max_attempts {
            Some(cap) => cap.min(self.full_size()),
            None => self.full_size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a fresh pass over the space
    pub fn iter(&self) -> ProbeIter<'_> {
        ProbeIter {
            space: self,
            next: 0,
            end: self.len(),
        }
    }

    /// Build the spec at a position in resolver order
    pub fn spec_at(&self, index: u64) -> Option<ProbeSpec> {
        if index >= self.full_size() {
            return None;
        }

        let (outer, inner) = self.plan.dimensions();
        let per_method = outer * inner;
        let method = &self.methods[(index / per_method) as usize];
        let rem = index % per_method;
        let (i, j) = ((rem / inner) as usize, (rem % inner) as usize);

        let (injection_point, payload, fields) = match &self.plan {
            ProbePlan::Fuzz {
                injection_points,
                payloads,
            } => {
                let point = injection_points[i].clone();
                let payload = payloads[j].clone();
                let fields = vec![(point.clone(), payload.clone())];
                (Some(point), Some(payload), fields)
            }
            ProbePlan::Credentials {
                username_field,
                password_field,
                usernames,
                passwords,
            } => {
                let password = passwords[j].clone();
                let fields = vec![
                    (username_field.clone(), usernames[i].clone()),
                    (password_field.clone(), password.clone()),
                ];
                (Some(password_field.clone()), Some(password), fields)
            }
            ProbePlan::Repeat { .. } => (None, None, Vec::new()),
        };

        Some(ProbeSpec {
            id: index,
            module: self.module,
            method: method.clone(),
            url: self.target.to_string(),
            injection_point,
            payload,
            fields,
            placement: self.placement_for(method),
            headers: self.headers.clone(),
        })
    }

    fn placement_for(&self, method: &str) -> Placement {
        match method {
            "GET" | "HEAD" | "DELETE" | "OPTIONS" => Placement::Query,
            _ => match self.body_format {
                BodyFormat::Json => Placement::JsonBody,
                BodyFormat::Form => Placement::FormBody,
            },
        }
    }
}

impl<'a> IntoIterator for &'a ProbeSpace {
    type Item = ProbeSpec;
    type IntoIter = ProbeIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a `ProbeSpace`
#[derive(Debug, Clone)]
pub struct ProbeIter<'a> {
    space: &'a ProbeSpace,
    next: u64,
    end: u64,
}

impl Iterator for ProbeIter<'_> {
    type Item = ProbeSpec;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let spec = self.space.spec_at(self.next);
        self.next += 1;
        spec
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next) as usize;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.next = self.next.saturating_add(n as u64).min(self.end);
        self.next()
    }
}

impl ExactSizeIterator for ProbeIter<'_> {}

fn parse_target(raw: &str) -> Result<Url, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::MissingField("targetUrl".into()));
    }
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

fn normalize_method(raw: &str) -> Result<String, ConfigError> {
    let upper = raw.trim().to_uppercase();
    reqwest::Method::from_str(&upper).map_err(|_| ConfigError::ValidationError {
        field: "methods".into(),
        reason: format!("'{}' is not a valid HTTP method", raw),
    })?;
    Ok(upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn fuzz_space() -> ProbeSpace {
        ProbeSpace::new(
            ModuleKind::Fuzz,
            "http://test.local/api",
            strings(&["get", "POST"]),
            ProbePlan::Fuzz {
                injection_points: strings(&["q", "id"]),
                payloads: strings(&["1", "2", "3"]),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_order_is_method_then_point_then_payload() {
        let space = fuzz_space();
        let specs: Vec<_> = space.iter().collect();
        assert_eq!(specs.len(), 12);

        let labels: Vec<_> = specs
            .iter()
            .take(4)
            .map(|s| {
                format!(
                    "{} {} {}",
                    s.method,
                    s.injection_point.as_deref().unwrap(),
                    s.payload.as_deref().unwrap()
                )
            })
            .collect();
        assert_eq!(labels, strings(&["GET q 1", "GET q 2", "GET q 3", "GET id 1"]));

        assert_eq!(specs[6].method, "POST");
        assert_eq!(specs[6].placement, Placement::JsonBody);
        assert_eq!(specs[0].placement, Placement::Query);
        assert!(specs.iter().enumerate().all(|(i, s)| s.id == i as u64));
    }

    #[test]
    fn test_max_attempts_truncates_to_same_prefix() {
        let full: Vec<_> = fuzz_space().iter().collect();
        for cap in [0u64, 1, 5, 12, 40] {
            let space = fuzz_space().with_max_attempts(Some(cap));
            let capped: Vec<_> = space.iter().collect();
            assert_eq!(capped.len() as u64, cap.min(12));
            assert_eq!(&full[..capped.len()], &capped[..]);
        }
    }

    #[test]
    fn test_iteration_is_restartable() {
        let space = fuzz_space();
        let first: Vec<_> = space.iter().collect();
        let second: Vec<_> = space.iter().collect();
        assert_eq!(first, second);

        let mut iter = space.iter();
        assert_eq!(iter.len(), 12);
        assert_eq!(iter.nth(7).map(|s| s.id), Some(7));
        assert_eq!(iter.len(), 4);
    }

    #[test]
    fn test_credentials_plan() {
        let space = ProbeSpace::new(
            ModuleKind::Brute,
            "http://test.local/login",
            strings(&["POST"]),
            ProbePlan::Credentials {
                username_field: "username".into(),
                password_field: "password".into(),
                usernames: strings(&["admin", "root"]),
                passwords: strings(&["a", "b"]),
            },
        )
        .unwrap()
        .with_body_format(BodyFormat::Form);

        let specs: Vec<_> = space.iter().collect();
        assert_eq!(specs.len(), 4);
        assert_eq!(specs[1].payload.as_deref(), Some("b"));
        assert_eq!(
            specs[2].fields,
            vec![
                ("username".to_string(), "root".to_string()),
                ("password".to_string(), "a".to_string())
            ]
        );
        assert_eq!(specs[0].placement, Placement::FormBody);
    }

    #[test]
    fn test_repeat_plan() {
        let space = ProbeSpace::new(
            ModuleKind::RateLimit,
            "https://test.local/",
            strings(&["GET"]),
            ProbePlan::Repeat { count: 3 },
        )
        .unwrap();
        let specs: Vec<_> = space.iter().collect();
        assert_eq!(specs.len(), 3);
        assert!(specs.iter().all(|s| s.fields.is_empty() && s.payload.is_none()));
    }

    #[test]
    fn test_empty_dimension_rejected() {
        let err = ProbeSpace::new(
            ModuleKind::Fuzz,
            "http://test.local/",
            strings(&["GET"]),
            ProbePlan::Fuzz {
                injection_points: strings(&["q"]),
                payloads: vec![],
            },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyDimension(ref d) if d == "payloads"));

        let err = ProbeSpace::new(
            ModuleKind::RateLimit,
            "http://test.local/",
            vec![],
            ProbePlan::Repeat { count: 1 },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyDimension(ref d) if d == "methods"));
    }

    #[test]
    fn test_bad_url_and_method_rejected() {
        let plan = ProbePlan::Repeat { count: 1 };
        assert!(matches!(
            ProbeSpace::new(ModuleKind::RateLimit, "not a url", strings(&["GET"]), plan.clone()),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ProbeSpace::new(ModuleKind::RateLimit, "ftp://host/", strings(&["GET"]), plan.clone()),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ProbeSpace::new(ModuleKind::RateLimit, "http://host/", strings(&["GE T"]), plan),
            Err(ConfigError::ValidationError { .. })
        ));
    }
}
