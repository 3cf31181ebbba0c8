//! Response classifier
//!
//! Runs every enabled rule against a probe result and collects all findings.
//! Rules are pure: no I/O, no shared state.

mod findings;
pub mod rules;

pub use findings::{Finding, FindingKind, Severity};
pub use rules::RuleConfig;

use crate::error::{ClassificationError, ConfigError};
use crate::probe::{ModuleKind, ProbeResult, ProbeSpec};

/// Trait for classifier rules
pub trait ClassifierRule {
    /// Rule name
    fn name(&self) -> &str;

    /// Evaluate one result. An error skips this rule for this result only.
    fn evaluate(
        &self,
        result: &ProbeResult,
        spec: &ProbeSpec,
    ) -> Result<Vec<Finding>, ClassificationError>;
}

pub type BoxedRule = Box<dyn ClassifierRule + Send + Sync>;

/// Options shaping the default rule set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierOptions {
    pub module: ModuleKind,
    pub slow_threshold_ms: u64,
    pub default_rules: bool,
    pub custom_rules: Vec<RuleConfig>,
}

impl ClassifierOptions {
    pub fn for_module(module: ModuleKind) -> Self {
        Self {
            module,
            slow_threshold_ms: 3000,
            default_rules: true,
            custom_rules: Vec::new(),
        }
    }
}

/// Response classifier
pub struct Classifier {
    rules: Vec<BoxedRule>,
}

impl Classifier {
    pub fn new(rules: Vec<BoxedRule>) -> Self {
        Self { rules }
    }

    /// Build the module's default rules plus any configured ones
    pub fn from_options(options: &ClassifierOptions) -> Result<Self, ConfigError> {
        let mut rules = if options.default_rules {
            Self::default_rules(options.module, options.slow_threshold_ms)?
        } else {
            Vec::new()
        };

        for config in &options.custom_rules {
            rules.push(config.build()?);
        }

        Ok(Self::new(rules))
    }

    fn default_rules(module: ModuleKind, slow_threshold_ms: u64) -> Result<Vec<BoxedRule>, ConfigError> {
        let mut rules: Vec<BoxedRule> = vec![
            Box::new(rules::StatusRule::server_errors()),
            Box::new(rules::TimingRule::new(
                "slow-response",
                slow_threshold_ms,
                FindingKind::SlowResponse,
                Severity::Low,
            )),
        ];

        match module {
            ModuleKind::Brute => {
                rules.push(Box::new(rules::SuccessRule::new()));
            }
            ModuleKind::Fuzz => {
                rules.push(Box::new(rules::ReflectionRule::new(Severity::Medium)));
                rules.push(Box::new(rules::BodyPatternRule::error_disclosure()?));
            }
            ModuleKind::RateLimit => {
                rules.push(Box::new(rules::StatusRule::rate_limited()));
                rules.push(Box::new(rules::HeaderRule::retry_after()));
                rules.push(Box::new(rules::HeaderRule::remaining_exhausted()?));
            }
        }

        Ok(rules)
    }

    /// Classify a result. All rules run; failing rules are skipped.
    pub fn classify(&self, result: &ProbeResult, spec: &ProbeSpec) -> Vec<Finding> {
        let mut findings = Vec::new();

        for rule in &self.rules {
            match rule.evaluate(result, spec) {
                Ok(found) => findings.extend(found),
                Err(err) => {
                    tracing::debug!(spec_id = spec.id, error = %err, "Rule skipped");
                }
            }
        }

        findings
    }

    /// Get list of rule names
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{result, spec};
    use super::*;

    #[test]
    fn test_all_matching_rules_fire() {
        let classifier = Classifier::from_options(&ClassifierOptions::for_module(ModuleKind::Fuzz)).unwrap();
        let spec = spec("<probe-42>");
        let result = result(500, "Unhandled exception near <probe-42>");

        let findings = classifier.classify(&result, &spec);
        let kinds: Vec<_> = findings.iter().map(|f| f.kind).collect();

        assert!(kinds.contains(&FindingKind::ServerError));
        assert!(kinds.contains(&FindingKind::ReflectedPayload));
        assert!(kinds.contains(&FindingKind::ErrorDisclosure));
        assert!(findings.iter().all(|f| f.spec_id == spec.id));
    }

    #[test]
    fn test_classification_is_idempotent() {
        let classifier = Classifier::from_options(&ClassifierOptions::for_module(ModuleKind::Fuzz)).unwrap();
        let spec = spec("abc");
        let result = result(503, "abc");

        assert_eq!(classifier.classify(&result, &spec), classifier.classify(&result, &spec));
    }

    #[test]
    fn test_binary_body_still_runs_status_rules() {
        let classifier = Classifier::from_options(&ClassifierOptions::for_module(ModuleKind::Fuzz)).unwrap();
        let spec = spec("abc");
        let mut result = result(502, "");
        result.body = crate::probe::BodySnapshot::from_bytes(vec![0xFF, 0x00, 0xFE], false);

        let findings = classifier.classify(&result, &spec);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::ServerError);
    }

    #[test]
    fn test_default_rules_can_be_disabled() {
        let mut options = ClassifierOptions::for_module(ModuleKind::RateLimit);
        options.default_rules = false;
        let classifier = Classifier::from_options(&options).unwrap();
        assert!(classifier.rule_names().is_empty());
        assert!(classifier.classify(&result(500, ""), &spec("x")).is_empty());
    }
}
