//! Configuration file loading and validation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::{Classifier, ClassifierOptions, RuleConfig};
use crate::dispatch::{DispatchConfig, Endpoint, EndpointSpec, RetryPolicy, TransportConfig};
use crate::error::ConfigError;
use crate::probe::{
    load_wordlist, normalize_wordlist, BodyFormat, ModuleKind, ProbePlan, ProbeSpace,
    SuccessCriteria, WordlistOptions,
};

/// Configuration file syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// TOML for `.toml` files, JSON otherwise
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

/// One endpoint or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointList {
    Many(Vec<EndpointSpec>),
    One(EndpointSpec),
}

impl Default for EndpointList {
    fn default() -> Self {
        EndpointList::Many(Vec::new())
    }
}

impl EndpointList {
    pub fn specs(&self) -> &[EndpointSpec] {
        match self {
            EndpointList::Many(specs) => specs,
            EndpointList::One(spec) => std::slice::from_ref(spec),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.specs().is_empty()
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigFile {
    /// Credential probing
    #[serde(alias = "smartBrute", alias = "smart_brute", skip_serializing_if = "Option::is_none")]
    pub brute: Option<ProbeConfig>,

    /// Payload fuzzing
    #[serde(alias = "apiFuzzer", alias = "api_fuzzer", skip_serializing_if = "Option::is_none")]
    pub fuzz: Option<ProbeConfig>,

    /// Repeated requests
    #[serde(
        alias = "rateLimitChecker",
        alias = "rate_limit_checker",
        alias = "rate_limit",
        skip_serializing_if = "Option::is_none"
    )]
    pub rate_limit: Option<ProbeConfig>,

    /// Endpoints shared by every module that does not list its own
    #[serde(alias = "proxy", alias = "proxies")]
    pub endpoints: EndpointList,

    /// Several targets probed with several modules in one invocation
    #[serde(alias = "campaignManager", skip_serializing_if = "Option::is_none")]
    pub campaign: Option<CampaignConfig>,
}

/// A campaign target: a bare URL or a named one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CampaignTarget {
    Url(String),
    #[serde(rename_all = "camelCase")]
    Named {
        name: Option<String>,
        #[serde(alias = "target")]
        target_url: String,
    },
}

impl CampaignTarget {
    pub fn url(&self) -> &str {
        match self {
            CampaignTarget::Url(url) => url,
            CampaignTarget::Named { target_url, .. } => target_url,
        }
    }

    /// Display name, the URL when unnamed
    pub fn label(&self) -> &str {
        match self {
            CampaignTarget::Named { name: Some(name), .. } if !name.trim().is_empty() => name,
            _ => self.url(),
        }
    }
}

/// Campaign section of the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CampaignConfig {
    #[serde(alias = "campaignName")]
    pub name: Option<String>,
    pub targets: Vec<CampaignTarget>,
    /// JSON file holding an array of targets
    pub targets_file: Option<PathBuf>,
    /// Module names, run in order against every target
    pub modules: Vec<String>,
    #[serde(alias = "delayBetweenModules")]
    pub delay_between_modules_ms: u64,
    #[serde(alias = "delayBetweenTargets")]
    pub delay_between_targets_ms: u64,
}

/// Validated campaign: the targets and modules to cross
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignPlan {
    pub name: String,
    pub targets: Vec<CampaignTarget>,
    pub modules: Vec<ModuleKind>,
    pub delay_between_modules: Duration,
    pub delay_between_targets: Duration,
}

impl CampaignPlan {
    /// Number of module runs in the campaign
    pub fn operations(&self) -> usize {
        self.targets.len() * self.modules.len()
    }
}

impl CampaignConfig {
    /// Resolve targets (inline plus `targetsFile`) and module names
    pub fn resolve(&self, base_dir: &Path) -> Result<CampaignPlan, ConfigError> {
        let mut targets = self.targets.clone();
        if let Some(file) = &self.targets_file {
            let path = if file.is_absolute() {
                file.to_path_buf()
            } else {
                base_dir.join(file)
            };
            let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            })?;
            let listed: Vec<CampaignTarget> = serde_json::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
            targets.extend(listed);
        }
        if targets.is_empty() {
            return Err(ConfigError::EmptyDimension("campaign.targets".into()));
        }

        let modules = self
            .modules
            .iter()
            .map(|name| ModuleKind::parse(name).ok_or_else(|| ConfigError::UnknownModule(name.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        if modules.is_empty() {
            return Err(ConfigError::EmptyDimension("campaign.modules".into()));
        }

        Ok(CampaignPlan {
            name: self
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "campaign".to_string()),
            targets,
            modules,
            delay_between_modules: Duration::from_millis(self.delay_between_modules_ms),
            delay_between_targets: Duration::from_millis(self.delay_between_targets_ms),
        })
    }
}

/// Options for one module
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeConfig {
    pub target_url: Option<String>,
    pub methods: Vec<String>,

    // Fuzz dimensions
    pub injection_points: Vec<String>,
    pub payloads: Vec<String>,
    pub payloads_file: Option<PathBuf>,

    // Brute dimensions
    pub usernames: Vec<String>,
    pub usernames_file: Option<PathBuf>,
    pub passwords: Vec<String>,
    pub passwords_file: Option<PathBuf>,
    pub username_field: String,
    pub password_field: String,

    /// Requests per method for rate-limit probing
    #[serde(alias = "maxRequests")]
    pub repeat: usize,

    pub body_format: BodyFormat,
    pub headers: BTreeMap<String, String>,

    pub concurrency: usize,
    pub rate_per_second: Option<f64>,
    /// Legacy pacing; converted to a rate when `ratePerSecond` is unset
    #[serde(alias = "intervalMs")]
    pub delay_ms: Option<u64>,
    pub max_attempts: Option<u64>,

    pub use_proxy: Option<bool>,
    pub endpoints: Option<EndpointList>,

    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_body_bytes: usize,
    pub follow_redirects: bool,
    pub user_agent: Option<String>,

    pub success: SuccessCriteria,
    pub slow_threshold_ms: u64,
    pub default_rules: bool,
    pub rules: Vec<RuleConfig>,

    /// Normalisation for file-sourced lists
    pub wordlist: WordlistOptions,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target_url: None,
            methods: vec!["GET".to_string()],
            injection_points: vec!["test".to_string()],
            payloads: Vec::new(),
            payloads_file: None,
            usernames: Vec::new(),
            usernames_file: None,
            passwords: Vec::new(),
            passwords_file: None,
            username_field: "username".to_string(),
            password_field: "password".to_string(),
            repeat: 10,
            body_format: BodyFormat::Json,
            headers: BTreeMap::new(),
            concurrency: 1,
            rate_per_second: None,
            delay_ms: None,
            max_attempts: None,
            use_proxy: None,
            endpoints: None,
            timeout_ms: 5000,
            max_retries: 2,
            retry_backoff_ms: 200,
            max_body_bytes: 64 * 1024,
            follow_redirects: false,
            user_agent: None,
            success: SuccessCriteria::default(),
            slow_threshold_ms: 3000,
            default_rules: true,
            rules: Vec::new(),
            wordlist: WordlistOptions::default(),
        }
    }
}

/// Everything needed to run one module
pub struct ModulePlan {
    pub module: ModuleKind,
    pub space: ProbeSpace,
    pub dispatch: DispatchConfig,
    pub transport: TransportConfig,
    /// Rotation endpoints; empty when rotation is off
    pub endpoints: Vec<Endpoint>,
    pub classifier: Classifier,
}

impl ConfigFile {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;

        let config = Self::parse(&contents, ConfigFormat::from_path(path))?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn parse(contents: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        match format {
            ConfigFormat::Json => {
                serde_json::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
            }
            ConfigFormat::Toml => {
                toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
            }
        }
    }

    pub fn section(&self, module: ModuleKind) -> Result<&ProbeConfig, ConfigError> {
        let section = match module {
            ModuleKind::Brute => self.brute.as_ref(),
            ModuleKind::Fuzz => self.fuzz.as_ref(),
            ModuleKind::RateLimit => self.rate_limit.as_ref(),
        };
        section.ok_or_else(|| ConfigError::MissingSection(section_name(module).to_string()))
    }

    /// Validate and resolve one module. Relative wordlist paths are taken
    /// from `base_dir`.
    pub fn plan(&self, module: ModuleKind, base_dir: &Path) -> Result<ModulePlan, ConfigError> {
        self.section(module)?.resolve(module, &self.endpoints, base_dir)
    }

    pub fn campaign(&self) -> Result<&CampaignConfig, ConfigError> {
        self.campaign
            .as_ref()
            .ok_or_else(|| ConfigError::MissingSection("campaign".to_string()))
    }

    /// Resolve one module against a different target URL
    pub fn plan_for_target(
        &self,
        module: ModuleKind,
        target_url: &str,
        base_dir: &Path,
    ) -> Result<ModulePlan, ConfigError> {
        let mut section = self.section(module)?.clone();
        section.target_url = Some(target_url.to_string());
        section.resolve(module, &self.endpoints, base_dir)
    }

    /// Sample configuration used by `init`
    pub fn sample() -> Self {
        let brute = ProbeConfig {
            target_url: Some("http://localhost:8080/login".into()),
            methods: vec!["POST".into()],
            usernames: vec!["admin".into()],
            passwords: vec!["password".into(), "123456".into(), "admin".into()],
            max_attempts: Some(100),
            rate_per_second: Some(5.0),
            ..ProbeConfig::default()
        };
        let fuzz = ProbeConfig {
            target_url: Some("http://localhost:8080/api/search".into()),
            methods: vec!["GET".into(), "POST".into()],
            injection_points: vec!["q".into()],
            payloads: vec!["'".into(), "<script>alert(1)</script>".into(), "../../etc/passwd".into()],
            concurrency: 4,
            rate_per_second: Some(10.0),
            ..ProbeConfig::default()
        };
        let rate_limit = ProbeConfig {
            target_url: Some("http://localhost:8080/api/status".into()),
            repeat: 50,
            concurrency: 5,
            ..ProbeConfig::default()
        };

        Self {
            brute: Some(brute),
            fuzz: Some(fuzz),
            rate_limit: Some(rate_limit),
            endpoints: EndpointList::default(),
            campaign: None,
        }
    }

    pub fn sample_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::sample())
    }
}

fn section_name(module: ModuleKind) -> &'static str {
    match module {
        ModuleKind::Brute => "brute",
        ModuleKind::Fuzz => "fuzz",
        ModuleKind::RateLimit => "rateLimit",
    }
}

impl ProbeConfig {
    pub fn resolve(
        &self,
        module: ModuleKind,
        shared_endpoints: &EndpointList,
        base_dir: &Path,
    ) -> Result<ModulePlan, ConfigError> {
        let target = self
            .target_url
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField("targetUrl".into()))?;

        let plan = self.probe_plan(module, base_dir)?;
        let space = ProbeSpace::new(module, target, self.methods.clone(), plan)?
            .with_headers(self.headers.clone())
            .with_body_format(self.body_format)
            .with_max_attempts(self.max_attempts);

        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(invalid(
                "concurrency",
                &format!("must be between 1 and {}", MAX_CONCURRENCY),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeoutMs", "must be greater than 0"));
        }
        if self.max_body_bytes == 0 {
            return Err(invalid("maxBodyBytes", "must be greater than 0"));
        }

        let endpoints = self.rotation_endpoints(shared_endpoints)?;

        let dispatch = DispatchConfig {
            concurrency: self.concurrency,
            rate_per_second: self.effective_rate()?,
            timeout: Duration::from_millis(self.timeout_ms),
            retry: RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_backoff_ms)),
            success: self.success.clone(),
        };

        let mut transport = TransportConfig {
            timeout: dispatch.timeout,
            follow_redirects: self.follow_redirects,
            max_body_bytes: self.max_body_bytes,
            ..TransportConfig::default()
        };
        if let Some(user_agent) = &self.user_agent {
            transport.user_agent = user_agent.clone();
        }

        let classifier = Classifier::from_options(&ClassifierOptions {
            module,
            slow_threshold_ms: self.slow_threshold_ms,
            default_rules: self.default_rules,
            custom_rules: self.rules.clone(),
        })?;

        Ok(ModulePlan {
            module,
            space,
            dispatch,
            transport,
            endpoints,
            classifier,
        })
    }

    fn probe_plan(&self, module: ModuleKind, base_dir: &Path) -> Result<ProbePlan, ConfigError> {
        let plan = match module {
            ModuleKind::Brute => ProbePlan::Credentials {
                username_field: self.username_field.clone(),
                password_field: self.password_field.clone(),
                usernames: self.word_source(&self.usernames, self.usernames_file.as_deref(), base_dir)?,
                passwords: self.word_source(&self.passwords, self.passwords_file.as_deref(), base_dir)?,
            },
            ModuleKind::Fuzz => ProbePlan::Fuzz {
                injection_points: self.injection_points.clone(),
                payloads: self.word_source(&self.payloads, self.payloads_file.as_deref(), base_dir)?,
            },
            ModuleKind::RateLimit => ProbePlan::Repeat { count: self.repeat },
        };
        Ok(plan)
    }

    /// Inline entries followed by file entries. Inline lists are kept as
    /// written; when a file is given the combined list is normalised.
    fn word_source(
        &self,
        inline: &[String],
        file: Option<&Path>,
        base_dir: &Path,
    ) -> Result<Vec<String>, ConfigError> {
        let Some(file) = file else {
            return Ok(inline.to_vec());
        };

        let path = if file.is_absolute() {
            file.to_path_buf()
        } else {
            base_dir.join(file)
        };
        let mut words = inline.to_vec();
        words.extend(load_wordlist(&path, &self.wordlist)?);
        Ok(normalize_wordlist(words, &self.wordlist))
    }

    /// Attempt starts per second, from `ratePerSecond` or legacy `delayMs`
    pub fn effective_rate(&self) -> Result<Option<f64>, ConfigError> {
        let (field, rate) = match (self.rate_per_second, self.delay_ms) {
            (Some(rate), _) => ("ratePerSecond", rate),
            (None, Some(delay)) if delay > 0 => ("delayMs", 1000.0 / delay as f64),
            (None, _) => return Ok(None),
        };

        if !rate.is_finite() || rate <= 0.0 {
            return Err(invalid(field, &format!("{} is not a positive number", rate)));
        }
        if rate < MIN_RATE_PER_SECOND {
            return Err(invalid(
                field,
                &format!("rate {} is below the minimum of {} per second", rate, MIN_RATE_PER_SECOND),
            ));
        }
        Ok(Some(rate))
    }

    /// Endpoints to rotate through, honouring `useProxy`
    fn rotation_endpoints(&self, shared: &EndpointList) -> Result<Vec<Endpoint>, ConfigError> {
        let list = self.endpoints.as_ref().unwrap_or(shared);
        let use_proxy = self.use_proxy.unwrap_or(!list.is_empty());

        if !use_proxy {
            return Ok(Vec::new());
        }
        if list.is_empty() {
            return Err(invalid("useProxy", "enabled but no endpoints are configured"));
        }

        list.specs().iter().map(EndpointSpec::to_endpoint).collect()
    }
}

/// Upper bound on probes in flight
pub const MAX_CONCURRENCY: usize = 4096;

/// Slowest accepted pacing, one attempt every ~11.5 days
pub const MIN_RATE_PER_SECOND: f64 = 1e-6;

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(json: &str) -> ConfigFile {
        ConfigFile::parse(json, ConfigFormat::Json).unwrap()
    }

    fn plan(json: &str, module: ModuleKind) -> Result<ModulePlan, ConfigError> {
        parse(json).plan(module, Path::new("."))
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse(r#"{"fuzz": {"targetUrl": "http://test.local/api", "payloads": ["x"]}}"#);
        let fuzz = config.section(ModuleKind::Fuzz).unwrap();
        assert_eq!(fuzz.methods, vec!["GET"]);
        assert_eq!(fuzz.injection_points, vec!["test"]);
        assert_eq!(fuzz.concurrency, 1);
        assert_eq!(fuzz.timeout_ms, 5000);
        assert_eq!(fuzz.max_retries, 2);
        assert!(fuzz.default_rules);

        let plan = plan(r#"{"fuzz": {"targetUrl": "http://test.local/api", "payloads": ["x"]}}"#, ModuleKind::Fuzz).unwrap();
        assert_eq!(plan.space.len(), 1);
        assert!(plan.endpoints.is_empty());
        assert_eq!(plan.dispatch.rate_per_second, None);
    }

    #[test]
    fn test_legacy_section_names_and_fields() {
        let config = parse(
            r#"{
                "smartBrute": {"targetUrl": "http://t.local/login", "usernames": ["a"], "passwords": ["b"], "delayMs": 250},
                "rateLimitChecker": {"targetUrl": "http://t.local/", "maxRequests": 7, "intervalMs": 100},
                "proxy": {"protocol": "http", "host": "127.0.0.1", "port": 8080}
            }"#,
        );

        let brute = config.plan(ModuleKind::Brute, Path::new(".")).unwrap();
        assert_eq!(brute.dispatch.rate_per_second, Some(4.0));
        assert_eq!(brute.endpoints.len(), 1);
        assert_eq!(brute.endpoints[0].url, "http://127.0.0.1:8080");

        let rate = config.plan(ModuleKind::RateLimit, Path::new(".")).unwrap();
        assert_eq!(rate.space.len(), 7);
        assert_eq!(rate.dispatch.rate_per_second, Some(10.0));
    }

    #[test]
    fn test_missing_section_and_target() {
        assert!(matches!(
            plan(r#"{}"#, ModuleKind::Fuzz),
            Err(ConfigError::MissingSection(_))
        ));
        assert!(matches!(
            plan(r#"{"fuzz": {"payloads": ["x"]}}"#, ModuleKind::Fuzz),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            r#"{"fuzz": {"targetUrl": "ftp://t.local/", "payloads": ["x"]}}"#,
            r#"{"fuzz": {"targetUrl": "http://t.local/", "payloads": []}}"#,
            r#"{"fuzz": {"targetUrl": "http://t.local/", "payloads": ["x"], "methods": ["G ET"]}}"#,
            r#"{"fuzz": {"targetUrl": "http://t.local/", "payloads": ["x"], "concurrency": 0}}"#,
            r#"{"fuzz": {"targetUrl": "http://t.local/", "payloads": ["x"], "timeoutMs": 0}}"#,
            r#"{"fuzz": {"targetUrl": "http://t.local/", "payloads": ["x"], "ratePerSecond": -1}}"#,
            r#"{"fuzz": {"targetUrl": "http://t.local/", "payloads": ["x"], "ratePerSecond": 1e-30}}"#,
            r#"{"fuzz": {"targetUrl": "http://t.local/", "payloads": ["x"], "concurrency": 18446744073709551615}}"#,
            r#"{"fuzz": {"targetUrl": "http://t.local/", "payloads": ["x"], "concurrency": 4097}}"#,
            r#"{"fuzz": {"targetUrl": "http://t.local/", "payloads": ["x"], "useProxy": true}}"#,
            r#"{"fuzz": {"targetUrl": "http://t.local/", "payloads": ["x"], "endpoints": ["nope"]}}"#,
            r#"{"fuzz": {"targetUrl": "http://t.local/", "payloads": ["x"], "rules": [{"type": "body", "pattern": "(", "severity": "LOW"}]}}"#,
        ];
        for case in cases {
            assert!(plan(case, ModuleKind::Fuzz).is_err(), "accepted: {}", case);
        }
    }

    #[test]
    fn test_extreme_values_rejected_with_field() {
        let err = plan(
            r#"{"rateLimit": {"targetUrl": "http://t.local/", "ratePerSecond": 1e-30}}"#,
            ModuleKind::RateLimit,
        )
        .err();
        assert!(matches!(err, Some(ConfigError::ValidationError { ref field, .. }) if field == "ratePerSecond"));

        let err = plan(
            r#"{"rateLimit": {"targetUrl": "http://t.local/", "concurrency": 18446744073709551615}}"#,
            ModuleKind::RateLimit,
        )
        .err();
        assert!(matches!(err, Some(ConfigError::ValidationError { ref field, .. }) if field == "concurrency"));

        let plan = plan(
            r#"{"rateLimit": {"targetUrl": "http://t.local/", "concurrency": 4096, "ratePerSecond": 0.000001}}"#,
            ModuleKind::RateLimit,
        )
        .unwrap();
        assert_eq!(plan.dispatch.concurrency, MAX_CONCURRENCY);
        assert_eq!(plan.dispatch.rate_per_second, Some(MIN_RATE_PER_SECOND));
    }

    #[test]
    fn test_campaign_section() {
        let config = parse(
            r#"{
                "rateLimit": {"targetUrl": "http://placeholder.local/", "repeat": 2},
                "campaign": {
                    "campaignName": "weekly",
                    "targets": ["http://a.local/", {"name": "B", "target": "http://b.local/"}],
                    "modules": ["rateLimitChecker", "fuzz"],
                    "delayBetweenTargets": 5
                }
            }"#,
        );
        let campaign = config.campaign().unwrap().resolve(Path::new(".")).unwrap();
        assert_eq!(campaign.name, "weekly");
        assert_eq!(campaign.modules, vec![ModuleKind::RateLimit, ModuleKind::Fuzz]);
        assert_eq!(campaign.operations(), 4);
        assert_eq!(campaign.targets[0].label(), "http://a.local/");
        assert_eq!(campaign.targets[1].label(), "B");
        assert_eq!(campaign.targets[1].url(), "http://b.local/");
        assert_eq!(campaign.delay_between_targets, Duration::from_millis(5));

        let plan = config
            .plan_for_target(ModuleKind::RateLimit, "http://b.local/", Path::new("."))
            .unwrap();
        assert_eq!(plan.space.target().as_str(), "http://b.local/");
        assert_eq!(plan.space.len(), 2);
    }

    #[test]
    fn test_campaign_targets_file_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("targets.json"), r#"["http://c.local/"]"#).unwrap();

        let config = parse(r#"{"campaign": {"targetsFile": "targets.json", "modules": ["brute"]}}"#);
        let campaign = config.campaign().unwrap().resolve(dir.path()).unwrap();
        assert_eq!(campaign.name, "campaign");
        assert_eq!(campaign.targets, vec![CampaignTarget::Url("http://c.local/".into())]);

        let unknown = parse(r#"{"campaign": {"targets": ["http://c.local/"], "modules": ["ddos"]}}"#);
        assert!(matches!(
            unknown.campaign().unwrap().resolve(dir.path()),
            Err(ConfigError::UnknownModule(_))
        ));

        let empty = parse(r#"{"campaign": {"modules": ["fuzz"]}}"#);
        assert!(matches!(
            empty.campaign().unwrap().resolve(dir.path()),
            Err(ConfigError::EmptyDimension(_))
        ));

        assert!(matches!(parse("{}").campaign(), Err(ConfigError::MissingSection(_))));
    }

    #[test]
    fn test_use_proxy_false_disables_rotation() {
        let plan = plan(
            r#"{"endpoints": ["http://p1.local:3128"], "fuzz": {"targetUrl": "http://t.local/", "payloads": ["x"], "useProxy": false}}"#,
            ModuleKind::Fuzz,
        )
        .unwrap();
        assert!(plan.endpoints.is_empty());
    }

    #[test]
    fn test_module_endpoints_override_shared() {
        let plan = plan(
            r#"{"endpoints": ["http://p1.local:3128"], "fuzz": {"targetUrl": "http://t.local/", "payloads": ["x"], "endpoints": ["socks5://p2.local:1080", "http://p3.local:3128"]}}"#,
            ModuleKind::Fuzz,
        )
        .unwrap();
        assert_eq!(plan.endpoints.len(), 2);
        assert_eq!(plan.endpoints[0].url, "socks5://p2.local:1080");
    }

    #[test]
    fn test_wordlist_file_relative_to_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("passwords.txt")).unwrap();
        writeln!(file, "# common\nsecret\n  hunter2 \nsecret\n").unwrap();

        let config = parse(
            r#"{"brute": {"targetUrl": "http://t.local/login", "methods": ["POST"], "usernames": ["admin"], "passwords": ["first"], "passwordsFile": "passwords.txt"}}"#,
        );
        let plan = config.plan(ModuleKind::Brute, dir.path()).unwrap();
        let payloads: Vec<_> = plan.space.iter().filter_map(|s| s.payload).collect();
        assert_eq!(payloads, vec!["first", "secret", "hunter2"]);
    }

    #[test]
    fn test_toml_config() {
        let toml = r#"
            [rateLimit]
            targetUrl = "http://t.local/"
            repeat = 3
            concurrency = 2

            [[rateLimit.rules]]
            type = "status"
            min = 429
            severity = "HIGH"
        "#;
        let config = ConfigFile::parse(toml, ConfigFormat::Toml).unwrap();
        let plan = config.plan(ModuleKind::RateLimit, Path::new(".")).unwrap();
        assert_eq!(plan.space.len(), 3);
        assert_eq!(plan.dispatch.concurrency, 2);
        assert!(plan.classifier.rule_names().contains(&"status"));
    }

    #[test]
    fn test_load_detects_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        std::fs::write(&path, "[fuzz]\ntargetUrl = \"http://t.local/\"\npayloads = [\"x\"]\n").unwrap();
        assert!(ConfigFile::load(&path).unwrap().fuzz.is_some());

        let missing = ConfigFile::load(&dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ConfigError::ReadError { .. })));
        assert!(ConfigFile::parse("{not json", ConfigFormat::Json).is_err());
    }

    #[test]
    fn test_sample_config_is_valid() {
        let json = ConfigFile::sample_json().unwrap();
        let config = parse(&json);
        for module in ModuleKind::all() {
            assert!(config.plan(*module, Path::new(".")).is_ok(), "{} invalid", module);
        }
    }
}
