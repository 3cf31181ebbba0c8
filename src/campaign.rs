//! Multi-target campaigns
//!
//! A campaign crosses every configured target with every configured module
//! and executes the resulting runs one after another through `Runner`. Each
//! run keeps its own report; the campaign report rolls their summaries up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::app::{CampaignPlan, CampaignTarget, ConfigFile};
use crate::classifier::Severity;
use crate::dispatch::StopHandle;
use crate::error::{ConfigError, ProbeError};
use crate::probe::ModuleKind;
use crate::reporting::{OutputFormat, RunReport, RunSummary};
use crate::runner::Runner;

/// One module run against one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignOperation {
    pub target: String,
    pub target_url: String,
    pub module: ModuleKind,
    /// The run completed; findings do not make it fail
    pub success: bool,
    pub error: Option<String>,
    pub run_id: Option<String>,
    pub duration_ms: u64,
    pub summary: Option<RunSummary>,
    pub report_files: Vec<PathBuf>,
}

impl CampaignOperation {
    fn failed(target: &CampaignTarget, module: ModuleKind, error: String, elapsed: Duration) -> Self {
        Self {
            target: target.label().to_string(),
            target_url: target.url().to_string(),
            module,
            success: false,
            error: Some(error),
            run_id: None,
            duration_ms: elapsed.as_millis() as u64,
            summary: None,
            report_files: Vec::new(),
        }
    }

    fn completed(
        target: &CampaignTarget,
        module: ModuleKind,
        report: RunReport,
        report_files: Vec<PathBuf>,
        elapsed: Duration,
    ) -> Self {
        Self {
            target: target.label().to_string(),
            target_url: target.url().to_string(),
            module,
            success: true,
            error: None,
            run_id: Some(report.metadata.id),
            duration_ms: elapsed.as_millis() as u64,
            summary: Some(report.summary),
            report_files,
        }
    }
}

/// Totals across every operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSummary {
    pub total_targets: u64,
    pub total_modules: u64,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    /// Probe results across all runs
    pub probes_attempted: u64,
    pub findings_total: u64,
    pub findings_by_severity: BTreeMap<Severity, u64>,
    /// Findings per target label
    pub findings_by_target: BTreeMap<String, u64>,
}

impl CampaignSummary {
    fn add(&mut self, operation: &CampaignOperation) {
        self.total_operations += 1;
        if !operation.success {
            self.failed_operations += 1;
            return;
        }
        self.successful_operations += 1;

        let Some(summary) = &operation.summary else {
            return;
        };
        self.probes_attempted += summary.attempted;
        self.findings_total += summary.findings_total;
        for (severity, count) in &summary.findings_by_severity {
            *self.findings_by_severity.entry(*severity).or_insert(0) += count;
        }
        *self
            .findings_by_target
            .entry(operation.target.clone())
            .or_insert(0) += summary.findings_total;
    }
}

/// Outcome of a whole campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignReport {
    pub id: String,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Stopped before every operation ran
    pub cancelled: bool,
    pub summary: CampaignSummary,
    pub operations: Vec<CampaignOperation>,
}

impl CampaignReport {
    pub fn to_json(&self) -> Result<String, ProbeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write `campaign_results.json` into `dir`
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ProbeError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("campaign_results.json");
        std::fs::write(&path, self.to_json()?)?;
        tracing::info!(path = %path.display(), "Campaign report written");
        Ok(path)
    }
}

/// Sequential multi-target campaign
pub struct Campaign {
    config: ConfigFile,
    plan: CampaignPlan,
    base_dir: PathBuf,
    stop: StopHandle,
    output: Option<(PathBuf, OutputFormat)>,
}

impl Campaign {
    /// Validate the campaign section of `config`
    pub fn new(config: ConfigFile, base_dir: &Path) -> Result<Self, ConfigError> {
        let plan = config.campaign()?.resolve(base_dir)?;
        Ok(Self {
            config,
            plan,
            base_dir: base_dir.to_path_buf(),
            stop: StopHandle::new(),
            output: None,
        })
    }

    /// Save every run's report under `dir`, one subdirectory per target
    pub fn with_output(mut self, dir: &Path, format: OutputFormat) -> Self {
        self.output = Some((dir.to_path_buf(), format));
        self
    }

    pub fn plan(&self) -> &CampaignPlan {
        &self.plan
    }

    /// Stops the current run and skips the remaining operations
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run every operation in target-major order.
    ///
    /// A target or module that cannot be planned fails its operation only.
    pub async fn run(self) -> Result<CampaignReport, ProbeError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let targets = &self.plan.targets;
        let modules = &self.plan.modules;

        tracing::info!(
            campaign = %self.plan.name,
            targets = targets.len(),
            modules = modules.len(),
            operations = self.plan.operations(),
            "Starting campaign"
        );

        let mut summary = CampaignSummary {
            total_targets: targets.len() as u64,
            total_modules: modules.len() as u64,
            ..CampaignSummary::default()
        };
        let mut operations = Vec::with_capacity(self.plan.operations());
        let mut cancelled = false;

        'targets: for (target_index, target) in targets.iter().enumerate() {
            for (module_index, module) in modules.iter().enumerate() {
                if self.stop.is_stopped() {
                    cancelled = true;
                    break 'targets;
                }

                let operation = self.run_operation(target_index, target, *module).await?;
                summary.add(&operation);
                operations.push(operation);

                if module_index + 1 < modules.len() && !self.plan.delay_between_modules.is_zero() {
                    tokio::time::sleep(self.plan.delay_between_modules).await;
                }
            }

            if target_index + 1 < targets.len() && !self.plan.delay_between_targets.is_zero() {
                tracing::debug!(
                    delay_ms = self.plan.delay_between_targets.as_millis() as u64,
                    "Waiting before next target"
                );
                tokio::time::sleep(self.plan.delay_between_targets).await;
            }
        }

        // A run interrupted mid-way also leaves the stop flag set
        cancelled |= self.stop.is_stopped();

        let report = CampaignReport {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.plan.name.clone(),
            started_at,
            finished_at: Utc::now(),
            duration_ms: clock.elapsed().as_millis() as u64,
            cancelled,
            summary,
            operations,
        };

        tracing::info!(
            campaign = %report.name,
            operations = report.summary.total_operations,
            failed = report.summary.failed_operations,
            findings = report.summary.findings_total,
            cancelled,
            "Campaign complete"
        );

        Ok(report)
    }

    async fn run_operation(
        &self,
        target_index: usize,
        target: &CampaignTarget,
        module: ModuleKind,
    ) -> Result<CampaignOperation, ProbeError> {
        let started = Instant::now();
        tracing::info!(target_name = target.label(), module = %module, "Campaign operation");

        let runner = self
            .config
            .plan_for_target(module, target.url(), &self.base_dir)
            .map_err(ProbeError::from)
            .and_then(Runner::from_plan);
        let runner = match runner {
            Ok(runner) => runner.with_stop_handle(self.stop.clone()),
            Err(err) => {
                tracing::warn!(target_name = target.label(), module = %module, error = %err, "Operation skipped");
                return Ok(CampaignOperation::failed(target, module, err.to_string(), started.elapsed()));
            }
        };

        let report = runner.run().await?;
        let report_files = match &self.output {
            Some((dir, format)) => report.save(&dir.join(run_dir_name(target_index, target)), *format)?,
            None => Vec::new(),
        };

        Ok(CampaignOperation::completed(target, module, report, report_files, started.elapsed()))
    }
}

/// `<nn>_<label>` with anything but alphanumerics, `-` and `_` replaced
fn run_dir_name(index: usize, target: &CampaignTarget) -> String {
    let label: String = target
        .label()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{:02}_{}", index + 1, label.trim_matches('_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ConfigFormat;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status).set_body_string("ok"))
            .mount(&server)
            .await;
        server
    }

    fn campaign(json: &str) -> Campaign {
        let config = ConfigFile::parse(json, ConfigFormat::Json).unwrap();
        Campaign::new(config, Path::new(".")).unwrap()
    }

    #[tokio::test]
    async fn test_every_target_crossed_with_every_module() {
        let healthy = server(200).await;
        let broken = server(500).await;
        let config = format!(
            r#"{{
                "rateLimit": {{"repeat": 2}},
                "fuzz": {{"payloads": ["x", "y"]}},
                "campaign": {{
                    "name": "nightly",
                    "targets": ["{}/", {{"name": "broken", "targetUrl": "{}/"}}],
                    "modules": ["rate-limit", "fuzz"]
                }}
            }}"#,
            healthy.uri(),
            broken.uri()
        );

        let report = campaign(&config).run().await.unwrap();

        assert_eq!(report.name, "nightly");
        assert!(!report.cancelled);
        assert_eq!(report.summary.total_operations, 4);
        assert_eq!(report.summary.successful_operations, 4);
        assert_eq!(report.summary.probes_attempted, 8);

        let order: Vec<_> = report.operations.iter().map(|o| (o.target.as_str(), o.module)).collect();
        assert_eq!(order[2], ("broken", ModuleKind::RateLimit));
        assert_eq!(order[3], ("broken", ModuleKind::Fuzz));

        // Only the 500 target produces server-error findings
        assert_eq!(report.summary.findings_by_target.get("broken"), Some(&4));
        assert_eq!(report.summary.findings_by_severity.get(&Severity::Medium), Some(&4));
    }

    #[tokio::test]
    async fn test_unplannable_operation_fails_alone() {
        let healthy = server(200).await;
        let config = format!(
            r#"{{
                "rateLimit": {{"repeat": 1}},
                "campaign": {{"targets": ["ftp://nowhere.local/", "{}/"], "modules": ["rateLimit", "brute"]}}
            }}"#,
            healthy.uri()
        );

        let report = campaign(&config).run().await.unwrap();

        assert_eq!(report.summary.total_operations, 4);
        assert_eq!(report.summary.successful_operations, 1);
        assert_eq!(report.summary.failed_operations, 3);
        let ok = report.operations.iter().find(|o| o.success).unwrap();
        assert_eq!(ok.module, ModuleKind::RateLimit);
        assert!(ok.run_id.is_some());
        assert!(report
            .operations
            .iter()
            .filter(|o| !o.success)
            .all(|o| o.error.is_some() && o.summary.is_none()));
    }

    #[tokio::test]
    async fn test_stopped_campaign_skips_remaining_operations() {
        let campaign = campaign(
            r#"{"rateLimit": {"repeat": 1}, "campaign": {"targets": ["http://127.0.0.1:1/"], "modules": ["rateLimit"]}}"#,
        );
        campaign.stop_handle().stop();

        let report = campaign.run().await.unwrap();
        assert!(report.cancelled);
        assert!(report.operations.is_empty());
        assert_eq!(report.summary.total_targets, 1);
    }

    #[tokio::test]
    async fn test_reports_saved_per_run() {
        let healthy = server(200).await;
        let dir = tempfile::tempdir().unwrap();
        let config = format!(
            r#"{{"rateLimit": {{"repeat": 1}}, "campaign": {{"targets": [{{"name": "api one", "target": "{}/"}}], "modules": ["rateLimit"]}}}}"#,
            healthy.uri()
        );

        let report = campaign(&config)
            .with_output(dir.path(), OutputFormat::Json)
            .run()
            .await
            .unwrap();
        let files = &report.operations[0].report_files;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0], dir.path().join("01_api_one").join("rate_limit_results.json"));
        assert!(files[0].exists());

        let path = report.save(dir.path()).unwrap();
        let saved: CampaignReport = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved, report);
    }

    #[test]
    fn test_run_dir_name() {
        let target = CampaignTarget::Url("https://api.example.com:8443/v1".into());
        assert_eq!(run_dir_name(0, &target), "01_api_example_com_8443_v1");
    }
}
