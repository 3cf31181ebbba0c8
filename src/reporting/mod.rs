//! Run reporting
//!
//! The `Aggregator` accumulates probe outcomes into a `RunReport`. Counters are
//! updated on every `record`, so a consistent partial report can be taken at
//! any point. `finalize` freezes it.

pub mod checkpoint;
pub mod formats;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::classifier::{Finding, FindingKind, Severity};
use crate::error::{ProbeError, ReportError};
use crate::probe::{ModuleKind, ProbeResult, ProbeSpec};

/// Report metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// Run identifier
    pub id: String,
    pub module: ModuleKind,
    /// Target URL
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock duration, set on finalize
    pub duration_ms: u64,
    /// Stopped before the probe space was exhausted
    pub cancelled: bool,
    pub finalized: bool,
    pub tool_version: String,
}

impl ReportMetadata {
    pub fn new(module: ModuleKind, target: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            module,
            target: target.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
            cancelled: false,
            finalized: false,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Summary counters, kept consistent with the records on every update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Probe results recorded
    pub attempted: u64,
    pub succeeded: u64,
    /// Results whose success predicate did not match, transport errors included
    pub failed: u64,
    pub transport_errors: u64,
    /// Results whose spec id had already been recorded
    pub duplicates: u64,
    pub findings_total: u64,
    pub findings_by_severity: BTreeMap<Severity, u64>,
    pub findings_by_kind: BTreeMap<FindingKind, u64>,
    /// Responses per HTTP status
    pub status_distribution: BTreeMap<u16, u64>,
    /// Transport errors per kind
    pub errors_by_kind: BTreeMap<String, u64>,
    pub success_rate_pct: f64,
    pub failure_rate_pct: f64,
    /// Share of findings at each severity
    pub severity_pct: BTreeMap<Severity, f64>,
    /// Every rotation endpoint failed and the run went direct
    pub no_endpoints_available: bool,
    pub failed_endpoints: Vec<String>,
    #[serde(default)]
    pub latency: LatencyStats,
    /// Lowest spec id that drew a throttling finding
    #[serde(default)]
    pub rate_limit_at: Option<u64>,
    /// Description of the finding behind `rate_limit_at`
    #[serde(default)]
    pub rate_limit_reason: Option<String>,
}

/// Response time statistics over every recorded result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    pub count: u64,
    pub total_ms: u64,
    pub min_ms: Option<u64>,
    pub max_ms: Option<u64>,
    /// Mean, two decimal places
    pub avg_ms: f64,
}

impl LatencyStats {
    fn add(&mut self, latency_ms: u64) {
        self.count += 1;
        self.total_ms = self.total_ms.saturating_add(latency_ms);
        self.min_ms = Some(self.min_ms.map_or(latency_ms, |m| m.min(latency_ms)));
        self.max_ms = Some(self.max_ms.map_or(latency_ms, |m| m.max(latency_ms)));
    }

    fn compute_average(&mut self) {
        self.avg_ms = if self.count == 0 {
            0.0
        } else {
            (self.total_ms as f64 * 100.0 / self.count as f64).round() / 100.0
        };
    }
}

impl RunSummary {
    fn add(&mut self, result: &ProbeResult, findings: &[Finding], duplicate: bool) {
        self.attempted += 1;
        if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        if duplicate {
            self.duplicates += 1;
        }

        match (&result.error, result.status) {
            (Some(error), _) => {
                self.transport_errors += 1;
                *self.errors_by_kind.entry(error.kind.to_string()).or_insert(0) += 1;
            }
            (None, Some(status)) => {
                *self.status_distribution.entry(status).or_insert(0) += 1;
            }
            (None, None) => {}
        }

        self.latency.add(result.latency_ms);

        for finding in findings {
            self.findings_total += 1;
            *self.findings_by_severity.entry(finding.severity).or_insert(0) += 1;
            *self.findings_by_kind.entry(finding.kind).or_insert(0) += 1;

            if finding.kind == FindingKind::RateLimited
                && self.rate_limit_at.map_or(true, |at| finding.spec_id < at)
            {
                self.rate_limit_at = Some(finding.spec_id);
                self.rate_limit_reason = Some(finding.description.clone());
            }
        }
    }

    /// Recompute the percentage breakdowns from the counters
    fn compute_percentages(&mut self) {
        self.latency.compute_average();
        self.success_rate_pct = percent(self.succeeded, self.attempted);
        self.failure_rate_pct = percent(self.failed, self.attempted);
        self.severity_pct = self
            .findings_by_severity
            .iter()
            .map(|(severity, count)| (*severity, percent(*count, self.findings_total)))
            .collect();
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    // Two decimal places
    (part as f64 * 10_000.0 / total as f64).round() / 100.0
}

/// One recorded probe with the findings it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub spec: ProbeSpec,
    pub result: ProbeResult,
    pub findings: Vec<Finding>,
    /// Spec id was already present when this record arrived
    pub duplicate: bool,
}

/// Complete report for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: ReportMetadata,
    pub summary: RunSummary,
    pub records: Vec<AttemptRecord>,
}

impl RunReport {
    /// All findings across records, in record order
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.records.iter().flat_map(|r| r.findings.iter())
    }

    /// Findings at or above a severity
    pub fn findings_at_least(&self, severity: Severity) -> Vec<&Finding> {
        self.findings().filter(|f| f.severity >= severity).collect()
    }

    pub fn to_json(&self) -> Result<String, ProbeError> {
        Ok(formats::json::generate(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ProbeError> {
        Ok(formats::json::parse(json)?)
    }

    pub fn to_csv(&self) -> String {
        formats::csv::generate(self)
    }

    /// Write the report to `dir` in the requested formats.
    ///
    /// Files are named `<module>_results.<ext>`. Returns the paths written.
    pub fn save(&self, dir: &Path, format: OutputFormat) -> Result<Vec<PathBuf>, ProbeError> {
        let mut written = Vec::new();
        if format == OutputFormat::None {
            return Ok(written);
        }

        std::fs::create_dir_all(dir)?;
        let stem = format!("{}_results", self.metadata.module.name().replace('-', "_"));

        if matches!(format, OutputFormat::Json | OutputFormat::Both) {
            let path = dir.join(format!("{}.json", stem));
            std::fs::write(&path, self.to_json()?)?;
            written.push(path);
        }
        if matches!(format, OutputFormat::Csv | OutputFormat::Both) {
            let path = dir.join(format!("{}.csv", stem));
            std::fs::write(&path, self.to_csv())?;
            written.push(path);
        }

        for path in &written {
            tracing::info!(path = %path.display(), "Report written");
        }
        Ok(written)
    }
}

/// Report export selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Both,
    None,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Both => "both",
            OutputFormat::None => "none",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct AggregatorState {
    metadata: ReportMetadata,
    summary: RunSummary,
    records: Vec<AttemptRecord>,
    seen: HashSet<u64>,
    finalized: bool,
}

impl AggregatorState {
    fn ensure_open(&self) -> Result<(), ReportError> {
        if self.finalized {
            Err(ReportError::AlreadyFinalized)
        } else {
            Ok(())
        }
    }

    fn report(&self) -> RunReport {
        let mut summary = self.summary.clone();
        summary.compute_percentages();
        RunReport {
            metadata: self.metadata.clone(),
            summary,
            records: self.records.clone(),
        }
    }
}

/// Accumulates probe outcomes for one run
pub struct Aggregator {
    state: Mutex<AggregatorState>,
}

impl Aggregator {
    pub fn new(module: ModuleKind, target: &str) -> Self {
        Self {
            state: Mutex::new(AggregatorState {
                metadata: ReportMetadata::new(module, target),
                summary: RunSummary::default(),
                records: Vec::new(),
                seen: HashSet::new(),
                finalized: false,
            }),
        }
    }

    /// Append one probe outcome. Returns whether its spec id was a duplicate.
    pub fn record(
        &self,
        spec: ProbeSpec,
        result: ProbeResult,
        findings: Vec<Finding>,
    ) -> Result<bool, ReportError> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        let duplicate = !state.seen.insert(result.spec_id);
        if duplicate {
            tracing::warn!(spec_id = result.spec_id, "Duplicate probe result recorded");
        }

        state.summary.add(&result, &findings, duplicate);
        state.records.push(AttemptRecord {
            spec,
            result,
            findings,
            duplicate,
        });

        Ok(duplicate)
    }

    /// Record the endpoint pool state at the end of dispatch
    pub fn record_endpoints(
        &self,
        no_endpoints_available: bool,
        failed_endpoints: Vec<String>,
    ) -> Result<(), ReportError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.summary.no_endpoints_available = no_endpoints_available;
        state.summary.failed_endpoints = failed_endpoints;
        Ok(())
    }

    pub fn mark_cancelled(&self) -> Result<(), ReportError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.metadata.cancelled = true;
        Ok(())
    }

    /// Partial report as of now; the aggregator stays open
    pub fn snapshot(&self) -> RunReport {
        self.state.lock().report()
    }

    /// Freeze the report and return it
    pub fn finalize(&self) -> Result<RunReport, ReportError> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        let finished = Utc::now();
        state.metadata.finished_at = Some(finished);
        state.metadata.duration_ms = finished
            .signed_duration_since(state.metadata.started_at)
            .num_milliseconds()
            .max(0) as u64;
        state.metadata.finalized = true;
        state.finalized = true;

        Ok(state.report())
    }

    pub fn is_finalized(&self) -> bool {
        self.state.lock().finalized
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
