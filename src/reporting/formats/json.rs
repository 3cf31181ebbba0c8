//! JSON report export
//!
//! Lossless: `parse(generate(report))` yields an equal report.

use crate::reporting::RunReport;

/// Generate pretty-printed JSON
pub fn generate(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Parse a report previously written by `generate`
pub fn parse(json: &str) -> Result<RunReport, serde_json::Error> {
    serde_json::from_str(json)
}
