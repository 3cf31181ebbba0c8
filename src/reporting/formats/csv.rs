//! CSV report export
//!
//! One row per probe result. Finding detail beyond the kind name is not
//! carried; use the JSON export for the full report.

use crate::reporting::{AttemptRecord, RunReport};

const HEADER: &str = "timestamp,target,method,payload,success,status,findingTypes,error";

/// Generate CSV rows for every record
pub fn generate(report: &RunReport) -> String {
    let mut csv = String::new();
    csv.push_str(HEADER);
    csv.push('\n');

    for record in &report.records {
        csv.push_str(&row(record).join(","));
        csv.push('\n');
    }

    csv
}

fn row(record: &AttemptRecord) -> Vec<String> {
    let result = &record.result;
    let finding_types = record
        .findings
        .iter()
        .map(|f| f.kind.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let error = result
        .error
        .as_ref()
        .map(|e| format!("{}: {}", e.kind, e.message))
        .unwrap_or_default();

    vec![
        result.timestamp.to_rfc3339(),
        csv_escape(&record.spec.url),
        csv_escape(&record.spec.method),
        csv_escape(record.spec.payload.as_deref().unwrap_or("")),
        result.success.to_string(),
        result.status.map(|s| s.to_string()).unwrap_or_default(),
        csv_escape(&finding_types),
        csv_escape(&error),
    ]
}

/// Escape a value for CSV (handle commas, quotes, newlines)
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::test_support::sample_report;

    #[test]
    fn test_one_row_per_result() {
        let report = sample_report();
        let csv = generate(&report);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], HEADER);
        assert_eq!(lines.len(), report.records.len() + 1);
    }

    #[test]
    fn test_row_contents() {
        let csv = generate(&sample_report());
        let lines: Vec<&str> = csv.lines().collect();

        assert!(lines[1].ends_with(",http://test.local/login,POST,a,true,200,,"));
        assert!(lines[2].contains(",\"b, \"\"quoted\"\"\",false,500,SERVER_ERROR,"));
        assert!(lines[3].ends_with(",false,,,connect: connection refused"));
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("simple"), "simple");
        assert_eq!(csv_escape("with,comma"), "\"with,comma\"");
        assert_eq!(csv_escape("with\"quote"), "\"with\"\"quote\"");
        assert_eq!(csv_escape("line\nbreak"), "\"line\nbreak\"");
    }
}
