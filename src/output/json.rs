use serde::Serialize;

use crate::error::Result;
use crate::rules::Detection;
use crate::AnalysisReport;

#[derive(Serialize)]
struct JsonReport<'a> {
    target: &'a str,
    pass: bool,
    files_analyzed: usize,
    rules_loaded: usize,
    detections: &'a [Detection],
}

/// Render the report as a JSON document.
pub fn render(report: &AnalysisReport) -> Result<String> {
    let json = serde_json::to_string_pretty(&JsonReport {
        target: &report.target_name,
        pass: report.pass,
        files_analyzed: report.files_analyzed,
        rules_loaded: report.rules_loaded,
        detections: &report.detections,
    })?;
    Ok(json)
}
