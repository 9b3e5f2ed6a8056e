use crate::AnalysisReport;

/// Render detections as plain console output, in the engine's deterministic
/// order (file, sink line, rule id).
pub fn render(report: &AnalysisReport) -> String {
    let mut output = String::new();

    if report.detections.is_empty() {
        output.push_str("\n  No detections.\n\n");
        output.push_str(&summary_line(report));
        return output;
    }

    output.push_str(&format!(
        "\n  {} detection(s) in {}:\n\n",
        report.detections.len(),
        report.target_name
    ));

    for detection in &report.detections {
        let rule = detection.rule_id.as_deref().unwrap_or("-");
        output.push_str(&format!(
            "  [{}] {} -> {} at {}:{}\n",
            rule,
            detection.function_fqn,
            detection.sink_call_target,
            detection.file_path.display(),
            detection.sink_line
        ));
        if let Some(var) = detection.tainted_var.as_deref().filter(|v| !v.is_empty()) {
            let source = detection
                .source_line
                .map(|l| format!(" (tainted at line {l})"))
                .unwrap_or_default();
            output.push_str(&format!("        via '{var}'{source}\n"));
        }
        if !detection.path.is_empty() {
            output.push_str(&format!("        path: {}\n", detection.path.join(" -> ")));
        }
        output.push_str(&format!(
            "        scope: {}, confidence: {:.2}\n\n",
            detection.scope, detection.confidence
        ));
    }

    output.push_str(&summary_line(report));
    output
}

fn summary_line(report: &AnalysisReport) -> String {
    let status = if report.pass { "PASS" } else { "FAIL" };
    format!(
        "  Result: {} ({} file(s) analyzed, {} rule(s) loaded)\n\n",
        status, report.files_analyzed, report.rules_loaded
    )
}
