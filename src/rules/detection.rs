//! Detection records and deterministic ordering.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use super::ir::DataflowScope;

/// A finding produced by a rule executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Filled in by the engine once the executor returns.
    pub rule_id: Option<String>,
    pub file_path: PathBuf,
    pub function_fqn: String,
    /// Line of the taint source, for dataflow detections.
    pub source_line: Option<usize>,
    pub sink_line: usize,
    pub tainted_var: Option<String>,
    pub sink_call_target: String,
    pub confidence: f64,
    pub sanitized: bool,
    pub scope: DataflowScope,
    /// Call path for global flows, caller to callee.
    pub path: Vec<String>,
}

impl Detection {
    /// Identity used by the logic combinators.
    pub fn key(&self) -> (String, Option<usize>, usize) {
        (self.function_fqn.clone(), self.source_line, self.sink_line)
    }
}

/// Deterministic emission order: `(file_path, sink_line, rule_id)`, with
/// exact duplicates removed.
pub fn sort_and_dedupe(mut detections: Vec<Detection>) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        (&a.file_path, a.sink_line, &a.rule_id, &a.function_fqn, a.source_line).cmp(&(
            &b.file_path,
            b.sink_line,
            &b.rule_id,
            &b.function_fqn,
            b.source_line,
        ))
    });
    detections.dedup_by(|a, b| {
        a.rule_id == b.rule_id
            && a.function_fqn == b.function_fqn
            && a.source_line == b.source_line
            && a.sink_line == b.sink_line
            && a.tainted_var == b.tainted_var
    });
    detections
}
