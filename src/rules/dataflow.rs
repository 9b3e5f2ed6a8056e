//! Dataflow executors: intra-procedural taint with sanitizer dominance, and
//! inter-procedural source-to-sink reachability over the call graph.

use std::collections::BTreeSet;

use crate::analysis::taint::{self, TaintSpec};
use crate::analysis::ProgramModel;
use crate::error::Result;
use crate::ir::CallSite;

use super::call_matcher::CallMatcherExec;
use super::detection::Detection;
use super::ir::{DataflowIr, DataflowScope};
use super::Executor;

const LOCAL_CONFIDENCE: f64 = 0.9;
const GLOBAL_CONFIDENCE: f64 = 0.8;

pub struct DataflowExec {
    scope: DataflowScope,
    sources: Vec<CallMatcherExec>,
    sinks: Vec<CallMatcherExec>,
    sanitizers: Vec<CallMatcherExec>,
}

impl DataflowExec {
    pub fn new(ir: DataflowIr) -> Result<Self> {
        let build = |irs: Vec<super::ir::CallMatcherIr>| -> Result<Vec<CallMatcherExec>> {
            irs.into_iter().map(CallMatcherExec::new).collect()
        };
        Ok(Self {
            scope: ir.scope,
            sources: build(ir.sources)?,
            sinks: build(ir.sinks)?,
            sanitizers: build(ir.sanitizers)?,
        })
    }

    fn local_detections(&self, program: &ProgramModel) -> Vec<Detection> {
        let mut detections = Vec::new();
        let spec = Matchers(self);

        for (fqn, func) in &program.call_graph.functions {
            let sites = program.call_graph.sites_of(fqn);
            let has_source = sites.iter().any(|s| spec.is_source(s));
            let has_sink = sites.iter().any(|s| spec.is_sink(s));
            if !has_source || !has_sink {
                continue;
            }
            let Some(cfg) = program.cfgs.get(fqn) else {
                continue;
            };

            for flow in taint::analyze_function(func, cfg, &spec) {
                if flow.sanitized {
                    tracing::debug!(
                        function = %fqn,
                        sink_line = flow.sink_line,
                        "flow suppressed by dominating sanitizer"
                    );
                    continue;
                }
                detections.push(Detection {
                    rule_id: None,
                    file_path: func.location.file.clone(),
                    function_fqn: fqn.clone(),
                    source_line: Some(flow.source_line),
                    sink_line: flow.sink_line,
                    tainted_var: Some(flow.variable),
                    sink_call_target: flow.sink_target,
                    confidence: LOCAL_CONFIDENCE,
                    sanitized: false,
                    scope: DataflowScope::Local,
                    path: Vec::new(),
                });
            }
        }
        detections
    }

    fn global_detections(&self, program: &ProgramModel) -> Vec<Detection> {
        let spec = Matchers(self);
        let mut detections = Vec::new();

        let source_sites: Vec<(&str, &CallSite)> = program
            .call_graph
            .all_call_sites()
            .filter(|(_, s)| spec.is_source(s))
            .collect();
        let sink_sites: Vec<(&str, &CallSite)> = program
            .call_graph
            .all_call_sites()
            .filter(|(_, s)| spec.is_sink(s))
            .collect();
        // Functions that apply any sanitizer anywhere in their body.
        let sanitizer_fns: BTreeSet<&str> = program
            .call_graph
            .all_call_sites()
            .filter(|(_, s)| spec.is_sanitizer(s))
            .map(|(fqn, _)| fqn)
            .collect();

        for (source_fqn, source_site) in &source_sites {
            for (sink_fqn, sink_site) in &sink_sites {
                if source_fqn == sink_fqn {
                    continue;
                }
                let Some(path) = program.call_graph.call_path(source_fqn, sink_fqn) else {
                    continue;
                };
                if path.iter().any(|f| sanitizer_fns.contains(f.as_str())) {
                    continue;
                }
                detections.push(Detection {
                    rule_id: None,
                    file_path: sink_site.location.file.clone(),
                    function_fqn: sink_fqn.to_string(),
                    source_line: Some(source_site.location.line),
                    sink_line: sink_site.location.line,
                    // Cross-function flows do not track a single variable.
                    tainted_var: Some(String::new()),
                    sink_call_target: sink_site.target_name.clone(),
                    confidence: GLOBAL_CONFIDENCE,
                    sanitized: false,
                    scope: DataflowScope::Global,
                    path,
                });
            }
        }
        detections
    }
}

/// Adapter from the matcher lists to the taint engine's predicates.
struct Matchers<'a>(&'a DataflowExec);

impl TaintSpec for Matchers<'_> {
    fn is_source(&self, call: &CallSite) -> bool {
        self.0.sources.iter().any(|m| m.matches_site(call))
    }
    fn is_sink(&self, call: &CallSite) -> bool {
        self.0.sinks.iter().any(|m| m.matches_site(call))
    }
    fn is_sanitizer(&self, call: &CallSite) -> bool {
        self.0.sanitizers.iter().any(|m| m.matches_site(call))
    }
    fn is_source_expr(&self, expr: &str) -> bool {
        self.0.sources.iter().any(|m| m.matches_name(expr))
    }
}

impl Executor for DataflowExec {
    fn run(&self, program: &ProgramModel) -> Vec<Detection> {
        match self.scope {
            DataflowScope::Local => self.local_detections(program),
            DataflowScope::Global => {
                // Global runs local first, then cross-function pairs.
                let mut detections = self.local_detections(program);
                detections.extend(self.global_detections(program));
                detections
            }
        }
    }
}

#[cfg(all(test, feature = "python"))]
mod tests {
    use super::*;
    use crate::analysis::ProgramModel;
    use serde_json::json;

    fn dataflow(scope: &str) -> DataflowExec {
        DataflowExec::new(
            serde_json::from_value(json!({
                "sources": [{"patterns": ["request.*"], "wildcard": true}],
                "sinks": [{"patterns": ["eval"]}],
                "sanitizers": [{"patterns": ["escape"]}],
                "scope": scope
            }))
            .unwrap(),
        )
        .unwrap()
    }

    fn program(sources: &[(&str, &str)]) -> ProgramModel {
        use crate::analysis::analyze_module;
        use crate::parser::python::PythonAdapter;
        let modules: Vec<_> = sources
            .iter()
            .map(|(name, src)| {
                analyze_module(
                    &PythonAdapter,
                    std::path::Path::new(&format!("{name}.py")),
                    name,
                    src,
                )
                .unwrap()
            })
            .collect();
        ProgramModel::from_modules(modules)
    }

    #[test]
    fn local_flow_detected_at_confidence_09() {
        let program = program(&[(
            "app",
            r#"
def f():
    x = request.GET()
    eval(x)
"#,
        )]);
        let detections = dataflow("local").run(&program);
        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.scope, DataflowScope::Local);
        assert_eq!(d.confidence, 0.9);
        assert_eq!(d.tainted_var.as_deref(), Some("x"));
        assert_eq!(d.source_line, Some(3));
        assert_eq!(d.sink_line, 4);
    }

    #[test]
    fn dominating_sanitizer_suppresses_local_flow() {
        let program = program(&[(
            "app",
            r#"
def f():
    x = request.GET()
    x = escape(x)
    eval(x)
"#,
        )]);
        assert!(dataflow("local").run(&program).is_empty());
    }

    #[test]
    fn global_flow_follows_call_path() {
        let program = program(&[(
            "app",
            r#"
def a():
    x = request.GET()
    b(x)

def b(data):
    eval(data)
"#,
        )]);
        let detections = dataflow("global").run(&program);
        let global: Vec<_> = detections
            .iter()
            .filter(|d| d.scope == DataflowScope::Global)
            .collect();
        assert_eq!(global.len(), 1);
        let d = global[0];
        assert_eq!(d.confidence, 0.8);
        assert_eq!(d.tainted_var.as_deref(), Some(""));
        assert_eq!(d.path, vec!["app.a", "app.b"]);
    }

    #[test]
    fn sanitizer_on_path_suppresses_global_flow() {
        let program = program(&[(
            "app",
            r#"
def a():
    x = request.GET()
    b(x)

def b(data):
    clean = escape(data)
    eval(clean)
"#,
        )]);
        let detections = dataflow("global").run(&program);
        assert!(
            detections.iter().all(|d| d.scope != DataflowScope::Global),
            "sanitizing function on the path kills the global flow"
        );
    }

    #[test]
    fn unrelated_functions_produce_nothing() {
        let program = program(&[(
            "app",
            r#"
def a():
    x = request.GET()
    log(x)

def c():
    eval("1 + 1")
"#,
        )]);
        let detections = dataflow("global").run(&program);
        // `a` never reaches `c` in the call graph.
        assert!(detections.iter().all(|d| d.scope != DataflowScope::Global));
    }
}
