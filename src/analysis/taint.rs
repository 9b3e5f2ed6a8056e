//! Intra-procedural taint tracking.
//!
//! Def–use propagation over a function's statements in source order, with
//! the CFG's dominator sets deciding whether a sanitizer covers every path
//! to a sink. The caller supplies source/sink/sanitizer predicates; this
//! module knows nothing about rule IR.

use std::collections::BTreeMap;

use crate::ir::cfg::ControlFlowGraph;
use crate::ir::statement::{self, RValue, Statement};
use crate::ir::{CallSite, FunctionDef};

/// Predicates classifying call sites for one dataflow rule.
pub trait TaintSpec {
    fn is_source(&self, call: &CallSite) -> bool;
    fn is_sink(&self, call: &CallSite) -> bool;
    fn is_sanitizer(&self, call: &CallSite) -> bool;
    /// Source match on a bare expression (`x = request.GET`), the attribute
    /// form of a source.
    fn is_source_expr(&self, expr: &str) -> bool {
        let _ = expr;
        false
    }
}

/// One tainted flow from a source line to a sink call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaintFlow {
    pub variable: String,
    pub source_line: usize,
    pub sink_line: usize,
    pub sink_target: String,
    /// True when a sanitizer dominates the sink: the flow is safe on every
    /// path and callers normally suppress it.
    pub sanitized: bool,
}

#[derive(Debug, Clone)]
struct SanitizerEvent {
    variable: String,
    line: usize,
}

enum Event<'a> {
    Call(&'a CallSite),
    Assign(&'a statement::Assignment),
}

/// Track taint through one function.
pub fn analyze_function(
    func: &FunctionDef,
    cfg: &ControlFlowGraph,
    spec: &dyn TaintSpec,
) -> Vec<TaintFlow> {
    let events = collect_events(&func.body);

    // variable -> line of the source that tainted it
    let mut tainted: BTreeMap<String, usize> = BTreeMap::new();
    let mut sanitizers: Vec<SanitizerEvent> = Vec::new();
    let mut flows: Vec<TaintFlow> = Vec::new();

    for event in &events {
        match event {
            Event::Call(call) => {
                let line = call.location.line;
                let tainted_args: Vec<String> = call
                    .arguments
                    .iter()
                    .filter(|a| a.is_variable && tainted.contains_key(&a.raw_text))
                    .map(|a| a.raw_text.clone())
                    .collect();

                if spec.is_source(call) {
                    if let Some(var) = &call.assigned_to {
                        tainted.insert(var.clone(), line);
                    }
                    continue;
                }

                if spec.is_sanitizer(call) {
                    // The returned binding is clean; the original stays
                    // tainted until reassigned.
                    for var in &tainted_args {
                        sanitizers.push(SanitizerEvent {
                            variable: var.clone(),
                            line,
                        });
                    }
                    if let Some(var) = &call.assigned_to {
                        if tainted_args.contains(var) {
                            // `x = escape(x)`: same name, now sanitized on
                            // the paths through this call. Dominance decides
                            // whether that covers the sink.
                        } else {
                            tainted.remove(var);
                        }
                    }
                    continue;
                }

                if spec.is_sink(call) {
                    for var in &tainted_args {
                        let source_line = tainted[var];
                        let sanitized =
                            sanitizer_dominates_sink(cfg, &sanitizers, var, source_line, line);
                        flows.push(TaintFlow {
                            variable: var.clone(),
                            source_line,
                            sink_line: line,
                            sink_target: call.target_name.clone(),
                            sanitized,
                        });
                    }
                    continue;
                }

                // Plain call: taint flows through to the returned binding.
                if let Some(var) = &call.assigned_to {
                    if let Some(&source_line) = tainted_args.first().map(|v| &tainted[v]) {
                        tainted.insert(var.clone(), source_line);
                    }
                }
            }
            Event::Assign(assign) => match &assign.value {
                // Calls were handled via `assigned_to` on the call event.
                RValue::Call(_) => {}
                RValue::Name(name) => {
                    match tainted.get(name).copied() {
                        Some(src) => {
                            tainted.insert(assign.target.clone(), src);
                        }
                        None => {
                            tainted.remove(&assign.target);
                        }
                    };
                }
                RValue::Attribute {
                    receiver,
                    attribute,
                } => {
                    let expr = format!("{receiver}.{attribute}");
                    if spec.is_source_expr(&expr) {
                        tainted.insert(assign.target.clone(), assign.line);
                    } else if let Some(&src) = tainted.get(receiver) {
                        tainted.insert(assign.target.clone(), src);
                    } else {
                        tainted.remove(&assign.target);
                    }
                }
                // Literal or opaque value: the binding is rewritten clean.
                RValue::Literal { .. } | RValue::Other(_) => {
                    tainted.remove(&assign.target);
                }
            },
        }
    }

    flows
}

/// A sink is "always sanitized" when some sanitizer applied to the same
/// variable, after the source, sits in a block that dominates the sink's
/// block.
fn sanitizer_dominates_sink(
    cfg: &ControlFlowGraph,
    sanitizers: &[SanitizerEvent],
    variable: &str,
    source_line: usize,
    sink_line: usize,
) -> bool {
    let Some(sink_block) = cfg.block_at_line(sink_line) else {
        return false;
    };
    sanitizers
        .iter()
        .filter(|s| s.variable == variable && s.line > source_line && s.line < sink_line)
        .any(|s| {
            cfg.block_at_line(s.line)
                .map(|b| cfg.is_dominator(&b.id, &sink_block.id))
                .unwrap_or(false)
        })
}

/// Statements and assignments flattened in line order; calls within one
/// statement keep their syntactic order and precede the assignment effect.
fn collect_events(body: &[Statement]) -> Vec<Event<'_>> {
    let mut events: Vec<(usize, usize, Event<'_>)> = Vec::new();
    let mut seq = 0usize;
    statement::walk(body, &mut |stmt| {
        for call in stmt.own_calls() {
            events.push((call.location.line, seq, Event::Call(call)));
            seq += 1;
        }
        if let Statement::Simple(simple) = stmt {
            if let Some(assign) = &simple.assignment {
                events.push((assign.line, seq, Event::Assign(assign)));
                seq += 1;
            }
        }
    });
    events.sort_by_key(|(line, seq, _)| (*line, *seq));
    events.into_iter().map(|(_, _, e)| e).collect()
}

#[cfg(all(test, feature = "python"))]
mod tests {
    use super::*;
    use crate::analysis::analyze_module;
    use crate::parser::python::PythonAdapter;
    use std::path::Path;

    struct Spec;

    impl TaintSpec for Spec {
        fn is_source(&self, call: &CallSite) -> bool {
            call.target_name.starts_with("request.")
        }
        fn is_sink(&self, call: &CallSite) -> bool {
            call.target_name == "eval"
        }
        fn is_sanitizer(&self, call: &CallSite) -> bool {
            call.target_name == "escape"
        }
    }

    fn flows_of(source: &str) -> Vec<TaintFlow> {
        let analysis = analyze_module(&PythonAdapter, Path::new("app.py"), "app", source).unwrap();
        let func = &analysis.functions[0];
        let cfg = &analysis.cfgs[&func.fqn];
        analyze_function(func, cfg, &Spec)
    }

    #[test]
    fn source_to_sink_is_reported() {
        let flows = flows_of(
            r#"
def f():
    x = request.GET()
    eval(x)
"#,
        );
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].variable, "x");
        assert_eq!(flows[0].source_line, 3);
        assert_eq!(flows[0].sink_line, 4);
        assert!(!flows[0].sanitized);
    }

    #[test]
    fn dominating_sanitizer_suppresses() {
        let flows = flows_of(
            r#"
def f():
    x = request.GET()
    x = escape(x)
    eval(x)
"#,
        );
        assert_eq!(flows.len(), 1);
        assert!(flows[0].sanitized);
    }

    #[test]
    fn branch_only_sanitizer_does_not_suppress() {
        let flows = flows_of(
            r#"
def f(cond):
    x = request.GET()
    if cond:
        x = escape(x)
    eval(x)
"#,
        );
        assert_eq!(flows.len(), 1);
        assert!(
            !flows[0].sanitized,
            "a sanitizer on one branch does not cover every path"
        );
    }

    #[test]
    fn taint_propagates_through_call_returns() {
        let flows = flows_of(
            r#"
def f():
    x = request.GET()
    y = transform(x)
    eval(y)
"#,
        );
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].variable, "y");
        assert_eq!(flows[0].source_line, 3);
    }

    #[test]
    fn reassignment_kills_taint() {
        let flows = flows_of(
            r#"
def f():
    x = request.GET()
    x = "safe"
    eval(x)
"#,
        );
        assert!(flows.is_empty());
    }

    #[test]
    fn sanitized_into_new_binding_is_clean() {
        let flows = flows_of(
            r#"
def f():
    x = request.GET()
    y = escape(x)
    eval(y)
"#,
        );
        assert!(flows.is_empty(), "sanitizer output is not tainted");
    }

    #[test]
    fn untainted_variable_at_sink_is_ignored(){
        let flows = flows_of(
            r#"
def f():
    x = "literal"
    eval(x)
"#,
        );
        assert!(flows.is_empty());
    }
}
