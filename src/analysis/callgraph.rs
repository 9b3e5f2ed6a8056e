//! Call-graph construction.
//!
//! Runs after the barrier: every module's functions and type contexts are
//! final. Call targets resolve through the module's imports, local
//! definitions, or the receiver's inferred class; unresolvable targets stay
//! recorded with `resolved = false` so name-based matchers still see them.

use crate::ir::statement;
use crate::ir::{CallGraph, CallSite, TypeContext};

use super::ModuleAnalysis;

/// Link all modules into one call graph.
pub fn build(modules: &[ModuleAnalysis]) -> CallGraph {
    let mut graph = CallGraph::new();

    for analysis in modules {
        for func in &analysis.functions {
            graph.add_function(func.clone());
        }
        for class in &analysis.classes {
            graph.add_class(class.clone());
        }
    }

    for analysis in modules {
        let module_fqn = &analysis.module.module_fqn;
        for func in analysis.all_functions() {
            let mut sites: Vec<CallSite> = statement::call_sites(&func.body)
                .into_iter()
                .cloned()
                .collect();
            for site in sites.iter_mut() {
                if let Some(fqn) =
                    resolve_target(module_fqn, &func.fqn, &site.target_name, &analysis.type_context, &graph)
                {
                    site.resolve(fqn);
                }
            }
            graph.record_call_sites(&func.fqn, sites);
        }
    }

    graph
}

fn resolve_target(
    module_fqn: &str,
    caller_fqn: &str,
    target_name: &str,
    ctx: &TypeContext,
    graph: &CallGraph,
) -> Option<String> {
    // `new Widget(...)` resolves like the bare class name.
    let target = target_name.strip_prefix("new ").unwrap_or(target_name).trim();

    if let Some((receiver, method)) = target.rsplit_once('.') {
        // Module alias: `os.system`, `np.array`, `a.b.c`.
        if let Some(base) = longest_import_prefix(receiver, ctx) {
            let rest = &target[base.0.len()..];
            return Some(format!("{}{rest}", base.1));
        }
        // Method on the enclosing class.
        if receiver == "self" || receiver == "this" {
            if let Some((class_fqn, _)) = caller_fqn.rsplit_once('.') {
                if let Some(class) = graph.classes.get(class_fqn) {
                    if class.method(method).is_some() {
                        return Some(format!("{class_fqn}.{method}"));
                    }
                }
            }
            return None;
        }
        // Method on a typed receiver variable.
        let ty = ctx.variable(caller_fqn, receiver)?;
        let class = graph
            .classes
            .get(&ty.type_fqn)
            .or_else(|| graph.classes.values().find(|c| c.name == ty.type_fqn))?;
        if class.method(method).is_some() {
            return Some(format!("{}.{method}", class.fqn));
        }
        return None;
    }

    // Local definition in the same module.
    let local = format!("{module_fqn}.{target}");
    if graph.functions.contains_key(&local) || graph.classes.contains_key(&local) {
        return Some(local);
    }
    // Imported symbol: `from os import system` binds `system -> os.system`.
    ctx.imports.get(target).cloned()
}

/// Longest dotted prefix of `receiver` bound by an import. Returns the
/// matched prefix and its FQN.
fn longest_import_prefix<'a>(
    receiver: &'a str,
    ctx: &TypeContext,
) -> Option<(&'a str, String)> {
    let mut candidate = receiver;
    loop {
        if let Some(fqn) = ctx.imports.get(candidate) {
            return Some((candidate, fqn.clone()));
        }
        match candidate.rsplit_once('.') {
            Some((head, _)) => candidate = head,
            None => return None,
        }
    }
}

#[cfg(all(test, feature = "python"))]
mod tests {
    use super::*;
    use crate::analysis::analyze_module;
    use crate::parser::python::PythonAdapter;
    use std::path::Path;

    fn analyze(source: &str) -> ModuleAnalysis {
        analyze_module(&PythonAdapter, Path::new("app.py"), "app", source).unwrap()
    }

    #[test]
    fn local_calls_create_edges() {
        let module = analyze(
            r#"
def helper():
    pass

def main():
    helper()
    helper()
"#,
        );
        let graph = build(&[module]);
        assert_eq!(graph.callees("app.main"), ["app.helper"]);
        let sites = graph.sites_of("app.main");
        assert_eq!(sites.len(), 2);
        assert!(sites.iter().all(|s| s.resolved));
    }

    #[test]
    fn imports_resolve_dotted_targets() {
        let module = analyze(
            r#"
import os
from subprocess import run

def main(cmd):
    os.system(cmd)
    run(cmd)
    eval(cmd)
"#,
        );
        let graph = build(&[module]);
        assert_eq!(graph.callees("app.main"), ["os.system", "subprocess.run"]);
        let eval_site = graph
            .sites_of("app.main")
            .iter()
            .find(|s| s.target_name == "eval")
            .unwrap();
        assert!(!eval_site.resolved, "builtins stay unresolved");
    }

    #[test]
    fn method_calls_resolve_via_receiver_type() {
        let module = analyze(
            r#"
class Repo:
    def save(self):
        self.flush()

    def flush(self):
        pass

def main():
    r = Repo()
    r.save()
"#,
        );
        let graph = build(&[module]);
        assert_eq!(graph.callees("app.main"), ["app.Repo", "app.Repo.save"]);
        assert_eq!(graph.callees("app.Repo.save"), ["app.Repo.flush"]);
    }

    #[test]
    fn aliased_module_calls_resolve() {
        let module = analyze(
            r#"
import numpy as np

def main():
    np.array([1])
"#,
        );
        let graph = build(&[module]);
        assert_eq!(graph.callees("app.main"), ["numpy.array"]);
    }
}
