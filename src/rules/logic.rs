//! Boolean combinators over detection sets.
//!
//! `and` intersects and `or` unions on `(function_fqn, source_line,
//! sink_line)`. `not` complements its child within the universe of all call
//! sites in the call graph, keyed on `(function_fqn, sink_line)` since
//! universe entries carry no source line.

use std::collections::BTreeSet;

use crate::analysis::ProgramModel;

use super::detection::Detection;
use super::ir::DataflowScope;
use super::Executor;

pub enum LogicOp {
    And,
    Or,
    Not,
}

pub struct LogicExec {
    op: LogicOp,
    children: Vec<Box<dyn Executor>>,
}

impl LogicExec {
    pub fn new(op: LogicOp, children: Vec<Box<dyn Executor>>) -> Self {
        Self { op, children }
    }
}

impl Executor for LogicExec {
    fn run(&self, program: &ProgramModel) -> Vec<Detection> {
        match self.op {
            LogicOp::And => self.intersect(program),
            LogicOp::Or => self.union(program),
            LogicOp::Not => self.complement(program),
        }
    }
}

impl LogicExec {
    fn intersect(&self, program: &ProgramModel) -> Vec<Detection> {
        let mut iter = self.children.iter();
        let Some(first) = iter.next() else {
            return Vec::new();
        };
        let mut result = first.run(program);
        for child in iter {
            let keys: BTreeSet<_> = child.run(program).iter().map(Detection::key).collect();
            result.retain(|d| keys.contains(&d.key()));
        }
        result
    }

    fn union(&self, program: &ProgramModel) -> Vec<Detection> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        for child in &self.children {
            for detection in child.run(program) {
                if seen.insert(detection.key()) {
                    result.push(detection);
                }
            }
        }
        result
    }

    fn complement(&self, program: &ProgramModel) -> Vec<Detection> {
        let mut matched: BTreeSet<(String, usize)> = BTreeSet::new();
        for child in &self.children {
            for detection in child.run(program) {
                matched.insert((detection.function_fqn.clone(), detection.sink_line));
            }
        }

        let mut result = Vec::new();
        for (fqn, site) in program.call_graph.all_call_sites() {
            let key = (fqn.to_string(), site.location.line);
            if matched.contains(&key) {
                continue;
            }
            result.push(Detection {
                rule_id: None,
                file_path: site.location.file.clone(),
                function_fqn: fqn.to_string(),
                source_line: None,
                sink_line: site.location.line,
                tainted_var: None,
                sink_call_target: site.target_name.clone(),
                confidence: 1.0,
                sanitized: false,
                scope: DataflowScope::Local,
                path: Vec::new(),
            });
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Argument, CallGraph, CallSite, Location};
    use crate::rules::call_matcher::CallMatcherExec;
    use serde_json::json;

    fn site(target: &str, line: usize) -> CallSite {
        CallSite {
            target_name: target.into(),
            target_fqn: None,
            arguments: vec![Argument {
                raw_text: "x".into(),
                is_variable: true,
                position: 0,
            }],
            resolved: false,
            assigned_to: None,
            location: Location::new("t.py", line, 0),
        }
    }

    fn program() -> ProgramModel {
        let mut graph = CallGraph::new();
        graph.record_call_sites(
            "m.f",
            vec![site("eval", 3), site("escape", 4), site("print", 5)],
        );
        ProgramModel {
            registry: Default::default(),
            call_graph: graph,
            cfgs: Default::default(),
            contexts: Default::default(),
        }
    }

    fn call_exec(pattern: &str) -> Box<dyn Executor> {
        Box::new(
            CallMatcherExec::new(serde_json::from_value(json!({"patterns": [pattern]})).unwrap())
                .unwrap(),
        )
    }

    #[test]
    fn or_unions_and_dedupes() {
        let exec = LogicExec::new(LogicOp::Or, vec![call_exec("eval"), call_exec("eval")]);
        let detections = exec.run(&program());
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].sink_call_target, "eval");
    }

    #[test]
    fn and_keeps_common_keys_only() {
        // Children match disjoint sites: intersection is empty.
        let exec = LogicExec::new(LogicOp::And, vec![call_exec("eval"), call_exec("escape")]);
        assert!(exec.run(&program()).is_empty());

        // Identical children: intersection is the child set.
        let exec = LogicExec::new(LogicOp::And, vec![call_exec("eval"), call_exec("eval")]);
        assert_eq!(exec.run(&program()).len(), 1);
    }

    #[test]
    fn not_complements_within_all_call_sites() {
        let exec = LogicExec::new(LogicOp::Not, vec![call_exec("eval")]);
        let detections = exec.run(&program());
        let targets: Vec<&str> = detections
            .iter()
            .map(|d| d.sink_call_target.as_str())
            .collect();
        assert_eq!(targets, vec!["escape", "print"]);
    }
}
