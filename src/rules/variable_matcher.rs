//! Variable matcher executor: pattern-match call arguments that are bare
//! identifiers or attribute chains.

use crate::analysis::ProgramModel;
use crate::error::Result;

use super::detection::Detection;
use super::ir::{DataflowScope, VariableMatcherIr};
use super::{pattern, Executor};

pub struct VariableMatcherExec {
    ir: VariableMatcherIr,
}

impl VariableMatcherExec {
    pub fn new(ir: VariableMatcherIr) -> Result<Self> {
        pattern::validate(&ir.pattern, ir.wildcard)?;
        Ok(Self { ir })
    }
}

impl Executor for VariableMatcherExec {
    fn run(&self, program: &ProgramModel) -> Vec<Detection> {
        let mut detections = Vec::new();
        for (fqn, site) in program.call_graph.all_call_sites() {
            for arg in site.arguments.iter().filter(|a| a.is_variable) {
                let hit = pattern::matches(&arg.raw_text, &self.ir.pattern, self.ir.wildcard)
                    .unwrap_or(false);
                if hit {
                    detections.push(Detection {
                        rule_id: None,
                        file_path: site.location.file.clone(),
                        function_fqn: fqn.to_string(),
                        source_line: None,
                        sink_line: site.location.line,
                        tainted_var: Some(arg.raw_text.clone()),
                        sink_call_target: site.target_name.clone(),
                        confidence: 1.0,
                        sanitized: false,
                        scope: DataflowScope::Local,
                        path: Vec::new(),
                    });
                }
            }
        }
        detections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ProgramModel;
    use crate::ir::{Argument, CallGraph, CallSite, Location};

    fn program_with_call(args: Vec<(&str, bool)>) -> ProgramModel {
        let mut graph = CallGraph::new();
        graph.record_call_sites(
            "m.f",
            vec![CallSite {
                target_name: "query".into(),
                target_fqn: None,
                arguments: args
                    .into_iter()
                    .enumerate()
                    .map(|(i, (text, is_var))| Argument {
                        raw_text: text.into(),
                        is_variable: is_var,
                        position: i,
                    })
                    .collect(),
                resolved: false,
                assigned_to: None,
                location: Location::new("t.py", 7, 0),
            }],
        );
        ProgramModel {
            registry: Default::default(),
            call_graph: graph,
            cfgs: Default::default(),
            contexts: Default::default(),
        }
    }

    #[test]
    fn matches_variable_arguments_only() {
        let program = program_with_call(vec![
            ("user_input", true),
            ("\"literal\"", false),
        ]);
        let exec = VariableMatcherExec::new(VariableMatcherIr {
            pattern: "user_*".into(),
            wildcard: true,
        })
        .unwrap();
        let detections = exec.run(&program);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].tainted_var.as_deref(), Some("user_input"));
        assert_eq!(detections[0].sink_line, 7);
    }

    #[test]
    fn attribute_chains_match() {
        let program = program_with_call(vec![("request.args", true)]);
        let exec = VariableMatcherExec::new(VariableMatcherIr {
            pattern: "request.*".into(),
            wildcard: true,
        })
        .unwrap();
        assert_eq!(exec.run(&program).len(), 1);
    }
}
