//! Rule model and execution engine.
//!
//! A `Rule` pairs metadata with a compiled matcher tree. The engine turns
//! each matcher into an executor at load time (rejecting invalid patterns
//! per rule) and runs executors over the linked program model, attaching
//! rule ids and producing a deterministically ordered detection list.

pub mod call_matcher;
pub mod dataflow;
pub mod detection;
pub mod ir;
pub mod loader;
pub mod logic;
pub mod pattern;
pub mod variable_matcher;

use crate::analysis::ProgramModel;
use crate::error::Result;
use crate::CancelToken;

pub use detection::{sort_and_dedupe, Detection};
pub use ir::{DataflowScope, MatcherIr, RuleMeta, RuleRecord};
pub use loader::RuleLoader;

/// A loaded rule: metadata plus its matcher IR. Immutable for the run.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub severity: String,
    pub cwe: String,
    pub owasp: String,
    pub description: String,
    pub matcher: MatcherIr,
}

impl From<RuleRecord> for Rule {
    fn from(record: RuleRecord) -> Self {
        Self {
            id: record.rule.id,
            name: record.rule.name,
            severity: record.rule.severity,
            cwe: record.rule.cwe,
            owasp: record.rule.owasp,
            description: record.rule.description,
            matcher: record.matcher,
        }
    }
}

/// An executor evaluates one matcher tree against the program model.
/// Executors are pure: the engine owns collection, dedup, and ordering.
pub trait Executor: Send + Sync {
    fn run(&self, program: &ProgramModel) -> Vec<Detection>;
}

/// Recursively build the executor for a matcher tree.
pub fn build_executor(matcher: &MatcherIr) -> Result<Box<dyn Executor>> {
    Ok(match matcher {
        MatcherIr::Call(ir) => Box::new(call_matcher::CallMatcherExec::new(ir.clone())?),
        MatcherIr::Variable(ir) => {
            Box::new(variable_matcher::VariableMatcherExec::new(ir.clone())?)
        }
        MatcherIr::Dataflow(ir) => Box::new(dataflow::DataflowExec::new(ir.clone())?),
        MatcherIr::LogicAnd(ir) => Box::new(logic::LogicExec::new(
            logic::LogicOp::And,
            build_children(&ir.children)?,
        )),
        MatcherIr::LogicOr(ir) => Box::new(logic::LogicExec::new(
            logic::LogicOp::Or,
            build_children(&ir.children)?,
        )),
        MatcherIr::LogicNot(ir) => Box::new(logic::LogicExec::new(
            logic::LogicOp::Not,
            build_children(&ir.children)?,
        )),
    })
}

fn build_children(children: &[MatcherIr]) -> Result<Vec<Box<dyn Executor>>> {
    children.iter().map(build_executor).collect()
}

struct CompiledRule {
    rule: Rule,
    executor: Box<dyn Executor>,
}

/// Runs all loaded rules against a program model.
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    /// Compile executors for the given rules. A rule whose matcher fails to
    /// compile is skipped with a warning; rule-level errors never abort the
    /// run.
    pub fn new(rules: Vec<Rule>) -> Self {
        let mut compiled = Vec::new();
        for rule in rules {
            match build_executor(&rule.matcher) {
                Ok(executor) => compiled.push(CompiledRule { rule, executor }),
                Err(e) => {
                    tracing::warn!(rule_id = %rule.id, error = %e, "rule skipped");
                }
            }
        }
        Self { rules: compiled }
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|c| &c.rule)
    }

    /// Run every rule; the cancellation token is honored at rule
    /// boundaries. Detections come back sorted by `(file_path, sink_line,
    /// rule_id)` with duplicates removed.
    pub fn run(&self, program: &ProgramModel, cancel: &CancelToken) -> Vec<Detection> {
        let mut all = Vec::new();
        for compiled in &self.rules {
            if cancel.is_cancelled() {
                tracing::debug!("rule execution cancelled");
                break;
            }
            for mut detection in compiled.executor.run(program) {
                detection.rule_id = Some(compiled.rule.id.clone());
                all.push(detection);
            }
        }
        sort_and_dedupe(all)
    }
}
