//! Normalized statement tree.
//!
//! Adapters lower language-specific syntax into this shape so the CFG
//! builder, type inference, and taint tracking stay language-agnostic.

use serde::{Deserialize, Serialize};

use super::CallSite;

/// Right-hand side of an assignment, classified for type inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RValue {
    /// A literal with its language-level builtin type name.
    Literal { type_fqn: String, text: String },
    /// A bare identifier.
    Name(String),
    /// `receiver.attribute` where receiver itself may be dotted.
    Attribute { receiver: String, attribute: String },
    /// Index into the owning statement's call list.
    Call(usize),
    /// Anything the adapter does not classify.
    Other(String),
}

/// An assignment binding inside a simple statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub target: String,
    /// Explicit type annotation text, when present.
    pub annotation: Option<String>,
    pub value: RValue,
    pub line: usize,
}

/// A straight-line statement: zero or more calls, at most one assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleStmt {
    pub line: usize,
    pub end_line: usize,
    pub calls: Vec<CallSite>,
    pub assignment: Option<Assignment>,
}

/// One arm of a switch statement, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    pub label: String,
    pub body: Vec<Statement>,
}

/// One catch clause of a try statement, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchClause {
    pub exception: String,
    pub body: Vec<Statement>,
    pub line: usize,
}

/// A lowered statement. Control-flow statements keep their nested bodies;
/// the CFG builder turns the nesting into blocks and edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    Simple(SimpleStmt),
    Return {
        value: Option<RValue>,
        calls: Vec<CallSite>,
        line: usize,
    },
    If {
        condition: String,
        calls: Vec<CallSite>,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
        line: usize,
    },
    /// `while`/`for`: a conditional header with a back edge from the body.
    Loop {
        condition: String,
        calls: Vec<CallSite>,
        body: Vec<Statement>,
        line: usize,
    },
    Switch {
        subject: String,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Statement>>,
        line: usize,
    },
    Try {
        body: Vec<Statement>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Statement>>,
        line: usize,
    },
}

impl Statement {
    pub fn line(&self) -> usize {
        match self {
            Self::Simple(s) => s.line,
            Self::Return { line, .. }
            | Self::If { line, .. }
            | Self::Loop { line, .. }
            | Self::Switch { line, .. }
            | Self::Try { line, .. } => *line,
        }
    }

    /// Calls owned directly by this statement (not by nested bodies).
    pub fn own_calls(&self) -> &[CallSite] {
        match self {
            Self::Simple(s) => &s.calls,
            Self::Return { calls, .. } | Self::If { calls, .. } | Self::Loop { calls, .. } => calls,
            Self::Switch { .. } | Self::Try { .. } => &[],
        }
    }

}

/// Pre-order walk over a statement list, descending into nested bodies.
pub fn walk<'a>(stmts: &'a [Statement], visit: &mut dyn FnMut(&'a Statement)) {
    for stmt in stmts {
        visit(stmt);
        match stmt {
            Statement::Simple(_) | Statement::Return { .. } => {}
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                walk(then_body, visit);
                walk(else_body, visit);
            }
            Statement::Loop { body, .. } => walk(body, visit),
            Statement::Switch { cases, default, .. } => {
                for case in cases {
                    walk(&case.body, visit);
                }
                if let Some(default) = default {
                    walk(default, visit);
                }
            }
            Statement::Try {
                body,
                catches,
                finally,
                ..
            } => {
                walk(body, visit);
                for catch in catches {
                    walk(&catch.body, visit);
                }
                if let Some(finally) = finally {
                    walk(finally, visit);
                }
            }
        }
    }
}

/// Same walk with mutable access.
pub fn walk_mut(stmts: &mut [Statement], visit: &mut dyn FnMut(&mut Statement)) {
    for stmt in stmts {
        visit(stmt);
        match stmt {
            Statement::Simple(_) | Statement::Return { .. } => {}
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                walk_mut(then_body, visit);
                walk_mut(else_body, visit);
            }
            Statement::Loop { body, .. } => walk_mut(body, visit),
            Statement::Switch { cases, default, .. } => {
                for case in cases.iter_mut() {
                    walk_mut(&mut case.body, visit);
                }
                if let Some(default) = default {
                    walk_mut(default, visit);
                }
            }
            Statement::Try {
                body,
                catches,
                finally,
                ..
            } => {
                walk_mut(body, visit);
                for catch in catches.iter_mut() {
                    walk_mut(&mut catch.body, visit);
                }
                if let Some(finally) = finally {
                    walk_mut(finally, visit);
                }
            }
        }
    }
}

/// All call sites in a body, in source order.
pub fn call_sites(stmts: &[Statement]) -> Vec<&CallSite> {
    let mut calls = Vec::new();
    walk(stmts, &mut |stmt| calls.extend(stmt.own_calls().iter()));
    calls.sort_by_key(|c| c.location.line);
    calls
}

/// All assignments in a body, in source order.
pub fn assignments(stmts: &[Statement]) -> Vec<&Assignment> {
    let mut found = Vec::new();
    walk(stmts, &mut |stmt| {
        if let Statement::Simple(s) = stmt {
            if let Some(assign) = &s.assignment {
                found.push(assign);
            }
        }
    });
    found.sort_by_key(|a| a.line);
    found
}
