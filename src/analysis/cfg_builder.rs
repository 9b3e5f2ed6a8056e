//! Statement IR to control-flow graph lowering.
//!
//! Runs of straight-line statements share one `normal` block. Control
//! statements get their own block kind with successor order fixed by the
//! construct: true branch before false branch, loop body before after-loop,
//! switch cases in declaration order with default last, try body before
//! catch edges.

use crate::ir::cfg::{BlockKind, ControlFlowGraph};
use crate::ir::statement::Statement;
use crate::ir::FunctionDef;

/// Build the CFG for one function and compute its dominator sets.
pub fn build(func: &FunctionDef) -> ControlFlowGraph {
    let mut graph = ControlFlowGraph::new(&func.fqn);
    let entry = graph.entry_id.clone();
    let exit = graph.exit_id.clone();

    if let Some(block) = graph.block_mut(&entry) {
        block.start_line = func.location.line;
        block.end_line = func.location.line;
    }

    let mut builder = Builder { graph };
    let frontier = builder.seq(&func.body, vec![entry]);
    for open in frontier {
        builder.graph.add_edge(&open, &exit);
    }

    let mut graph = builder.graph;
    graph.compute_dominators();
    graph
}

struct Builder {
    graph: ControlFlowGraph,
}

impl Builder {
    /// Lower a statement sequence. `frontier` is the set of open blocks that
    /// flow into the sequence; the return value is the frontier flowing out.
    fn seq(&mut self, stmts: &[Statement], mut frontier: Vec<String>) -> Vec<String> {
        // Open normal block accumulating consecutive simple statements.
        let mut open: Option<String> = None;

        for stmt in stmts {
            match stmt {
                Statement::Simple(simple) => {
                    let id = self.append_simple(&mut open, &mut frontier, simple.line, simple.end_line);
                    let block = self.graph.block_mut(&id).expect("open block exists");
                    block.instructions.extend(simple.calls.iter().cloned());
                }
                Statement::Return { calls, line, .. } => {
                    let id = self.append_simple(&mut open, &mut frontier, *line, *line);
                    {
                        let block = self.graph.block_mut(&id).expect("open block exists");
                        block.instructions.extend(calls.iter().cloned());
                    }
                    let exit = self.graph.exit_id.clone();
                    self.graph.add_edge(&id, &exit);
                    // Anything after a return is unreachable.
                    frontier = Vec::new();
                    open = None;
                }
                Statement::If {
                    condition,
                    calls,
                    then_body,
                    else_body,
                    line,
                } => {
                    open = None;
                    let cond = self.graph.add_block(BlockKind::Conditional, *line, *line);
                    self.set_condition(&cond, condition, calls);
                    self.connect(&frontier, &cond);

                    // True branch first, then false branch.
                    let then_frontier = self.seq(then_body, vec![cond.clone()]);
                    let else_frontier = if else_body.is_empty() {
                        vec![cond.clone()]
                    } else {
                        self.seq(else_body, vec![cond.clone()])
                    };

                    frontier = then_frontier;
                    frontier.extend(else_frontier);
                }
                Statement::Loop {
                    condition,
                    calls,
                    body,
                    line,
                } => {
                    open = None;
                    let header = self.graph.add_block(BlockKind::Loop, *line, *line);
                    self.set_condition(&header, condition, calls);
                    self.connect(&frontier, &header);

                    // Body edge precedes the after-loop edge; the body tail
                    // closes the back edge to the header.
                    let body_frontier = self.seq(body, vec![header.clone()]);
                    for tail in body_frontier {
                        self.graph.add_edge(&tail, &header);
                    }
                    frontier = vec![header];
                }
                Statement::Switch {
                    subject,
                    cases,
                    default,
                    line,
                } => {
                    open = None;
                    let switch = self.graph.add_block(BlockKind::Switch, *line, *line);
                    self.set_condition(&switch, subject, &[]);
                    self.connect(&frontier, &switch);

                    frontier = Vec::new();
                    for case in cases {
                        let out = self.seq(&case.body, vec![switch.clone()]);
                        frontier.extend(out);
                    }
                    match default {
                        Some(body) => {
                            let out = self.seq(body, vec![switch.clone()]);
                            frontier.extend(out);
                        }
                        // No default arm: control can fall past the switch.
                        None => frontier.push(switch.clone()),
                    }
                }
                Statement::Try {
                    body,
                    catches,
                    finally,
                    line,
                } => {
                    open = None;
                    if catches.is_empty() && finally.is_none() {
                        // Bare block, no exceptional flow.
                        frontier = self.seq(body, frontier);
                        continue;
                    }

                    let try_block = self.graph.add_block(BlockKind::Try, *line, *line);
                    self.connect(&frontier, &try_block);

                    // Normal successor first, one catch edge per clause after.
                    let mut merged = self.seq(body, vec![try_block.clone()]);
                    for catch in catches {
                        let catch_block =
                            self.graph.add_block(BlockKind::Catch, catch.line, catch.line);
                        if let Some(block) = self.graph.block_mut(&catch_block) {
                            block.condition_text = Some(catch.exception.clone());
                        }
                        self.graph.add_edge(&try_block, &catch_block);
                        let out = self.seq(&catch.body, vec![catch_block]);
                        merged.extend(out);
                    }

                    frontier = match finally {
                        Some(finally_body) => {
                            let fin = self.graph.add_block(BlockKind::Finally, *line, *line);
                            self.connect(&merged, &fin);
                            self.seq(finally_body, vec![fin])
                        }
                        None => merged,
                    };
                }
            }
        }
        frontier
    }

    /// Append a simple statement to the open normal block, creating one and
    /// wiring the frontier into it when needed.
    fn append_simple(
        &mut self,
        open: &mut Option<String>,
        frontier: &mut Vec<String>,
        line: usize,
        end_line: usize,
    ) -> String {
        if let Some(id) = open {
            let block = self.graph.block_mut(id).expect("open block exists");
            block.end_line = block.end_line.max(end_line);
            return id.clone();
        }
        let id = self.graph.add_block(BlockKind::Normal, line, end_line);
        let targets: Vec<String> = frontier.clone();
        for from in &targets {
            self.graph.add_edge(from, &id);
        }
        *frontier = vec![id.clone()];
        *open = Some(id.clone());
        id
    }

    fn connect(&mut self, frontier: &[String], to: &str) {
        for from in frontier {
            self.graph.add_edge(from, to);
        }
    }

    fn set_condition(&mut self, id: &str, condition: &str, calls: &[crate::ir::CallSite]) {
        if let Some(block) = self.graph.block_mut(id) {
            block.condition_text = Some(condition.to_string());
            block.instructions.extend(calls.iter().cloned());
        }
    }
}
