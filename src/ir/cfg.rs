//! Per-function control-flow graph.
//!
//! Blocks are stored by stable string id in a map owned by the graph, with
//! successor/predecessor lists holding ids rather than references. Dominators
//! use iterative dataflow; path enumeration is an iterative DFS with a hard
//! cap because the path count is exponential in the branching factor.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::CallSite;

/// Default ceiling for `all_paths`. Callers that need more must opt in
/// explicitly via `all_paths_capped`.
pub const DEFAULT_MAX_PATHS: usize = 4096;

pub const ENTRY_ID: &str = "entry";
pub const EXIT_ID: &str = "exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Entry,
    Exit,
    Normal,
    Conditional,
    Loop,
    Switch,
    Try,
    Catch,
    Finally,
}

/// A maximal straight-line code sequence with a single entry and exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: String,
    pub kind: BlockKind,
    pub start_line: usize,
    pub end_line: usize,
    pub instructions: Vec<CallSite>,
    pub successors: Vec<String>,
    pub predecessors: Vec<String>,
    /// Source text of the branch condition, for conditional/loop/switch blocks.
    pub condition_text: Option<String>,
    pub dominators: BTreeSet<String>,
}

impl BasicBlock {
    fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            kind,
            start_line: 0,
            end_line: 0,
            instructions: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            condition_text: None,
            dominators: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    pub function_fqn: String,
    pub blocks: BTreeMap<String, BasicBlock>,
    pub entry_id: String,
    pub exit_id: String,
    #[serde(skip)]
    next_block: usize,
}

impl ControlFlowGraph {
    /// Create a graph with its entry and exit blocks; exactly one of each
    /// ever exists.
    pub fn new(function_fqn: impl Into<String>) -> Self {
        let mut blocks = BTreeMap::new();
        blocks.insert(
            ENTRY_ID.to_string(),
            BasicBlock::new(ENTRY_ID, BlockKind::Entry),
        );
        blocks.insert(
            EXIT_ID.to_string(),
            BasicBlock::new(EXIT_ID, BlockKind::Exit),
        );
        Self {
            function_fqn: function_fqn.into(),
            blocks,
            entry_id: ENTRY_ID.to_string(),
            exit_id: EXIT_ID.to_string(),
            next_block: 0,
        }
    }

    /// Add a block and return its generated id.
    pub fn add_block(&mut self, kind: BlockKind, start_line: usize, end_line: usize) -> String {
        self.next_block += 1;
        let id = format!("b{}", self.next_block);
        let mut block = BasicBlock::new(id.clone(), kind);
        block.start_line = start_line;
        block.end_line = end_line;
        self.blocks.insert(id.clone(), block);
        id
    }

    pub fn block(&self, id: &str) -> Option<&BasicBlock> {
        self.blocks.get(id)
    }

    pub fn block_mut(&mut self, id: &str) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id)
    }

    /// Insert the edge `u -> v`, updating both adjacency lists. Idempotent:
    /// inserting an existing edge leaves the graph unchanged. Unknown ids are
    /// ignored so a half-inserted edge can never appear.
    pub fn add_edge(&mut self, u: &str, v: &str) {
        if !self.blocks.contains_key(u) || !self.blocks.contains_key(v) {
            tracing::debug!(from = u, to = v, "edge references unknown block, skipped");
            return;
        }
        let succs = &mut self.blocks.get_mut(u).expect("checked above").successors;
        if !succs.iter().any(|s| s == v) {
            succs.push(v.to_string());
        }
        let preds = &mut self.blocks.get_mut(v).expect("checked above").predecessors;
        if !preds.iter().any(|p| p == u) {
            preds.push(u.to_string());
        }
    }

    /// Iterative dominator dataflow to a fixed point.
    ///
    /// `Dom(entry) = {entry}`; every other block starts at the full block set
    /// and shrinks via `Dom(b) = {b} ∪ ⋂ Dom(p)` over its predecessors. A
    /// block with no predecessors (unreachable) ends at `{b}`.
    pub fn compute_dominators(&mut self) {
        let all_ids: BTreeSet<String> = self.blocks.keys().cloned().collect();

        for (id, block) in self.blocks.iter_mut() {
            if *id == self.entry_id {
                block.dominators = BTreeSet::from([id.clone()]);
            } else {
                block.dominators = all_ids.clone();
            }
        }

        let ids: Vec<String> = self.blocks.keys().cloned().collect();
        let mut changed = true;
        while changed {
            changed = false;
            for id in &ids {
                if *id == self.entry_id {
                    continue;
                }
                let preds = self.blocks[id].predecessors.clone();
                let mut new_doms: BTreeSet<String> = if preds.is_empty() {
                    BTreeSet::new()
                } else {
                    let mut intersection = self.blocks[&preds[0]].dominators.clone();
                    for pred in &preds[1..] {
                        let pred_doms = &self.blocks[pred].dominators;
                        intersection.retain(|d| pred_doms.contains(d));
                    }
                    intersection
                };
                new_doms.insert(id.clone());
                if new_doms != self.blocks[id].dominators {
                    self.blocks.get_mut(id).expect("known id").dominators = new_doms;
                    changed = true;
                }
            }
        }
    }

    /// Whether `a` dominates `b`: every path from entry to `b` passes
    /// through `a`. Requires `compute_dominators` to have run.
    pub fn is_dominator(&self, a: &str, b: &str) -> bool {
        self.blocks
            .get(b)
            .map(|block| block.dominators.contains(a))
            .unwrap_or(false)
    }

    /// Enumerate entry→exit paths, capped at `DEFAULT_MAX_PATHS`.
    pub fn all_paths(&self) -> Vec<Vec<String>> {
        self.all_paths_capped(DEFAULT_MAX_PATHS)
    }

    /// Iterative DFS path enumeration. A block is on-path while the DFS is
    /// inside it, so each cycle contributes a single unfolding. Successors
    /// are visited in declaration order.
    pub fn all_paths_capped(&self, cap: usize) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        if !self.blocks.contains_key(&self.entry_id) {
            return paths;
        }

        // Stack frames: (block id, index of the next successor to try).
        let mut stack: Vec<(String, usize)> = vec![(self.entry_id.clone(), 0)];
        let mut on_path: HashSet<String> = HashSet::from([self.entry_id.clone()]);

        while let Some((block_id, succ_idx)) = stack.pop() {
            if block_id == self.exit_id && succ_idx == 0 {
                paths.push(stack.iter().map(|(id, _)| id.clone()).chain([block_id.clone()]).collect());
                if paths.len() >= cap {
                    tracing::warn!(
                        function = %self.function_fqn,
                        cap,
                        "path enumeration hit cap, truncating"
                    );
                    return paths;
                }
                on_path.remove(&block_id);
                continue;
            }

            let successors = &self.blocks[&block_id].successors;
            let mut idx = succ_idx;
            let mut descended = false;
            while idx < successors.len() {
                let next = &successors[idx];
                idx += 1;
                if on_path.contains(next) {
                    continue;
                }
                stack.push((block_id.clone(), idx));
                stack.push((next.clone(), 0));
                on_path.insert(next.clone());
                descended = true;
                break;
            }
            if !descended {
                on_path.remove(&block_id);
            }
        }
        paths
    }

    /// Blocks reachable from entry, in DFS preorder.
    pub fn reachable_blocks(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![self.entry_id.clone()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(block) = self.blocks.get(&id) {
                order.push(id.clone());
                for succ in block.successors.iter().rev() {
                    stack.push(succ.clone());
                }
            }
        }
        order
    }

    /// The innermost block whose line span covers `line`, preferring blocks
    /// that actually carry instructions there.
    pub fn block_at_line(&self, line: usize) -> Option<&BasicBlock> {
        if let Some(block) = self
            .blocks
            .values()
            .find(|b| b.instructions.iter().any(|c| c.location.line == line))
        {
            return Some(block);
        }
        self.blocks
            .values()
            .filter(|b| b.start_line <= line && line <= b.end_line && b.start_line > 0)
            .min_by_key(|b| b.end_line - b.start_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn linear_graph() -> ControlFlowGraph {
        // entry -> b1 -> b2 -> exit
        let mut g = ControlFlowGraph::new("m.f");
        let b1 = g.add_block(BlockKind::Normal, 1, 2);
        let b2 = g.add_block(BlockKind::Normal, 3, 4);
        g.add_edge(ENTRY_ID, &b1);
        g.add_edge(&b1, &b2);
        g.add_edge(&b2, EXIT_ID);
        g
    }

    fn branch_graph() -> ControlFlowGraph {
        // entry -> b1 -> {b2, b3} -> b4 -> exit
        let mut g = ControlFlowGraph::new("m.f");
        let b1 = g.add_block(BlockKind::Conditional, 1, 1);
        let b2 = g.add_block(BlockKind::Normal, 2, 2);
        let b3 = g.add_block(BlockKind::Normal, 3, 3);
        let b4 = g.add_block(BlockKind::Normal, 4, 4);
        g.add_edge(ENTRY_ID, &b1);
        g.add_edge(&b1, &b2);
        g.add_edge(&b1, &b3);
        g.add_edge(&b2, &b4);
        g.add_edge(&b3, &b4);
        g.add_edge(&b4, EXIT_ID);
        g
    }

    #[test]
    fn linear_dominators() {
        let mut g = linear_graph();
        g.compute_dominators();

        let doms_b2: Vec<&str> = g.blocks["b2"].dominators.iter().map(String::as_str).collect();
        assert_eq!(doms_b2, vec!["b1", "b2", "entry"]);
        let doms_exit: Vec<&str> = g.blocks["exit"].dominators.iter().map(String::as_str).collect();
        assert_eq!(doms_exit, vec!["b1", "b2", "entry", "exit"]);
        assert!(g.is_dominator("b1", "b2"));
        assert!(!g.is_dominator("b2", "b1"));
    }

    #[test]
    fn branch_join_not_dominated_by_arms() {
        let mut g = branch_graph();
        g.compute_dominators();

        let doms_b4: Vec<&str> = g.blocks["b4"].dominators.iter().map(String::as_str).collect();
        assert_eq!(doms_b4, vec!["b1", "b4", "entry"]);
        assert!(!g.is_dominator("b2", "b4"));
        assert!(!g.is_dominator("b3", "b4"));
    }

    #[test]
    fn branch_paths_in_declaration_order() {
        let g = branch_graph();
        let paths = g.all_paths();
        assert_eq!(
            paths,
            vec![
                vec!["entry", "b1", "b2", "b4", "exit"],
                vec!["entry", "b1", "b3", "b4", "exit"],
            ]
        );
    }

    #[test]
    fn entry_and_self_dominate_every_reachable_block() {
        let mut g = branch_graph();
        g.compute_dominators();
        for id in g.reachable_blocks() {
            assert!(g.is_dominator("entry", &id), "entry should dominate {id}");
            assert!(g.is_dominator(&id, &id), "{id} should dominate itself");
        }
    }

    #[test]
    fn edge_insertion_is_idempotent() {
        let mut g = linear_graph();
        let before_succs = g.blocks["b1"].successors.clone();
        let before_preds = g.blocks["b2"].predecessors.clone();
        for _ in 0..5 {
            g.add_edge("b1", "b2");
        }
        assert_eq!(g.blocks["b1"].successors, before_succs);
        assert_eq!(g.blocks["b2"].predecessors, before_preds);
    }

    #[test]
    fn unknown_edge_endpoints_are_ignored() {
        let mut g = linear_graph();
        g.add_edge("b1", "missing");
        g.add_edge("missing", "b2");
        assert_eq!(g.blocks["b1"].successors, vec!["b2"]);
        assert_eq!(g.blocks["b2"].predecessors, vec!["b1"]);
    }

    #[test]
    fn unreachable_block_dominates_only_itself() {
        let mut g = linear_graph();
        let orphan = g.add_block(BlockKind::Normal, 10, 11);
        g.compute_dominators();
        let doms: Vec<&str> = g.blocks[&orphan].dominators.iter().map(String::as_str).collect();
        assert_eq!(doms, vec![orphan.as_str()]);
    }

    #[test]
    fn loop_contributes_one_unfolding() {
        // entry -> b1 -> b2 -> b1 (back edge), b1 -> exit
        let mut g = ControlFlowGraph::new("m.f");
        let b1 = g.add_block(BlockKind::Loop, 1, 1);
        let b2 = g.add_block(BlockKind::Normal, 2, 3);
        g.add_edge(ENTRY_ID, &b1);
        g.add_edge(&b1, &b2);
        g.add_edge(&b2, &b1);
        g.add_edge(&b1, EXIT_ID);

        let paths = g.all_paths();
        // The cycle is broken by the on-path check: b2 cannot re-enter b1.
        assert_eq!(paths, vec![vec!["entry", "b1", "exit"]]);
    }

    #[test]
    fn path_enumeration_respects_cap() {
        // Chain of diamonds: 2^6 paths without a cap.
        let mut g = ControlFlowGraph::new("m.f");
        let mut join = ENTRY_ID.to_string();
        for i in 0..6 {
            let head = g.add_block(BlockKind::Conditional, i * 4 + 1, i * 4 + 1);
            let left = g.add_block(BlockKind::Normal, i * 4 + 2, i * 4 + 2);
            let right = g.add_block(BlockKind::Normal, i * 4 + 3, i * 4 + 3);
            let bottom = g.add_block(BlockKind::Normal, i * 4 + 4, i * 4 + 4);
            g.add_edge(&join, &head);
            g.add_edge(&head, &left);
            g.add_edge(&head, &right);
            g.add_edge(&left, &bottom);
            g.add_edge(&right, &bottom);
            join = bottom;
        }
        g.add_edge(&join, EXIT_ID);

        assert_eq!(g.all_paths().len(), 64);
        assert_eq!(g.all_paths_capped(10).len(), 10);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Successor/predecessor lists stay mutually consistent under
            /// arbitrary edge insertions, including repeats.
            #[test]
            fn edges_stay_mutually_consistent(
                edges in proptest::collection::vec((0usize..8, 0usize..8), 0..64)
            ) {
                let mut g = ControlFlowGraph::new("m.f");
                let ids: Vec<String> =
                    (0..8).map(|_| g.add_block(BlockKind::Normal, 1, 1)).collect();
                for (u, v) in edges {
                    g.add_edge(&ids[u], &ids[v]);
                }
                for (id, block) in &g.blocks {
                    for succ in &block.successors {
                        prop_assert!(g.blocks[succ].predecessors.contains(id));
                    }
                    for pred in &block.predecessors {
                        prop_assert!(g.blocks[pred].successors.contains(id));
                    }
                }
            }

            /// After dominator computation, entry and the block itself are in
            /// every reachable block's dominator set.
            #[test]
            fn dominator_universal_invariants(
                edges in proptest::collection::vec((0usize..6, 0usize..6), 0..24)
            ) {
                let mut g = ControlFlowGraph::new("m.f");
                let ids: Vec<String> =
                    (0..6).map(|_| g.add_block(BlockKind::Normal, 1, 1)).collect();
                g.add_edge(ENTRY_ID, &ids[0]);
                for (u, v) in edges {
                    g.add_edge(&ids[u], &ids[v]);
                }
                g.compute_dominators();
                for id in g.reachable_blocks() {
                    prop_assert!(g.is_dominator(ENTRY_ID, &id));
                    prop_assert!(g.is_dominator(&id, &id));
                }
            }
        }
    }
}
