//! Whole-program call graph.
//!
//! Functions and classes are stored by FQN; edges hold callee FQNs in
//! first-seen order with duplicates removed. Path queries use an iterative
//! visited-set DFS, so cycles are handled without special casing.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{CallSite, ClassDef, FunctionDef};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallGraph {
    pub functions: BTreeMap<String, FunctionDef>,
    pub classes: BTreeMap<String, ClassDef>,
    /// Per-function call sites, in source order.
    pub call_sites: BTreeMap<String, Vec<CallSite>>,
    /// caller FQN -> ordered, deduplicated callee FQNs.
    pub edges: BTreeMap<String, Vec<String>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, func: FunctionDef) {
        self.functions.insert(func.fqn.clone(), func);
    }

    pub fn add_class(&mut self, class: ClassDef) {
        for method in &class.methods {
            self.functions.insert(method.fqn.clone(), method.clone());
        }
        self.classes.insert(class.fqn.clone(), class);
    }

    pub fn record_call_sites(&mut self, caller_fqn: &str, sites: Vec<CallSite>) {
        let entry = self.call_sites.entry(caller_fqn.to_string()).or_default();
        for site in sites {
            if let (true, Some(fqn)) = (site.resolved, site.target_fqn.clone()) {
                let callees = self.edges.entry(caller_fqn.to_string()).or_default();
                if !callees.iter().any(|c| c == &fqn) {
                    callees.push(fqn);
                }
            }
            entry.push(site);
        }
    }

    pub fn callees(&self, caller_fqn: &str) -> &[String] {
        self.edges.get(caller_fqn).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sites_of(&self, fqn: &str) -> &[CallSite] {
        self.call_sites
            .get(fqn)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every `(function_fqn, call_site)` pair, functions in FQN order.
    pub fn all_call_sites(&self) -> impl Iterator<Item = (&str, &CallSite)> {
        self.call_sites
            .iter()
            .flat_map(|(fqn, sites)| sites.iter().map(move |s| (fqn.as_str(), s)))
    }

    /// First call path `from -> ... -> to` over the edge map, if any.
    /// Iterative DFS with a visited set; edge order decides which path wins.
    pub fn call_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_string()]);
        }
        let mut visited: HashSet<&str> = HashSet::from([from]);
        let mut stack: Vec<(&str, usize)> = vec![(from, 0)];

        while let Some((node, idx)) = stack.pop() {
            let callees = self.callees(node);
            let mut i = idx;
            while i < callees.len() {
                let next = callees[i].as_str();
                i += 1;
                if next == to {
                    let mut path: Vec<String> =
                        stack.iter().map(|(n, _)| n.to_string()).collect();
                    path.push(node.to_string());
                    path.push(to.to_string());
                    return Some(path);
                }
                if visited.insert(next) {
                    stack.push((node, i));
                    stack.push((next, 0));
                    break;
                }
            }
        }
        None
    }
}
