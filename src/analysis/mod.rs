//! Analysis stages over the language-agnostic IR.
//!
//! Per-file stages run in strict sequence (parse, imports, defs, inference,
//! CFG) and are embarrassingly parallel across files. Cross-module stages
//! (call-graph linking, rule execution) run after the barrier in `lib.rs`.

pub mod callgraph;
pub mod cfg_builder;
pub mod taint;
pub mod types;

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::ir::{
    CallGraph, ClassDef, ControlFlowGraph, FunctionDef, ImportMap, ModuleRegistry, ParsedModule,
    TypeContext,
};
use crate::parser::LanguageAdapter;

/// Everything extracted from one source file.
#[derive(Debug)]
pub struct ModuleAnalysis {
    pub module: ParsedModule,
    pub imports: ImportMap,
    /// Module-level functions. Methods live on `classes`.
    pub functions: Vec<FunctionDef>,
    pub classes: Vec<ClassDef>,
    pub type_context: TypeContext,
    pub cfgs: BTreeMap<String, ControlFlowGraph>,
}

impl ModuleAnalysis {
    /// Module-level functions plus every class method.
    pub fn all_functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.functions
            .iter()
            .chain(self.classes.iter().flat_map(|c| c.methods.iter()))
    }
}

/// The fully linked program: registry, call graph, CFGs, and per-module
/// type contexts. Built once at the barrier, read-only afterwards.
#[derive(Debug, Default)]
pub struct ProgramModel {
    pub registry: ModuleRegistry,
    pub call_graph: CallGraph,
    /// function FQN -> its CFG.
    pub cfgs: BTreeMap<String, ControlFlowGraph>,
    /// module FQN -> its type context.
    pub contexts: BTreeMap<String, TypeContext>,
}

impl ProgramModel {
    /// The barrier: merge per-file results and link the call graph.
    pub fn from_modules(modules: Vec<ModuleAnalysis>) -> Self {
        let call_graph = callgraph::build(&modules);

        let mut registry = ModuleRegistry::new();
        let mut cfgs = BTreeMap::new();
        let mut contexts = BTreeMap::new();
        for analysis in modules {
            for func in &analysis.functions {
                registry.insert_function(func.clone());
            }
            for class in &analysis.classes {
                registry.insert_class(class.clone());
            }
            cfgs.extend(analysis.cfgs);
            contexts.insert(analysis.module.module_fqn.clone(), analysis.type_context);
            registry.insert_module(analysis.module);
        }

        Self {
            registry,
            call_graph,
            cfgs,
            contexts,
        }
    }
}

/// Run the per-file pipeline:
/// `parse -> extract_imports -> extract_functions -> extract_classes ->
/// infer_types -> build_cfg`.
pub fn analyze_module(
    adapter: &dyn LanguageAdapter,
    path: &Path,
    module_fqn: &str,
    source: &str,
) -> Result<ModuleAnalysis> {
    let mut module = adapter.parse(path, module_fqn, source)?;
    let imports = adapter.extract_imports(&module);
    let functions = adapter.extract_functions(&module);
    let classes = adapter.extract_classes(&module);

    let type_context = adapter.infer_types(&module.module_fqn, &functions, &classes, &imports);

    let mut cfgs = BTreeMap::new();
    for func in functions
        .iter()
        .chain(classes.iter().flat_map(|c| c.methods.iter()))
    {
        cfgs.insert(func.fqn.clone(), cfg_builder::build(func));
    }

    // Extraction is done; the tree is no longer needed.
    module.release_tree();

    Ok(ModuleAnalysis {
        module,
        imports,
        functions,
        classes,
        type_context,
        cfgs,
    })
}
