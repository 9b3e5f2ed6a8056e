//! Language adapters.
//!
//! Each adapter turns source text into the language-agnostic IR: a parsed
//! module, an import map, function/class definitions with lowered statement
//! bodies. Everything downstream (type inference, CFG construction, call
//! resolution, taint) is generic over the IR, so adding a language means
//! implementing this trait and registering the adapter.

#[cfg(feature = "java")]
pub mod java;
#[cfg(feature = "python")]
pub mod python;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::error::Result;
use crate::ir::statement;
use crate::ir::{
    CallSite, ClassDef, FunctionDef, ImportMap, Language, ParsedModule, TypeContext, TypeInfo,
};

/// Capability set each language adapter must satisfy.
///
/// `parse` fails only on unrecoverable I/O-level problems; syntax errors
/// produce a module whose tree contains error nodes, never a failure.
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// Parse source text into a module. `module_fqn` is derived from the
    /// path relative to the scan root.
    fn parse(&self, path: &Path, module_fqn: &str, source: &str) -> Result<ParsedModule>;

    /// One entry per bound local name; `from a.b import c as d` maps
    /// `d -> "a.b.c"`.
    fn extract_imports(&self, module: &ParsedModule) -> ImportMap;

    /// Module-level functions with lowered bodies.
    fn extract_functions(&self, module: &ParsedModule) -> Vec<FunctionDef>;

    /// Classes with methods, attribute types, and base-class FQNs.
    fn extract_classes(&self, module: &ParsedModule) -> Vec<ClassDef>;

    /// Builtin type names for this language, checked first by `resolve_type`.
    fn builtin_types(&self) -> &'static [&'static str];

    /// Whether this adapter understands a web/app framework by name.
    fn supports_framework(&self, name: &str) -> bool;

    /// Resolve a type expression: builtins first (confidence 1.0), then
    /// imports (0.9), otherwise the expression verbatim at 0.3. A missing
    /// context yields the expression at confidence 0.0.
    fn resolve_type(&self, expr: &str, ctx: Option<&TypeContext>) -> TypeInfo {
        let Some(ctx) = ctx else {
            return TypeInfo::unresolved(expr, 0.0);
        };
        if self.builtin_types().contains(&expr) {
            return TypeInfo::builtin(expr);
        }
        if let Some(fqn) = ctx.imports.get(expr) {
            return TypeInfo::imported(fqn.clone());
        }
        TypeInfo::unresolved(expr, 0.3)
    }
}

/// Statement-level capabilities shared by every adapter; implemented over
/// the lowered IR rather than per language.
impl dyn LanguageAdapter + '_ {
    /// All call sites in a function body, in source order.
    pub fn extract_call_sites(&self, func: &FunctionDef) -> Vec<CallSite> {
        statement::call_sites(&func.body).into_iter().cloned().collect()
    }

    /// Flattened statement list (pre-order) of a function body.
    pub fn extract_statements<'a>(
        &self,
        func: &'a FunctionDef,
    ) -> Vec<&'a crate::ir::Statement> {
        let mut stmts = Vec::new();
        statement::walk(&func.body, &mut |s| stmts.push(s));
        stmts
    }

    /// Names bound by assignment within a function body.
    pub fn extract_variables(&self, func: &FunctionDef) -> Vec<String> {
        let mut names: Vec<String> = statement::assignments(&func.body)
            .into_iter()
            .map(|a| a.target.clone())
            .collect();
        names.dedup();
        names
    }

    /// Run the inference engine over one module's definitions.
    pub fn infer_types(
        &self,
        module_fqn: &str,
        functions: &[FunctionDef],
        classes: &[ClassDef],
        imports: &ImportMap,
    ) -> TypeContext {
        crate::analysis::types::infer(self, module_fqn, functions, classes, imports)
    }

    /// Run intra-procedural taint tracking over one function.
    pub fn analyze_taint(
        &self,
        func: &FunctionDef,
        cfg: &crate::ir::ControlFlowGraph,
        spec: &dyn crate::analysis::taint::TaintSpec,
    ) -> Vec<crate::analysis::taint::TaintFlow> {
        crate::analysis::taint::analyze_function(func, cfg, spec)
    }
}

/// Process-wide adapter registry, keyed by language tag.
///
/// The registry is the engine's only true singleton; it is created by the
/// first access, before any adapter can register.
pub struct LanguageRegistry {
    adapters: RwLock<BTreeMap<&'static str, Arc<dyn LanguageAdapter>>>,
}

static REGISTRY: Lazy<LanguageRegistry> = Lazy::new(|| {
    let registry = LanguageRegistry {
        adapters: RwLock::new(BTreeMap::new()),
    };
    registry.register_builtin_adapters();
    registry
});

impl LanguageRegistry {
    pub fn global() -> &'static LanguageRegistry {
        &REGISTRY
    }

    fn register_builtin_adapters(&self) {
        #[cfg(feature = "python")]
        self.register(Arc::new(python::PythonAdapter));
        #[cfg(feature = "java")]
        self.register(Arc::new(java::JavaAdapter));
    }

    pub fn register(&self, adapter: Arc<dyn LanguageAdapter>) {
        let tag = adapter.language().tag();
        self.adapters
            .write()
            .expect("language registry poisoned")
            .insert(tag, adapter);
    }

    pub fn adapter_for(&self, language: Language) -> Option<Arc<dyn LanguageAdapter>> {
        self.adapters
            .read()
            .expect("language registry poisoned")
            .get(language.tag())
            .cloned()
    }

    pub fn adapter_for_path(&self, path: &Path) -> Option<Arc<dyn LanguageAdapter>> {
        self.adapter_for(Language::from_path(path))
    }

    pub fn registered_tags(&self) -> Vec<&'static str> {
        self.adapters
            .read()
            .expect("language registry poisoned")
            .keys()
            .copied()
            .collect()
    }
}
