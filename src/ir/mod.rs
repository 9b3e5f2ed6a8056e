//! Language-agnostic program IR.
//!
//! All adapters produce these types. All analysis stages and rule executors
//! consume them. This decouples language-specific parsing from the type
//! inference, graph construction, and rule execution layers.

pub mod callgraph;
pub mod cfg;
pub mod statement;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use callgraph::CallGraph;
pub use cfg::{BasicBlock, BlockKind, ControlFlowGraph};
pub use statement::{Assignment, CatchClause, RValue, SimpleStmt, Statement, SwitchCase};

/// Source language of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    Unknown,
}

impl Language {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "py" | "pyw" | "pyi" => Self::Python,
            "java" => Self::Java,
            _ => Self::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Registry key for adapter lookup.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Java => "java",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Location in source code. Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

/// How a type was established, ordered by how much we trust it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeSource {
    Annotation,
    Literal,
    Assignment,
    CallReturn,
    Attribute,
    Builtin,
    Import,
    Unresolved,
}

impl TypeSource {
    /// Rank used by the inference fixed point: an update may only replace a
    /// binding when `(rank, confidence)` strictly increases lexicographically.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Unresolved => 0,
            Self::CallReturn => 1,
            Self::Assignment => 2,
            Self::Attribute => 3,
            Self::Import => 4,
            Self::Literal => 5,
            Self::Annotation => 6,
            Self::Builtin => 7,
        }
    }
}

/// An inferred or declared type with a confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub type_fqn: String,
    pub confidence: f64,
    pub source: TypeSource,
}

impl TypeInfo {
    pub fn new(type_fqn: impl Into<String>, confidence: f64, source: TypeSource) -> Self {
        Self {
            type_fqn: type_fqn.into(),
            confidence,
            source,
        }
    }

    pub fn builtin(type_fqn: impl Into<String>) -> Self {
        Self::new(type_fqn, 1.0, TypeSource::Builtin)
    }

    pub fn imported(type_fqn: impl Into<String>) -> Self {
        Self::new(type_fqn, 0.9, TypeSource::Import)
    }

    pub fn unresolved(expr: impl Into<String>, confidence: f64) -> Self {
        Self::new(expr, confidence, TypeSource::Unresolved)
    }

    /// Whether this type should replace `other` in a binding. Replacement
    /// requires a strict lexicographic increase of `(source rank, confidence)`,
    /// which is what guarantees the inference loop terminates.
    pub fn supersedes(&self, other: &TypeInfo) -> bool {
        let (a, b) = (self.source.rank(), other.source.rank());
        a > b || (a == b && self.confidence > other.confidence)
    }
}

/// A declared function parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub position: usize,
    pub type_info: Option<TypeInfo>,
}

/// A function or method definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    /// Unique within the module registry.
    pub fqn: String,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeInfo>,
    /// Lowered body, consumed by the CFG builder, type inference, and taint.
    pub body: Vec<Statement>,
    pub location: Location,
}

/// A class definition with its methods and attribute types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub fqn: String,
    pub methods: Vec<FunctionDef>,
    pub attributes: BTreeMap<String, TypeInfo>,
    pub base_class_fqns: Vec<String>,
    pub location: Location,
}

impl ClassDef {
    pub fn method(&self, name: &str) -> Option<&FunctionDef> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// A single call argument. For named arguments `raw_text` is `key=value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub raw_text: String,
    /// True iff the argument expression is a bare identifier or attribute chain.
    pub is_variable: bool,
    pub position: usize,
}

/// One call expression discovered in a function body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSite {
    /// Syntactic target, e.g. `eval`, `request.GET`, `user.save`.
    pub target_name: String,
    /// Present iff `resolved` is true.
    pub target_fqn: Option<String>,
    pub arguments: Vec<Argument>,
    pub resolved: bool,
    /// Variable bound to the call's return value (`x = f(...)`), when the
    /// call is the right-hand side of an assignment.
    pub assigned_to: Option<String>,
    pub location: Location,
}

impl CallSite {
    pub fn resolve(&mut self, fqn: impl Into<String>) {
        self.target_fqn = Some(fqn.into());
        self.resolved = true;
    }

    /// Named arguments parsed into a `name -> value text` map by splitting on
    /// the first `=`. Positional arguments (no `=`) are skipped.
    pub fn keyword_arguments(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for arg in &self.arguments {
            if let Some(eq) = arg.raw_text.find('=') {
                // Avoid splitting comparison operators inside the value.
                if arg.raw_text[eq..].starts_with("==") {
                    continue;
                }
                let name = arg.raw_text[..eq].trim();
                let value = arg.raw_text[eq + 1..].trim();
                if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    map.insert(name.to_string(), value.to_string());
                }
            }
        }
        map
    }
}

/// Mapping from a locally bound name to a fully qualified module/symbol path.
pub type ImportMap = BTreeMap<String, String>;

/// A parsed source module. The tree-sitter tree is kept only while the
/// extraction stages run; `release_tree` drops it afterwards.
#[derive(Debug)]
pub struct ParsedModule {
    pub file_path: PathBuf,
    pub language: Language,
    pub module_fqn: String,
    pub source: String,
    pub tree: Option<tree_sitter::Tree>,
    pub metadata: BTreeMap<String, String>,
}

impl ParsedModule {
    pub fn root(&self) -> Option<tree_sitter::Node<'_>> {
        self.tree.as_ref().map(|t| t.root_node())
    }

    pub fn release_tree(&mut self) {
        self.tree = None;
    }
}

/// A symbol looked up in the registry.
#[derive(Debug)]
pub enum Symbol<'a> {
    Function(&'a FunctionDef),
    Class(&'a ClassDef),
}

/// Process-wide registry of modules and extracted symbols. Append-only while
/// the per-file phase runs, read-only after the barrier.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, ParsedModule>,
    functions: BTreeMap<String, FunctionDef>,
    classes: BTreeMap<String, ClassDef>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_module(&mut self, module: ParsedModule) {
        self.modules.insert(module.module_fqn.clone(), module);
    }

    pub fn insert_function(&mut self, func: FunctionDef) {
        self.functions.insert(func.fqn.clone(), func);
    }

    pub fn insert_class(&mut self, class: ClassDef) {
        for method in &class.methods {
            self.functions.insert(method.fqn.clone(), method.clone());
        }
        self.classes.insert(class.fqn.clone(), class);
    }

    pub fn module(&self, fqn: &str) -> Option<&ParsedModule> {
        self.modules.get(fqn)
    }

    pub fn function(&self, fqn: &str) -> Option<&FunctionDef> {
        self.functions.get(fqn)
    }

    pub fn class(&self, fqn: &str) -> Option<&ClassDef> {
        self.classes.get(fqn)
    }

    pub fn symbol(&self, fqn: &str) -> Option<Symbol<'_>> {
        self.functions
            .get(fqn)
            .map(Symbol::Function)
            .or_else(|| self.classes.get(fqn).map(Symbol::Class))
    }

    pub fn modules(&self) -> impl Iterator<Item = &ParsedModule> {
        self.modules.values()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.functions.values()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.values()
    }
}

/// Per-module type information, filled in by the inference engine.
#[derive(Debug, Clone, Default)]
pub struct TypeContext {
    /// `"<function_fqn>.<var>"` -> inferred type.
    pub variables: BTreeMap<String, TypeInfo>,
    pub functions: BTreeMap<String, FunctionDef>,
    pub classes: BTreeMap<String, ClassDef>,
    pub imports: ImportMap,
}

impl TypeContext {
    pub fn variable(&self, function_fqn: &str, name: &str) -> Option<&TypeInfo> {
        self.variables.get(&format!("{function_fqn}.{name}"))
    }

    /// Record a type for a binding. The update is applied only when it
    /// strictly improves `(source rank, confidence)`; returns whether the
    /// binding changed.
    pub fn bind_variable(&mut self, function_fqn: &str, name: &str, info: TypeInfo) -> bool {
        let key = format!("{function_fqn}.{name}");
        match self.variables.get(&key) {
            Some(existing) if !info.supersedes(existing) => false,
            _ => {
                self.variables.insert(key, info);
                true
            }
        }
    }
}

/// Derive a dotted module FQN from a path relative to the scan root:
/// `app/views.py` -> `app.views`, `com/example/Svc.java` -> `com.example.Svc`.
pub fn module_fqn_for_path(relative: &Path) -> String {
    let no_ext = relative.with_extension("");
    let parts: Vec<String> = no_ext
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_from_extension() {
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("pyi"), Language::Python);
        assert_eq!(Language::from_extension("java"), Language::Java);
        assert_eq!(Language::from_extension("rs"), Language::Unknown);
    }

    #[test]
    fn type_supersedes_by_rank_then_confidence() {
        let unresolved = TypeInfo::unresolved("x", 0.3);
        let assigned = TypeInfo::new("str", 0.5, TypeSource::Assignment);
        let assigned_better = TypeInfo::new("str", 0.9, TypeSource::Assignment);
        let builtin = TypeInfo::builtin("int");

        assert!(assigned.supersedes(&unresolved));
        assert!(assigned_better.supersedes(&assigned));
        assert!(!assigned.supersedes(&assigned_better));
        assert!(builtin.supersedes(&assigned_better));
        assert!(!unresolved.supersedes(&assigned));
    }

    #[test]
    fn bind_variable_never_downgrades() {
        let mut ctx = TypeContext::default();
        assert!(ctx.bind_variable("m.f", "x", TypeInfo::new("str", 0.95, TypeSource::Literal)));
        assert!(!ctx.bind_variable("m.f", "x", TypeInfo::unresolved("x", 0.3)));
        assert_eq!(ctx.variable("m.f", "x").unwrap().type_fqn, "str");
    }

    #[test]
    fn keyword_arguments_split_on_first_equals() {
        let call = CallSite {
            target_name: "run".into(),
            target_fqn: None,
            arguments: vec![
                Argument {
                    raw_text: "host=\"0.0.0.0\"".into(),
                    is_variable: false,
                    position: 0,
                },
                Argument {
                    raw_text: "debug=True".into(),
                    is_variable: false,
                    position: 1,
                },
                Argument {
                    raw_text: "positional".into(),
                    is_variable: true,
                    position: 2,
                },
            ],
            resolved: false,
            assigned_to: None,
            location: Location::new("app.py", 1, 0),
        };
        let kwargs = call.keyword_arguments();
        assert_eq!(kwargs.get("host").map(String::as_str), Some("\"0.0.0.0\""));
        assert_eq!(kwargs.get("debug").map(String::as_str), Some("True"));
        assert!(!kwargs.contains_key("positional"));
    }

    #[test]
    fn module_fqn_from_relative_path() {
        assert_eq!(module_fqn_for_path(Path::new("app/views.py")), "app.views");
        assert_eq!(
            module_fqn_for_path(Path::new("com/example/Svc.java")),
            "com.example.Svc"
        );
    }
}
