use std::collections::BTreeMap;
use std::path::Path;

use tree_sitter::Node;

use super::LanguageAdapter;
use crate::error::{Result, SleuthError};
use crate::ir::statement::{Assignment, CatchClause, RValue, SimpleStmt, Statement, SwitchCase};
use crate::ir::{
    Argument, CallSite, ClassDef, FunctionDef, ImportMap, Language, Location, Parameter,
    ParsedModule, TypeInfo, TypeSource,
};

pub struct PythonAdapter;

static BUILTIN_TYPES: &[&str] = &[
    "int", "float", "str", "bool", "bytes", "bytearray", "complex", "list", "dict", "set",
    "frozenset", "tuple", "object", "None",
];

static FRAMEWORKS: &[&str] = &["flask", "django", "fastapi"];

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn parse(&self, path: &Path, module_fqn: &str, source: &str) -> Result<ParsedModule> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| SleuthError::Parse {
                file: path.display().to_string(),
                message: format!("Failed to load Python grammar: {e}"),
            })?;

        let tree = parser.parse(source, None).ok_or_else(|| SleuthError::Parse {
            file: path.display().to_string(),
            message: "tree-sitter failed to parse Python".into(),
        })?;

        let mut metadata = BTreeMap::new();
        if tree.root_node().has_error() {
            // Error nodes stay in the tree; extraction skips what it cannot read.
            metadata.insert("has_errors".to_string(), "true".to_string());
        }

        Ok(ParsedModule {
            file_path: path.to_path_buf(),
            language: Language::Python,
            module_fqn: module_fqn.to_string(),
            source: source.to_string(),
            tree: Some(tree),
            metadata,
        })
    }

    fn extract_imports(&self, module: &ParsedModule) -> ImportMap {
        let mut imports = ImportMap::new();
        let Some(root) = module.root() else {
            return imports;
        };
        collect_imports(root, &module.source, &mut imports);
        imports
    }

    fn extract_functions(&self, module: &ParsedModule) -> Vec<FunctionDef> {
        let Some(root) = module.root() else {
            return Vec::new();
        };
        let mut functions = Vec::new();
        for i in 0..root.named_child_count() {
            let Some(child) = root.named_child(i) else {
                continue;
            };
            if let Some(def) = as_function_definition(child) {
                functions.push(build_function(
                    def,
                    &module.source,
                    &module.file_path,
                    &module.module_fqn,
                ));
            }
        }
        functions
    }

    fn extract_classes(&self, module: &ParsedModule) -> Vec<ClassDef> {
        let Some(root) = module.root() else {
            return Vec::new();
        };
        let mut classes = Vec::new();
        for i in 0..root.named_child_count() {
            let Some(child) = root.named_child(i) else {
                continue;
            };
            if let Some(def) = as_class_definition(child) {
                classes.push(build_class(
                    def,
                    &module.source,
                    &module.file_path,
                    &module.module_fqn,
                ));
            }
        }
        classes
    }

    fn builtin_types(&self) -> &'static [&'static str] {
        BUILTIN_TYPES
    }

    fn supports_framework(&self, name: &str) -> bool {
        FRAMEWORKS.contains(&name.to_lowercase().as_str())
    }
}

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

fn loc(file: &Path, node: Node) -> Location {
    Location::new(file, node.start_position().row + 1, node.start_position().column)
}

/// Unwrap `decorated_definition` down to a `function_definition`, if any.
fn as_function_definition(node: Node) -> Option<Node> {
    match node.kind() {
        "function_definition" => Some(node),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .filter(|d| d.kind() == "function_definition"),
        _ => None,
    }
}

fn as_class_definition(node: Node) -> Option<Node> {
    match node.kind() {
        "class_definition" => Some(node),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .filter(|d| d.kind() == "class_definition"),
        _ => None,
    }
}

// ── Imports ─────────────────────────────────────────────────────

fn collect_imports(node: Node, source: &str, imports: &mut ImportMap) {
    match node.kind() {
        "import_statement" => {
            for i in 0..node.named_child_count() {
                let Some(item) = node.named_child(i) else {
                    continue;
                };
                match item.kind() {
                    "dotted_name" => {
                        let name = node_text(item, source).to_string();
                        imports.insert(name.clone(), name);
                    }
                    "aliased_import" => {
                        let name = item
                            .child_by_field_name("name")
                            .map(|n| node_text(n, source).to_string())
                            .unwrap_or_default();
                        let alias = item
                            .child_by_field_name("alias")
                            .map(|n| node_text(n, source).to_string())
                            .unwrap_or_default();
                        if !name.is_empty() && !alias.is_empty() {
                            imports.insert(alias, name);
                        }
                    }
                    _ => {}
                }
            }
        }
        "import_from_statement" => {
            let module = node
                .child_by_field_name("module_name")
                .map(|n| node_text(n, source).trim_start_matches('.').to_string())
                .unwrap_or_default();
            let mut cursor = node.walk();
            for item in node.children_by_field_name("name", &mut cursor) {
                match item.kind() {
                    "dotted_name" => {
                        let name = node_text(item, source).to_string();
                        imports.insert(name.clone(), join_fqn(&module, &name));
                    }
                    "aliased_import" => {
                        let name = item
                            .child_by_field_name("name")
                            .map(|n| node_text(n, source).to_string())
                            .unwrap_or_default();
                        let alias = item
                            .child_by_field_name("alias")
                            .map(|n| node_text(n, source).to_string())
                            .unwrap_or_default();
                        if !name.is_empty() && !alias.is_empty() {
                            imports.insert(alias, join_fqn(&module, &name));
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {
            for i in 0..node.named_child_count() {
                if let Some(child) = node.named_child(i) {
                    collect_imports(child, source, imports);
                }
            }
        }
    }
}

fn join_fqn(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

// ── Functions and classes ───────────────────────────────────────

fn build_function(node: Node, source: &str, file: &Path, fqn_prefix: &str) -> FunctionDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default();
    let fqn = join_fqn(fqn_prefix, &name);

    let mut params = Vec::new();
    if let Some(params_node) = node.child_by_field_name("parameters") {
        let mut position = 0;
        for i in 0..params_node.named_child_count() {
            let Some(param) = params_node.named_child(i) else {
                continue;
            };
            if let Some(parameter) = build_parameter(param, source, position) {
                if parameter.name == "self" || parameter.name == "cls" {
                    continue;
                }
                params.push(parameter);
                position += 1;
            }
        }
    }

    let return_type = node
        .child_by_field_name("return_type")
        .map(|n| annotation_type(node_text(n, source)));

    let body = node
        .child_by_field_name("body")
        .map(|b| lower_block(b, source, file))
        .unwrap_or_default();

    FunctionDef {
        name,
        fqn,
        params,
        return_type,
        body,
        location: loc(file, node),
    }
}

fn build_parameter(node: Node, source: &str, position: usize) -> Option<Parameter> {
    match node.kind() {
        "identifier" => Some(Parameter {
            name: node_text(node, source).to_string(),
            position,
            type_info: None,
        }),
        "typed_parameter" => {
            let name = node
                .named_child(0)
                .filter(|n| n.kind() == "identifier")
                .map(|n| node_text(n, source).to_string())?;
            let type_info = node
                .child_by_field_name("type")
                .map(|t| annotation_type(node_text(t, source)));
            Some(Parameter {
                name,
                position,
                type_info,
            })
        }
        "default_parameter" | "typed_default_parameter" => {
            let name = node
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_string())?;
            let type_info = node
                .child_by_field_name("type")
                .map(|t| annotation_type(node_text(t, source)));
            Some(Parameter {
                name,
                position,
                type_info,
            })
        }
        "list_splat_pattern" | "dictionary_splat_pattern" => {
            let name = node_text(node, source).trim_start_matches('*').to_string();
            Some(Parameter {
                name,
                position,
                type_info: None,
            })
        }
        _ => None,
    }
}

/// Annotation text becomes an annotation-sourced type; the inference stage
/// later resolves the FQN through imports without lowering the confidence.
fn annotation_type(text: &str) -> TypeInfo {
    TypeInfo::new(text.trim(), 1.0, TypeSource::Annotation)
}

fn build_class(node: Node, source: &str, file: &Path, module_fqn: &str) -> ClassDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default();
    let fqn = join_fqn(module_fqn, &name);

    let mut base_class_fqns = Vec::new();
    if let Some(supers) = node.child_by_field_name("superclasses") {
        for i in 0..supers.named_child_count() {
            if let Some(base) = supers.named_child(i) {
                if matches!(base.kind(), "identifier" | "attribute" | "dotted_name") {
                    base_class_fqns.push(node_text(base, source).to_string());
                }
            }
        }
    }

    let mut methods = Vec::new();
    let mut attributes = BTreeMap::new();
    if let Some(body) = node.child_by_field_name("body") {
        for i in 0..body.named_child_count() {
            let Some(child) = body.named_child(i) else {
                continue;
            };
            if let Some(def) = as_function_definition(child) {
                methods.push(build_function(def, source, file, &fqn));
            } else if child.kind() == "expression_statement" {
                collect_class_level_attribute(child, source, &mut attributes);
            }
        }
    }

    // `self.x = ...` in __init__ contributes attribute types.
    if let Some(init) = methods.iter().find(|m| m.name == "__init__") {
        for assign in crate::ir::statement::assignments(&init.body) {
            if let Some(attr) = assign.target.strip_prefix("self.") {
                attributes
                    .entry(attr.to_string())
                    .or_insert_with(|| attribute_type(assign));
            }
        }
    }

    ClassDef {
        name,
        fqn,
        methods,
        attributes,
        base_class_fqns,
        location: loc(file, node),
    }
}

fn collect_class_level_attribute(
    stmt: Node,
    source: &str,
    attributes: &mut BTreeMap<String, TypeInfo>,
) {
    let Some(assign) = stmt.named_child(0).filter(|n| n.kind() == "assignment") else {
        return;
    };
    let Some(left) = assign.child_by_field_name("left") else {
        return;
    };
    if left.kind() != "identifier" {
        return;
    }
    let name = node_text(left, source).to_string();
    let info = if let Some(ann) = assign.child_by_field_name("type") {
        annotation_type(node_text(ann, source))
    } else if let Some(right) = assign.child_by_field_name("right") {
        literal_type(right).unwrap_or_else(|| TypeInfo::unresolved(node_text(right, source), 0.3))
    } else {
        return;
    };
    attributes.insert(name, info);
}

fn attribute_type(assign: &Assignment) -> TypeInfo {
    if let Some(ann) = &assign.annotation {
        return annotation_type(ann);
    }
    match &assign.value {
        RValue::Literal { type_fqn, .. } => {
            TypeInfo::new(type_fqn.clone(), 0.95, TypeSource::Literal)
        }
        RValue::Name(n) => TypeInfo::unresolved(n.clone(), 0.3),
        _ => TypeInfo::unresolved("", 0.3),
    }
}

// ── Statement lowering ──────────────────────────────────────────

fn lower_block(block: Node, source: &str, file: &Path) -> Vec<Statement> {
    let mut stmts = Vec::new();
    for i in 0..block.named_child_count() {
        let Some(node) = block.named_child(i) else {
            continue;
        };
        if let Some(stmt) = lower_statement(node, source, file) {
            stmts.push(stmt);
        }
    }
    stmts
}

fn lower_statement(node: Node, source: &str, file: &Path) -> Option<Statement> {
    let line = node.start_position().row + 1;
    match node.kind() {
        "if_statement" => {
            let condition_node = node.child_by_field_name("condition");
            let condition = condition_node
                .map(|c| node_text(c, source).to_string())
                .unwrap_or_default();
            let mut calls = Vec::new();
            if let Some(cond) = condition_node {
                collect_calls(cond, source, file, &mut calls);
            }
            let then_body = node
                .child_by_field_name("consequence")
                .map(|b| lower_block(b, source, file))
                .unwrap_or_default();
            let else_body = lower_alternatives(node, source, file);
            Some(Statement::If {
                condition,
                calls,
                then_body,
                else_body,
                line,
            })
        }
        "while_statement" => {
            let condition_node = node.child_by_field_name("condition");
            let condition = condition_node
                .map(|c| node_text(c, source).to_string())
                .unwrap_or_default();
            let mut calls = Vec::new();
            if let Some(cond) = condition_node {
                collect_calls(cond, source, file, &mut calls);
            }
            let body = node
                .child_by_field_name("body")
                .map(|b| lower_block(b, source, file))
                .unwrap_or_default();
            Some(Statement::Loop {
                condition,
                calls,
                body,
                line,
            })
        }
        "for_statement" => {
            let left = node
                .child_by_field_name("left")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            let right_node = node.child_by_field_name("right");
            let right = right_node.map(|n| node_text(n, source)).unwrap_or_default();
            let mut calls = Vec::new();
            if let Some(r) = right_node {
                collect_calls(r, source, file, &mut calls);
            }
            let body = node
                .child_by_field_name("body")
                .map(|b| lower_block(b, source, file))
                .unwrap_or_default();
            Some(Statement::Loop {
                condition: format!("{left} in {right}"),
                calls,
                body,
                line,
            })
        }
        "try_statement" => {
            let body = node
                .child_by_field_name("body")
                .map(|b| lower_block(b, source, file))
                .unwrap_or_default();
            let mut catches = Vec::new();
            let mut finally = None;
            for i in 0..node.named_child_count() {
                let Some(clause) = node.named_child(i) else {
                    continue;
                };
                match clause.kind() {
                    "except_clause" => {
                        let exception = clause
                            .named_child(0)
                            .filter(|c| c.kind() != "block")
                            .map(|c| node_text(c, source).to_string())
                            .unwrap_or_default();
                        let clause_body = last_block_child(clause)
                            .map(|b| lower_block(b, source, file))
                            .unwrap_or_default();
                        catches.push(CatchClause {
                            exception,
                            body: clause_body,
                            line: clause.start_position().row + 1,
                        });
                    }
                    "finally_clause" => {
                        finally = last_block_child(clause).map(|b| lower_block(b, source, file));
                    }
                    _ => {}
                }
            }
            Some(Statement::Try {
                body,
                catches,
                finally,
                line,
            })
        }
        "match_statement" => {
            let subject = node
                .child_by_field_name("subject")
                .map(|s| node_text(s, source).to_string())
                .unwrap_or_default();
            let mut cases = Vec::new();
            if let Some(body) = node.child_by_field_name("body") {
                for i in 0..body.named_child_count() {
                    let Some(case) = body.named_child(i) else {
                        continue;
                    };
                    if case.kind() != "case_clause" {
                        continue;
                    }
                    let label = case
                        .named_child(0)
                        .map(|p| node_text(p, source).to_string())
                        .unwrap_or_default();
                    let case_body = last_block_child(case)
                        .map(|b| lower_block(b, source, file))
                        .unwrap_or_default();
                    cases.push(SwitchCase {
                        label,
                        body: case_body,
                    });
                }
            }
            Some(Statement::Switch {
                subject,
                cases,
                default: None,
                line,
            })
        }
        "return_statement" => {
            let mut calls = Vec::new();
            let mut value = None;
            if let Some(expr) = node.named_child(0) {
                collect_calls(expr, source, file, &mut calls);
                value = Some(classify_rvalue(expr, source, &mut calls));
            }
            Some(Statement::Return { value, calls, line })
        }
        "expression_statement" => Some(lower_simple(node, source, file)),
        // Nested definitions are extracted separately, not lowered.
        "function_definition" | "class_definition" | "decorated_definition" => None,
        "import_statement" | "import_from_statement" => None,
        _ => Some(lower_simple(node, source, file)),
    }
}

/// Chain `elif` clauses into nested `If` statements in the else body.
fn lower_alternatives(node: Node, source: &str, file: &Path) -> Vec<Statement> {
    let mut cursor = node.walk();
    let alternatives: Vec<Node> = node.children_by_field_name("alternative", &mut cursor).collect();
    let mut result: Vec<Statement> = Vec::new();

    for alt in alternatives.into_iter().rev() {
        match alt.kind() {
            "else_clause" => {
                result = alt
                    .child_by_field_name("body")
                    .map(|b| lower_block(b, source, file))
                    .unwrap_or_default();
            }
            "elif_clause" => {
                let condition_node = alt.child_by_field_name("condition");
                let condition = condition_node
                    .map(|c| node_text(c, source).to_string())
                    .unwrap_or_default();
                let mut calls = Vec::new();
                if let Some(cond) = condition_node {
                    collect_calls(cond, source, file, &mut calls);
                }
                let then_body = alt
                    .child_by_field_name("consequence")
                    .map(|b| lower_block(b, source, file))
                    .unwrap_or_default();
                result = vec![Statement::If {
                    condition,
                    calls,
                    then_body,
                    else_body: result,
                    line: alt.start_position().row + 1,
                }];
            }
            _ => {}
        }
    }
    result
}

fn last_block_child(node: Node) -> Option<Node> {
    let mut found = None;
    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            if child.kind() == "block" {
                found = Some(child);
            }
        }
    }
    found
}

fn lower_simple(node: Node, source: &str, file: &Path) -> Statement {
    let line = node.start_position().row + 1;
    let end_line = node.end_position().row + 1;
    let mut calls = Vec::new();
    collect_calls(node, source, file, &mut calls);

    let assignment = node
        .named_child(0)
        .filter(|n| n.kind() == "assignment")
        .and_then(|assign| lower_assignment(assign, source, &mut calls));

    Statement::Simple(SimpleStmt {
        line,
        end_line,
        calls,
        assignment,
    })
}

fn lower_assignment(
    assign: Node,
    source: &str,
    calls: &mut [CallSite],
) -> Option<Assignment> {
    let left = assign.child_by_field_name("left")?;
    let target = match left.kind() {
        "identifier" => node_text(left, source).to_string(),
        "attribute" => node_text(left, source).to_string(),
        _ => return None,
    };
    let annotation = assign
        .child_by_field_name("type")
        .map(|t| node_text(t, source).trim().to_string());
    let line = assign.start_position().row + 1;

    let value = match assign.child_by_field_name("right") {
        Some(right) => {
            let value = classify_rvalue_in(right, source, calls);
            if let RValue::Call(idx) = &value {
                if left.kind() == "identifier" {
                    calls[*idx].assigned_to = Some(target.clone());
                }
            }
            value
        }
        // `x: int` with no value still records the annotation.
        None => RValue::Other(String::new()),
    };

    Some(Assignment {
        target,
        annotation,
        value,
        line,
    })
}

fn classify_rvalue(node: Node, source: &str, calls: &mut Vec<CallSite>) -> RValue {
    classify_rvalue_in(node, source, calls)
}

fn classify_rvalue_in(node: Node, source: &str, calls: &mut [CallSite]) -> RValue {
    if let Some(info) = literal_type(node) {
        return RValue::Literal {
            type_fqn: info.type_fqn,
            text: node_text(node, source).to_string(),
        };
    }
    match node.kind() {
        "identifier" => RValue::Name(node_text(node, source).to_string()),
        "attribute" => {
            let receiver = node
                .child_by_field_name("object")
                .map(|o| node_text(o, source).to_string())
                .unwrap_or_default();
            let attribute = node
                .child_by_field_name("attribute")
                .map(|a| node_text(a, source).to_string())
                .unwrap_or_default();
            RValue::Attribute {
                receiver,
                attribute,
            }
        }
        "call" => {
            let target = node
                .child_by_field_name("function")
                .map(|f| node_text(f, source))
                .unwrap_or_default();
            let line = node.start_position().row + 1;
            calls
                .iter()
                .position(|c| c.target_name == target && c.location.line == line)
                .map(RValue::Call)
                .unwrap_or_else(|| RValue::Other(node_text(node, source).to_string()))
        }
        _ => RValue::Other(node_text(node, source).to_string()),
    }
}

/// Builtin type of a literal node, if the node is one.
fn literal_type(node: Node) -> Option<TypeInfo> {
    let fqn = match node.kind() {
        "integer" => "int",
        "float" => "float",
        "string" | "concatenated_string" => "str",
        "true" | "false" => "bool",
        "none" => "None",
        "list" | "list_comprehension" => "list",
        "dictionary" | "dictionary_comprehension" => "dict",
        "set" | "set_comprehension" => "set",
        "tuple" => "tuple",
        _ => return None,
    };
    Some(TypeInfo::new(fqn, 0.95, TypeSource::Literal))
}

// ── Call extraction ─────────────────────────────────────────────

fn collect_calls(node: Node, source: &str, file: &Path, out: &mut Vec<CallSite>) {
    if node.kind() == "call" {
        let target_name = node
            .child_by_field_name("function")
            .map(|f| node_text(f, source).to_string())
            .unwrap_or_default();
        let mut arguments = Vec::new();
        if let Some(args) = node.child_by_field_name("arguments") {
            for i in 0..args.named_child_count() {
                let Some(arg) = args.named_child(i) else {
                    continue;
                };
                arguments.push(Argument {
                    raw_text: node_text(arg, source).to_string(),
                    is_variable: is_variable_expr(arg),
                    position: i,
                });
            }
        }
        if !target_name.is_empty() {
            out.push(CallSite {
                target_name,
                target_fqn: None,
                arguments,
                resolved: false,
                assigned_to: None,
                location: loc(file, node),
            });
        }
    }
    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            collect_calls(child, source, file, out);
        }
    }
}

/// Bare identifier or attribute chain of identifiers.
fn is_variable_expr(node: Node) -> bool {
    match node.kind() {
        "identifier" => true,
        "attribute" => node
            .child_by_field_name("object")
            .map(is_variable_expr)
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::statement;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> ParsedModule {
        PythonAdapter
            .parse(Path::new("app.py"), "app", source)
            .unwrap()
    }

    #[test]
    fn imports_map_bound_names_to_fqns() {
        let module = parse(
            r#"
import os
import numpy as np
from flask import request
from a.b import c as d
"#,
        );
        let imports = PythonAdapter.extract_imports(&module);
        assert_eq!(imports.get("os").map(String::as_str), Some("os"));
        assert_eq!(imports.get("np").map(String::as_str), Some("numpy"));
        assert_eq!(imports.get("request").map(String::as_str), Some("flask.request"));
        assert_eq!(imports.get("d").map(String::as_str), Some("a.b.c"));
    }

    #[test]
    fn function_params_and_annotations() {
        let module = parse(
            r#"
def handle(req, cmd: str, timeout: int = 5) -> bool:
    return True
"#,
        );
        let funcs = PythonAdapter.extract_functions(&module);
        assert_eq!(funcs.len(), 1);
        let f = &funcs[0];
        assert_eq!(f.fqn, "app.handle");
        assert_eq!(f.params.len(), 3);
        assert_eq!(f.params[0].name, "req");
        assert!(f.params[0].type_info.is_none());
        assert_eq!(f.params[1].type_info.as_ref().unwrap().type_fqn, "str");
        assert_eq!(f.params[2].type_info.as_ref().unwrap().type_fqn, "int");
        assert_eq!(f.return_type.as_ref().unwrap().type_fqn, "bool");
    }

    #[test]
    fn call_sites_record_assignment_binding() {
        let module = parse(
            r#"
def f():
    x = request.GET()
    eval(x)
"#,
        );
        let funcs = PythonAdapter.extract_functions(&module);
        let calls = statement::call_sites(&funcs[0].body);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].target_name, "request.GET");
        assert_eq!(calls[0].assigned_to.as_deref(), Some("x"));
        assert_eq!(calls[1].target_name, "eval");
        assert!(calls[1].arguments[0].is_variable);
    }

    #[test]
    fn keyword_arguments_keep_raw_text() {
        let module = parse(
            r#"
def f():
    app.run(host="0.0.0.0", port=5000, debug=True)
"#,
        );
        let funcs = PythonAdapter.extract_functions(&module);
        let calls = statement::call_sites(&funcs[0].body);
        let kwargs = calls[0].keyword_arguments();
        assert_eq!(kwargs.get("host").map(String::as_str), Some("\"0.0.0.0\""));
        assert_eq!(kwargs.get("port").map(String::as_str), Some("5000"));
        assert_eq!(kwargs.get("debug").map(String::as_str), Some("True"));
    }

    #[test]
    fn control_flow_is_lowered() {
        let module = parse(
            r#"
def f(x):
    if x:
        a()
    elif y:
        b()
    else:
        c()
    while x:
        d()
    try:
        e()
    except ValueError:
        g()
    finally:
        h()
"#,
        );
        let funcs = PythonAdapter.extract_functions(&module);
        let body = &funcs[0].body;
        assert!(matches!(body[0], Statement::If { .. }));
        if let Statement::If { else_body, .. } = &body[0] {
            assert!(matches!(else_body[0], Statement::If { .. }), "elif chains");
        }
        assert!(matches!(body[1], Statement::Loop { .. }));
        if let Statement::Try {
            catches, finally, ..
        } = &body[2]
        {
            assert_eq!(catches.len(), 1);
            assert_eq!(catches[0].exception, "ValueError");
            assert!(finally.is_some());
        } else {
            panic!("expected try statement");
        }
    }

    #[test]
    fn classes_collect_methods_and_attributes() {
        let module = parse(
            r#"
class User(Base):
    table = "users"

    def __init__(self, name: str):
        self.name = name
        self.age = 0

    def save(self):
        db.commit()
"#,
        );
        let classes = PythonAdapter.extract_classes(&module);
        assert_eq!(classes.len(), 1);
        let class = &classes[0];
        assert_eq!(class.fqn, "app.User");
        assert_eq!(class.base_class_fqns, vec!["Base"]);
        assert_eq!(class.methods.len(), 2);
        assert_eq!(class.attributes.get("table").unwrap().type_fqn, "str");
        assert_eq!(class.attributes.get("age").unwrap().type_fqn, "int");
        // Method FQNs nest under the class.
        assert_eq!(class.method("save").unwrap().fqn, "app.User.save");
        // `self`/`cls` params are dropped; call-site positions align.
        assert_eq!(class.method("__init__").unwrap().params[0].name, "name");
    }

    #[test]
    fn syntax_errors_degrade_not_fail() {
        let module = parse("def broken(:\n    pass\n");
        assert_eq!(module.metadata.get("has_errors").map(String::as_str), Some("true"));
    }
}
