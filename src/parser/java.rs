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

pub struct JavaAdapter;

static BUILTIN_TYPES: &[&str] = &[
    "int", "long", "short", "byte", "float", "double", "boolean", "char", "void", "Integer",
    "Long", "Short", "Byte", "Float", "Double", "Boolean", "Character", "String", "Object",
];

static FRAMEWORKS: &[&str] = &["spring", "servlet", "jakarta"];

impl LanguageAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    fn parse(&self, path: &Path, module_fqn: &str, source: &str) -> Result<ParsedModule> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_java::LANGUAGE.into())
            .map_err(|e| SleuthError::Parse {
                file: path.display().to_string(),
                message: format!("Failed to load Java grammar: {e}"),
            })?;

        let tree = parser.parse(source, None).ok_or_else(|| SleuthError::Parse {
            file: path.display().to_string(),
            message: "tree-sitter failed to parse Java".into(),
        })?;

        // Package declaration overrides the path-derived module FQN.
        let mut fqn = module_fqn.to_string();
        let root = tree.root_node();
        for i in 0..root.named_child_count() {
            if let Some(child) = root.named_child(i) {
                if child.kind() == "package_declaration" {
                    if let Some(name) = child.named_child(0) {
                        fqn = node_text(name, source).to_string();
                    }
                    break;
                }
            }
        }

        let mut metadata = BTreeMap::new();
        if root.has_error() {
            metadata.insert("has_errors".to_string(), "true".to_string());
        }

        Ok(ParsedModule {
            file_path: path.to_path_buf(),
            language: Language::Java,
            module_fqn: fqn,
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
        for i in 0..root.named_child_count() {
            let Some(child) = root.named_child(i) else {
                continue;
            };
            if child.kind() != "import_declaration" {
                continue;
            }
            // `import a.b.*;` binds no local name, skip it.
            let is_wildcard = (0..child.child_count())
                .filter_map(|i| child.child(i))
                .any(|c| c.kind() == "asterisk");
            if is_wildcard {
                tracing::debug!(
                    file = %module.file_path.display(),
                    "wildcard import skipped"
                );
                continue;
            }
            if let Some(path_node) = child.named_child(0) {
                let fqn = node_text(path_node, &module.source).to_string();
                if let Some(simple) = fqn.rsplit('.').next() {
                    imports.insert(simple.to_string(), fqn.clone());
                }
            }
        }
        imports
    }

    /// Java has no module-level functions; everything lives on classes.
    fn extract_functions(&self, _module: &ParsedModule) -> Vec<FunctionDef> {
        Vec::new()
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
            if matches!(child.kind(), "class_declaration" | "interface_declaration") {
                classes.push(build_class(
                    child,
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

fn join_fqn(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

// ── Classes and methods ─────────────────────────────────────────

fn build_class(node: Node, source: &str, file: &Path, module_fqn: &str) -> ClassDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default();
    // The path-derived module FQN already ends in the public class name;
    // avoid doubling it up.
    let fqn = if module_fqn.ends_with(&format!(".{name}")) || module_fqn == name {
        module_fqn.to_string()
    } else {
        join_fqn(module_fqn, &name)
    };

    let mut base_class_fqns = Vec::new();
    if let Some(superclass) = node.child_by_field_name("superclass") {
        for i in 0..superclass.named_child_count() {
            if let Some(ty) = superclass.named_child(i) {
                base_class_fqns.push(node_text(ty, source).to_string());
            }
        }
    }
    if let Some(interfaces) = node.child_by_field_name("interfaces") {
        let mut stack = vec![interfaces];
        while let Some(n) = stack.pop() {
            if matches!(n.kind(), "type_identifier" | "scoped_type_identifier") {
                base_class_fqns.push(node_text(n, source).to_string());
                continue;
            }
            for i in (0..n.named_child_count()).rev() {
                if let Some(child) = n.named_child(i) {
                    stack.push(child);
                }
            }
        }
    }

    let mut methods = Vec::new();
    let mut attributes = BTreeMap::new();
    if let Some(body) = node.child_by_field_name("body") {
        for i in 0..body.named_child_count() {
            let Some(member) = body.named_child(i) else {
                continue;
            };
            match member.kind() {
                "method_declaration" | "constructor_declaration" => {
                    methods.push(build_method(member, source, file, &fqn));
                }
                "field_declaration" => {
                    collect_field(member, source, &mut attributes);
                }
                _ => {}
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

fn collect_field(node: Node, source: &str, attributes: &mut BTreeMap<String, TypeInfo>) {
    let Some(type_node) = node.child_by_field_name("type") else {
        return;
    };
    let type_text = node_text(type_node, source).to_string();
    let mut cursor = node.walk();
    for declarator in node.children_by_field_name("declarator", &mut cursor) {
        if let Some(name) = declarator.child_by_field_name("name") {
            attributes.insert(
                node_text(name, source).to_string(),
                TypeInfo::new(type_text.clone(), 1.0, TypeSource::Annotation),
            );
        }
    }
}

fn build_method(node: Node, source: &str, file: &Path, class_fqn: &str) -> FunctionDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default();
    let fqn = join_fqn(class_fqn, &name);

    let mut params = Vec::new();
    if let Some(params_node) = node.child_by_field_name("parameters") {
        let mut position = 0;
        for i in 0..params_node.named_child_count() {
            let Some(param) = params_node.named_child(i) else {
                continue;
            };
            if !matches!(param.kind(), "formal_parameter" | "spread_parameter") {
                continue;
            }
            let Some(param_name) = param.child_by_field_name("name") else {
                continue;
            };
            let type_info = param
                .child_by_field_name("type")
                .map(|t| TypeInfo::new(node_text(t, source).trim(), 1.0, TypeSource::Annotation));
            params.push(Parameter {
                name: node_text(param_name, source).to_string(),
                position,
                type_info,
            });
            position += 1;
        }
    }

    // Declared return type; `void` is simply not a binding-producing type.
    let return_type = node
        .child_by_field_name("type")
        .map(|t| TypeInfo::new(node_text(t, source).trim(), 1.0, TypeSource::Annotation));

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

fn lower_body(node: Option<Node>, source: &str, file: &Path) -> Vec<Statement> {
    match node {
        Some(n) if n.kind() == "block" => lower_block(n, source, file),
        // Single-statement bodies (no braces) still become a block.
        Some(n) => lower_statement(n, source, file).into_iter().collect(),
        None => Vec::new(),
    }
}

fn lower_statement(node: Node, source: &str, file: &Path) -> Option<Statement> {
    let line = node.start_position().row + 1;
    match node.kind() {
        "if_statement" => {
            let condition_node = node.child_by_field_name("condition");
            let condition = condition_node
                .map(|c| node_text(c, source).trim_matches(|c| c == '(' || c == ')').to_string())
                .unwrap_or_default();
            let mut calls = Vec::new();
            if let Some(cond) = condition_node {
                collect_calls(cond, source, file, &mut calls);
            }
            let then_body = lower_body(node.child_by_field_name("consequence"), source, file);
            let else_body = lower_body(node.child_by_field_name("alternative"), source, file);
            Some(Statement::If {
                condition,
                calls,
                then_body,
                else_body,
                line,
            })
        }
        "while_statement" | "do_statement" => {
            let condition_node = node.child_by_field_name("condition");
            let condition = condition_node
                .map(|c| node_text(c, source).trim_matches(|c| c == '(' || c == ')').to_string())
                .unwrap_or_default();
            let mut calls = Vec::new();
            if let Some(cond) = condition_node {
                collect_calls(cond, source, file, &mut calls);
            }
            let body = lower_body(node.child_by_field_name("body"), source, file);
            Some(Statement::Loop {
                condition,
                calls,
                body,
                line,
            })
        }
        "for_statement" => {
            let condition = node
                .child_by_field_name("condition")
                .map(|c| node_text(c, source).to_string())
                .unwrap_or_default();
            let mut calls = Vec::new();
            for field in ["init", "condition", "update"] {
                if let Some(part) = node.child_by_field_name(field) {
                    collect_calls(part, source, file, &mut calls);
                }
            }
            let body = lower_body(node.child_by_field_name("body"), source, file);
            Some(Statement::Loop {
                condition,
                calls,
                body,
                line,
            })
        }
        "enhanced_for_statement" => {
            let name = node
                .child_by_field_name("name")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            let value_node = node.child_by_field_name("value");
            let value = value_node.map(|v| node_text(v, source)).unwrap_or_default();
            let mut calls = Vec::new();
            if let Some(v) = value_node {
                collect_calls(v, source, file, &mut calls);
            }
            let body = lower_body(node.child_by_field_name("body"), source, file);
            Some(Statement::Loop {
                condition: format!("{name} : {value}"),
                calls,
                body,
                line,
            })
        }
        "switch_expression" | "switch_statement" => {
            let subject = node
                .child_by_field_name("condition")
                .map(|c| node_text(c, source).trim_matches(|c| c == '(' || c == ')').to_string())
                .unwrap_or_default();
            let mut cases = Vec::new();
            let mut default = None;
            if let Some(body) = node.child_by_field_name("body") {
                for i in 0..body.named_child_count() {
                    let Some(group) = body.named_child(i) else {
                        continue;
                    };
                    if !matches!(group.kind(), "switch_block_statement_group" | "switch_rule") {
                        continue;
                    }
                    let mut label = String::new();
                    let mut group_body = Vec::new();
                    for j in 0..group.named_child_count() {
                        let Some(part) = group.named_child(j) else {
                            continue;
                        };
                        if part.kind() == "switch_label" {
                            label = node_text(part, source).to_string();
                        } else if let Some(stmt) = lower_statement(part, source, file) {
                            group_body.push(stmt);
                        }
                    }
                    if label.starts_with("default") {
                        default = Some(group_body);
                    } else {
                        cases.push(SwitchCase {
                            label,
                            body: group_body,
                        });
                    }
                }
            }
            Some(Statement::Switch {
                subject,
                cases,
                default,
                line,
            })
        }
        "try_statement" | "try_with_resources_statement" => {
            let body = lower_body(node.child_by_field_name("body"), source, file);
            let mut catches = Vec::new();
            let mut finally = None;
            for i in 0..node.named_child_count() {
                let Some(clause) = node.named_child(i) else {
                    continue;
                };
                match clause.kind() {
                    "catch_clause" => {
                        let exception = clause
                            .named_child(0)
                            .filter(|c| c.kind() == "catch_formal_parameter")
                            .map(|c| node_text(c, source).to_string())
                            .unwrap_or_default();
                        catches.push(CatchClause {
                            exception,
                            body: lower_body(clause.child_by_field_name("body"), source, file),
                            line: clause.start_position().row + 1,
                        });
                    }
                    "finally_clause" => {
                        let mut block = None;
                        for j in 0..clause.named_child_count() {
                            if let Some(c) = clause.named_child(j) {
                                if c.kind() == "block" {
                                    block = Some(c);
                                }
                            }
                        }
                        finally = Some(lower_body(block, source, file));
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
        "return_statement" => {
            let mut calls = Vec::new();
            let mut value = None;
            if let Some(expr) = node.named_child(0) {
                collect_calls(expr, source, file, &mut calls);
                value = Some(classify_rvalue(expr, source, &mut calls));
            }
            Some(Statement::Return { value, calls, line })
        }
        "local_variable_declaration" => Some(lower_local_declaration(node, source, file)),
        "expression_statement" => Some(lower_expression_statement(node, source, file)),
        "block" => {
            // Bare braces: inline into a simple statement run is not possible,
            // treat as an if-less body by flattening.
            let inner = lower_block(node, source, file);
            match inner.len() {
                0 => None,
                _ => Some(Statement::Try {
                    body: inner,
                    catches: Vec::new(),
                    finally: None,
                    line,
                }),
            }
        }
        "class_declaration" | "interface_declaration" | "method_declaration" => None,
        _ => {
            let mut calls = Vec::new();
            collect_calls(node, source, file, &mut calls);
            Some(Statement::Simple(SimpleStmt {
                line,
                end_line: node.end_position().row + 1,
                calls,
                assignment: None,
            }))
        }
    }
}

/// `String x = svc.load(id);` — a declaration is an annotated assignment.
fn lower_local_declaration(node: Node, source: &str, file: &Path) -> Statement {
    let line = node.start_position().row + 1;
    let end_line = node.end_position().row + 1;
    let mut calls = Vec::new();
    collect_calls(node, source, file, &mut calls);

    let annotation = node
        .child_by_field_name("type")
        .map(|t| node_text(t, source).trim().to_string());

    let mut assignment = None;
    if let Some(declarator) = first_child_of_kind(node, "variable_declarator") {
        if let Some(name) = declarator.child_by_field_name("name") {
            let target = node_text(name, source).to_string();
            let value = match declarator.child_by_field_name("value") {
                Some(value_node) => {
                    let value = classify_rvalue_in(value_node, source, &mut calls);
                    if let RValue::Call(idx) = &value {
                        calls[*idx].assigned_to = Some(target.clone());
                    }
                    value
                }
                None => RValue::Other(String::new()),
            };
            assignment = Some(Assignment {
                target,
                annotation,
                value,
                line,
            });
        }
    }

    Statement::Simple(SimpleStmt {
        line,
        end_line,
        calls,
        assignment,
    })
}

fn lower_expression_statement(node: Node, source: &str, file: &Path) -> Statement {
    let line = node.start_position().row + 1;
    let end_line = node.end_position().row + 1;
    let mut calls = Vec::new();
    collect_calls(node, source, file, &mut calls);

    let assignment = node
        .named_child(0)
        .filter(|n| n.kind() == "assignment_expression")
        .and_then(|assign| {
            let left = assign.child_by_field_name("left")?;
            if !matches!(left.kind(), "identifier" | "field_access") {
                return None;
            }
            let target = node_text(left, source).to_string();
            let value_node = assign.child_by_field_name("right")?;
            let value = classify_rvalue_in(value_node, source, &mut calls);
            if let RValue::Call(idx) = &value {
                if left.kind() == "identifier" {
                    calls[*idx].assigned_to = Some(target.clone());
                }
            }
            Some(Assignment {
                target,
                annotation: None,
                value,
                line,
            })
        });

    Statement::Simple(SimpleStmt {
        line,
        end_line,
        calls,
        assignment,
    })
}

fn first_child_of_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    (0..node.named_child_count())
        .filter_map(|i| node.named_child(i))
        .find(|c| c.kind() == kind)
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
        "field_access" => {
            let receiver = node
                .child_by_field_name("object")
                .map(|o| node_text(o, source).to_string())
                .unwrap_or_default();
            let attribute = node
                .child_by_field_name("field")
                .map(|f| node_text(f, source).to_string())
                .unwrap_or_default();
            RValue::Attribute {
                receiver,
                attribute,
            }
        }
        "method_invocation" | "object_creation_expression" => {
            let target = invocation_target(node, source);
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

fn literal_type(node: Node) -> Option<TypeInfo> {
    let fqn = match node.kind() {
        "decimal_integer_literal" | "hex_integer_literal" | "octal_integer_literal"
        | "binary_integer_literal" => "int",
        "decimal_floating_point_literal" | "hex_floating_point_literal" => "double",
        "string_literal" | "text_block" => "String",
        "character_literal" => "char",
        "true" | "false" => "boolean",
        "null_literal" => "null",
        _ => return None,
    };
    Some(TypeInfo::new(fqn, 0.95, TypeSource::Literal))
}

// ── Call extraction ─────────────────────────────────────────────

fn invocation_target(node: Node, source: &str) -> String {
    match node.kind() {
        "method_invocation" => {
            let name = node
                .child_by_field_name("name")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            match node.child_by_field_name("object") {
                Some(object) => format!("{}.{}", node_text(object, source), name),
                None => name.to_string(),
            }
        }
        "object_creation_expression" => node
            .child_by_field_name("type")
            .map(|t| format!("new {}", node_text(t, source)))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn collect_calls(node: Node, source: &str, file: &Path, out: &mut Vec<CallSite>) {
    if matches!(node.kind(), "method_invocation" | "object_creation_expression") {
        let target_name = invocation_target(node, source);
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

fn is_variable_expr(node: Node) -> bool {
    match node.kind() {
        "identifier" => true,
        "field_access" => node
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
        JavaAdapter
            .parse(Path::new("com/example/Svc.java"), "com.example.Svc", source)
            .unwrap()
    }

    #[test]
    fn package_declaration_wins_over_path() {
        let module = parse(
            r#"
package com.acme.api;

import java.sql.Statement;

public class Svc {}
"#,
        );
        assert_eq!(module.module_fqn, "com.acme.api");
        let imports = JavaAdapter.extract_imports(&module);
        assert_eq!(
            imports.get("Statement").map(String::as_str),
            Some("java.sql.Statement")
        );
    }

    #[test]
    fn methods_parameters_and_fields() {
        let module = parse(
            r#"
package com.acme;

public class UserService extends Base {
    private String table;

    public String load(String id, int limit) {
        return db.query(id);
    }
}
"#,
        );
        let classes = JavaAdapter.extract_classes(&module);
        assert_eq!(classes.len(), 1);
        let class = &classes[0];
        assert_eq!(class.fqn, "com.acme.UserService");
        assert_eq!(class.base_class_fqns, vec!["Base"]);
        assert_eq!(class.attributes.get("table").unwrap().type_fqn, "String");

        let load = class.method("load").unwrap();
        assert_eq!(load.fqn, "com.acme.UserService.load");
        assert_eq!(load.params.len(), 2);
        assert_eq!(load.params[0].type_info.as_ref().unwrap().type_fqn, "String");
        assert_eq!(load.return_type.as_ref().unwrap().type_fqn, "String");
    }

    #[test]
    fn declarations_bind_call_returns() {
        let module = parse(
            r#"
package com.acme;

public class Svc {
    void handle(String id) {
        String data = request.getParameter(id);
        exec(data);
    }
}
"#,
        );
        let classes = JavaAdapter.extract_classes(&module);
        let handle = classes[0].method("handle").unwrap();
        let calls = statement::call_sites(&handle.body);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].target_name, "request.getParameter");
        assert_eq!(calls[0].assigned_to.as_deref(), Some("data"));
        assert_eq!(calls[1].target_name, "exec");
        assert!(calls[1].arguments[0].is_variable);

        let assigns = statement::assignments(&handle.body);
        assert_eq!(assigns[0].annotation.as_deref(), Some("String"));
    }

    #[test]
    fn control_flow_is_lowered() {
        let module = parse(
            r#"
package com.acme;

public class Svc {
    void run(int x) {
        if (x > 0) {
            a();
        } else {
            b();
        }
        while (x < 10) {
            c();
        }
        switch (x) {
            case 1:
                d();
                break;
            default:
                e();
        }
        try {
            f();
        } catch (Exception ex) {
            g();
        } finally {
            h();
        }
    }
}
"#,
        );
        let classes = JavaAdapter.extract_classes(&module);
        let body = &classes[0].method("run").unwrap().body;
        assert!(matches!(body[0], Statement::If { .. }));
        assert!(matches!(body[1], Statement::Loop { .. }));
        if let Statement::Switch { cases, default, .. } = &body[2] {
            assert_eq!(cases.len(), 1);
            assert!(default.is_some());
        } else {
            panic!("expected switch");
        }
        if let Statement::Try {
            catches, finally, ..
        } = &body[3]
        {
            assert_eq!(catches.len(), 1);
            assert!(finally.is_some());
        } else {
            panic!("expected try");
        }
    }

    #[test]
    fn object_creation_is_a_call_site() {
        let module = parse(
            r#"
package com.acme;

public class Svc {
    void run(String cmd) {
        Runtime r = new Runtime(cmd);
    }
}
"#,
        );
        let classes = JavaAdapter.extract_classes(&module);
        let calls = statement::call_sites(&classes[0].method("run").unwrap().body);
        assert_eq!(calls[0].target_name, "new Runtime");
        assert_eq!(calls[0].assigned_to.as_deref(), Some("r"));
    }
}
