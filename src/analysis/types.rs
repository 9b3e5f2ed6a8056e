//! Type inference.
//!
//! Populates `TypeContext.variables` for every binding in a module. Rules
//! apply in confidence order (annotation, literal, then the propagation
//! rules) and the propagation stages iterate to a fixed point. A binding is
//! only ever replaced when its `(source rank, confidence)` strictly
//! increases, which bounds the iteration.

use std::collections::BTreeMap;

use crate::ir::statement::{self, RValue};
use crate::ir::{
    CallSite, ClassDef, FunctionDef, ImportMap, TypeContext, TypeInfo, TypeSource,
};
use crate::parser::LanguageAdapter;

const ASSIGNMENT_DECAY: f64 = 0.95;
const CALL_RETURN_DECAY: f64 = 0.9;
const ATTRIBUTE_DECAY: f64 = 0.85;
const PARAM_AGREEMENT_CONFIDENCE: f64 = 0.5;
const PARAM_CONFLICT_CONFIDENCE: f64 = 0.3;

/// Infer types for all bindings in one module.
pub fn infer(
    adapter: &dyn LanguageAdapter,
    module_fqn: &str,
    functions: &[FunctionDef],
    classes: &[ClassDef],
    imports: &ImportMap,
) -> TypeContext {
    let mut ctx = TypeContext {
        imports: imports.clone(),
        ..TypeContext::default()
    };
    for func in functions {
        ctx.functions.insert(func.fqn.clone(), func.clone());
    }
    for class in classes {
        for method in &class.methods {
            ctx.functions.insert(method.fqn.clone(), method.clone());
        }
        ctx.classes.insert(class.fqn.clone(), class.clone());
    }

    resolve_annotations(adapter, &mut ctx);
    seed_literals(&mut ctx);

    // Propagation stages iterate until no binding changes.
    loop {
        let mut changed = false;
        changed |= propagate_assignments(module_fqn, &mut ctx);
        changed |= infer_parameters_from_call_sites(module_fqn, &mut ctx);
        if !changed {
            break;
        }
    }

    ctx
}

/// Rule 1: explicit annotations, confidence 1.0. The annotation text is
/// resolved through builtins and imports for its FQN, but stays
/// annotation-sourced at full confidence.
fn resolve_annotations(adapter: &dyn LanguageAdapter, ctx: &mut TypeContext) {
    let resolve = |ctx: &TypeContext, text: &str| -> TypeInfo {
        let resolved = adapter.resolve_type(text, Some(ctx));
        TypeInfo::new(resolved.type_fqn, 1.0, TypeSource::Annotation)
    };

    let fqns: Vec<String> = ctx.functions.keys().cloned().collect();
    for fqn in &fqns {
        let func = ctx.functions[fqn].clone();
        let mut updated = func.clone();

        for param in updated.params.iter_mut() {
            if let Some(info) = &param.type_info {
                if info.source == TypeSource::Annotation {
                    let resolved = resolve(ctx, &info.type_fqn);
                    ctx.bind_variable(fqn, &param.name, resolved.clone());
                    param.type_info = Some(resolved);
                }
            }
        }
        if let Some(ret) = &updated.return_type {
            if ret.source == TypeSource::Annotation {
                updated.return_type = Some(resolve(ctx, &ret.type_fqn));
            }
        }

        // Annotated assignments: `x: T = ...`.
        for assign in statement::assignments(&func.body) {
            if let Some(ann) = &assign.annotation {
                let resolved = resolve(ctx, ann);
                ctx.bind_variable(fqn, &assign.target, resolved);
            }
        }

        ctx.functions.insert(fqn.clone(), updated);
    }

    let class_fqns: Vec<String> = ctx.classes.keys().cloned().collect();
    for fqn in class_fqns {
        let mut class = ctx.classes[&fqn].clone();
        for info in class.attributes.values_mut() {
            if info.source == TypeSource::Annotation {
                *info = resolve(ctx, &info.type_fqn);
            }
        }
        ctx.classes.insert(fqn, class);
    }
}

/// Rule 2: literals, confidence 0.95.
fn seed_literals(ctx: &mut TypeContext) {
    let fqns: Vec<String> = ctx.functions.keys().cloned().collect();
    for fqn in fqns {
        let func = ctx.functions[&fqn].clone();
        for assign in statement::assignments(&func.body) {
            if let RValue::Literal { type_fqn, .. } = &assign.value {
                ctx.bind_variable(
                    &fqn,
                    &assign.target,
                    TypeInfo::new(type_fqn.clone(), 0.95, TypeSource::Literal),
                );
            }
        }
    }
}

/// Rules 3–5: assignment propagation, call returns, attribute reads.
fn propagate_assignments(module_fqn: &str, ctx: &mut TypeContext) -> bool {
    let mut changed = false;
    let fqns: Vec<String> = ctx.functions.keys().cloned().collect();

    for fqn in &fqns {
        let func = ctx.functions[fqn].clone();
        let calls: Vec<CallSite> = statement::call_sites(&func.body)
            .into_iter()
            .cloned()
            .collect();

        for assign in statement::assignments(&func.body) {
            let inferred = match &assign.value {
                // Rule 3: `x = y`.
                RValue::Name(name) => ctx.variable(fqn, name).map(|ty| {
                    TypeInfo::new(
                        ty.type_fqn.clone(),
                        ty.confidence * ASSIGNMENT_DECAY,
                        TypeSource::Assignment,
                    )
                }),
                // Rule 4: `x = f(...)`.
                RValue::Call(idx) => calls
                    .iter()
                    .find(|c| {
                        c.location.line == assign.line && c.assigned_to.as_deref() == Some(&assign.target)
                    })
                    .or_else(|| calls.get(*idx))
                    .and_then(|call| callee_return_type(module_fqn, fqn, call, ctx)),
                // Rule 5: `x = obj.attr`.
                RValue::Attribute {
                    receiver,
                    attribute,
                } => attribute_read_type(fqn, receiver, attribute, ctx),
                _ => None,
            };
            if let Some(info) = inferred {
                changed |= ctx.bind_variable(fqn, &assign.target, info);
            }
        }
    }
    changed
}

/// Return type of a call target resolved within the module: a local
/// function, a class constructor, or a method on a typed receiver.
fn callee_return_type(
    module_fqn: &str,
    caller_fqn: &str,
    call: &CallSite,
    ctx: &TypeContext,
) -> Option<TypeInfo> {
    let target = call.target_name.trim_start_matches("new ").trim();

    if let Some((receiver, method)) = target.rsplit_once('.') {
        let class = receiver_class(caller_fqn, receiver, ctx)?;
        let ret = class.method(method)?.return_type.as_ref()?;
        return Some(TypeInfo::new(
            ret.type_fqn.clone(),
            ret.confidence * CALL_RETURN_DECAY,
            TypeSource::CallReturn,
        ));
    }

    // Constructor call: the "return type" is the class itself.
    if let Some(class) = lookup_class(module_fqn, target, ctx) {
        return Some(TypeInfo::new(
            class.fqn.clone(),
            CALL_RETURN_DECAY,
            TypeSource::CallReturn,
        ));
    }

    let callee = ctx.functions.get(&format!("{module_fqn}.{target}"))?;
    let ret = callee.return_type.as_ref()?;
    Some(TypeInfo::new(
        ret.type_fqn.clone(),
        ret.confidence * CALL_RETURN_DECAY,
        TypeSource::CallReturn,
    ))
}

fn attribute_read_type(
    caller_fqn: &str,
    receiver: &str,
    attribute: &str,
    ctx: &TypeContext,
) -> Option<TypeInfo> {
    let (class, receiver_confidence) = receiver_class_with_confidence(caller_fqn, receiver, ctx)?;
    let attr = class.attributes.get(attribute)?;
    Some(TypeInfo::new(
        attr.type_fqn.clone(),
        receiver_confidence * ATTRIBUTE_DECAY,
        TypeSource::Attribute,
    ))
}

fn receiver_class<'a>(
    caller_fqn: &str,
    receiver: &str,
    ctx: &'a TypeContext,
) -> Option<&'a ClassDef> {
    receiver_class_with_confidence(caller_fqn, receiver, ctx).map(|(c, _)| c)
}

fn receiver_class_with_confidence<'a>(
    caller_fqn: &str,
    receiver: &str,
    ctx: &'a TypeContext,
) -> Option<(&'a ClassDef, f64)> {
    // `self`/`this` binds to the enclosing class at full confidence.
    if receiver == "self" || receiver == "this" {
        let (class_fqn, _) = caller_fqn.rsplit_once('.')?;
        return ctx.classes.get(class_fqn).map(|c| (c, 1.0));
    }
    let ty = ctx.variable(caller_fqn, receiver)?;
    let class = ctx
        .classes
        .get(&ty.type_fqn)
        .or_else(|| ctx.classes.values().find(|c| c.name == ty.type_fqn))?;
    Some((class, ty.confidence))
}

fn lookup_class<'a>(module_fqn: &str, name: &str, ctx: &'a TypeContext) -> Option<&'a ClassDef> {
    ctx.classes
        .get(&format!("{module_fqn}.{name}"))
        .or_else(|| ctx.classes.get(name))
        .or_else(|| ctx.classes.values().find(|c| c.name == name))
}

/// Rule 6: refine unannotated parameters from call-site argument types.
/// All callers agreeing yields confidence 0.5; disagreement keeps the
/// first-seen type at 0.3.
fn infer_parameters_from_call_sites(module_fqn: &str, ctx: &mut TypeContext) -> bool {
    let mut changed = false;

    // Caller function -> its call sites, computed once per pass.
    let mut sites_by_caller: BTreeMap<String, Vec<CallSite>> = BTreeMap::new();
    for (fqn, func) in &ctx.functions {
        sites_by_caller.insert(
            fqn.clone(),
            statement::call_sites(&func.body).into_iter().cloned().collect(),
        );
    }

    let fqns: Vec<String> = ctx.functions.keys().cloned().collect();
    for callee_fqn in &fqns {
        let callee = ctx.functions[callee_fqn].clone();
        let mut updated = callee.clone();
        let mut any_param_changed = false;

        for param in updated.params.iter_mut() {
            if param
                .type_info
                .as_ref()
                .is_some_and(|t| t.source == TypeSource::Annotation)
            {
                continue;
            }

            let mut observed: Vec<TypeInfo> = Vec::new();
            for (caller_fqn, sites) in &sites_by_caller {
                for site in sites {
                    if !call_targets_function(module_fqn, caller_fqn, site, &callee, ctx) {
                        continue;
                    }
                    if let Some(ty) = argument_type(caller_fqn, site, param.position, &param.name, ctx)
                    {
                        observed.push(ty);
                    }
                }
            }
            if observed.is_empty() {
                continue;
            }

            let first = observed[0].type_fqn.clone();
            let agree = observed.iter().all(|t| t.type_fqn == first);
            let confidence = if agree {
                PARAM_AGREEMENT_CONFIDENCE
            } else {
                PARAM_CONFLICT_CONFIDENCE
            };
            let info = TypeInfo::new(first, confidence, TypeSource::Assignment);
            if ctx.bind_variable(callee_fqn, &param.name, info.clone()) {
                param.type_info = Some(info);
                any_param_changed = true;
            }
        }

        if any_param_changed {
            ctx.functions.insert(callee_fqn.clone(), updated);
            changed = true;
        }
    }
    changed
}

fn call_targets_function(
    module_fqn: &str,
    caller_fqn: &str,
    site: &CallSite,
    callee: &FunctionDef,
    ctx: &TypeContext,
) -> bool {
    let target = site.target_name.as_str();
    if target == callee.name && callee.fqn == format!("{module_fqn}.{}", callee.name) {
        return true;
    }
    if let Some((receiver, method)) = target.rsplit_once('.') {
        if method == callee.name {
            if let Some(class) = receiver_class(caller_fqn, receiver, ctx) {
                return callee.fqn == format!("{}.{}", class.fqn, method);
            }
        }
    }
    false
}

/// Type of the argument feeding a parameter: keyword match first, then
/// positional; only variable arguments with known types count.
fn argument_type(
    caller_fqn: &str,
    site: &CallSite,
    position: usize,
    name: &str,
    ctx: &TypeContext,
) -> Option<TypeInfo> {
    if let Some(value) = site.keyword_arguments().get(name) {
        return ctx.variable(caller_fqn, value).cloned();
    }
    let arg = site
        .arguments
        .iter()
        .filter(|a| !a.raw_text.contains('='))
        .find(|a| a.position == position)?;
    if !arg.is_variable {
        return None;
    }
    ctx.variable(caller_fqn, &arg.raw_text).cloned()
}

#[cfg(all(test, feature = "python"))]
mod tests {
    use super::*;
    use crate::parser::python::PythonAdapter;
    use std::path::Path;

    fn infer_source(source: &str) -> TypeContext {
        let adapter = PythonAdapter;
        let module = adapter.parse(Path::new("app.py"), "app", source).unwrap();
        let imports = adapter.extract_imports(&module);
        let functions = adapter.extract_functions(&module);
        let classes = adapter.extract_classes(&module);
        infer(&adapter, "app", &functions, &classes, &imports)
    }

    #[test]
    fn annotation_beats_everything() {
        let ctx = infer_source(
            r#"
def f(cmd: str):
    cmd = 1
"#,
        );
        let ty = ctx.variable("app.f", "cmd").unwrap();
        assert_eq!(ty.type_fqn, "str");
        assert_eq!(ty.confidence, 1.0);
        assert_eq!(ty.source, TypeSource::Annotation);
    }

    #[test]
    fn literal_then_assignment_propagation() {
        let ctx = infer_source(
            r#"
def f():
    a = 1
    b = a
"#,
        );
        let a = ctx.variable("app.f", "a").unwrap();
        assert_eq!(a.type_fqn, "int");
        assert_eq!(a.source, TypeSource::Literal);
        assert_eq!(a.confidence, 0.95);

        let b = ctx.variable("app.f", "b").unwrap();
        assert_eq!(b.type_fqn, "int");
        assert_eq!(b.source, TypeSource::Assignment);
        assert!((b.confidence - 0.95 * 0.95).abs() < 1e-9);
    }

    #[test]
    fn call_return_propagates_declared_type() {
        let ctx = infer_source(
            r#"
def load() -> str:
    return "x"

def f():
    data = load()
"#,
        );
        let data = ctx.variable("app.f", "data").unwrap();
        assert_eq!(data.type_fqn, "str");
        assert_eq!(data.source, TypeSource::CallReturn);
        assert!((data.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn constructor_and_attribute_reads() {
        let ctx = infer_source(
            r#"
class User:
    def __init__(self):
        self.name = "anon"

def f():
    u = User()
    n = u.name
"#,
        );
        let u = ctx.variable("app.f", "u").unwrap();
        assert_eq!(u.type_fqn, "app.User");
        assert_eq!(u.source, TypeSource::CallReturn);

        let n = ctx.variable("app.f", "n").unwrap();
        assert_eq!(n.type_fqn, "str");
        assert_eq!(n.source, TypeSource::Attribute);
        assert!((n.confidence - 0.9 * 0.85).abs() < 1e-9);
    }

    #[test]
    fn parameters_inferred_from_agreeing_callers() {
        let ctx = infer_source(
            r#"
def sink(value):
    pass

def a():
    x = "s"
    sink(x)

def b():
    y = "t"
    sink(y)
"#,
        );
        let value = ctx.variable("app.sink", "value").unwrap();
        assert_eq!(value.type_fqn, "str");
        assert_eq!(value.confidence, 0.5);
    }

    #[test]
    fn disagreeing_callers_drop_confidence() {
        let ctx = infer_source(
            r#"
def sink(value):
    pass

def a():
    x = "s"
    sink(x)

def b():
    y = 2
    sink(y)
"#,
        );
        let value = ctx.variable("app.sink", "value").unwrap();
        assert_eq!(value.confidence, 0.3);
    }

    #[test]
    fn fixed_point_rank_never_decreases() {
        // The same module inferred twice yields identical bindings: the
        // fixed point is deterministic and stable.
        let src = r#"
def load() -> str:
    return "x"

def f():
    a = load()
    b = a
    c = b
"#;
        let first = infer_source(src);
        let second = infer_source(src);
        assert_eq!(first.variables.len(), second.variables.len());
        for (key, info) in &first.variables {
            let other = &second.variables[key];
            assert_eq!(info.type_fqn, other.type_fqn);
            assert_eq!(info.source, other.source);
        }
        // Transitive propagation decays multiplicatively.
        let c = first.variable("app.f", "c").unwrap();
        assert!((c.confidence - 0.9 * 0.95 * 0.95).abs() < 1e-9);
    }

    #[test]
    fn imported_annotation_resolves_fqn() {
        let ctx = infer_source(
            r#"
from models import User

def f(u: User):
    pass
"#,
        );
        let u = ctx.variable("app.f", "u").unwrap();
        assert_eq!(u.type_fqn, "models.User");
        assert_eq!(u.source, TypeSource::Annotation);
        assert_eq!(u.confidence, 1.0);
    }
}
