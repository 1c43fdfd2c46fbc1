//! Expression evaluation.
//!
//! Expressions are evaluated against a [`Scope`] that supplies variable
//! values and resource objects. Resource objects may be partially or wholly
//! [`Value::Unknown`] during planning; unknowns propagate through templates
//! and attribute access.

use std::collections::BTreeMap;

use mantle_common::diagnostics::{Diagnostic, Diagnostics, SourceRange};
use mantle_common::types::{ResourceAddr, ResourceMode};
use mantle_common::value::Value;

use crate::parser::ast::{Expr, ExprKind, Reference, TemplatePart};

/// Supplies values for references during evaluation.
pub trait Scope {
    /// Value of an input variable, or `None` if it is not declared.
    fn variable(&self, name: &str) -> Option<Value>;

    /// Object value of a resource, or `None` if it is not declared.
    fn resource(&self, addr: &ResourceAddr) -> Option<Value>;
}

/// A scope in which nothing is declared.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn variable(&self, _name: &str) -> Option<Value> {
        None
    }

    fn resource(&self, _addr: &ResourceAddr) -> Option<Value> {
        None
    }
}

/// Evaluates an expression.
///
/// # Errors
///
/// Returns diagnostics for references the scope cannot resolve, missing
/// attributes, and values that cannot be interpolated.
pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<Value, Diagnostics> {
    let mut diags = Diagnostics::new();
    let value = eval(expr, scope, &mut diags);
    if diags.has_errors() {
        Err(diags)
    } else {
        Ok(value)
    }
}

/// Evaluates an expression that may not contain any references.
///
/// # Errors
///
/// Returns a "Variables not allowed" diagnostic for every reference.
pub fn evaluate_literal(expr: &Expr) -> Result<Value, Diagnostics> {
    let refs = expr.references();
    if !refs.is_empty() {
        return Err(refs
            .into_iter()
            .map(|(_, range)| {
                Diagnostic::error("Variables not allowed", "Variables may not be used here.")
                    .with_subject(range.clone())
            })
            .collect());
    }
    evaluate(expr, &EmptyScope)
}

/// Evaluates every attribute of a block, collecting all diagnostics.
///
/// # Errors
///
/// Returns the diagnostics of every attribute that failed.
pub fn evaluate_map(
    attrs: &BTreeMap<String, Expr>,
    scope: &dyn Scope,
) -> Result<BTreeMap<String, Value>, Diagnostics> {
    let mut diags = Diagnostics::new();
    let mut out = BTreeMap::new();
    for (name, expr) in attrs {
        let value = eval(expr, scope, &mut diags);
        let _ = out.insert(name.clone(), value);
    }
    if diags.has_errors() {
        Err(diags)
    } else {
        Ok(out)
    }
}

fn eval(expr: &Expr, scope: &dyn Scope, diags: &mut Diagnostics) -> Value {
    match &expr.kind {
        ExprKind::Literal(v) => v.clone(),
        ExprKind::Reference(r) => eval_reference(r, &expr.range, scope, diags),
        ExprKind::List(items) => Value::List(items.iter().map(|e| eval(e, scope, diags)).collect()),
        ExprKind::Object(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, e)| (k.clone(), eval(e, scope, diags)))
                .collect(),
        ),
        ExprKind::Template(parts) => eval_template(parts, scope, diags),
    }
}

fn eval_template(parts: &[TemplatePart], scope: &dyn Scope, diags: &mut Diagnostics) -> Value {
    // A lone interpolation yields the value itself, not its string form.
    if let [TemplatePart::Interpolation(inner)] = parts {
        return eval(inner, scope, diags);
    }

    let mut out = String::new();
    let mut unknown = false;
    for part in parts {
        match part {
            TemplatePart::Literal(s) => out.push_str(s),
            TemplatePart::Interpolation(inner) => {
                let value = eval(inner, scope, diags);
                if !value.is_known() {
                    unknown = true;
                    continue;
                }
                match value.interpolate() {
                    Some(s) => out.push_str(&s),
                    None => diags.push(
                        Diagnostic::error(
                            "Invalid template interpolation value",
                            format!(
                                "Cannot include the given value in a string template: string required, but have {}.",
                                value.type_name()
                            ),
                        )
                        .with_subject(inner.range.clone()),
                    ),
                }
            }
        }
    }
    if unknown { Value::Unknown } else { Value::String(out) }
}

fn eval_reference(
    reference: &Reference,
    range: &SourceRange,
    scope: &dyn Scope,
    diags: &mut Diagnostics,
) -> Value {
    match reference {
        Reference::Variable(name) => scope.variable(name).unwrap_or_else(|| {
            diags.push(undeclared_variable(name).with_subject(range.clone()));
            Value::Null
        }),
        Reference::Resource { addr, path } => {
            let Some(mut value) = scope.resource(addr) else {
                diags.push(undeclared_resource(addr).with_subject(range.clone()));
                return Value::Null;
            };
            for attr in path {
                if value.is_null() {
                    diags.push(
                        Diagnostic::error(
                            "Attempt to get attribute from null value",
                            "This value is null, so it does not have any attributes.",
                        )
                        .with_subject(range.clone()),
                    );
                    return Value::Null;
                }
                match value.get_attr(attr) {
                    Some(next) => value = next,
                    None => {
                        diags.push(
                            Diagnostic::error(
                                "Unsupported attribute",
                                format!("This object does not have an attribute named {attr:?}."),
                            )
                            .with_subject(range.clone()),
                        );
                        return Value::Null;
                    }
                }
            }
            value
        }
    }
}

/// Diagnostic for a reference to a variable that is not declared.
pub fn undeclared_variable(name: &str) -> Diagnostic {
    Diagnostic::error(
        "Reference to undeclared input variable",
        format!(
            "An input variable with the name {name:?} has not been declared. This variable can be declared with a variable {name:?} {{}} block."
        ),
    )
}

/// Diagnostic for a reference to a resource that is not declared.
pub fn undeclared_resource(addr: &ResourceAddr) -> Diagnostic {
    let kind = match addr.mode {
        ResourceMode::Managed => "managed resource",
        ResourceMode::Data => "data resource",
    };
    Diagnostic::error(
        "Reference to undeclared resource",
        format!(
            "A {kind} {:?} {:?} has not been declared in the root module.",
            addr.type_name, addr.name
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    struct TestScope;

    impl Scope for TestScope {
        fn variable(&self, name: &str) -> Option<Value> {
            match name {
                "env" => Some(Value::from("prod")),
                "ports" => Some(Value::List(vec![Value::Number(80.0)])),
                _ => None,
            }
        }

        fn resource(&self, addr: &ResourceAddr) -> Option<Value> {
            if addr.name != "a" {
                return None;
            }
            let mut m = BTreeMap::new();
            let _ = m.insert("id".to_string(), Value::Unknown);
            let _ = m.insert("name".to_string(), Value::from("alpha"));
            Some(Value::Map(m))
        }
    }

    fn eval_str(src: &str) -> Result<Value, Diagnostics> {
        let expr = parse_expression("<test>", src).expect("parse");
        evaluate(&expr, &TestScope)
    }

    #[test]
    fn template_interpolates_variables() {
        assert_eq!(eval_str(r#""app-${var.env}""#).expect("eval"), Value::from("app-prod"));
    }

    #[test]
    fn lone_interpolation_keeps_type() {
        assert_eq!(
            eval_str(r#""${var.ports}""#).expect("eval"),
            Value::List(vec![Value::Number(80.0)])
        );
    }

    #[test]
    fn unknown_attribute_makes_template_unknown() {
        assert_eq!(eval_str(r#""x-${null_resource.a.id}""#).expect("eval"), Value::Unknown);
        assert_eq!(eval_str("null_resource.a.name").expect("eval"), Value::from("alpha"));
    }

    #[test]
    fn undeclared_variable_is_error() {
        let diags = eval_str("var.missing").expect_err("should fail");
        let d = diags.iter().next().expect("diag");
        assert_eq!(d.summary, "Reference to undeclared input variable");
        assert!(d.subject.is_some());
    }

    #[test]
    fn missing_attribute_is_error() {
        let diags = eval_str("null_resource.a.nope").expect_err("should fail");
        assert_eq!(diags.iter().next().expect("diag").summary, "Unsupported attribute");
    }

    #[test]
    fn list_in_template_is_error() {
        let diags = eval_str(r#""p=${var.ports}""#).expect_err("should fail");
        assert_eq!(
            diags.iter().next().expect("diag").summary,
            "Invalid template interpolation value"
        );
    }

    #[test]
    fn literal_rejects_references() {
        let expr = parse_expression("<test>", "[1, var.env]").expect("parse");
        let diags = evaluate_literal(&expr).expect_err("should fail");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.iter().next().expect("diag").summary, "Variables not allowed");
    }

    #[test]
    fn object_evaluates_entries() {
        let v = eval_str(r#"{ a = 1, b = "${var.env}" }"#).expect("eval");
        let m = v.as_map().expect("map");
        assert_eq!(m.get("b"), Some(&Value::from("prod")));
    }
}
