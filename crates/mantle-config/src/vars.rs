//! Variable definition files and command-line variable values.
//!
//! A variables file holds top-level `name = value` attributes with literal
//! values, e.g. `mantle.mvars` or `prod.auto.mvars`.

use std::path::Path;

use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::value::Value;

use crate::expr::evaluate_literal;
use crate::parser::{parse_expression, parse_source};

/// Reads and parses a variables file.
///
/// # Errors
///
/// Returns diagnostics if the file cannot be read, does not parse, contains
/// blocks, or uses references.
pub fn parse_var_file(path: &Path) -> Result<Vec<(String, Value)>, Diagnostics> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Diagnostics::single(Diagnostic::error(
            "Failed to read variables file",
            format!("Given variables file {} does not exist or cannot be read: {e}.", path.display()),
        ))
    })?;
    parse_var_source(&path.display().to_string(), &text)
}

/// Parses variables-file content.
///
/// # Errors
///
/// Returns diagnostics for syntax errors, blocks, and non-literal values.
pub fn parse_var_source(filename: &str, text: &str) -> Result<Vec<(String, Value)>, Diagnostics> {
    let file = parse_source(filename, text).map_err(Diagnostics::single)?;
    let mut diags = Diagnostics::new();
    for block in &file.body.blocks {
        diags.push(
            Diagnostic::error(
                "Unexpected block in variables file",
                "A variables file may only contain attribute definitions.",
            )
            .with_subject(block.range.clone()),
        );
    }

    let mut out = Vec::with_capacity(file.body.attributes.len());
    for attr in &file.body.attributes {
        match evaluate_literal(&attr.expr) {
            Ok(v) => out.push((attr.name.clone(), v)),
            Err(e) => diags.append(e),
        }
    }
    if diags.has_errors() { Err(diags) } else { Ok(out) }
}

/// Interprets a raw value from `--var` or the environment.
///
/// Text that is a valid literal expression (number, bool, list, quoted
/// string...) is evaluated; anything else is taken as a plain string.
pub fn parse_raw_value(raw: &str) -> Value {
    parse_expression("<value>", raw)
        .ok()
        .and_then(|expr| evaluate_literal(&expr).ok())
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_attributes_in_order() {
        let vars = parse_var_source("t.mvars", "b = 2\na = \"x\"\nl = [true]\n").expect("parse");
        let names: Vec<&str> = vars.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "l"]);
        assert_eq!(vars[1].1, Value::from("x"));
    }

    #[test]
    fn blocks_are_rejected() {
        let diags = parse_var_source("t.mvars", "variable \"x\" {}\n").expect_err("should fail");
        assert_eq!(
            diags.iter().next().expect("diag").summary,
            "Unexpected block in variables file"
        );
    }

    #[test]
    fn references_are_rejected() {
        let diags = parse_var_source("t.mvars", "a = var.b\n").expect_err("should fail");
        assert_eq!(diags.iter().next().expect("diag").summary, "Variables not allowed");
    }

    #[test]
    fn missing_file_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(parse_var_file(&dir.path().join("none.mvars")).is_err());
    }

    #[test]
    fn raw_values() {
        assert_eq!(parse_raw_value("42"), Value::Number(42.0));
        assert_eq!(parse_raw_value("true"), Value::Bool(true));
        assert_eq!(parse_raw_value("hello world"), Value::from("hello world"));
        assert_eq!(parse_raw_value("a.b"), Value::from("a.b"));
        assert_eq!(parse_raw_value("\"quoted\""), Value::from("quoted"));
        assert_eq!(parse_raw_value("[1, 2]"), Value::List(vec![Value::Number(1.0), Value::Number(2.0)]));
    }
}
