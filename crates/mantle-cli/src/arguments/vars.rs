//! `--var` and `--var-file` flags.
//!
//! Later items override earlier ones, so the flags are pulled out of the
//! argument list in order rather than grouped by clap.

use std::path::PathBuf;

use mantle_common::diagnostics::{Diagnostic, Diagnostics};

/// One variable source from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarItem {
    /// `--var NAME=VALUE`.
    Var {
        /// Variable name.
        name: String,
        /// Unparsed value.
        raw: String,
    },
    /// `--var-file PATH`.
    File(PathBuf),
}

/// Variable items in command-line order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vars {
    /// The items.
    pub items: Vec<VarItem>,
}

impl Vars {
    /// Returns true if no variables were given.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Splits `--var`/`--var-file` items out of `args`.
pub fn extract_vars(args: Vec<String>) -> (Vars, Vec<String>, Diagnostics) {
    let mut vars = Vars::default();
    let mut rest = Vec::with_capacity(args.len());
    let mut diags = Diagnostics::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag == "--var" || flag == "--var-file" => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };
        if flag != "--var" && flag != "--var-file" {
            rest.push(arg);
            continue;
        }
        let Some(value) = inline.or_else(|| iter.next()) else {
            diags.push(Diagnostic::error(
                "Failed to parse command-line flags",
                format!("flag needs an argument: {flag}"),
            ));
            continue;
        };
        if flag == "--var-file" {
            vars.items.push(VarItem::File(PathBuf::from(value)));
            continue;
        }
        match value.split_once('=') {
            Some((name, raw)) if !name.trim().is_empty() => vars.items.push(VarItem::Var {
                name: name.trim().to_string(),
                raw: raw.to_string(),
            }),
            _ => diags.push(Diagnostic::error(
                "Invalid --var option",
                format!(
                    "The given --var option {value:?} is not correctly specified. Must be a variable name and value separated by an equals sign, like --var=\"key=value\"."
                ),
            )),
        }
    }
    (vars, rest, diags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn keeps_order_of_mixed_items() {
        let (vars, rest, diags) = extract_vars(args(&[
            "--var=a=1",
            "--json",
            "--var-file",
            "x.mvars",
            "--var",
            "b=two=2",
        ]));
        assert!(diags.is_empty());
        assert_eq!(rest, args(&["--json"]));
        assert_eq!(
            vars.items,
            vec![
                VarItem::Var {
                    name: "a".into(),
                    raw: "1".into()
                },
                VarItem::File(PathBuf::from("x.mvars")),
                VarItem::Var {
                    name: "b".into(),
                    raw: "two=2".into()
                },
            ]
        );
    }

    #[test]
    fn var_without_equals_is_an_error() {
        let (vars, _, diags) = extract_vars(args(&["--var", "region"]));
        assert!(vars.is_empty());
        assert_eq!(diags.errors().next().expect("error").summary, "Invalid --var option");
    }

    #[test]
    fn missing_value_is_an_error() {
        let (_, _, diags) = extract_vars(args(&["--var-file"]));
        assert!(diags.has_errors());
    }
}
