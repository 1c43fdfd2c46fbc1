//! Final values of root input variables.

use std::collections::BTreeMap;

use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::value::Value;
use mantle_config::Config;

/// Combines the values given by the user with declared defaults.
///
/// `inputs` must already have precedence applied. Inputs for undeclared
/// variables are dropped; the caller decides how loudly to report them.
pub fn resolve(config: &Config, inputs: &BTreeMap<String, Value>) -> (BTreeMap<String, Value>, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut values = BTreeMap::new();
    for var in &config.variables {
        let value = inputs.get(&var.name).or(var.default.as_ref()).cloned();
        match value {
            Some(v) => {
                let _ = values.insert(var.name.clone(), v);
            }
            None => diags.push(
                Diagnostic::error(
                    "No value for required variable",
                    format!(
                        "The root module input variable {:?} is not set, and has no default value. Use a --var or --var-file command line argument to provide a value for this variable.",
                        var.name
                    ),
                )
                .with_subject(var.range.clone()),
            ),
        }
    }
    (values, diags)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use mantle_config::load_sources;

    use super::*;

    fn config(src: &str) -> Config {
        let (config, diags) = load_sources(
            Path::new("."),
            BTreeMap::from([("main.mtl".to_string(), src.to_string())]),
        );
        assert!(!diags.has_errors(), "{}", diags.err_summary());
        config
    }

    #[test]
    fn defaults_fill_missing_inputs() {
        let config = config("variable \"a\" {\n  default = \"x\"\n}\nvariable \"b\" {}\n");
        let inputs = BTreeMap::from([
            ("b".to_string(), Value::Number(1.0)),
            ("extra".to_string(), Value::Bool(true)),
        ]);
        let (values, diags) = resolve(&config, &inputs);
        assert!(diags.is_empty());
        assert_eq!(values.get("a"), Some(&Value::String("x".into())));
        assert_eq!(values.get("b"), Some(&Value::Number(1.0)));
        assert!(!values.contains_key("extra"));
    }

    #[test]
    fn missing_required_variable_is_an_error() {
        let config = config("variable \"region\" {}\n");
        let (_, diags) = resolve(&config, &BTreeMap::new());
        assert!(diags.has_errors());
        assert!(diags.err_summary().contains("No value for required variable"));
    }
}
