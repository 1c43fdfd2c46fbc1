//! Output of `output`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use mantle_common::constants::BIN_NAME;
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_state::OutputState;
use serde_json::{Map, Value, json};

use super::View;
use super::render::format_value;
use crate::arguments::OutputFormat;

/// What `output` shows.
pub trait OutputView {
    /// Shows one output, or all when `name` is `None`.
    fn output(&self, name: Option<&str>, outputs: &BTreeMap<String, OutputState>) -> Diagnostics;

    /// Shows diagnostics.
    fn diagnostics(&self, diags: Diagnostics);
}

/// Creates the view for the requested format.
pub fn new_output_view(format: OutputFormat, view: &View) -> Box<dyn OutputView> {
    let view = view.clone();
    match format {
        OutputFormat::Human => Box::new(HumanOutput { view }),
        OutputFormat::Json => Box::new(JsonOutput { view }),
        OutputFormat::Raw => Box::new(RawOutput { view }),
    }
}

fn not_found(name: &str) -> Diagnostic {
    Diagnostic::error(
        format!("Output \"{name}\" not found"),
        "The output variable requested could not be found in the state file. If you recently added this to your configuration, be sure to run `mantle apply`, since the state won't be updated with new output variables until that command is run.",
    )
}

fn no_outputs() -> Diagnostic {
    Diagnostic::warning(
        "No outputs found",
        format!(
            "The state file either has no outputs defined, or all the defined outputs are empty. Please define an output in your configuration with the `output` keyword and run `{BIN_NAME} refresh` for it to become available. If you are using interpolation, please verify the interpolated value is not empty. You can use the `{BIN_NAME} console` command to assist."
        ),
    )
}

struct HumanOutput {
    view: View,
}

impl OutputView for HumanOutput {
    fn output(&self, name: Option<&str>, outputs: &BTreeMap<String, OutputState>) -> Diagnostics {
        if let Some(name) = name {
            return match outputs.get(name) {
                Some(output) => {
                    self.view.stdout().println(&format_value(&output.value));
                    Diagnostics::new()
                }
                None => Diagnostics::single(not_found(name)),
            };
        }
        if outputs.is_empty() {
            return Diagnostics::single(no_outputs());
        }
        let mut text = String::new();
        for (name, output) in outputs {
            let value = if output.sensitive {
                "<sensitive>".to_string()
            } else {
                format_value(&output.value)
            };
            let _ = writeln!(text, "{name} = {value}");
        }
        self.view.stdout().print(&text);
        Diagnostics::new()
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.view.diagnostics(diags);
    }
}

struct RawOutput {
    view: View,
}

impl OutputView for RawOutput {
    fn output(&self, name: Option<&str>, outputs: &BTreeMap<String, OutputState>) -> Diagnostics {
        let Some(name) = name else {
            return Diagnostics::single(Diagnostic::error(
                "Output name required",
                "The --raw option requires a single output name.",
            ));
        };
        let Some(output) = outputs.get(name) else {
            return Diagnostics::single(not_found(name));
        };
        let text = match &output.value {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Null => {
                return Diagnostics::single(Diagnostic::error(
                    "Unsupported value for raw output",
                    format!("The value for output value \"{name}\" is null, so --raw mode cannot print it."),
                ));
            }
            Value::Array(_) | Value::Object(_) => {
                return Diagnostics::single(Diagnostic::error(
                    "Unsupported value for raw output",
                    "The --raw option only supports strings, numbers, and boolean values, but output value is a collection.\n\nUse the --json option for machine-readable representations of output values that have complex types.",
                ));
            }
        };
        self.view.stdout().print(&text);
        Diagnostics::new()
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.view.diagnostics(diags);
    }
}

struct JsonOutput {
    view: View,
}

impl OutputView for JsonOutput {
    fn output(&self, name: Option<&str>, outputs: &BTreeMap<String, OutputState>) -> Diagnostics {
        let doc = if let Some(name) = name {
            match outputs.get(name) {
                Some(output) => output.value.clone(),
                None => return Diagnostics::single(not_found(name)),
            }
        } else {
            let all: Map<String, Value> = outputs
                .iter()
                .map(|(name, o)| (name.clone(), json!({ "sensitive": o.sensitive, "value": o.value })))
                .collect();
            Value::Object(all)
        };
        self.view.stdout().println(&serde_json::to_string_pretty(&doc).unwrap_or_default());
        Diagnostics::new()
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.view.diagnostics(diags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::ViewArgs;
    use crate::streams::{Captured, Streams};

    fn view() -> (View, Captured) {
        let (streams, captured) = Streams::for_testing("");
        let args = ViewArgs {
            no_color: true,
            ..ViewArgs::default()
        };
        (View::new(streams, args, false, false), captured)
    }

    fn outputs() -> BTreeMap<String, OutputState> {
        BTreeMap::from([
            (
                "name".to_string(),
                OutputState {
                    value: json!("web"),
                    sensitive: false,
                },
            ),
            (
                "ports".to_string(),
                OutputState {
                    value: json!([80, 443]),
                    sensitive: false,
                },
            ),
            (
                "token".to_string(),
                OutputState {
                    value: json!("abc"),
                    sensitive: true,
                },
            ),
        ])
    }

    #[test]
    fn human_all_masks_sensitive() {
        let (view, captured) = view();
        let diags = new_output_view(OutputFormat::Human, &view).output(None, &outputs());
        assert!(diags.is_empty());
        let out = captured.stdout();
        assert!(out.contains("name = \"web\"\n"), "{out}");
        assert!(out.contains("token = <sensitive>\n"), "{out}");
    }

    #[test]
    fn human_single_shows_sensitive_value() {
        let (view, captured) = view();
        let _ = new_output_view(OutputFormat::Human, &view).output(Some("token"), &outputs());
        assert_eq!(captured.stdout(), "\"abc\"\n");
    }

    #[test]
    fn missing_output_is_error() {
        let (view, _) = view();
        let diags = new_output_view(OutputFormat::Json, &view).output(Some("nope"), &outputs());
        assert_eq!(diags.err_summary(), "Output \"nope\" not found");
    }

    #[test]
    fn no_outputs_warns() {
        let (view, _) = view();
        let diags = new_output_view(OutputFormat::Human, &view).output(None, &BTreeMap::new());
        assert!(!diags.has_errors());
        assert!(diags.has_warnings());
    }

    #[test]
    fn raw_prints_primitives_only() {
        let (view, captured) = view();
        let raw = new_output_view(OutputFormat::Raw, &view);
        assert!(raw.output(Some("name"), &outputs()).is_empty());
        assert_eq!(captured.stdout(), "web");
        assert!(raw.output(Some("ports"), &outputs()).has_errors());
    }

    #[test]
    fn json_all() {
        let (view, captured) = view();
        let _ = new_output_view(OutputFormat::Json, &view).output(None, &outputs());
        let doc: Value = serde_json::from_str(&captured.stdout()).expect("json");
        assert_eq!(doc["ports"]["value"], json!([80, 443]));
        assert_eq!(doc["token"]["sensitive"], true);
    }
}
