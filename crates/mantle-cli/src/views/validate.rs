//! Output of `validate`.

use mantle_common::diagnostics::Diagnostics;
use serde_json::json;

use super::json::diagnostic_json;
use super::{Style, View};
use crate::arguments::ViewType;

/// Format version of the `validate --json` document.
pub const VALIDATE_FORMAT_VERSION: &str = "1.0";

/// What `validate` shows.
pub trait ValidateView {
    /// Shows the result and returns the exit code.
    fn results(&self, diags: Diagnostics) -> i32;

    /// Shows diagnostics that prevented validation from running.
    fn diagnostics(&self, diags: Diagnostics);
}

/// Creates the view for the requested output format.
pub fn new_validate_view(view_type: ViewType, view: &View) -> Box<dyn ValidateView> {
    match view_type {
        ViewType::Human => Box::new(HumanValidate { view: view.clone() }),
        ViewType::Json => Box::new(JsonValidate { view: view.clone() }),
    }
}

struct HumanValidate {
    view: View,
}

impl ValidateView for HumanValidate {
    fn results(&self, diags: Diagnostics) -> i32 {
        let failed = diags.has_errors();
        let warned = diags.has_warnings();
        self.view.diagnostics(diags);
        if failed {
            return 1;
        }
        let message = if warned {
            "Success! The configuration is valid, but there were some validation warnings as shown above."
        } else {
            "Success! The configuration is valid."
        };
        self.view.stdout().println(&self.view.colorize(message, Style::Green));
        0
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.view.diagnostics(diags);
    }
}

/// Writes a single JSON document rather than a message stream.
struct JsonValidate {
    view: View,
}

impl ValidateView for JsonValidate {
    fn results(&self, diags: Diagnostics) -> i32 {
        let errors = diags.errors().count();
        let warnings = diags.warnings().count();
        let doc = json!({
            "format_version": VALIDATE_FORMAT_VERSION,
            "valid": errors == 0,
            "error_count": errors,
            "warning_count": warnings,
            "diagnostics": diags.iter().map(diagnostic_json).collect::<Vec<_>>(),
        });
        let text = serde_json::to_string_pretty(&doc).unwrap_or_default();
        self.view.stdout().println(&text);
        i32::from(errors > 0)
    }

    fn diagnostics(&self, diags: Diagnostics) {
        let _ = self.results(diags);
    }
}

#[cfg(test)]
mod tests {
    use mantle_common::diagnostics::Diagnostic;

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

    #[test]
    fn human_success() {
        let (view, captured) = view();
        let code = new_validate_view(ViewType::Human, &view).results(Diagnostics::new());
        assert_eq!(code, 0);
        assert!(captured.stdout().contains("Success! The configuration is valid.\n"));
    }

    #[test]
    fn human_failure() {
        let (view, captured) = view();
        let code = new_validate_view(ViewType::Human, &view)
            .results(Diagnostics::single(Diagnostic::error("Bad", "Very bad.")));
        assert_eq!(code, 1);
        assert!(!captured.stdout().contains("Success"));
        assert!(captured.stderr().contains("Error: Bad"));
    }

    #[test]
    fn json_document() {
        let (view, captured) = view();
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::error("Bad", ""));
        diags.push(Diagnostic::simple_warning("Odd"));
        let code = new_validate_view(ViewType::Json, &view).results(diags);
        assert_eq!(code, 1);
        let doc: serde_json::Value = serde_json::from_str(&captured.stdout()).expect("json");
        assert_eq!(doc["valid"], false);
        assert_eq!(doc["error_count"], 1);
        assert_eq!(doc["warning_count"], 1);
        assert_eq!(doc["diagnostics"][0]["summary"], "Bad");
    }
}
