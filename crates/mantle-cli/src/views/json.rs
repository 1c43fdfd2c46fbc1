//! Newline-delimited JSON output.
//!
//! Every line is one message:
//!
//! ```json
//! {"@level":"info","@message":"...","@module":"mantle.ui","@timestamp":"...","type":"..."}
//! ```
//!
//! A stream always starts with a `version` message.

use chrono::{SecondsFormat, Utc};
use mantle_common::constants::VERSION;
use mantle_common::diagnostics::{Diagnostic, Diagnostics, Severity};
use serde_json::{Map, Value, json};

use crate::streams::Output;

/// Version of the message format.
pub const JSON_UI_VERSION: &str = "1.0";

const MODULE: &str = "mantle.ui";

/// Writer of JSON log messages.
#[derive(Debug, Clone)]
pub struct JsonView {
    out: Output,
}

impl JsonView {
    /// Creates the view and writes the `version` message.
    pub fn new(out: Output) -> Self {
        let view = Self { out };
        view.log(
            "info",
            &format!("Mantle {VERSION}"),
            "version",
            json!({ "mantle": VERSION, "ui": JSON_UI_VERSION }),
        );
        view
    }

    /// Writes one message. Fields of `extra`, which must be an object, are
    /// added at the top level.
    pub fn log(&self, level: &str, message: &str, kind: &str, extra: Value) {
        let mut msg = Map::new();
        let _ = msg.insert("@level".into(), json!(level));
        let _ = msg.insert("@message".into(), json!(message));
        let _ = msg.insert("@module".into(), json!(MODULE));
        let _ = msg.insert(
            "@timestamp".into(),
            json!(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        let _ = msg.insert("type".into(), json!(kind));
        if let Value::Object(fields) = extra {
            msg.extend(fields);
        }
        self.out.println(&Value::Object(msg).to_string());
    }

    /// Writes an informational message without a type-specific payload.
    pub fn info(&self, message: &str) {
        self.log("info", message, "log", json!({}));
    }

    /// Writes one `diagnostic` message per diagnostic.
    pub fn diagnostics(&self, diags: &Diagnostics) {
        for diag in diags {
            let level = if diag.is_error() { "error" } else { "warn" };
            let message = format!("{}: {}", diag.severity, diag.summary);
            self.log(level, &message, "diagnostic", json!({ "diagnostic": diagnostic_json(diag) }));
        }
    }
}

/// The JSON form of a diagnostic, shared with `validate --json`.
pub fn diagnostic_json(diag: &Diagnostic) -> Value {
    let severity = match diag.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };
    let mut obj = json!({
        "severity": severity,
        "summary": diag.summary,
        "detail": diag.detail,
    });
    if let (Some(subject), Value::Object(map)) = (&diag.subject, &mut obj) {
        let pos = |p: &mantle_common::diagnostics::SourcePos| json!({ "line": p.line, "column": p.column, "byte": p.byte });
        let _ = map.insert(
            "range".into(),
            json!({
                "filename": subject.filename,
                "start": pos(&subject.start),
                "end": pos(&subject.end),
            }),
        );
    }
    obj
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::Streams;

    fn lines(text: &str) -> Vec<Value> {
        text.lines()
            .map(|l| serde_json::from_str(l).expect("valid json line"))
            .collect()
    }

    #[test]
    fn starts_with_version_message() {
        let (streams, captured) = Streams::for_testing("");
        let view = JsonView::new(streams.stdout);
        view.info("hello");
        let msgs = lines(&captured.stdout());
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["type"], "version");
        assert_eq!(msgs[0]["@module"], "mantle.ui");
        assert_eq!(msgs[0]["ui"], JSON_UI_VERSION);
        assert_eq!(msgs[1]["@message"], "hello");
        assert!(msgs[1]["@timestamp"].as_str().expect("timestamp").ends_with('Z'));
    }

    #[test]
    fn diagnostics_carry_level_and_payload() {
        let (streams, captured) = Streams::for_testing("");
        let view = JsonView::new(streams.stdout);
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::error("Bad", "Very bad"));
        diags.push(Diagnostic::simple_warning("Hmm"));
        view.diagnostics(&diags);
        let msgs = lines(&captured.stdout());
        assert_eq!(msgs[1]["@level"], "error");
        assert_eq!(msgs[1]["@message"], "Error: Bad");
        assert_eq!(msgs[1]["diagnostic"]["detail"], "Very bad");
        assert_eq!(msgs[2]["@level"], "warn");
        assert_eq!(msgs[2]["diagnostic"]["severity"], "warning");
    }
}
