//! Rendering command results for people or machines.
//!
//! [`View`] holds the display settings shared by every command and renders
//! diagnostics. [`json::JsonView`] writes newline-delimited JSON messages.
//! Each command has its own view trait with human and, where the command
//! takes `--json`, JSON implementations.

pub mod console;
pub mod import;
pub mod init;
pub mod json;
pub mod operation;
pub mod output;
pub mod render;
pub mod show;
pub mod state;
pub mod validate;
pub mod workspace;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, PoisonError, RwLock};

use mantle_common::constants::BIN_NAME;
use mantle_common::diagnostics::{Diagnostic, Diagnostics, Severity};

use crate::arguments::ViewArgs;
use crate::streams::{Output, Streams};

/// Text styles used in human output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// Bold.
    Bold,
    /// Bold red, for errors and destruction.
    Red,
    /// Bold yellow, for warnings and updates.
    Yellow,
    /// Bold green, for success and creation.
    Green,
}

impl Style {
    const fn code(self) -> &'static str {
        match self {
            Self::Bold => "\x1b[1m",
            Self::Red => "\x1b[1;31m",
            Self::Yellow => "\x1b[1;33m",
            Self::Green => "\x1b[1;32m",
        }
    }
}

/// Display settings and diagnostic rendering shared by every command.
#[derive(Debug, Clone)]
pub struct View {
    streams: Streams,
    color: bool,
    compact_warnings: bool,
    consolidate_warnings: bool,
    consolidate_errors: bool,
    concise: bool,
    in_automation: bool,
    show_sensitive: bool,
    sources: Arc<RwLock<BTreeMap<String, String>>>,
}

impl View {
    /// Creates a view. Color is off if `--no-color` was given or the CLI
    /// configuration disables it.
    pub fn new(streams: Streams, args: ViewArgs, config_no_color: bool, in_automation: bool) -> Self {
        Self {
            streams,
            color: !(args.no_color || config_no_color),
            compact_warnings: args.compact_warnings,
            consolidate_warnings: args.consolidate_warnings,
            consolidate_errors: args.consolidate_errors,
            concise: args.concise,
            in_automation,
            show_sensitive: false,
            sources: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Uses configuration sources for snippets in diagnostics. Clones of
    /// this view see the same sources.
    pub fn set_sources(&self, sources: BTreeMap<String, String>) {
        *self.sources.write().unwrap_or_else(PoisonError::into_inner) = sources;
    }

    /// Shows sensitive values in clear text.
    pub const fn set_show_sensitive(&mut self, show: bool) {
        self.show_sensitive = show;
    }

    /// The streams.
    pub const fn streams(&self) -> &Streams {
        &self.streams
    }

    /// Standard output.
    pub const fn stdout(&self) -> &Output {
        &self.streams.stdout
    }

    /// Standard error.
    pub const fn stderr(&self) -> &Output {
        &self.streams.stderr
    }

    /// Whether progress messages are suppressed.
    pub const fn concise(&self) -> bool {
        self.concise
    }

    /// Whether Mantle runs under automation.
    pub const fn in_automation(&self) -> bool {
        self.in_automation
    }

    /// Whether sensitive values are shown.
    pub const fn show_sensitive(&self) -> bool {
        self.show_sensitive
    }

    /// Whether color is enabled.
    pub const fn color(&self) -> bool {
        self.color
    }

    /// Wraps text in a style when color is enabled.
    pub fn colorize(&self, text: &str, style: Style) -> String {
        if self.color {
            format!("{}{text}\x1b[0m", style.code())
        } else {
            text.to_string()
        }
    }

    /// Prints diagnostics: errors to stderr, warnings to stdout.
    pub fn diagnostics(&self, mut diags: Diagnostics) {
        if diags.is_empty() {
            return;
        }
        diags.sort();
        if self.consolidate_warnings {
            diags = diags.consolidate(1, Severity::Warning);
        }
        if self.consolidate_errors {
            diags = diags.consolidate(1, Severity::Error);
        }
        if self.compact_warnings && !diags.has_errors() {
            self.stdout().print(&self.compact(&diags));
            return;
        }
        for diag in &diags {
            let text = self.format_diagnostic(diag);
            if diag.is_error() {
                self.stderr().print(&text);
            } else {
                self.stdout().print(&text);
            }
        }
    }

    fn compact(&self, diags: &Diagnostics) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\n{}\n", self.colorize("Warnings:", Style::Yellow));
        for diag in diags {
            let _ = writeln!(out, "- {}", diag.summary);
            if let Some(subject) = &diag.subject {
                let _ = writeln!(out, "  on {} line {}", subject.filename, subject.start.line);
            }
        }
        let _ = writeln!(
            out,
            "\nTo see the full warning notes, run {BIN_NAME} without --compact-warnings."
        );
        out
    }

    /// Formats one diagnostic in a box, with a source snippet when the
    /// subject's file is known.
    pub fn format_diagnostic(&self, diag: &Diagnostic) -> String {
        let (label, style) = match diag.severity {
            Severity::Error => ("Error: ", Style::Red),
            Severity::Warning => ("Warning: ", Style::Yellow),
        };
        let mut body = format!(
            "{}{}\n",
            self.colorize(label, style),
            self.colorize(&diag.summary, Style::Bold)
        );
        if let Some(subject) = &diag.subject {
            let _ = writeln!(body, "\n  on {} line {}:", subject.filename, subject.start.line);
            let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
            let line = sources
                .get(&subject.filename)
                .and_then(|src| src.lines().nth(subject.start.line.saturating_sub(1)));
            if let Some(line) = line {
                let _ = writeln!(body, "{:>4}: {line}", subject.start.line);
            }
        }
        if !diag.detail.is_empty() {
            let _ = writeln!(body, "\n{}", diag.detail);
        }

        let mut out = String::from("\n╷\n");
        for line in body.lines() {
            if line.is_empty() {
                out.push_str("│\n");
            } else {
                let _ = writeln!(out, "│ {line}");
            }
        }
        out.push_str("╵\n");
        out
    }

    /// Suggests the command's help after an argument error.
    pub fn help_prompt(&self, command: &str) {
        self.stderr()
            .print(&format!("\nFor more help on using this command, run:\n  {BIN_NAME} {command} --help\n"));
    }
}

#[cfg(test)]
mod tests {
    use mantle_common::diagnostics::{SourcePos, SourceRange};

    use super::*;

    fn view(args: ViewArgs) -> (View, crate::streams::Captured) {
        let (streams, captured) = Streams::for_testing("");
        (View::new(streams, args, false, false), captured)
    }

    fn no_color() -> ViewArgs {
        ViewArgs {
            no_color: true,
            ..ViewArgs::default()
        }
    }

    fn subject(line: usize) -> SourceRange {
        SourceRange {
            filename: "main.mtl".into(),
            start: SourcePos {
                line,
                column: 1,
                byte: line * 10,
            },
            end: SourcePos {
                line,
                column: 5,
                byte: line * 10 + 4,
            },
        }
    }

    #[test]
    fn errors_go_to_stderr_and_warnings_to_stdout() {
        let (view, captured) = view(no_color());
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::error("Broken", "It broke."));
        diags.push(Diagnostic::simple_warning("Careful"));
        view.diagnostics(diags);
        assert!(captured.stderr().contains("│ Error: Broken"));
        assert!(captured.stderr().contains("│ It broke."));
        assert!(captured.stdout().contains("│ Warning: Careful"));
        assert!(!captured.stdout().contains("Broken"));
    }

    #[test]
    fn snippet_from_sources() {
        let (view, captured) = view(no_color());
        view.set_sources(BTreeMap::from([(
            "main.mtl".to_string(),
            "resource \"a\" \"b\" {\n  bad = 1\n}\n".to_string(),
        )]));
        view.diagnostics(Diagnostics::single(
            Diagnostic::error("Unsupported argument", "").with_subject(subject(2)),
        ));
        let err = captured.stderr();
        assert!(err.contains("on main.mtl line 2:"), "{err}");
        assert!(err.contains("   2:   bad = 1"), "{err}");
    }

    #[test]
    fn compact_warnings_summarise() {
        let (view, captured) = view(ViewArgs {
            compact_warnings: true,
            ..no_color()
        });
        view.diagnostics(Diagnostics::single(
            Diagnostic::warning("Deprecated", "Long story.").with_subject(subject(3)),
        ));
        let out = captured.stdout();
        assert!(out.contains("Warnings:"));
        assert!(out.contains("- Deprecated\n  on main.mtl line 3"));
        assert!(!out.contains("Long story."));
    }

    #[test]
    fn warnings_consolidated_by_default() {
        let (view, captured) = view(no_color());
        let diags: Diagnostics = (1..=3)
            .map(|l| Diagnostic::warning("Same", "Detail").with_subject(subject(l)))
            .collect();
        view.diagnostics(diags);
        let out = captured.stdout();
        assert_eq!(out.matches("Warning: Same").count(), 1);
        assert!(out.contains("(and 2 more similar warnings elsewhere)"));
    }

    #[test]
    fn color_wraps_labels() {
        let (view, captured) = view(ViewArgs::default());
        view.diagnostics(Diagnostics::single(Diagnostic::error("Broken", "")));
        assert!(captured.stderr().contains("\x1b[1;31mError: \x1b[0m"));
    }
}
