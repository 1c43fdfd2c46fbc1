//! Ordered, append-only diagnostics.
//!
//! Commands collect warnings and errors from every phase into a single
//! [`Diagnostics`] value, check [`Diagnostics::has_errors`] before moving on,
//! and render everything together at the end.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Prevents the current phase from completing.
    Error,
    /// Informational; the command continues.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "Error"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// A position in a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePos {
    /// One-based line number.
    pub line: usize,
    /// One-based column number, counted in characters.
    pub column: usize,
    /// Zero-based byte offset.
    pub byte: usize,
}

/// A range within a named source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    /// File the range belongs to.
    pub filename: String,
    /// Inclusive start.
    pub start: SourcePos,
    /// Exclusive end.
    pub end: SourcePos,
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{},{}",
            self.filename, self.start.line, self.start.column
        )
    }
}

/// A single warning or error with an optional source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// How serious the problem is.
    pub severity: Severity,
    /// One-line summary.
    pub summary: String,
    /// Longer explanation, possibly empty.
    pub detail: String,
    /// Where in the configuration the problem was found.
    pub subject: Option<SourceRange>,
    /// Whether this diagnostic may be merged with similar ones.
    pub consolidate: bool,
}

impl Diagnostic {
    /// Creates an error diagnostic without a source location.
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Severity::Error, summary, detail)
    }

    /// Creates a warning diagnostic without a source location.
    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Severity::Warning, summary, detail)
    }

    /// Creates a warning that only has a summary.
    pub fn simple_warning(summary: impl Into<String>) -> Self {
        Self::new(Severity::Warning, summary, "")
    }

    fn new(severity: Severity, summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: detail.into(),
            subject: None,
            consolidate: true,
        }
    }

    /// Attaches a source location.
    #[must_use]
    pub fn with_subject(mut self, subject: SourceRange) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Attaches a source location if one is given.
    #[must_use]
    pub fn with_optional_subject(mut self, subject: Option<SourceRange>) -> Self {
        self.subject = subject;
        self
    }

    /// Marks the diagnostic as never to be consolidated.
    #[must_use]
    pub const fn no_consolidate(mut self) -> Self {
        self.consolidate = false;
        self
    }

    /// Returns true for error diagnostics.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.summary)?;
        if !self.detail.is_empty() {
            write!(f, "; {}", self.detail)?;
        }
        Ok(())
    }
}

/// Ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Creates an empty collection.
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends one diagnostic.
    pub fn push(&mut self, diag: impl Into<Diagnostic>) {
        self.0.push(diag.into());
    }

    /// Appends every diagnostic of `other`, preserving order.
    pub fn append(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Returns a collection holding a single diagnostic.
    pub fn single(diag: impl Into<Diagnostic>) -> Self {
        Self(vec![diag.into()])
    }

    /// Returns true if any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    /// Returns true if any diagnostic is a warning.
    pub fn has_warnings(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Warning)
    }

    /// Iterates over error diagnostics.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.is_error())
    }

    /// Iterates over warning diagnostics.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// Iterates over all diagnostics in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// Number of diagnostics.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when there are no diagnostics.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Joins error summaries into one line, for log fields.
    pub fn err_summary(&self) -> String {
        self.errors()
            .map(|d| d.summary.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Sorts in place: warnings before errors, sourceless before sourced,
    /// then by filename and start byte. The sort is stable.
    pub fn sort(&mut self) {
        self.0.sort_by(|a, b| {
            let sev = |d: &Diagnostic| u8::from(d.severity == Severity::Error);
            sev(a)
                .cmp(&sev(b))
                .then_with(|| match (&a.subject, &b.subject) {
                    (None, None) => std::cmp::Ordering::Equal,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (Some(x), Some(y)) => x
                        .filename
                        .cmp(&y.filename)
                        .then(x.start.byte.cmp(&y.start.byte)),
                })
        });
    }

    /// Merges repeated diagnostics of `level` that share a summary.
    ///
    /// Only diagnostics with a subject take part. The `threshold`-th
    /// occurrence of a summary absorbs every later one and gains a note
    /// counting them.
    #[must_use]
    pub fn consolidate(&self, threshold: usize, level: Severity) -> Self {
        let mut out: Vec<Diagnostic> = Vec::with_capacity(self.0.len());
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut groups: HashMap<&str, (usize, usize)> = HashMap::new();

        for diag in &self.0 {
            if diag.severity != level || diag.subject.is_none() || !diag.consolidate {
                out.push(diag.clone());
                continue;
            }
            let summary = diag.summary.as_str();
            if let Some(group) = groups.get_mut(summary) {
                group.1 += 1;
                continue;
            }
            let count = seen.entry(summary).or_insert(0);
            *count += 1;
            if *count == threshold {
                let _ = groups.insert(summary, (out.len(), 0));
            }
            out.push(diag.clone());
        }

        let noun = match level {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        for (index, absorbed) in groups.into_values() {
            if absorbed == 0 {
                continue;
            }
            let plural = if absorbed == 1 { "" } else { "s" };
            let note = format!("(and {absorbed} more similar {noun}{plural} elsewhere)");
            let target = &mut out[index];
            if target.detail.is_empty() {
                target.detail = note;
            } else {
                target.detail = format!("{}\n\n{note}", target.detail);
            }
        }

        Self(out)
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(file: &str, byte: usize) -> SourceRange {
        SourceRange {
            filename: file.into(),
            start: SourcePos {
                line: 1,
                column: 1,
                byte,
            },
            end: SourcePos {
                line: 1,
                column: 1,
                byte,
            },
        }
    }

    #[test]
    fn has_errors_ignores_warnings() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::simple_warning("careful"));
        assert!(!diags.has_errors());
        diags.push(Diagnostic::error("broken", ""));
        assert!(diags.has_errors());
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn append_preserves_order() {
        let mut a = Diagnostics::single(Diagnostic::simple_warning("one"));
        let b: Diagnostics = vec![
            Diagnostic::error("two", ""),
            Diagnostic::simple_warning("three"),
        ]
        .into_iter()
        .collect();
        a.append(b);
        let summaries: Vec<_> = a.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(summaries, vec!["one", "two", "three"]);
    }

    #[test]
    fn sort_puts_warnings_first_then_sourceless() {
        let mut diags: Diagnostics = vec![
            Diagnostic::error("e-sourced", "").with_subject(range("b.mtl", 4)),
            Diagnostic::error("e-plain", ""),
            Diagnostic::warning("w-sourced", "").with_subject(range("a.mtl", 9)),
            Diagnostic::warning("w-early", "").with_subject(range("a.mtl", 2)),
            Diagnostic::simple_warning("w-plain"),
        ]
        .into_iter()
        .collect();
        diags.sort();
        let summaries: Vec<_> = diags.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec!["w-plain", "w-early", "w-sourced", "e-plain", "e-sourced"]
        );
    }

    #[test]
    fn consolidate_groups_from_threshold() {
        let mut diags = Diagnostics::new();
        for i in 0..4 {
            diags.push(
                Diagnostic::warning("Warning 1", format!("subject {i}"))
                    .with_subject(range("foo.mtl", 0)),
            );
            diags.push(
                Diagnostic::error("Error 1", format!("subject {i}"))
                    .with_subject(range("foo.mtl", 0)),
            );
            diags.push(Diagnostic::warning("Warning 2", format!("sourceless {i}")));
        }
        diags.push(
            Diagnostic::warning("Warning 4", "only one").with_subject(range("foo.mtl", 0)),
        );

        let got = diags.consolidate(2, Severity::Warning);

        let w1: Vec<_> = got.iter().filter(|d| d.summary == "Warning 1").collect();
        assert_eq!(w1.len(), 2);
        assert_eq!(w1[0].detail, "subject 0");
        assert_eq!(
            w1[1].detail,
            "subject 1\n\n(and 2 more similar warnings elsewhere)"
        );
        assert_eq!(got.iter().filter(|d| d.summary == "Error 1").count(), 4);
        assert_eq!(got.iter().filter(|d| d.summary == "Warning 2").count(), 4);
        let w4 = got.iter().find(|d| d.summary == "Warning 4").expect("w4");
        assert_eq!(w4.detail, "only one");
    }

    #[test]
    fn consolidate_respects_opt_out() {
        let mut diags = Diagnostics::new();
        for i in 0..3 {
            diags.push(
                Diagnostic::warning("do not consolidate", format!("warning {i}"))
                    .with_subject(range("bar.mtl", 0))
                    .no_consolidate(),
            );
        }
        let got = diags.consolidate(1, Severity::Warning);
        assert_eq!(got, diags);
    }

    #[test]
    fn consolidate_singular_note() {
        let mut diags = Diagnostics::new();
        for _ in 0..2 {
            diags.push(Diagnostic::error("Dup", "").with_subject(range("x.mtl", 0)));
        }
        let got = diags.consolidate(1, Severity::Error);
        assert_eq!(got.len(), 1);
        assert_eq!(
            got.iter().next().map(|d| d.detail.as_str()),
            Some("(and 1 more similar error elsewhere)")
        );
    }
}
