//! Arguments of `mantle output`.

use std::path::PathBuf;

use clap::Parser;
use mantle_common::diagnostics::{Diagnostic, Diagnostics};

use super::{ViewType, parse_flags};

#[derive(Debug, Parser)]
struct Flags {
    #[arg(long)]
    json: bool,
    #[arg(long)]
    raw: bool,
    #[arg(long = "state")]
    state_path: Option<PathBuf>,
    name: Option<String>,
}

/// How output values are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Configuration-literal syntax.
    #[default]
    Human,
    /// JSON.
    Json,
    /// A single primitive value without quoting.
    Raw,
}

/// Parsed `output` arguments.
#[derive(Debug, Clone, Default)]
pub struct Output {
    /// Single output to show.
    pub name: Option<String>,
    /// Output format.
    pub format: OutputFormat,
    /// Legacy state file to read.
    pub state_path: Option<PathBuf>,
}

impl Output {
    /// View type for diagnostics.
    pub fn view_type(&self) -> ViewType {
        ViewType::from_flag(self.format == OutputFormat::Json)
    }
}

/// Parses `output [NAME]`.
pub fn parse_output(args: &[String]) -> (Output, Diagnostics) {
    let mut diags = Diagnostics::new();
    let flags = match parse_flags::<Flags>(args) {
        Ok(flags) => flags,
        Err(diag) => {
            diags.push(diag);
            return (Output::default(), diags);
        }
    };
    let format = match (flags.json, flags.raw) {
        (true, true) => {
            diags.push(Diagnostic::error(
                "Invalid output format",
                "The --raw and --json options are mutually-exclusive.",
            ));
            OutputFormat::Human
        }
        (true, false) => OutputFormat::Json,
        (false, true) => OutputFormat::Raw,
        (false, false) => OutputFormat::Human,
    };
    if format == OutputFormat::Raw && flags.name.is_none() {
        diags.push(Diagnostic::error(
            "Output name required",
            "You must give the name of a single output value when using the --raw option.",
        ));
    }
    (
        Output {
            name: flags.name,
            format,
            state_path: flags.state_path,
        },
        diags,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn raw_needs_a_name() {
        let (_, diags) = parse_output(&args(&["--raw"]));
        assert_eq!(diags.errors().next().expect("error").summary, "Output name required");
        let (out, diags) = parse_output(&args(&["--raw", "id"]));
        assert!(diags.is_empty());
        assert_eq!(out.format, OutputFormat::Raw);
        assert_eq!(out.name.as_deref(), Some("id"));
    }

    #[test]
    fn json_and_raw_conflict() {
        let (_, diags) = parse_output(&args(&["--raw", "--json", "id"]));
        assert_eq!(diags.errors().next().expect("error").summary, "Invalid output format");
    }
}
