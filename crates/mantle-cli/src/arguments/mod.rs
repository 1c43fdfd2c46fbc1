//! Typed command-line arguments.
//!
//! Each command parser turns raw arguments into an options struct plus
//! diagnostics. Flags shared between commands live in [`view`], [`state`],
//! [`operation`] and [`vars`]. Parsers always return usable arguments, so a
//! command can still build its view when parsing failed.

pub mod apply;
pub mod import;
pub mod operation;
pub mod output;
pub mod plan;
pub mod refresh;
pub mod show;
pub mod state;
pub mod validate;
pub mod vars;
pub mod view;

use clap::Parser;
use mantle_common::diagnostics::Diagnostic;

pub use operation::{Operation, OperationFlags};
pub use output::OutputFormat;
pub use state::State;
pub use vars::{VarItem, Vars};
pub use view::ViewArgs;

/// How a command renders its output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewType {
    /// Text for people.
    #[default]
    Human,
    /// Machine-readable JSON.
    Json,
}

impl ViewType {
    /// `Json` when the `--json` flag was given.
    pub const fn from_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Human }
    }
}

/// Parses flags with clap, turning failures into a diagnostic.
///
/// # Errors
///
/// Returns a `Failed to parse command-line flags` diagnostic.
pub fn parse_flags<T: Parser>(args: &[String]) -> Result<T, Diagnostic> {
    T::try_parse_from(std::iter::once(String::from("mantle")).chain(args.iter().cloned())).map_err(|e| {
        let message = e.to_string();
        let first = message.lines().next().unwrap_or_default();
        Diagnostic::error(
            "Failed to parse command-line flags",
            first.trim_start_matches("error: ").to_string(),
        )
    })
}

/// Returns true if `--json` appears among the arguments, used to pick a
/// view for reporting parse failures.
pub fn mentions_json(args: &[String]) -> bool {
    args.iter().any(|a| a == "--json" || a == "--json=true")
}

/// Parses a duration such as `500ms`, `10s`, `2m` or `1h`. A bare number
/// means seconds.
///
/// # Errors
///
/// Returns a message for malformed input.
pub fn parse_duration(input: &str) -> Result<std::time::Duration, String> {
    let split = input.find(|c: char| !c.is_ascii_digit()).unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {input:?}"))?;
    let scale: u64 = match unit {
        "ms" => 1,
        "" | "s" => 1000,
        "m" => 60_000,
        "h" => 3_600_000,
        _ => return Err(format!("invalid duration unit in {input:?}")),
    };
    let millis = n
        .checked_mul(scale)
        .ok_or_else(|| format!("invalid duration {input:?}"))?;
    Ok(std::time::Duration::from_millis(millis))
}
