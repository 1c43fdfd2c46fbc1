//! Arguments of `mantle validate`.

use clap::Parser;
use mantle_common::diagnostics::Diagnostics;

use super::{ViewType, mentions_json, parse_flags};

#[derive(Debug, Parser)]
struct Flags {
    #[arg(long)]
    json: bool,
}

/// Parsed `validate` arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validate {
    /// Output format.
    pub view_type: ViewType,
}

/// Parses `validate` arguments.
pub fn parse_validate(args: &[String]) -> (Validate, Diagnostics) {
    let mut diags = Diagnostics::new();
    let view_type = match parse_flags::<Flags>(args) {
        Ok(flags) => ViewType::from_flag(flags.json),
        Err(diag) => {
            diags.push(diag);
            ViewType::from_flag(mentions_json(args))
        }
    };
    (Validate { view_type }, diags)
}
