//! Arguments of `mantle show`.

use std::path::PathBuf;

use clap::Parser;
use mantle_common::diagnostics::Diagnostics;

use super::{ViewType, mentions_json, parse_flags};

#[derive(Debug, Parser)]
struct Flags {
    #[arg(long)]
    json: bool,
    path: Option<PathBuf>,
}

/// Parsed `show` arguments.
#[derive(Debug, Clone, Default)]
pub struct Show {
    /// State or plan file to show instead of the current state.
    pub path: Option<PathBuf>,
    /// Output format.
    pub view_type: ViewType,
}

/// Parses `show [PATH]`.
pub fn parse_show(args: &[String]) -> (Show, Diagnostics) {
    let mut diags = Diagnostics::new();
    let show = match parse_flags::<Flags>(args) {
        Ok(flags) => Show {
            path: flags.path,
            view_type: ViewType::from_flag(flags.json),
        },
        Err(diag) => {
            diags.push(diag);
            Show {
                path: None,
                view_type: ViewType::from_flag(mentions_json(args)),
            }
        }
    };
    (show, diags)
}
