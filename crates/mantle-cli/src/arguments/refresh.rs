//! Arguments of `mantle refresh`.

use clap::Parser;
use mantle_common::diagnostics::Diagnostics;

use super::vars::extract_vars;
use super::{Operation, OperationFlags, State, Vars, ViewType, mentions_json, parse_flags};

#[derive(Debug, Parser)]
struct Flags {
    #[command(flatten)]
    state: State,
    #[command(flatten)]
    operation: OperationFlags,
    #[arg(long)]
    json: bool,
}

/// Parsed `refresh` arguments.
#[derive(Debug, Clone, Default)]
pub struct Refresh {
    /// State flags.
    pub state: State,
    /// Operation options; the plan mode is ignored.
    pub operation: Operation,
    /// Variables.
    pub vars: Vars,
    /// Output format.
    pub view_type: ViewType,
}

/// Parses `refresh` arguments.
pub fn parse_refresh(args: Vec<String>, default_parallelism: usize) -> (Refresh, Diagnostics) {
    let (vars, args, mut diags) = extract_vars(args);
    let mut refresh = Refresh {
        vars,
        view_type: ViewType::from_flag(mentions_json(&args)),
        ..Refresh::default()
    };
    match parse_flags::<Flags>(&args) {
        Ok(flags) => {
            let (operation, op_diags) = flags.operation.parse(default_parallelism);
            diags.append(op_diags);
            refresh.state = flags.state;
            refresh.operation = operation;
            refresh.view_type = ViewType::from_flag(flags.json);
        }
        Err(diag) => diags.push(diag),
    }
    (refresh, diags)
}
