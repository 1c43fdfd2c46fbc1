//! Arguments of `mantle plan`.

use std::path::PathBuf;

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
    out: Option<PathBuf>,
    #[arg(long = "detailed-exitcode")]
    detailed_exitcode: bool,
    #[arg(long)]
    json: bool,
}

/// Parsed `plan` arguments.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// State flags.
    pub state: State,
    /// Operation options.
    pub operation: Operation,
    /// Variables.
    pub vars: Vars,
    /// Where to save the plan.
    pub out: Option<PathBuf>,
    /// Exit with 2 when there are changes.
    pub detailed_exitcode: bool,
    /// Output format.
    pub view_type: ViewType,
}

/// Parses `plan` arguments.
pub fn parse_plan(args: Vec<String>, default_parallelism: usize) -> (Plan, Diagnostics) {
    let (vars, args, mut diags) = extract_vars(args);
    let mut plan = Plan {
        vars,
        view_type: ViewType::from_flag(mentions_json(&args)),
        ..Plan::default()
    };
    let flags = match parse_flags::<Flags>(&args) {
        Ok(flags) => flags,
        Err(diag) => {
            diags.push(diag);
            return (plan, diags);
        }
    };
    let (operation, op_diags) = flags.operation.parse(default_parallelism);
    diags.append(op_diags);
    plan.state = flags.state;
    plan.operation = operation;
    plan.out = flags.out;
    plan.detailed_exitcode = flags.detailed_exitcode;
    plan.view_type = ViewType::from_flag(flags.json);
    (plan, diags)
}

#[cfg(test)]
mod tests {
    use mantle_engine::PlanMode;

    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parses_all_flags() {
        let (plan, diags) = parse_plan(
            args(&["--out=tfplan", "--detailed-exitcode", "--destroy", "--var", "a=1", "--json", "--lock=false"]),
            10,
        );
        assert!(diags.is_empty(), "{}", diags.err_summary());
        assert_eq!(plan.out, Some(PathBuf::from("tfplan")));
        assert!(plan.detailed_exitcode);
        assert_eq!(plan.operation.plan_mode, PlanMode::Destroy);
        assert_eq!(plan.vars.items.len(), 1);
        assert_eq!(plan.view_type, ViewType::Json);
        assert!(!plan.state.lock);
    }

    #[test]
    fn unknown_flag_keeps_json_view() {
        let (plan, diags) = parse_plan(args(&["--json", "--bogus"]), 10);
        assert_eq!(diags.errors().next().expect("error").summary, "Failed to parse command-line flags");
        assert_eq!(plan.view_type, ViewType::Json);
    }

    #[test]
    fn positional_arguments_rejected() {
        let (_, diags) = parse_plan(args(&["somedir"]), 10);
        assert!(diags.has_errors());
    }
}
