//! Arguments of `mantle apply` and `mantle destroy`.

use std::path::PathBuf;

use clap::Parser;
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_engine::PlanMode;

use super::vars::extract_vars;
use super::{Operation, OperationFlags, State, Vars, ViewType, mentions_json, parse_flags};

#[derive(Debug, Parser)]
struct Flags {
    #[command(flatten)]
    state: State,
    #[command(flatten)]
    operation: OperationFlags,
    #[arg(long = "auto-approve")]
    auto_approve: bool,
    #[arg(long)]
    json: bool,
    plan: Option<PathBuf>,
}

/// Parsed `apply` arguments.
#[derive(Debug, Clone, Default)]
pub struct Apply {
    /// State flags.
    pub state: State,
    /// Operation options.
    pub operation: Operation,
    /// Variables.
    pub vars: Vars,
    /// Skip interactive approval.
    pub auto_approve: bool,
    /// Saved plan to apply.
    pub plan_path: Option<PathBuf>,
    /// Output format.
    pub view_type: ViewType,
}

/// Parses `apply` arguments; `destroy` is set for `mantle destroy`.
pub fn parse_apply(args: Vec<String>, destroy: bool, default_parallelism: usize) -> (Apply, Diagnostics) {
    let (vars, args, mut diags) = extract_vars(args);
    let mut apply = Apply {
        vars,
        view_type: ViewType::from_flag(mentions_json(&args)),
        ..Apply::default()
    };
    let flags = match parse_flags::<Flags>(&args) {
        Ok(flags) => flags,
        Err(diag) => {
            diags.push(diag);
            return (apply, diags);
        }
    };
    let (mut operation, op_diags) = flags.operation.parse(default_parallelism);
    diags.append(op_diags);
    if destroy {
        if operation.plan_mode == PlanMode::RefreshOnly {
            diags.push(Diagnostic::error(
                "Incompatible plan mode options",
                "The destroy command cannot be used with --refresh-only.",
            ));
        }
        operation.plan_mode = PlanMode::Destroy;
        if flags.plan.is_some() {
            diags.push(Diagnostic::error(
                "Plan file not allowed",
                "The destroy command does not accept a saved plan file. To apply a saved destroy plan, use \"mantle apply PLAN\".",
            ));
        }
    }
    if flags.plan.is_some() && !apply.vars.is_empty() {
        diags.push(Diagnostic::error(
            "Can't set variables when applying a saved plan",
            "The --var and --var-file options cannot be used when applying a saved plan file, because a saved plan includes the variable values that were set when it was created.",
        ));
    }
    if flags.json && !flags.auto_approve && flags.plan.is_none() {
        diags.push(Diagnostic::error(
            "Plan file or auto-approve required",
            "Mantle cannot ask for interactive approval when --json is set. You can either apply a saved plan file, or enable the --auto-approve option.",
        ));
    }
    apply.state = flags.state;
    apply.operation = operation;
    apply.auto_approve = flags.auto_approve;
    apply.plan_path = flags.plan;
    apply.view_type = ViewType::from_flag(flags.json);
    (apply, diags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn first_error(diags: &Diagnostics) -> String {
        diags.errors().next().expect("error").summary.clone()
    }

    #[test]
    fn plan_path_and_auto_approve() {
        let (apply, diags) = parse_apply(args(&["--auto-approve", "tfplan"]), false, 10);
        assert!(diags.is_empty());
        assert!(apply.auto_approve);
        assert_eq!(apply.plan_path, Some(PathBuf::from("tfplan")));
    }

    #[test]
    fn json_requires_approval_source() {
        let (_, diags) = parse_apply(args(&["--json"]), false, 10);
        assert_eq!(first_error(&diags), "Plan file or auto-approve required");
        let (_, diags) = parse_apply(args(&["--json", "--auto-approve"]), false, 10);
        assert!(diags.is_empty());
    }

    #[test]
    fn destroy_sets_mode_and_rejects_plan_file() {
        let (apply, diags) = parse_apply(args(&[]), true, 10);
        assert!(diags.is_empty());
        assert_eq!(apply.operation.plan_mode, PlanMode::Destroy);
        let (_, diags) = parse_apply(args(&["tfplan"]), true, 10);
        assert_eq!(first_error(&diags), "Plan file not allowed");
    }

    #[test]
    fn vars_with_saved_plan_rejected() {
        let (_, diags) = parse_apply(args(&["--var=a=1", "tfplan"]), false, 10);
        assert_eq!(first_error(&diags), "Can't set variables when applying a saved plan");
    }
}
