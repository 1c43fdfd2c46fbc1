//! `mantle plan` — show the changes an apply would make.

use mantle_backend::OperationKind;

use super::operation::{Request, run_operation};
use super::{Command, STATE_OPTIONS_HELP, VARS_OPTIONS_HELP, VIEW_OPTIONS_HELP, base_view};
use crate::arguments::plan::parse_plan;
use crate::meta::Meta;
use crate::views::operation::new_operation_view;

/// Exit code of `--detailed-exitcode` when the plan has changes.
pub const EXIT_PLAN_HAS_CHANGES: i32 = 2;

/// The `plan` command.
#[derive(Debug)]
pub struct PlanCommand {
    meta: Meta,
}

impl PlanCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for PlanCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let (args, mut diags) = parse_plan(args, self.meta.default_parallelism());
        let op_view = new_operation_view(args.view_type, &view);
        diags.append(self.meta.startup_diagnostics());
        if diags.has_errors() {
            op_view.diagnostics(diags);
            op_view.help_prompt("plan");
            return 1;
        }

        let request = Request {
            kind: OperationKind::Plan,
            state: &args.state,
            operation: &args.operation,
            vars: &args.vars,
            auto_approve: false,
            plan_path: None,
            plan_out: args.out.clone(),
        };
        let Some(result) = run_operation(&self.meta, &view, op_view.as_ref(), request, &mut diags) else {
            op_view.diagnostics(diags);
            return 1;
        };
        diags.append(result.diagnostics);
        if let Some(plan) = &result.plan {
            if !diags.has_errors() {
                op_view.plan_next_step(plan, args.out.as_deref());
            }
        }
        let failed = diags.has_errors();
        op_view.diagnostics(diags);
        if failed {
            1
        } else if args.detailed_exitcode && !result.plan_empty {
            EXIT_PLAN_HAS_CHANGES
        } else {
            0
        }
    }

    fn help(&self) -> String {
        format!(
            "\
Usage: mantle [global options] plan [options]

  Generates a speculative execution plan, showing what actions Mantle
  would take to apply the current configuration. This command will not
  actually perform the planned actions.

  You can optionally save the plan to a file, which you can then pass to
  the \"apply\" command to perform exactly the actions described in the plan.

Plan Customization Options:

  --destroy                Select the \"destroy\" planning mode, which creates a
                           plan to destroy all objects currently managed by
                           this configuration.

  --refresh-only           Select the \"refresh only\" planning mode, which
                           checks whether remote objects still match the
                           outcome of the most recent apply but does not
                           propose any actions to undo changes.

  --refresh=false          Skip checking for changes to remote objects while
                           creating the plan.

  --replace=resource       Force replacement of a particular resource.

  --target=resource        Limit the planning operation to only the given
                           resource and its dependencies.

  --target-file=path       Read targets from a file, one per line.

  --exclude=resource       Exclude the given resource and its dependents.

  --exclude-file=path      Read excludes from a file, one per line.

{VARS_OPTIONS_HELP}
Other Options:

  --detailed-exitcode      Return detailed exit codes: 0 for an empty plan,
                           1 for errors, 2 when the plan has changes.

  --out=path               Write the plan to the given path.

  --parallelism=n          Limit the number of concurrent operations.

  --json                   Produce output in a machine-readable JSON format.

{STATE_OPTIONS_HELP}
{VIEW_OPTIONS_HELP}"
        )
    }

    fn synopsis(&self) -> &'static str {
        "Show changes required by the current configuration"
    }
}
