//! `mantle apply` and `mantle destroy`.

use mantle_backend::OperationKind;
use mantle_engine::PlanMode;

use super::operation::{Request, run_operation};
use super::{Command, STATE_OPTIONS_HELP, VARS_OPTIONS_HELP, VIEW_OPTIONS_HELP, base_view};
use crate::arguments::apply::parse_apply;
use crate::meta::Meta;
use crate::views::operation::new_operation_view;

/// The `apply` command, or `destroy` when `destroy` is set.
#[derive(Debug)]
pub struct ApplyCommand {
    meta: Meta,
    destroy: bool,
}

impl ApplyCommand {
    /// Creates the command.
    pub const fn new(meta: Meta, destroy: bool) -> Self {
        Self { meta, destroy }
    }

    const fn name(&self) -> &'static str {
        if self.destroy { "destroy" } else { "apply" }
    }
}

impl Command for ApplyCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let (args, mut diags) = parse_apply(args, self.destroy, self.meta.default_parallelism());
        let op_view = new_operation_view(args.view_type, &view);
        diags.append(self.meta.startup_diagnostics());
        if diags.has_errors() {
            op_view.diagnostics(diags);
            op_view.help_prompt(self.name());
            return 1;
        }

        let request = Request {
            kind: OperationKind::Apply,
            state: &args.state,
            operation: &args.operation,
            vars: &args.vars,
            auto_approve: args.auto_approve,
            plan_path: args.plan_path.clone(),
            plan_out: None,
        };
        let Some(result) = run_operation(&self.meta, &view, op_view.as_ref(), request, &mut diags) else {
            op_view.diagnostics(diags);
            return 1;
        };
        diags.append(result.diagnostics);

        if let Some(state) = result.state.as_ref().filter(|_| !diags.has_errors()) {
            let mode = result.plan.as_ref().map_or(args.operation.plan_mode, |p| p.mode);
            op_view.apply_summary(mode);
            if mode != PlanMode::Destroy {
                op_view.outputs(state);
            }
        }
        let failed = diags.has_errors();
        op_view.diagnostics(diags);
        i32::from(failed)
    }

    fn help(&self) -> String {
        if self.destroy {
            return format!(
                "\
Usage: mantle [global options] destroy [options]

  Destroy Mantle-managed infrastructure.

  This command is a convenience alias for:
      mantle apply --destroy

  This command also accepts many of the plan-customization options
  accepted by the apply command. For more information on those options,
  run:
      mantle apply --help

Options:

  --auto-approve           Skip interactive approval before destroying.

{VARS_OPTIONS_HELP}
{STATE_OPTIONS_HELP}
{VIEW_OPTIONS_HELP}"
            );
        }
        format!(
            "\
Usage: mantle [global options] apply [options] [PLAN]

  Creates or updates infrastructure according to Mantle configuration
  files in the current directory.

  By default, Mantle will generate a new plan and present it for your
  approval before taking any action. You can optionally provide a plan
  file created by a previous call to \"mantle plan\", in which case
  Mantle will take the actions described in that plan without any
  confirmation prompt.

Options:

  --auto-approve           Skip interactive approval of plan before applying.

  --parallelism=n          Limit the number of parallel resource operations.
                           Defaults to 10.

  --json                   Produce output in a machine-readable JSON format,
                           suitable for use in text editor integrations and
                           other automated systems. Always disables color.

  --destroy, --refresh-only, --refresh=false, --replace, --target,
  --target-file, --exclude, --exclude-file
                           Plan customization options, as for \"mantle plan\".

{VARS_OPTIONS_HELP}
{STATE_OPTIONS_HELP}
{VIEW_OPTIONS_HELP}"
        )
    }

    fn synopsis(&self) -> &'static str {
        if self.destroy {
            "Destroy previously-created infrastructure"
        } else {
            "Create or update infrastructure"
        }
    }
}
