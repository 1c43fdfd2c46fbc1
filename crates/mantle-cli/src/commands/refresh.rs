//! `mantle refresh` — update state to match remote objects.

use mantle_backend::OperationKind;

use super::operation::{Request, run_operation};
use super::{Command, STATE_OPTIONS_HELP, VARS_OPTIONS_HELP, VIEW_OPTIONS_HELP, base_view};
use crate::arguments::refresh::parse_refresh;
use crate::meta::Meta;
use crate::views::operation::new_operation_view;

/// The `refresh` command.
#[derive(Debug)]
pub struct RefreshCommand {
    meta: Meta,
}

impl RefreshCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for RefreshCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let (args, mut diags) = parse_refresh(args, self.meta.default_parallelism());
        let op_view = new_operation_view(args.view_type, &view);
        diags.append(self.meta.startup_diagnostics());
        if diags.has_errors() {
            op_view.diagnostics(diags);
            op_view.help_prompt("refresh");
            return 1;
        }

        let request = Request {
            kind: OperationKind::Refresh,
            state: &args.state,
            operation: &args.operation,
            vars: &args.vars,
            auto_approve: true,
            plan_path: None,
            plan_out: None,
        };
        let Some(result) = run_operation(&self.meta, &view, op_view.as_ref(), request, &mut diags) else {
            op_view.diagnostics(diags);
            return 1;
        };
        diags.append(result.diagnostics);
        if let Some(state) = &result.state {
            if !diags.has_errors() {
                op_view.outputs(state);
            }
        }
        let failed = diags.has_errors();
        op_view.diagnostics(diags);
        i32::from(failed)
    }

    fn help(&self) -> String {
        format!(
            "\
Usage: mantle [global options] refresh [options]

  Update the state file of your infrastructure with metadata that matches
  the physical resources they are tracking.

  This will not modify your infrastructure, but it can modify your
  state file to update metadata. This metadata might cause new changes
  to occur when you generate a plan or call apply next.

Options:

  --target=resource        Resource to target. Operation will be limited to
                           this resource and its dependencies.

  --exclude=resource       Resource to exclude.

  --parallelism=n          Limit the number of concurrent operations.

  --json                   Produce output in a machine-readable JSON format.

{VARS_OPTIONS_HELP}
{STATE_OPTIONS_HELP}
{VIEW_OPTIONS_HELP}"
        )
    }

    fn synopsis(&self) -> &'static str {
        "Update the state to match remote systems"
    }
}
