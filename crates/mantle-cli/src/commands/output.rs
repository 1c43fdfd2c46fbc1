//! `mantle output` — read root output values from the state.

use super::{Command, LockedState, base_view, current_workspace, exit_code, load_backend};
use crate::arguments::{self, output::parse_output};
use crate::meta::Meta;
use crate::views::output::new_output_view;

/// The `output` command.
#[derive(Debug)]
pub struct OutputCommand {
    meta: Meta,
}

impl OutputCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for OutputCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let (args, mut diags) = parse_output(&args);
        let output_view = new_output_view(args.format, &view);
        if diags.has_errors() {
            output_view.diagnostics(diags);
            view.help_prompt("output");
            return 1;
        }
        diags.append(self.meta.startup_diagnostics());

        let state_args = arguments::State {
            lock: false,
            state_path: args.state_path.clone(),
            ..arguments::State::default()
        };
        let Some((_, backend)) = load_backend(&self.meta, &view, &state_args, false, &mut diags) else {
            output_view.diagnostics(diags);
            return 1;
        };
        let Some(workspace) = current_workspace(&self.meta, &mut diags) else {
            output_view.diagnostics(diags);
            return 1;
        };
        let Some(locked) = LockedState::open(
            &self.meta,
            backend.as_ref(),
            &state_args,
            &workspace,
            "OperationTypeOutput",
            &mut diags,
        ) else {
            output_view.diagnostics(diags);
            return 1;
        };
        let outputs = locked.state().map(|s| s.outputs.clone()).unwrap_or_default();
        locked.close(&mut diags);
        diags.append(output_view.output(args.name.as_deref(), &outputs));
        let code = exit_code(&diags);
        output_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] output [options] [NAME]

  Reads an output variable from a Mantle state file and prints
  the value. With no additional arguments, output will display all
  the outputs for the root module. If NAME is not specified, all
  outputs are printed.

Options:

  --state=path      Path to the state file to read. Defaults to
                    \"mantle.state\".

  --no-color        If specified, output won't contain any color.

  --json            If specified, machine readable output will be
                    printed in JSON format.

  --raw             For value types that can be automatically
                    converted to a string, will print the raw
                    string directly, rather than a human-oriented
                    representation of the value.
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "Show output values from your root module"
    }
}
