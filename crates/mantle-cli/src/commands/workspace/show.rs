//! `mantle workspace show`.

use mantle_common::diagnostics::Diagnostics;

use crate::commands::{Command, base_view, current_workspace, exit_code, unexpected_arguments};
use crate::meta::Meta;
use crate::views::workspace::{HumanWorkspace, WorkspaceView};

/// The `workspace show` command.
#[derive(Debug)]
pub struct WorkspaceShowCommand {
    meta: Meta,
}

impl WorkspaceShowCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for WorkspaceShowCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let ws_view = HumanWorkspace::new(view);
        if !args.is_empty() {
            ws_view.diagnostics(Diagnostics::single(unexpected_arguments(&args)));
            ws_view.help_prompt("workspace show");
            return 1;
        }
        let mut diags = Diagnostics::new();
        if let Some(name) = current_workspace(&self.meta, &mut diags) {
            ws_view.show(&name);
        }
        let code = exit_code(&diags);
        ws_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] workspace show

  Show the name of the current workspace.
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "Show the name of the current workspace"
    }
}
