//! `mantle workspace list`.

use mantle_common::diagnostics::Diagnostics;

use super::{list_workspaces, workspace_backend};
use crate::arguments;
use crate::commands::{Command, base_view, current_workspace, exit_code, unexpected_arguments};
use crate::meta::Meta;
use crate::views::workspace::{HumanWorkspace, WorkspaceView};

/// The `workspace list` command.
#[derive(Debug)]
pub struct WorkspaceListCommand {
    meta: Meta,
}

impl WorkspaceListCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for WorkspaceListCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let ws_view = HumanWorkspace::new(view.clone());
        if !args.is_empty() {
            ws_view.diagnostics(Diagnostics::single(unexpected_arguments(&args)));
            ws_view.help_prompt("workspace list");
            return 1;
        }
        let mut diags = self.meta.startup_diagnostics();
        let listed = workspace_backend(&self.meta, &view, &arguments::State::default(), &mut diags)
            .and_then(|backend| list_workspaces(backend.as_ref(), &mut diags))
            .zip(current_workspace(&self.meta, &mut diags));
        if let Some((names, current)) = listed {
            ws_view.list(&names, &current);
        }
        let code = exit_code(&diags);
        ws_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] workspace list

  List Mantle workspaces.
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "List Workspaces"
    }
}
