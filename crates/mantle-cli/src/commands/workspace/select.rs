//! `mantle workspace select`.

use clap::Parser;
use mantle_common::diagnostics::{Diagnostic, Diagnostics};

use super::{check_name, env_override_error, list_workspaces, workspace_backend};
use crate::arguments::{self, parse_flags};
use crate::commands::{Command, base_view, exit_code};
use crate::meta::Meta;
use crate::views::workspace::{HumanWorkspace, WorkspaceView};

#[derive(Debug, Parser)]
struct Flags {
    /// Create the workspace if it does not exist.
    #[arg(long = "or-create")]
    or_create: bool,
    name: String,
}

/// The `workspace select` command.
#[derive(Debug)]
pub struct WorkspaceSelectCommand {
    meta: Meta,
}

impl WorkspaceSelectCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for WorkspaceSelectCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let ws_view = HumanWorkspace::new(view.clone());
        let flags = match parse_flags::<Flags>(&args).and_then(|f| check_name(&f.name).map(|()| f)) {
            Ok(flags) => flags,
            Err(diag) => {
                ws_view.diagnostics(Diagnostics::single(diag));
                ws_view.help_prompt("workspace select");
                return 1;
            }
        };
        let mut diags = self.meta.startup_diagnostics();
        if self.meta.workspace_overridden() {
            diags.push(env_override_error());
            ws_view.diagnostics(diags);
            return 1;
        }
        let Some(backend) = workspace_backend(&self.meta, &view, &arguments::State::default(), &mut diags) else {
            ws_view.diagnostics(diags);
            return 1;
        };
        let Some(existing) = list_workspaces(backend.as_ref(), &mut diags) else {
            ws_view.diagnostics(diags);
            return 1;
        };
        let mut created = false;
        if !existing.contains(&flags.name) {
            if !flags.or_create {
                diags.push(Diagnostic::error(
                    "Workspace doesn't exist",
                    format!(
                        "Workspace {:?} doesn't exist.\n\nYou can create this workspace with the \"new\" subcommand or include the \"--or-create\" flag with the \"select\" subcommand.",
                        flags.name
                    ),
                ));
                ws_view.diagnostics(diags);
                return 1;
            }
            if let Err(e) = backend.create_workspace(&flags.name) {
                diags.push(e);
                ws_view.diagnostics(diags);
                return 1;
            }
            created = true;
        }
        match self.meta.set_workspace(&flags.name) {
            Ok(()) if created => ws_view.created(&flags.name),
            Ok(()) => ws_view.switched(&flags.name),
            Err(diag) => diags.push(diag),
        }
        let code = exit_code(&diags);
        ws_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] workspace select [options] NAME

  Select a different Mantle workspace.

Options:

    --or-create=false    Create the Mantle workspace if it doesn't exist.
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "Select a workspace"
    }
}
