//! `mantle workspace delete`.

use clap::Parser;
use mantle_common::diagnostics::{Diagnostic, Diagnostics};

use super::{check_name, list_workspaces, workspace_backend};
use crate::arguments::{self, parse_duration, parse_flags};
use crate::commands::{Command, LockedState, base_view, current_workspace, exit_code};
use crate::meta::Meta;
use crate::views::workspace::{HumanWorkspace, WorkspaceView};

#[derive(Debug, Parser)]
struct Flags {
    /// Delete even if the workspace still manages resources or is locked.
    #[arg(long)]
    force: bool,
    /// Hold a state lock while checking the workspace.
    #[arg(long = "lock", default_value_t = true, num_args = 0..=1, require_equals = true,
        default_missing_value = "true", action = clap::ArgAction::Set)]
    lock: bool,
    /// How long to retry a held state lock.
    #[arg(long = "lock-timeout", default_value = "0s", value_parser = parse_duration)]
    lock_timeout: std::time::Duration,
    name: String,
}

/// The `workspace delete` command.
#[derive(Debug)]
pub struct WorkspaceDeleteCommand {
    meta: Meta,
}

impl WorkspaceDeleteCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for WorkspaceDeleteCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let ws_view = HumanWorkspace::new(view.clone());
        let flags = match parse_flags::<Flags>(&args).and_then(|f| check_name(&f.name).map(|()| f)) {
            Ok(flags) => flags,
            Err(diag) => {
                ws_view.diagnostics(Diagnostics::single(diag));
                ws_view.help_prompt("workspace delete");
                return 1;
            }
        };
        let mut diags = self.meta.startup_diagnostics();
        let state_args = arguments::State {
            lock: flags.lock,
            lock_timeout: flags.lock_timeout,
            ..arguments::State::default()
        };
        let Some(backend) = workspace_backend(&self.meta, &view, &state_args, &mut diags) else {
            ws_view.diagnostics(diags);
            return 1;
        };
        let Some(existing) = list_workspaces(backend.as_ref(), &mut diags) else {
            ws_view.diagnostics(diags);
            return 1;
        };
        if !existing.contains(&flags.name) {
            diags.push(Diagnostic::error(
                "Workspace doesn't exist",
                format!("Workspace {:?} doesn't exist.", flags.name),
            ));
            ws_view.diagnostics(diags);
            return 1;
        }
        let Some(current) = current_workspace(&self.meta, &mut diags) else {
            ws_view.diagnostics(diags);
            return 1;
        };
        if current == flags.name {
            diags.push(Diagnostic::error(
                "Workspace is your active workspace",
                format!(
                    "The workspace {:?} is your active workspace.\n\nYou cannot delete the currently active workspace. Please switch to another workspace and try again.",
                    flags.name
                ),
            ));
            ws_view.diagnostics(diags);
            return 1;
        }

        if !flags.force {
            let Some(locked) = LockedState::open(
                &self.meta,
                backend.as_ref(),
                &state_args,
                &flags.name,
                "OperationTypeWorkspaceDelete",
                &mut diags,
            ) else {
                ws_view.diagnostics(diags);
                return 1;
            };
            let has_resources = locked.state().is_some_and(mantle_state::State::has_managed_resources);
            locked.close(&mut diags);
            if has_resources {
                diags.push(Diagnostic::error(
                    "Workspace is not empty",
                    format!(
                        "Workspace {:?} is currently tracking the following resource instances. Deleting this workspace would cause Mantle to lose track of any associated remote objects, which would then require you to delete them manually outside of Mantle. You should destroy these objects with Mantle before deleting the workspace.\n\nIf you want to delete this workspace anyway, and have Mantle forget about these managed objects, use the --force option to disable this safety check.",
                        flags.name
                    ),
                ));
                ws_view.diagnostics(diags);
                return 1;
            }
        }

        match backend.delete_workspace(&flags.name, flags.force) {
            Ok(()) => ws_view.deleted(&flags.name),
            Err(e) => diags.push(e),
        }
        let code = exit_code(&diags);
        ws_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] workspace delete [OPTIONS] NAME

  Delete a Mantle workspace.

Options:

    --force              Remove a workspace even if it is managing resources.
                         Mantle can no longer track or manage the workspace's
                         infrastructure.

    --lock=false         Don't hold a state lock during the operation.

    --lock-timeout=0s    Duration to retry a state lock.
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "Delete a workspace"
    }
}
