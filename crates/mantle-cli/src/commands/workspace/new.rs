//! `mantle workspace new`.

use std::path::PathBuf;

use clap::Parser;
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_state::State;

use super::{check_name, env_override_error, list_workspaces, workspace_backend};
use crate::arguments::{self, parse_flags, parse_duration};
use crate::commands::{Command, LockedState, base_view, exit_code};
use crate::meta::Meta;
use crate::views::workspace::{HumanWorkspace, WorkspaceView};

#[derive(Debug, Parser)]
struct Flags {
    /// Hold a state lock while copying state.
    #[arg(long = "lock", default_value_t = true, num_args = 0..=1, require_equals = true,
        default_missing_value = "true", action = clap::ArgAction::Set)]
    lock: bool,
    /// How long to retry a held state lock.
    #[arg(long = "lock-timeout", default_value = "0s", value_parser = parse_duration)]
    lock_timeout: std::time::Duration,
    /// State file whose content seeds the new workspace.
    #[arg(long = "state")]
    state: Option<PathBuf>,
    name: String,
}

/// The `workspace new` command.
#[derive(Debug)]
pub struct WorkspaceNewCommand {
    meta: Meta,
}

impl WorkspaceNewCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }

    /// Reads the snapshot given by `--state`.
    fn read_seed(&self, path: &std::path::Path) -> Result<State, Diagnostic> {
        let full = self.meta.working_dir().join(path);
        let data = std::fs::read(&full).map_err(|e| {
            Diagnostic::error("Failed to read state", format!("Error reading {}: {e}", full.display()))
        })?;
        State::from_json(&data, &full.display().to_string()).map_err(Diagnostic::from)
    }
}

impl Command for WorkspaceNewCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let ws_view = HumanWorkspace::new(view.clone());
        let flags = match parse_flags::<Flags>(&args).and_then(|f| check_name(&f.name).map(|()| f)) {
            Ok(flags) => flags,
            Err(diag) => {
                ws_view.diagnostics(Diagnostics::single(diag));
                ws_view.help_prompt("workspace new");
                return 1;
            }
        };
        let mut diags = self.meta.startup_diagnostics();
        if self.meta.workspace_overridden() {
            diags.push(env_override_error());
            ws_view.diagnostics(diags);
            return 1;
        }
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
        if existing.contains(&flags.name) {
            diags.push(Diagnostic::error(
                "Workspace already exists",
                format!("Workspace {:?} already exists.", flags.name),
            ));
            ws_view.diagnostics(diags);
            return 1;
        }

        if let Err(e) = backend.create_workspace(&flags.name) {
            diags.push(e);
            ws_view.diagnostics(diags);
            return 1;
        }
        if let Err(diag) = self.meta.set_workspace(&flags.name) {
            diags.push(diag);
            ws_view.diagnostics(diags);
            return 1;
        }
        ws_view.created(&flags.name);

        if let Some(path) = &flags.state {
            match self.read_seed(path) {
                Ok(seed) => {
                    if let Some(mut locked) = LockedState::open(
                        &self.meta,
                        backend.as_ref(),
                        &state_args,
                        &flags.name,
                        "OperationTypeWorkspaceNew",
                        &mut diags,
                    ) {
                        let _ = locked.save(seed, &mut diags);
                        locked.close(&mut diags);
                    }
                }
                Err(diag) => diags.push(diag),
            }
        }
        let code = exit_code(&diags);
        ws_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] workspace new [OPTIONS] NAME

  Create a new Mantle workspace.

Options:

    --lock=false         Don't hold a state lock during the operation. This is
                         dangerous if others might concurrently run commands
                         against the same workspace.

    --lock-timeout=0s    Duration to retry a state lock.

    --state=path         Copy an existing state file into the new workspace.
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "Create a new workspace"
    }
}
