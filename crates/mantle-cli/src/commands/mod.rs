//! Command definitions and dispatch.
//!
//! Every command implements [`Command`] and follows the same phases: parse
//! the display flags, parse its own flags, build its view, resolve
//! encryption and the backend, build the request, delegate, render, and map
//! the result to an exit code. Warnings from every phase are shown together
//! at the end.

pub mod apply;
pub mod console;
pub mod fmt;
pub mod graph;
pub mod import;
pub mod init;
mod operation;
pub mod output;
pub mod plan;
pub mod refresh;
pub mod show;
pub mod state;
pub mod validate;
pub mod version;
pub mod workspace;

use std::collections::BTreeMap;

use mantle_backend::Backend;
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_config::Config;
use mantle_state::{Encryption, State, StateLocker, StateManager};

use crate::arguments::{self, ViewArgs};
use crate::arguments::view::parse_view;
use crate::meta::Meta;
use crate::views::View;

/// Exit code asking the dispatcher to print the command help.
pub const RUN_RESULT_HELP: i32 = -18511;

/// A `mantle` subcommand.
pub trait Command {
    /// Runs the command with the arguments after its name and returns the
    /// exit code.
    fn run(&mut self, args: Vec<String>) -> i32;

    /// Long help text.
    fn help(&self) -> String;

    /// One-line description for the command list.
    fn synopsis(&self) -> &'static str;
}

/// Builds a command sharing the given state.
pub type CommandFactory = fn(&Meta) -> Box<dyn Command>;

/// Every command by name. Subcommands are keyed by their full name, e.g.
/// `state rm`.
pub fn registry() -> BTreeMap<&'static str, CommandFactory> {
    let mut commands: BTreeMap<&'static str, CommandFactory> = BTreeMap::new();
    let _ = commands.insert("apply", |m| Box::new(apply::ApplyCommand::new(m.clone(), false)));
    let _ = commands.insert("console", |m| Box::new(console::ConsoleCommand::new(m.clone())));
    let _ = commands.insert("destroy", |m| Box::new(apply::ApplyCommand::new(m.clone(), true)));
    let _ = commands.insert("fmt", |m| Box::new(fmt::FmtCommand::new(m.clone())));
    let _ = commands.insert("graph", |m| Box::new(graph::GraphCommand::new(m.clone())));
    let _ = commands.insert("import", |m| Box::new(import::ImportCommand::new(m.clone())));
    let _ = commands.insert("init", |m| Box::new(init::InitCommand::new(m.clone())));
    let _ = commands.insert("output", |m| Box::new(output::OutputCommand::new(m.clone())));
    let _ = commands.insert("plan", |m| Box::new(plan::PlanCommand::new(m.clone())));
    let _ = commands.insert("refresh", |m| Box::new(refresh::RefreshCommand::new(m.clone())));
    let _ = commands.insert("show", |m| Box::new(show::ShowCommand::new(m.clone())));
    let _ = commands.insert("state", |_| Box::new(state::StateCommand));
    let _ = commands.insert("state list", |m| Box::new(state::list::StateListCommand::new(m.clone())));
    let _ = commands.insert("state mv", |m| Box::new(state::mv::StateMvCommand::new(m.clone())));
    let _ = commands.insert("state rm", |m| Box::new(state::rm::StateRmCommand::new(m.clone())));
    let _ = commands.insert("state show", |m| Box::new(state::show::StateShowCommand::new(m.clone())));
    let _ = commands.insert("validate", |m| Box::new(validate::ValidateCommand::new(m.clone())));
    let _ = commands.insert("version", |m| Box::new(version::VersionCommand::new(m.clone())));
    let _ = commands.insert("workspace", |_| Box::new(workspace::WorkspaceCommand));
    let _ = commands.insert("workspace delete", |m| {
        Box::new(workspace::delete::WorkspaceDeleteCommand::new(m.clone()))
    });
    let _ = commands.insert("workspace list", |m| Box::new(workspace::list::WorkspaceListCommand::new(m.clone())));
    let _ = commands.insert("workspace new", |m| Box::new(workspace::new::WorkspaceNewCommand::new(m.clone())));
    let _ = commands.insert("workspace select", |m| {
        Box::new(workspace::select::WorkspaceSelectCommand::new(m.clone()))
    });
    let _ = commands.insert("workspace show", |m| Box::new(workspace::show::WorkspaceShowCommand::new(m.clone())));
    commands
}

/// Splits off the display flags and builds the base view.
pub(crate) fn base_view(meta: &Meta, args: Vec<String>) -> (View, ViewArgs, Vec<String>) {
    let (view_args, rest) = parse_view(args);
    (meta.view(view_args), view_args, rest)
}

/// Loads the configuration, resolves encryption and builds the backend.
///
/// Diagnostics go into `diags`; `None` means an error stopped the
/// sequence.
pub(crate) fn load_backend(
    meta: &Meta,
    view: &View,
    state: &arguments::State,
    require_config: bool,
    diags: &mut Diagnostics,
) -> Option<(Config, Box<dyn Backend>)> {
    let (config, config_diags) = meta.load_config(require_config);
    view.set_sources(config.sources.clone());
    let failed = config_diags.has_errors();
    diags.append(config_diags);
    if failed {
        return None;
    }
    let encryption = match meta.encryption_for_config(&config) {
        Ok(enc) => enc,
        Err(diag) => {
            diags.push(diag);
            return None;
        }
    };
    match meta.backend_for_config(&config, state, encryption) {
        Ok(backend) => Some((config, backend)),
        Err(diag) => {
            diags.push(diag);
            None
        }
    }
}

/// Encryption configured in the working directory, for reading saved
/// plans before their own configuration snapshot is available.
pub(crate) fn plan_encryption(meta: &Meta, diags: &mut Diagnostics) -> Option<Encryption> {
    let (config, _) = meta.load_config(false);
    match meta.encryption_for_config(&config) {
        Ok(enc) => Some(enc),
        Err(diag) => {
            diags.push(diag);
            None
        }
    }
}

/// Current workspace, recording a diagnostic on failure.
pub(crate) fn current_workspace(meta: &Meta, diags: &mut Diagnostics) -> Option<String> {
    match meta.workspace() {
        Ok(ws) => Some(ws),
        Err(diag) => {
            diags.push(diag);
            None
        }
    }
}

/// A workspace's state manager holding the state lock.
pub(crate) struct LockedState {
    mgr: Box<dyn StateManager>,
    locker: Box<dyn StateLocker>,
}

impl LockedState {
    /// Locks and reads the state of `workspace`.
    pub(crate) fn open(
        meta: &Meta,
        backend: &dyn Backend,
        args: &arguments::State,
        workspace: &str,
        operation: &str,
        diags: &mut Diagnostics,
    ) -> Option<Self> {
        let mut mgr = match backend.state_mgr(workspace) {
            Ok(mgr) => mgr,
            Err(e) => {
                diags.push(e);
                return None;
            }
        };
        let mut locker = meta.state_locker(args);
        if let Err(e) = locker.lock(mgr.as_mut(), operation) {
            diags.push(Diagnostic::from(e));
            return None;
        }
        let mut locked = Self { mgr, locker };
        if let Err(e) = locked.mgr.refresh() {
            diags.push(e);
            locked.close(diags);
            return None;
        }
        Some(locked)
    }

    /// The current snapshot.
    pub(crate) fn state(&self) -> Option<&State> {
        self.mgr.state()
    }

    /// Writes and persists a new snapshot. Returns false on failure.
    pub(crate) fn save(&mut self, state: State, diags: &mut Diagnostics) -> bool {
        self.mgr.write_state(state);
        match self.mgr.persist() {
            Ok(()) => true,
            Err(e) => {
                diags.push(Diagnostic::error(
                    "Failed to save state",
                    format!("Error saving the updated state: {e}"),
                ));
                false
            }
        }
    }

    /// Releases the lock.
    pub(crate) fn close(mut self, diags: &mut Diagnostics) {
        if let Err(e) = self.locker.unlock(self.mgr.as_mut()) {
            diags.push(Diagnostic::error(
                "Error releasing the state lock",
                format!("Error message: {e}\n\nMantle acquired a lock on the state for you, but could not release it. Remove the lock manually before running another command."),
            ));
        }
    }
}

/// Error for positional arguments a command does not take.
pub(crate) fn unexpected_arguments(args: &[String]) -> Diagnostic {
    Diagnostic::error(
        "Unexpected argument",
        format!("This command does not take the arguments: {}", args.join(" ")),
    )
}

/// Exit code for diagnostics: 1 if there are errors.
pub(crate) fn exit_code(diags: &Diagnostics) -> i32 {
    i32::from(diags.has_errors())
}

/// Help text shared by commands that take the display flags.
pub(crate) const VIEW_OPTIONS_HELP: &str = "\
  --no-color               Disable color in the output.

  --compact-warnings       Show warnings in a compact form that includes only
                           the summary messages, unless there are errors.

  --consolidate-warnings   Group similar warnings together (default true).

  --consolidate-errors     Group similar errors together.

  --concise                Disable progress-related messages.
";

/// Help text for the state flags.
pub(crate) const STATE_OPTIONS_HELP: &str = "\
  --lock=false             Don't hold a state lock during the operation.

  --lock-timeout=0s        Duration to retry a state lock.

  --state=path             Legacy local state file to read.

  --state-out=path         Local state file to write instead.

  --backup=path            Backup path; \"-\" disables backups.
";

/// Help text for the variable flags.
pub(crate) const VARS_OPTIONS_HELP: &str = "\
  --var 'foo=bar'          Set a value for one of the input variables in the
                           root module of the configuration. Use this option
                           more than once to set more than one variable.

  --var-file=filename      Load variable values from the given file, in
                           addition to mantle.mvars and *.auto.mvars.
";
