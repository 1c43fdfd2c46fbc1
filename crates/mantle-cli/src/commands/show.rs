//! `mantle show` — inspect the state or a saved plan.

use std::path::Path;

use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_engine::PlanFile;
use mantle_state::State;

use super::{Command, LockedState, base_view, current_workspace, exit_code, load_backend};
use crate::arguments::{self, show::parse_show};
use crate::meta::Meta;
use crate::views::View;
use crate::views::show::{ShowView, new_show_view};

/// The `show` command.
#[derive(Debug)]
pub struct ShowCommand {
    meta: Meta,
}

impl ShowCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }

    /// Shows the current workspace's state.
    fn show_current(&self, view: &View, show_view: &dyn ShowView, diags: &mut Diagnostics) {
        let state_args = arguments::State {
            lock: false,
            ..arguments::State::default()
        };
        let Some((_, backend)) = load_backend(&self.meta, view, &state_args, false, diags) else {
            return;
        };
        let Some(workspace) = current_workspace(&self.meta, diags) else {
            return;
        };
        if let Some(locked) = LockedState::open(
            &self.meta,
            backend.as_ref(),
            &state_args,
            &workspace,
            "OperationTypeShow",
            diags,
        ) {
            show_view.state(locked.state());
            locked.close(diags);
        }
    }

    /// Shows a plan file, or else a state file, at `path`.
    fn show_file(&self, view: &View, show_view: &dyn ShowView, path: &Path, diags: &mut Diagnostics) {
        let full = self.meta.working_dir().join(path);
        let (config, config_diags) = self.meta.load_config(false);
        view.set_sources(config.sources.clone());
        let encryption = match self.meta.encryption_for_config(&config) {
            Ok(enc) => enc,
            Err(diag) => {
                diags.push(diag);
                return;
            }
        };
        if PlanFile::is_plan_file(&full, &encryption) {
            match PlanFile::read(&full, &encryption) {
                Ok(file) => show_view.plan(&file),
                Err(e) => diags.push(Diagnostic::error("Failed to read plan file", e.to_string())),
            }
            return;
        }
        diags.append(config_diags);
        let state = std::fs::read(&full)
            .map_err(|e| e.to_string())
            .and_then(|data| encryption.decrypt(&data).map_err(|e| e.to_string()))
            .and_then(|data| State::from_json(&data, &full.display().to_string()).map_err(|e| e.to_string()));
        match state {
            Ok(state) => show_view.state(Some(&state)),
            Err(e) => diags.push(Diagnostic::error(
                "Failed to read the given file as a state or plan file",
                format!("{}: {e}", path.display()),
            )),
        }
    }
}

impl Command for ShowCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let (args, mut diags) = parse_show(&args);
        let show_view = new_show_view(args.view_type, &view);
        if diags.has_errors() {
            show_view.diagnostics(diags);
            view.help_prompt("show");
            return 1;
        }
        diags.append(self.meta.startup_diagnostics());
        match &args.path {
            Some(path) => self.show_file(&view, show_view.as_ref(), path, &mut diags),
            None => self.show_current(&view, show_view.as_ref(), &mut diags),
        }
        let code = exit_code(&diags);
        show_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] show [options] [path]

  Reads and outputs a Mantle state or plan file in a human-readable
  form. If no path is specified, the current state will be shown.

Options:

  --no-color           If specified, output won't contain any color.

  --json               If specified, output the Mantle plan or state in
                       a machine-readable form.
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "Show the current state or a saved plan"
    }
}
