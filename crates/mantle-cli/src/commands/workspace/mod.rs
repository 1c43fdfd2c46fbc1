//! `mantle workspace` — manage named workspaces.
//!
//! Handles:
//! - listing, creating and deleting workspaces through the backend
//! - recording the selected workspace in the data directory
//! - refusing changes while `MANTLE_WORKSPACE` overrides the selection

pub mod delete;
pub mod list;
pub mod new;
pub mod select;
pub mod show;

use mantle_backend::Backend;
use mantle_common::constants::WORKSPACE_ENV;
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::types::is_valid_workspace_name;

use super::{Command, RUN_RESULT_HELP, load_backend};
use crate::arguments;
use crate::meta::Meta;
use crate::views::View;

/// The `workspace` parent command, which only prints help.
#[derive(Debug)]
pub struct WorkspaceCommand;

impl Command for WorkspaceCommand {
    fn run(&mut self, _args: Vec<String>) -> i32 {
        RUN_RESULT_HELP
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] workspace

  new, list, show, select and delete Mantle workspaces.

Subcommands:
    delete    Delete a workspace
    list      List Workspaces
    new       Create a new workspace
    select    Select a workspace
    show      Show the name of the current workspace
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "Workspace management"
    }
}

/// Builds the configured backend without requiring any resources.
fn workspace_backend(
    meta: &Meta,
    view: &View,
    state: &arguments::State,
    diags: &mut Diagnostics,
) -> Option<Box<dyn Backend>> {
    let (_, backend) = load_backend(meta, view, state, false, diags)?;
    if backend.supports_workspaces() {
        Some(backend)
    } else {
        diags.push(Diagnostic::error(
            "Workspaces not supported",
            format!("The \"{}\" backend does not support multiple workspaces.", backend.name()),
        ));
        None
    }
}

/// Error for commands that change the selection while the environment
/// pins it.
fn env_override_error() -> Diagnostic {
    Diagnostic::error(
        "Workspace overridden by environment",
        format!(
            "The selected workspace is currently overridden using the {WORKSPACE_ENV} environment variable.\n\nTo select a new workspace, either update this environment variable or unset it and then run this command again."
        ),
    )
}

/// Checks a workspace name.
fn check_name(name: &str) -> Result<(), Diagnostic> {
    if is_valid_workspace_name(name) {
        Ok(())
    } else {
        Err(Diagnostic::error(
            "Invalid workspace name",
            format!(
                "The workspace name {name:?} is not allowed. The name must contain only URL safe characters, and no path separators."
            ),
        ))
    }
}

/// Lists workspaces, recording a diagnostic on failure.
fn list_workspaces(backend: &dyn Backend, diags: &mut Diagnostics) -> Option<Vec<String>> {
    match backend.workspaces() {
        Ok(names) => Some(names),
        Err(e) => {
            diags.push(e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_checked() {
        assert!(check_name("staging").is_ok());
        let err = check_name("a/b").expect_err("path separator");
        assert_eq!(err.summary, "Invalid workspace name");
    }
}
