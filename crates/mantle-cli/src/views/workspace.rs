//! Output of the `workspace` subcommands.

use mantle_common::diagnostics::Diagnostics;

use super::{Style, View};

/// What the `workspace` subcommands show.
pub trait WorkspaceView {
    /// Lists workspaces, marking the current one.
    fn list(&self, workspaces: &[String], current: &str);

    /// Reports a new workspace.
    fn created(&self, name: &str);

    /// Reports a switch to another workspace.
    fn switched(&self, name: &str);

    /// Reports a deleted workspace.
    fn deleted(&self, name: &str);

    /// Prints the current workspace name.
    fn show(&self, name: &str);

    /// Shows diagnostics.
    fn diagnostics(&self, diags: Diagnostics);

    /// Suggests the command's help after an argument error.
    fn help_prompt(&self, command: &str);
}

/// Human output of the `workspace` subcommands.
pub struct HumanWorkspace {
    view: View,
}

impl HumanWorkspace {
    /// Creates the view.
    pub const fn new(view: View) -> Self {
        Self { view }
    }
}

impl WorkspaceView for HumanWorkspace {
    fn list(&self, workspaces: &[String], current: &str) {
        for ws in workspaces {
            let marker = if ws == current { "*" } else { " " };
            self.view.stdout().println(&format!("{marker} {ws}"));
        }
        self.view.stdout().println("");
    }

    fn created(&self, name: &str) {
        let text = format!("Created and switched to workspace \"{name}\"!");
        self.view.stdout().println(&self.view.colorize(&text, Style::Green));
        self.view.stdout().println(
            "\nYou're now on a new, empty workspace. Workspaces isolate their state,\nso if you run \"mantle plan\" Mantle will not see any existing state\nfor this configuration.",
        );
    }

    fn switched(&self, name: &str) {
        let text = format!("Switched to workspace \"{name}\".");
        self.view.stdout().println(&self.view.colorize(&text, Style::Green));
    }

    fn deleted(&self, name: &str) {
        let text = format!("Deleted workspace \"{name}\"!");
        self.view.stdout().println(&self.view.colorize(&text, Style::Green));
    }

    fn show(&self, name: &str) {
        self.view.stdout().println(name);
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.view.diagnostics(diags);
    }

    fn help_prompt(&self, command: &str) {
        self.view.help_prompt(command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::ViewArgs;
    use crate::streams::Streams;

    #[test]
    fn list_marks_current() {
        let (streams, captured) = Streams::for_testing("");
        let view = HumanWorkspace::new(View::new(streams, ViewArgs::default(), true, false));
        view.list(&["default".to_string(), "dev".to_string()], "dev");
        assert_eq!(captured.stdout(), "  default\n* dev\n\n");
    }
}
