//! Output of `console`.

use mantle_common::diagnostics::Diagnostics;

use super::View;

/// What `console` shows.
pub trait ConsoleView {
    /// Prints the prompt; `continuation` is true inside an unfinished
    /// multi-line expression.
    fn prompt(&self, continuation: bool);

    /// Prints a rendered result.
    fn result(&self, text: &str);

    /// Shows diagnostics.
    fn diagnostics(&self, diags: Diagnostics);
}

/// Human output of `console`.
pub struct HumanConsole {
    view: View,
    interactive: bool,
}

impl HumanConsole {
    /// Creates the view. Prompts are only printed when `interactive`.
    pub const fn new(view: View, interactive: bool) -> Self {
        Self { view, interactive }
    }
}

impl ConsoleView for HumanConsole {
    fn prompt(&self, continuation: bool) {
        if self.interactive {
            self.view.stdout().print(if continuation { ">> " } else { "> " });
        }
    }

    fn result(&self, text: &str) {
        self.view.stdout().println(text);
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.view.diagnostics(diags);
    }
}
