//! Output of `import`.

use mantle_common::diagnostics::Diagnostics;
use mantle_common::types::ResourceAddr;

use super::{Style, View};

/// What `import` shows.
pub trait ImportView {
    /// Reports the start of an import.
    fn importing(&self, addr: &ResourceAddr, id: &str);

    /// Reports a successful import.
    fn success(&self, addr: &ResourceAddr);

    /// Shows diagnostics.
    fn diagnostics(&self, diags: Diagnostics);

    /// Suggests the command's help after an argument error.
    fn help_prompt(&self, command: &str);
}

/// Human output of `import`.
pub struct HumanImport {
    view: View,
}

impl HumanImport {
    /// Creates the view.
    pub const fn new(view: View) -> Self {
        Self { view }
    }
}

impl ImportView for HumanImport {
    fn importing(&self, addr: &ResourceAddr, id: &str) {
        let text = format!("{addr}: Importing from ID \"{id}\"...");
        self.view.stdout().println(&self.view.colorize(&text, Style::Bold));
    }

    fn success(&self, addr: &ResourceAddr) {
        let out = self.view.stdout();
        out.println(&self.view.colorize(&format!("{addr}: Import prepared!"), Style::Green));
        out.println(&format!("\n{}", self.view.colorize("Import successful!", Style::Green)));
        out.println(
            "\nThe resources that were imported are shown above. These resources are now in\nyour Mantle state and will henceforth be managed by Mantle.",
        );
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.view.diagnostics(diags);
    }

    fn help_prompt(&self, command: &str) {
        self.view.help_prompt(command);
    }
}
