//! Output of the `state` subcommands.

use mantle_common::diagnostics::Diagnostics;
use mantle_common::types::ResourceAddr;
use mantle_state::State;

use super::View;
use super::render::render_state;

/// What the `state` subcommands show.
pub trait StateView {
    /// Lists addresses, one per line.
    fn list(&self, addrs: &[ResourceAddr]);

    /// Shows one resource.
    fn show(&self, state: &State);

    /// Reports removed resources.
    fn removed(&self, addrs: &[ResourceAddr], dry_run: bool);

    /// Reports a moved resource.
    fn moved(&self, src: &ResourceAddr, dst: &ResourceAddr, dry_run: bool);

    /// Shows diagnostics.
    fn diagnostics(&self, diags: Diagnostics);

    /// Suggests the command's help after an argument error.
    fn help_prompt(&self, command: &str);
}

/// Human output of the `state` subcommands.
pub struct HumanState {
    view: View,
}

impl HumanState {
    /// Creates the view.
    pub const fn new(view: View) -> Self {
        Self { view }
    }
}

impl StateView for HumanState {
    fn list(&self, addrs: &[ResourceAddr]) {
        for addr in addrs {
            self.view.stdout().println(&addr.to_string());
        }
    }

    fn show(&self, state: &State) {
        self.view.stdout().print(&render_state(&self.view, state));
    }

    fn removed(&self, addrs: &[ResourceAddr], dry_run: bool) {
        let out = self.view.stdout();
        if dry_run {
            for addr in addrs {
                out.println(&format!("Would remove {addr}"));
            }
            if addrs.is_empty() {
                out.println("Would have removed nothing.");
            }
            return;
        }
        for addr in addrs {
            out.println(&format!("Removed {addr}"));
        }
        let plural = if addrs.len() == 1 { "" } else { "s" };
        out.println(&format!("Successfully removed {} resource instance{plural}.", addrs.len()));
    }

    fn moved(&self, src: &ResourceAddr, dst: &ResourceAddr, dry_run: bool) {
        let out = self.view.stdout();
        if dry_run {
            out.println(&format!("Would move \"{src}\" to \"{dst}\""));
        } else {
            out.println(&format!("Move \"{src}\" to \"{dst}\""));
            out.println("Successfully moved 1 object(s).");
        }
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
    fn removal_messages() {
        let (streams, captured) = Streams::for_testing("");
        let view = HumanState::new(View::new(streams, ViewArgs::default(), true, false));
        let addrs = [
            ResourceAddr::managed("test_instance", "a"),
            ResourceAddr::managed("test_instance", "b"),
        ];
        view.removed(&addrs, true);
        assert_eq!(
            captured.stdout(),
            "Would remove test_instance.a\nWould remove test_instance.b\n"
        );
        captured.clear();
        view.removed(&addrs[..1], false);
        assert_eq!(
            captured.stdout(),
            "Removed test_instance.a\nSuccessfully removed 1 resource instance.\n"
        );
    }
}
