//! `mantle state rm`.

use clap::Parser;
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::types::ResourceAddr;

use super::open_state;
use crate::arguments::{self, parse_flags};
use crate::commands::{Command, STATE_OPTIONS_HELP, base_view, exit_code};
use crate::meta::Meta;
use crate::views::state::{HumanState, StateView};

#[derive(Debug, Parser)]
struct Flags {
    #[command(flatten)]
    state: arguments::State,
    /// Only report what would be removed.
    #[arg(long = "dry-run")]
    dry_run: bool,
    addrs: Vec<String>,
}

/// The `state rm` command.
#[derive(Debug)]
pub struct StateRmCommand {
    meta: Meta,
}

impl StateRmCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for StateRmCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let state_view = HumanState::new(view.clone());
        let flags = match parse_flags::<Flags>(&args) {
            Ok(flags) => flags,
            Err(diag) => {
                state_view.diagnostics(Diagnostics::single(diag));
                state_view.help_prompt("state rm");
                return 1;
            }
        };
        let mut diags = Diagnostics::new();
        if flags.addrs.is_empty() {
            diags.push(Diagnostic::error(
                "Invalid number of arguments",
                "At least one address is required.",
            ));
        }
        let mut targets = Vec::new();
        for raw in &flags.addrs {
            match ResourceAddr::parse(raw) {
                Ok(addr) => targets.push(addr),
                Err(e) => diags.push(Diagnostic::error("Invalid address", e.to_string())),
            }
        }
        if diags.has_errors() {
            state_view.diagnostics(diags);
            state_view.help_prompt("state rm");
            return 1;
        }

        diags.append(self.meta.startup_diagnostics());
        let Some(mut locked) = open_state(&self.meta, &view, &flags.state, "OperationTypeStateRm", &mut diags) else {
            state_view.diagnostics(diags);
            return 1;
        };
        let mut state = locked.state().cloned().unwrap_or_default();
        let mut removed = Vec::new();
        for addr in &targets {
            if state.remove(addr).is_some() {
                removed.push(addr.clone());
            } else {
                diags.push(Diagnostic::error(
                    "Invalid target address",
                    format!("No matching objects found. To view the available instances, use \"mantle state list\". Please modify the address to reference a specific instance. Address: {addr}"),
                ));
            }
        }
        if !diags.has_errors() {
            if flags.dry_run {
                state_view.removed(&removed, true);
            } else if locked.save(state, &mut diags) {
                state_view.removed(&removed, false);
            }
        }
        locked.close(&mut diags);
        let code = exit_code(&diags);
        state_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        format!(
            "\
Usage: mantle [global options] state rm [options] ADDRESS...

  Remove one or more items from the Mantle state, causing Mantle to
  \"forget\" those items without first destroying them in the remote system.

  This command removes one or more resource instances from the Mantle state
  based on the addresses given. You can view and list the available instances
  with \"mantle state list\".

  This command writes a backup of the previous state next to the state
  file unless --backup=- is given.

  If you instead want to destroy the remote objects, use \"mantle destroy\".

Options:

  --dry-run                If set, prints out what would've been removed but
                           doesn't actually remove anything.

{STATE_OPTIONS_HELP}"
        )
    }

    fn synopsis(&self) -> &'static str {
        "Remove instances from the state"
    }
}
