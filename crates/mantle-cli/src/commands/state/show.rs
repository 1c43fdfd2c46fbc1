//! `mantle state show`.

use clap::Parser;
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::types::ResourceAddr;
use mantle_state::State;

use super::open_state;
use crate::arguments::{self, parse_flags};
use crate::commands::{Command, base_view, exit_code};
use crate::meta::Meta;
use crate::views::state::{HumanState, StateView};

#[derive(Debug, Parser)]
struct Flags {
    /// Legacy local state file to read.
    #[arg(long = "state")]
    state_path: Option<std::path::PathBuf>,
    addr: String,
}

/// The `state show` command.
#[derive(Debug)]
pub struct StateShowCommand {
    meta: Meta,
}

impl StateShowCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for StateShowCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let state_view = HumanState::new(view.clone());
        let parsed = parse_flags::<Flags>(&args).and_then(|flags| {
            ResourceAddr::parse(&flags.addr)
                .map(|addr| (flags.state_path, addr))
                .map_err(|e| Diagnostic::error("Invalid address", e.to_string()))
        });
        let (state_path, addr) = match parsed {
            Ok(parsed) => parsed,
            Err(diag) => {
                state_view.diagnostics(Diagnostics::single(diag));
                state_view.help_prompt("state show");
                return 1;
            }
        };

        let state_args = arguments::State {
            lock: false,
            state_path,
            ..arguments::State::default()
        };
        let mut diags = self.meta.startup_diagnostics();
        let Some(locked) = open_state(&self.meta, &view, &state_args, "OperationTypeStateShow", &mut diags) else {
            state_view.diagnostics(diags);
            return 1;
        };
        match locked.state().and_then(|state| state.resource(&addr)) {
            Some(resource) => {
                let mut single = State::new();
                single.set_resource(resource.clone());
                state_view.show(&single);
            }
            None => diags.push(Diagnostic::error(
                "No instance found for the given address",
                format!("This command requires that the address references one specific instance; {addr} is not in the state."),
            )),
        }
        locked.close(&mut diags);
        let code = exit_code(&diags);
        state_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] state show [options] ADDRESS

  Shows the attributes of a resource in the Mantle state.

  This command shows the attributes of a single resource in the Mantle
  state. The address argument must be used to specify a single resource.
  You can view the list of available resources with \"mantle state list\".

Options:

  --state=statefile        Path to a Mantle state file to use to look
                           up Mantle-managed resources. By default it will
                           use the state \"mantle.state\" if it exists.
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "Show a resource in the state"
    }
}
