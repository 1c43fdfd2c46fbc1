//! `mantle state` — advanced state management.
//!
//! Handles:
//! - listing and showing recorded resources
//! - removing records without destroying remote objects
//! - moving records to a new address

pub mod list;
pub mod mv;
pub mod rm;
pub mod show;

use mantle_common::diagnostics::Diagnostics;

use super::{Command, LockedState, RUN_RESULT_HELP, current_workspace, load_backend};
use crate::arguments;
use crate::meta::Meta;
use crate::views::View;

/// The `state` parent command, which only prints help.
#[derive(Debug)]
pub struct StateCommand;

impl Command for StateCommand {
    fn run(&mut self, _args: Vec<String>) -> i32 {
        RUN_RESULT_HELP
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] state <subcommand> [options] [args]

  This command has subcommands for advanced state management.

  These subcommands can be used to slice and dice the Mantle state.
  This is sometimes necessary in advanced cases. Commands that modify
  the state write a backup of the previous snapshot first.

Subcommands:
    list                List resources in the state
    mv                  Move an item in the state
    rm                  Remove instances from the state
    show                Show a resource in the state
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "Advanced state management"
    }
}

/// Opens the current workspace's state under lock.
fn open_state(
    meta: &Meta,
    view: &View,
    args: &arguments::State,
    operation: &str,
    diags: &mut Diagnostics,
) -> Option<LockedState> {
    let (_, backend) = load_backend(meta, view, args, false, diags)?;
    let workspace = current_workspace(meta, diags)?;
    LockedState::open(meta, backend.as_ref(), args, &workspace, operation, diags)
}
