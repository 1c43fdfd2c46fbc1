//! `mantle state mv`.

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
    /// Only report what would be moved.
    #[arg(long = "dry-run")]
    dry_run: bool,
    addrs: Vec<String>,
}

fn parse_pair(addrs: &[String]) -> Result<(ResourceAddr, ResourceAddr), Diagnostic> {
    let [src, dst] = addrs else {
        return Err(Diagnostic::error(
            "Invalid number of arguments",
            "Exactly two arguments expected: the source and the destination address.",
        ));
    };
    let parse = |raw: &str, which: &str| {
        ResourceAddr::parse(raw).map_err(|e| Diagnostic::error(format!("Invalid {which} address"), e.to_string()))
    };
    Ok((parse(src, "source")?, parse(dst, "target")?))
}

/// The `state mv` command.
#[derive(Debug)]
pub struct StateMvCommand {
    meta: Meta,
}

impl StateMvCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for StateMvCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let state_view = HumanState::new(view.clone());
        let parsed = parse_flags::<Flags>(&args).and_then(|flags| {
            let pair = parse_pair(&flags.addrs)?;
            Ok((flags, pair))
        });
        let (flags, (src, dst)) = match parsed {
            Ok(parsed) => parsed,
            Err(diag) => {
                state_view.diagnostics(Diagnostics::single(diag));
                state_view.help_prompt("state mv");
                return 1;
            }
        };

        let mut diags = self.meta.startup_diagnostics();
        let Some(mut locked) = open_state(&self.meta, &view, &flags.state, "OperationTypeStateMv", &mut diags) else {
            state_view.diagnostics(diags);
            return 1;
        };
        let mut state = locked.state().cloned().unwrap_or_default();
        match state.move_resource(&src, &dst) {
            Ok(()) if flags.dry_run => state_view.moved(&src, &dst, true),
            Ok(()) => {
                if locked.save(state, &mut diags) {
                    state_view.moved(&src, &dst, false);
                }
            }
            Err(e) => diags.push(Diagnostic::error("Invalid move", e.to_string())),
        }
        locked.close(&mut diags);
        let code = exit_code(&diags);
        state_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        format!(
            "\
Usage: mantle [global options] state mv [options] SOURCE DESTINATION

  This command will move an item matched by the address given to the
  destination address. This can be used for simple resource renaming.

  This command writes a backup of the previous state next to the state
  file unless --backup=- is given.

Options:

  --dry-run                If set, prints out what would've been moved but
                           doesn't actually move anything.

{STATE_OPTIONS_HELP}"
        )
    }

    fn synopsis(&self) -> &'static str {
        "Move an item in the state"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_source_and_destination() {
        let err = parse_pair(&["test_instance.a".into()]).expect_err("one address");
        assert_eq!(err.summary, "Invalid number of arguments");
        let err = parse_pair(&["test_instance.a".into(), "nope".into()]).expect_err("bad target");
        assert_eq!(err.summary, "Invalid target address");
        let (src, dst) = parse_pair(&["test_instance.a".into(), "test_instance.b".into()]).expect("pair");
        assert_eq!(src.name, "a");
        assert_eq!(dst.name, "b");
    }
}
