//! `mantle state list`.

use clap::Parser;
use mantle_common::diagnostics::Diagnostics;
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
    /// Only list resources whose `id` attribute matches.
    #[arg(long)]
    id: Option<String>,
    addrs: Vec<String>,
}

/// Returns true if `addr` is selected by `filter`, which is either a full
/// address or a resource type prefix such as `test_instance` or
/// `data.test_source`.
fn matches(addr: &ResourceAddr, filter: &str) -> bool {
    let text = addr.to_string();
    text == filter || text.strip_prefix(filter).is_some_and(|rest| rest.starts_with('.'))
}

/// The `state list` command.
#[derive(Debug)]
pub struct StateListCommand {
    meta: Meta,
}

impl StateListCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for StateListCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let state_view = HumanState::new(view.clone());
        let flags = match parse_flags::<Flags>(&args) {
            Ok(flags) => flags,
            Err(diag) => {
                state_view.diagnostics(Diagnostics::single(diag));
                state_view.help_prompt("state list");
                return 1;
            }
        };
        let mut diags = self.meta.startup_diagnostics();
        let read_only = arguments::State {
            lock: false,
            ..flags.state
        };
        let Some(locked) = open_state(&self.meta, &view, &read_only, "OperationTypeStateList", &mut diags) else {
            state_view.diagnostics(diags);
            return 1;
        };
        let addrs: Vec<ResourceAddr> = locked.state().map_or_else(Vec::new, |state| {
            state
                .resources
                .iter()
                .filter(|r| flags.id.as_deref().is_none_or(|id| r.id() == Some(id)))
                .map(mantle_state::ResourceState::addr)
                .filter(|addr| flags.addrs.is_empty() || flags.addrs.iter().any(|f| matches(addr, f)))
                .collect()
        });
        locked.close(&mut diags);
        state_view.list(&addrs);
        let code = exit_code(&diags);
        state_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        format!(
            "\
Usage: mantle [global options] state list [options] [address...]

  List resources in the Mantle state.

  This command lists resource instances in the Mantle state. The address
  argument can be used to filter the instances by resource, by resource
  type or by data source.

  If no addresses are given, all resources are listed.

Options:

  --id=ID                  Filters the results to include only instances whose
                           resource types have an attribute named \"id\" whose
                           value equals the given id string.

{STATE_OPTIONS_HELP}"
        )
    }

    fn synopsis(&self) -> &'static str {
        "List resources in the state"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_address_or_type() {
        let addr = ResourceAddr::managed("test_instance", "web");
        assert!(matches(&addr, "test_instance.web"));
        assert!(matches(&addr, "test_instance"));
        assert!(!matches(&addr, "test_inst"));
        assert!(!matches(&addr, "test_instance.db"));
        let data = ResourceAddr::data("test_source", "x");
        assert!(matches(&data, "data.test_source"));
        assert!(!matches(&data, "test_source"));
    }
}
