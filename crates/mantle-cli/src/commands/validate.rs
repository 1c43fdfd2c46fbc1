//! `mantle validate` — check the configuration without touching state.

use super::{Command, VIEW_OPTIONS_HELP, base_view};
use crate::arguments::validate::parse_validate;
use crate::meta::Meta;
use crate::views::validate::new_validate_view;

/// The `validate` command.
#[derive(Debug)]
pub struct ValidateCommand {
    meta: Meta,
}

impl ValidateCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for ValidateCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let (args, mut diags) = parse_validate(&args);
        let validate_view = new_validate_view(args.view_type, &view);
        if diags.has_errors() {
            validate_view.diagnostics(diags);
            return 1;
        }

        let (config, config_diags) = self.meta.load_config(false);
        view.set_sources(config.sources.clone());
        let failed = config_diags.has_errors();
        diags.append(config_diags);
        if !failed {
            diags.append(self.meta.context(self.meta.default_parallelism()).validate(&config));
        }
        validate_view.results(diags)
    }

    fn help(&self) -> String {
        format!(
            "\
Usage: mantle [global options] validate [options]

  Validate the configuration files in a directory, referring only to the
  configuration and not accessing any remote services such as remote state
  or provider APIs.

  Validate runs checks that verify whether a configuration is syntactically
  valid and internally consistent, regardless of any provided variables or
  existing state.

Options:

  --json                   Produce output in a machine-readable JSON format.

{VIEW_OPTIONS_HELP}"
        )
    }

    fn synopsis(&self) -> &'static str {
        "Check whether the configuration is valid"
    }
}
