//! `mantle import` — bring an existing remote object under management.

use super::{
    Command, LockedState, STATE_OPTIONS_HELP, VARS_OPTIONS_HELP, VIEW_OPTIONS_HELP, base_view, current_workspace,
    exit_code, load_backend,
};
use crate::arguments::import::parse_import;
use crate::meta::Meta;
use crate::views::import::{HumanImport, ImportView};

/// The `import` command.
#[derive(Debug)]
pub struct ImportCommand {
    meta: Meta,
}

impl ImportCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for ImportCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let import_view = HumanImport::new(view.clone());
        let (args, mut diags) = parse_import(args);
        diags.append(self.meta.startup_diagnostics());
        let Some(addr) = args.addr.clone().filter(|_| !diags.has_errors()) else {
            import_view.diagnostics(diags);
            import_view.help_prompt("import");
            return 1;
        };

        let Some((config, backend)) = load_backend(&self.meta, &view, &args.state, true, &mut diags) else {
            import_view.diagnostics(diags);
            return 1;
        };
        let Some(workspace) = current_workspace(&self.meta, &mut diags) else {
            import_view.diagnostics(diags);
            return 1;
        };
        // Only validated here: importing evaluates no expressions.
        let (_variables, var_diags) = self.meta.collect_variables(&config, &args.vars);
        let failed = var_diags.has_errors();
        diags.append(var_diags);
        if failed {
            import_view.diagnostics(diags);
            return 1;
        }

        let Some(mut locked) = LockedState::open(
            &self.meta,
            backend.as_ref(),
            &args.state,
            &workspace,
            "OperationTypeImport",
            &mut diags,
        ) else {
            import_view.diagnostics(diags);
            return 1;
        };

        import_view.importing(&addr, &args.id);
        let ctx = self.meta.context(self.meta.default_parallelism());
        let (new_state, import_diags) = ctx.import(&config, locked.state(), &addr, &args.id);
        diags.append(import_diags);
        let saved = match new_state {
            Some(state) if !diags.has_errors() => locked.save(state, &mut diags),
            _ => false,
        };
        locked.close(&mut diags);
        if saved && !diags.has_errors() {
            import_view.success(&addr);
        }
        let code = exit_code(&diags);
        import_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        format!(
            "\
Usage: mantle [global options] import [options] ADDR ID

  Import existing infrastructure into your Mantle state.

  This will find and import the specified resource into your Mantle
  state, allowing existing infrastructure to come under Mantle
  management without having to be initially created by Mantle.

  The ADDR specified is the address to import the resource to. A resource
  block for the address must already exist in the configuration.

  The ID is a resource-specific ID to identify that resource being imported.
  Please reference the documentation for the resource type you're importing
  to determine the ID syntax to use.

  This command will not modify your infrastructure, but it will make
  network requests to inspect parts of your infrastructure relevant to
  the resource being imported.

Options:

{VARS_OPTIONS_HELP}
{STATE_OPTIONS_HELP}
{VIEW_OPTIONS_HELP}"
        )
    }

    fn synopsis(&self) -> &'static str {
        "Associate existing infrastructure with a Mantle resource"
    }
}
