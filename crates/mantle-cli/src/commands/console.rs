//! `mantle console` — evaluate expressions against the current state.

use clap::Parser;
use mantle_common::diagnostics::Diagnostics;
use mantle_config::expr::evaluate;
use mantle_config::parser::parse_expression;

use super::{
    Command, LockedState, STATE_OPTIONS_HELP, VARS_OPTIONS_HELP, base_view, current_workspace, exit_code,
    load_backend,
};
use crate::arguments::vars::extract_vars;
use crate::arguments::{self, parse_flags};
use crate::meta::Meta;
use crate::views::console::{ConsoleView, HumanConsole};

const INPUT_NAME: &str = "<console-input>";

#[derive(Debug, Parser)]
struct Flags {
    #[command(flatten)]
    state: arguments::State,
}

/// Net count of open brackets in `text`, ignoring brackets inside quoted
/// strings. A positive result means the expression continues on the next
/// line.
fn open_brackets(text: &str) -> i64 {
    let mut depth = 0_i64;
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// The `console` command.
#[derive(Debug)]
pub struct ConsoleCommand {
    meta: Meta,
}

impl ConsoleCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for ConsoleCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let console_view = HumanConsole::new(view.clone(), self.meta.streams().stdin_is_terminal());
        let (vars, args, mut diags) = extract_vars(args);
        let flags = match parse_flags::<Flags>(&args) {
            Ok(flags) => Some(flags),
            Err(diag) => {
                diags.push(diag);
                None
            }
        };
        let Some(flags) = flags.filter(|_| !diags.has_errors()) else {
            console_view.diagnostics(diags);
            view.help_prompt("console");
            return 1;
        };
        diags.append(self.meta.startup_diagnostics());

        let Some((config, backend)) = load_backend(&self.meta, &view, &flags.state, false, &mut diags) else {
            console_view.diagnostics(diags);
            return 1;
        };
        let (variables, var_diags) = self.meta.collect_variables(&config, &vars);
        let failed = var_diags.has_errors();
        diags.append(var_diags);
        if failed {
            console_view.diagnostics(diags);
            return 1;
        }
        let Some(workspace) = current_workspace(&self.meta, &mut diags) else {
            console_view.diagnostics(diags);
            return 1;
        };
        let Some(locked) = LockedState::open(
            &self.meta,
            backend.as_ref(),
            &flags.state,
            &workspace,
            "OperationTypeConsole",
            &mut diags,
        ) else {
            console_view.diagnostics(diags);
            return 1;
        };
        if !diags.is_empty() {
            console_view.diagnostics(std::mem::take(&mut diags));
        }

        let ctx = self.meta.context(self.meta.default_parallelism());
        let scope = ctx.eval_scope(&config, locked.state(), &variables);
        let mut buffer = String::new();
        loop {
            console_view.prompt(!buffer.is_empty());
            let Some(line) = self.meta.streams().read_line() else {
                break;
            };
            if buffer.is_empty() && line.trim() == "exit" {
                break;
            }
            buffer.push_str(&line);
            buffer.push('\n');
            if open_brackets(&buffer) > 0 {
                continue;
            }
            let input = std::mem::take(&mut buffer);
            if input.trim().is_empty() {
                continue;
            }
            let result = parse_expression(INPUT_NAME, input.trim())
                .map_err(Diagnostics::single)
                .and_then(|expr| evaluate(&expr, &scope));
            match result {
                Ok(value) => console_view.result(&value.render()),
                Err(errs) => console_view.diagnostics(errs),
            }
        }

        let mut close_diags = Diagnostics::new();
        locked.close(&mut close_diags);
        let code = exit_code(&close_diags);
        console_view.diagnostics(close_diags);
        code
    }

    fn help(&self) -> String {
        format!(
            "\
Usage: mantle [global options] console [options]

  Starts an interactive console for experimenting with Mantle
  interpolations.

  This will open an interactive console that you can use to type
  interpolations into and inspect their values. This command loads the
  current state. This lets you explore and test interpolations before
  using them in future configurations.

  This command will never modify your state. Type \"exit\" or send an
  end-of-file to leave the console.

Options:

{VARS_OPTIONS_HELP}
{STATE_OPTIONS_HELP}"
        )
    }

    fn synopsis(&self) -> &'static str {
        "Try Mantle expressions at an interactive command prompt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brackets_outside_strings_are_counted() {
        assert_eq!(open_brackets("{"), 1);
        assert_eq!(open_brackets("[1, 2]"), 0);
        assert_eq!(open_brackets("\"{[(\""), 0);
        assert_eq!(open_brackets("{ a = \"\\\"}\""), 1);
        assert_eq!(open_brackets("}"), -1);
    }
}
