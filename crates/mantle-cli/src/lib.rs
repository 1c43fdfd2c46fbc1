//! # mantle-cli
//!
//! The `mantle` command-line front end.
//!
//! Handles:
//! - **Dispatch**: Mapping command names to [`commands::Command`]
//!   implementations.
//! - **Arguments**: Parsing flags into typed option structs.
//! - **Views**: Rendering results for people or as JSON.
//! - **Meta**: State shared by every command.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod arguments;
pub mod commands;
pub mod meta;
pub mod streams;
pub mod views;

pub use meta::Meta;
pub use streams::Streams;

use std::fmt::Write as _;

use mantle_common::constants::BIN_NAME;

use crate::commands::{RUN_RESULT_HELP, registry};

/// Exit code for an unknown command.
pub const EXIT_UNKNOWN_COMMAND: i32 = 127;

/// Runs the command named by `args` and returns the exit code.
///
/// The longest registered name matching the leading arguments wins, so
/// `state rm` is found before `state`.
pub fn run(meta: &Meta, args: Vec<String>) -> i32 {
    let mut args = args;
    if args.first().is_some_and(|a| a == "--version" || a == "-v") {
        args[0] = "version".to_string();
    }
    let registry = registry();

    let mut matched = None;
    for words in (1..=2).rev() {
        if args.len() < words {
            continue;
        }
        let name = args[..words].join(" ");
        if let Some((key, factory)) = registry.get_key_value(name.as_str()) {
            matched = Some((*key, *factory, words));
            break;
        }
    }
    let Some((name, factory, words)) = matched else {
        if let Some(first) = args.first().filter(|a| !a.starts_with('-')) {
            meta.streams()
                .stderr
                .println(&format!("{BIN_NAME}: '{first}' is not a {BIN_NAME} command.\n"));
        }
        meta.streams().stderr.print(&top_level_help(meta));
        return EXIT_UNKNOWN_COMMAND;
    };

    let rest: Vec<String> = args.split_off(words);
    let mut command = factory(meta);
    if rest.iter().any(|a| a == "--help" || a == "-h") {
        meta.streams().stdout.print(&command.help());
        return 0;
    }
    tracing::debug!(command = name, "running command");
    let code = command.run(rest);
    if code == RUN_RESULT_HELP {
        meta.streams().stderr.print(&command.help());
        return 1;
    }
    code
}

/// Usage text listing every command.
pub fn top_level_help(meta: &Meta) -> String {
    let registry = registry();
    let width = registry.keys().map(|k| k.len()).max().unwrap_or(0);
    let mut text = format!("Usage: {BIN_NAME} [--chdir=DIR] <command> [args]\n\nAvailable commands:\n");
    for (name, factory) in &registry {
        if name.contains(' ') {
            continue;
        }
        let synopsis = factory(meta).synopsis();
        let _ = writeln!(text, "  {name:<width$}  {synopsis}");
    }
    text.push_str("\nGlobal options:\n  --chdir=DIR   Switch to a different working directory before running\n  --help        Show this help output, or the help for a command\n  --version     Show the current Mantle version\n");
    text
}
