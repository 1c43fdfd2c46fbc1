//! `mantle version` — print the Mantle and provider versions.

use std::collections::BTreeMap;

use clap::Parser;
use mantle_common::constants::VERSION;
use mantle_common::diagnostics::Diagnostics;
use serde_json::json;

use super::init::DependencyLock;
use super::{Command, base_view};
use crate::arguments::parse_flags;
use crate::meta::Meta;

#[derive(Debug, Parser)]
struct Flags {
    /// Machine-readable output.
    #[arg(long)]
    json: bool,
}

/// `os_arch` of the running binary.
fn platform() -> String {
    format!("{}_{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// The `version` command.
#[derive(Debug)]
pub struct VersionCommand {
    meta: Meta,
}

impl VersionCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for VersionCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let flags = match parse_flags::<Flags>(&args) {
            Ok(flags) => flags,
            Err(diag) => {
                view.diagnostics(Diagnostics::single(diag));
                view.help_prompt("version");
                return 1;
            }
        };
        // An unreadable lock file only hides the provider list.
        let selections: BTreeMap<String, String> = DependencyLock::load(self.meta.working_dir())
            .map(|lock| lock.providers.into_iter().map(|(name, p)| (name, p.version)).collect())
            .unwrap_or_default();

        if flags.json {
            let doc = json!({
                "mantle_version": VERSION,
                "platform": platform(),
                "provider_selections": selections,
            });
            let text = serde_json::to_string_pretty(&doc).unwrap_or_default();
            view.stdout().println(&text);
            return 0;
        }
        let out = view.stdout();
        out.println(&format!("Mantle v{VERSION}"));
        out.println(&format!("on {}", platform()));
        for (name, version) in &selections {
            out.println(&format!("+ provider {name} v{version}"));
        }
        0
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] version [options]

  Displays the version of Mantle and all installed plugins.

Options:

  --json       Output the version information as a JSON object.
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "Show the current Mantle version"
    }
}
