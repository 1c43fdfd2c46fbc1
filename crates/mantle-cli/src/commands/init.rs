//! `mantle init` — prepare a working directory.
//!
//! Handles:
//! - creating the data directory
//! - recording the configured backend (`--reconfigure` replaces a changed one)
//! - selecting built-in providers into the dependency lock file

use std::collections::BTreeMap;
use std::path::Path;

use clap::{ArgAction, Parser};
use mantle_backend::BackendRecord;
use mantle_common::constants::DEPENDENCY_LOCK_FILE;
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_config::Config;
use mantle_state::Encryption;
use serde::{Deserialize, Serialize};

use super::{Command, VIEW_OPTIONS_HELP, base_view, exit_code};
use crate::arguments::{self, ViewType, mentions_json, parse_flags};
use crate::meta::Meta;
use crate::views::init::{InitMessage, InitView, new_init_view};

#[derive(Debug, Parser)]
struct Flags {
    /// Configure the backend.
    #[arg(long, default_value_t = true, num_args = 0..=1, require_equals = true,
        default_missing_value = "true", action = ArgAction::Set)]
    backend: bool,
    /// Ignore the recorded backend and use the configured one.
    #[arg(long)]
    reconfigure: bool,
    /// Machine-readable output.
    #[arg(long)]
    json: bool,
}

/// A provider pinned in the dependency lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedProvider {
    /// Selected version.
    pub version: String,
}

/// Contents of `.mantle.lock.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyLock {
    /// Selected providers by name.
    #[serde(default)]
    pub providers: BTreeMap<String, LockedProvider>,
}

impl DependencyLock {
    /// Reads the lock file in `dir`; a missing file is an empty lock.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic if the file exists but is unreadable or invalid.
    pub fn load(dir: &Path) -> Result<Self, Diagnostic> {
        let path = dir.join(DEPENDENCY_LOCK_FILE);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(Diagnostic::error(
                    "Failed to read dependency lock file",
                    format!("Error reading {}: {e}", path.display()),
                ));
            }
        };
        serde_json::from_slice(&data).map_err(|e| {
            Diagnostic::error(
                "Invalid dependency lock file",
                format!("{} is not a valid lock file: {e}", path.display()),
            )
        })
    }

    /// Writes the lock file into `dir`.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic if the file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<(), Diagnostic> {
        let path = dir.join(DEPENDENCY_LOCK_FILE);
        let write_err = |e: String| {
            Diagnostic::error(
                "Failed to write dependency lock file",
                format!("Error writing {}: {e}", path.display()),
            )
        };
        let mut data = serde_json::to_vec_pretty(self).map_err(|e| write_err(e.to_string()))?;
        data.push(b'\n');
        std::fs::write(&path, data).map_err(|e| write_err(e.to_string()))
    }
}

/// The `init` command.
#[derive(Debug)]
pub struct InitCommand {
    meta: Meta,
}

impl InitCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }

    /// Records the configured backend after checking it can be built.
    fn init_backend(&self, config: &Config, reconfigure: bool, view: &dyn InitView, diags: &mut Diagnostics) {
        let record = BackendRecord::from_block(config.backend());
        view.message(&InitMessage::InitializingBackend(record.kind.clone()));
        let recorded = match BackendRecord::load(self.meta.data_dir()) {
            Ok(recorded) => recorded,
            Err(e) => {
                diags.push(e);
                return;
            }
        };
        if let Some(previous) = recorded.filter(|r| r.hash != record.hash) {
            if !reconfigure {
                diags.push(
                    Diagnostic::error(
                        "Backend configuration changed",
                        format!(
                            "The backend configuration has changed since the last initialization (was \"{}\", now \"{}\"). Mantle does not migrate state between backends. Run \"mantle init --reconfigure\" to use the new configuration as-is.",
                            previous.kind, record.kind
                        ),
                    )
                    .with_optional_subject(config.backend().map(|b| b.range.clone())),
                );
                return;
            }
            tracing::info!(from = %previous.kind, to = %record.kind, "reconfiguring backend");
        }
        let encryption = match self.meta.encryption_for_config(config) {
            Ok(enc) => enc,
            Err(diag) => {
                diags.push(diag);
                Encryption::Disabled
            }
        };
        if let Err(diag) = self
            .meta
            .backend_unchecked(config, &arguments::State::default(), encryption)
        {
            diags.push(diag);
            return;
        }
        match record.save(self.meta.data_dir()) {
            Ok(()) => view.message(&InitMessage::BackendConfigured(record.kind)),
            Err(e) => diags.push(e),
        }
    }

    /// Selects the providers the configuration needs and updates the lock
    /// file.
    fn init_providers(&self, config: &Config, view: &dyn InitView, diags: &mut Diagnostics) {
        view.message(&InitMessage::InitializingProviders);
        let available = self.meta.providers();
        let mut lock = DependencyLock::default();
        for name in config.required_providers() {
            match available.get(&name) {
                Some(provider) => {
                    let version = provider.version().to_string();
                    view.message(&InitMessage::ProviderSelected {
                        name: name.clone(),
                        version: version.clone(),
                    });
                    let _ = lock.providers.insert(name, LockedProvider { version });
                }
                None => diags.push(Diagnostic::error(
                    "Failed to query available provider packages",
                    format!(
                        "Could not find a provider named \"{name}\". Mantle only supports its built-in providers: {}.",
                        available.keys().cloned().collect::<Vec<_>>().join(", ")
                    ),
                )),
            }
        }
        if diags.has_errors() {
            return;
        }
        let previous = match DependencyLock::load(self.meta.working_dir()) {
            Ok(previous) => previous,
            Err(diag) => {
                diags.push(diag);
                return;
            }
        };
        if previous == lock {
            return;
        }
        match lock.save(self.meta.working_dir()) {
            Ok(()) => view.message(&InitMessage::LockFileWritten(DEPENDENCY_LOCK_FILE.to_string())),
            Err(diag) => diags.push(diag),
        }
    }
}

impl Command for InitCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let (flags, parse_err) = match parse_flags::<Flags>(&args) {
            Ok(flags) => (Some(flags), None),
            Err(diag) => (None, Some(diag)),
        };
        let view_type = ViewType::from_flag(flags.as_ref().map_or_else(|| mentions_json(&args), |f| f.json));
        let init_view = new_init_view(view_type, &view);
        let Some(flags) = flags else {
            init_view.diagnostics(parse_err.into_iter().collect());
            init_view.help_prompt("init");
            return 1;
        };

        let mut diags = self.meta.startup_diagnostics();
        if let Err(e) = std::fs::create_dir_all(self.meta.data_dir()) {
            diags.push(Diagnostic::error(
                "Failed to create data directory",
                format!("Error creating {}: {e}", self.meta.data_dir().display()),
            ));
            init_view.diagnostics(diags);
            return 1;
        }

        let (config, config_diags) = self.meta.load_config(false);
        view.set_sources(config.sources.clone());
        let failed = config_diags.has_errors();
        diags.append(config_diags);
        if failed {
            init_view.diagnostics(diags);
            return 1;
        }
        if config.is_empty() {
            diags.push(Diagnostic::simple_warning(
                "Mantle initialized in an empty directory!\n\nThe directory has no Mantle configuration files. You may begin working with Mantle immediately by creating Mantle configuration files.",
            ));
            init_view.diagnostics(diags);
            return 0;
        }

        if flags.backend {
            self.init_backend(&config, flags.reconfigure, init_view.as_ref(), &mut diags);
            if diags.has_errors() {
                init_view.diagnostics(diags);
                return 1;
            }
        }
        self.init_providers(&config, init_view.as_ref(), &mut diags);
        if !diags.has_errors() {
            init_view.message(&InitMessage::Success);
        }
        let code = exit_code(&diags);
        init_view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        format!(
            "\
Usage: mantle [global options] init [options]

  Initialize a new or existing Mantle working directory by creating
  initial files, recording the backend and selecting providers.

  This is the first command that should be run for any new or existing
  Mantle configuration per machine. This sets up all the local data
  necessary to run Mantle that is typically not committed to version
  control.

  This command is always safe to run multiple times.

Options:

  --backend=false          Disable backend initialization for this
                           configuration and use what was previously
                           initialized instead.

  --reconfigure            Reconfigure a backend, ignoring any saved
                           configuration.

  --json                   Produce output in a machine-readable JSON format.

{VIEW_OPTIONS_HELP}"
        )
    }

    fn synopsis(&self) -> &'static str {
        "Prepare your working directory for other commands"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(DependencyLock::load(dir.path()).expect("missing"), DependencyLock::default());
        let mut lock = DependencyLock::default();
        let _ = lock.providers.insert(
            "test".to_string(),
            LockedProvider {
                version: "0.1.0".to_string(),
            },
        );
        lock.save(dir.path()).expect("save");
        assert_eq!(DependencyLock::load(dir.path()).expect("load"), lock);
    }

    #[test]
    fn invalid_lock_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(DEPENDENCY_LOCK_FILE), "not json").expect("write");
        let err = DependencyLock::load(dir.path()).expect_err("invalid");
        assert_eq!(err.summary, "Invalid dependency lock file");
    }
}
