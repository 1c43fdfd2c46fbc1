//! State shared by every command.
//!
//! Handles:
//! - **Environment**: Working and data directories, captured environment
//!   variables, the CLI configuration file.
//! - **Configuration**: Loading the configuration directory and collecting
//!   input variables from every source.
//! - **Backend**: Resolving encryption and the configured backend.
//! - **Workspace**: Reading and recording the selected workspace.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use mantle_backend::{Backend, backend_from_config, check_initialized};
use mantle_common::config::CliConfig;
use mantle_common::constants::{
    AUTO_VARS_SUFFIX, BIN_NAME, CLI_CONFIG_FILE_ENV, DATA_DIR_ENV, DEFAULT_DATA_DIR, DEFAULT_PARALLELISM,
    DEFAULT_VARS_FILE, DEFAULT_WORKSPACE, ENCRYPTION_PASSPHRASE_ENV, ENVIRONMENT_FILE, IN_AUTOMATION_ENV,
    VAR_ENV_PREFIX, WORKSPACE_ENV, default_cli_config_path,
};
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::types::is_valid_workspace_name;
use mantle_common::value::Value;
use mantle_config::vars::{parse_raw_value, parse_var_file};
use mantle_config::{Config, load_dir};
use mantle_engine::provider::builtin_providers;
use mantle_engine::{Context, ProviderMap, variables};
use mantle_state::{Encryption, Locker, NoopLocker, StateLocker};

use crate::arguments::{self, VarItem, Vars, ViewArgs};
use crate::streams::Streams;
use crate::views::View;

/// Builds the providers available in a configuration directory.
pub type ProviderFactory = Arc<dyn Fn(&Path) -> ProviderMap + Send + Sync>;

/// Builds a backend, replacing the configured one.
pub type BackendFactory = Arc<dyn Fn() -> Box<dyn Backend> + Send + Sync>;

/// Shared command state.
#[derive(Clone)]
pub struct Meta {
    streams: Streams,
    working_dir: PathBuf,
    data_dir: PathBuf,
    env: BTreeMap<String, String>,
    cli_config: CliConfig,
    cli_config_warning: Option<Diagnostic>,
    providers: ProviderFactory,
    backend: Option<BackendFactory>,
    in_automation: bool,
    stop: Arc<AtomicBool>,
}

impl std::fmt::Debug for Meta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Meta")
            .field("working_dir", &self.working_dir)
            .field("data_dir", &self.data_dir)
            .field("cli_config", &self.cli_config)
            .finish_non_exhaustive()
    }
}

impl Meta {
    /// Creates the state for a process running in `working_dir`.
    ///
    /// `env` is the process environment; the CLI configuration file is
    /// located through it.
    pub fn new(working_dir: impl Into<PathBuf>, streams: Streams, env: BTreeMap<String, String>) -> Self {
        let config_path = env
            .get(CLI_CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .or_else(default_cli_config_path);
        let (cli_config, cli_config_warning) = config_path.map_or_else(|| (CliConfig::default(), None), |p| CliConfig::load(&p));
        let mut meta = Self::for_testing(working_dir, streams, env);
        meta.cli_config = cli_config;
        meta.cli_config_warning = cli_config_warning;
        meta
    }

    /// Creates the state without reading any CLI configuration file.
    pub fn for_testing(working_dir: impl Into<PathBuf>, streams: Streams, env: BTreeMap<String, String>) -> Self {
        let working_dir = working_dir.into();
        let data_dir = env
            .get(DATA_DIR_ENV)
            .filter(|d| !d.is_empty())
            .map_or_else(|| working_dir.join(DEFAULT_DATA_DIR), |d| working_dir.join(d));
        let in_automation = env.get(IN_AUTOMATION_ENV).is_some_and(|v| !v.is_empty());
        Self {
            streams,
            working_dir,
            data_dir,
            env,
            cli_config: CliConfig::default(),
            cli_config_warning: None,
            providers: Arc::new(builtin_providers),
            backend: None,
            in_automation,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the provider factory.
    #[must_use]
    pub fn with_providers(mut self, providers: ProviderFactory) -> Self {
        self.providers = providers;
        self
    }

    /// Uses the given backend instead of the configured one.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendFactory) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Uses the given CLI configuration.
    #[must_use]
    pub fn with_cli_config(mut self, config: CliConfig) -> Self {
        self.cli_config = config;
        self
    }

    /// The streams.
    pub const fn streams(&self) -> &Streams {
        &self.streams
    }

    /// Directory holding the configuration.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Directory for Mantle's own files, `.mantle` by default.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// A captured environment variable.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    /// The CLI configuration.
    pub const fn cli_config(&self) -> &CliConfig {
        &self.cli_config
    }

    /// Flag set when the user interrupts the process.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Parallelism when `--parallelism` is not given.
    pub fn default_parallelism(&self) -> usize {
        self.cli_config.parallelism.unwrap_or(DEFAULT_PARALLELISM)
    }

    /// Builds the base view for a command.
    pub fn view(&self, args: ViewArgs) -> View {
        View::new(self.streams.clone(), args, self.cli_config.no_color, self.in_automation)
    }

    /// Warnings collected before any command ran.
    pub fn startup_diagnostics(&self) -> Diagnostics {
        self.cli_config_warning.clone().into_iter().collect()
    }

    /// The providers of the working directory.
    pub fn providers(&self) -> ProviderMap {
        (self.providers)(&self.working_dir)
    }

    /// An engine context with the working directory's providers.
    pub fn context(&self, parallelism: usize) -> Context {
        Context::new(self.providers())
            .with_parallelism(parallelism)
            .with_stop_flag(self.stop_flag())
    }

    /// Loads the configuration directory.
    ///
    /// With `required`, a directory without configuration files is an
    /// error.
    pub fn load_config(&self, required: bool) -> (Config, Diagnostics) {
        let (config, mut diags) = load_dir(&self.working_dir);
        if required && config.is_empty() && !diags.has_errors() {
            diags.push(Diagnostic::error(
                "No configuration files",
                format!(
                    "This command requires configuration to be present. The directory {} contains no Mantle configuration files.",
                    self.working_dir.display()
                ),
            ));
        }
        (config, diags)
    }

    /// Resolves state encryption for a configuration.
    ///
    /// An `encryption` block names the environment variable holding the
    /// passphrase; without one, `MANTLE_ENCRYPTION_PASSPHRASE` is used if
    /// set.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic if the configured passphrase variable is unset
    /// or the key cannot be derived.
    pub fn encryption_for_config(&self, config: &Config) -> Result<Encryption, Diagnostic> {
        let passphrase = match &config.encryption {
            Some(block) => match self.env_var(&block.passphrase_env).filter(|p| !p.is_empty()) {
                Some(p) => p,
                None => {
                    return Err(Diagnostic::error(
                        "Encryption passphrase not set",
                        format!(
                            "State encryption is configured, but the environment variable {} holding the passphrase is not set.",
                            block.passphrase_env
                        ),
                    )
                    .with_subject(block.range.clone()));
                }
            },
            None => match self.env_var(ENCRYPTION_PASSPHRASE_ENV).filter(|p| !p.is_empty()) {
                Some(p) => p,
                None => return Ok(Encryption::Disabled),
            },
        };
        Encryption::from_passphrase(passphrase).map_err(Diagnostic::from)
    }

    /// The backend for a configuration, after checking that it was
    /// initialized.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic if `init` is needed or the backend settings are
    /// invalid.
    pub fn backend_for_config(
        &self,
        config: &Config,
        state: &arguments::State,
        encryption: Encryption,
    ) -> Result<Box<dyn Backend>, Diagnostic> {
        if let Some(factory) = &self.backend {
            return Ok(factory());
        }
        check_initialized(config.backend(), &self.data_dir)?;
        self.backend_unchecked(config, state, encryption)
    }

    /// The backend for a configuration, without the initialization check.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic if the backend settings are invalid.
    pub fn backend_unchecked(
        &self,
        config: &Config,
        state: &arguments::State,
        encryption: Encryption,
    ) -> Result<Box<dyn Backend>, Diagnostic> {
        if let Some(factory) = &self.backend {
            return Ok(factory());
        }
        backend_from_config(config.backend(), &self.working_dir, state.backend_opts(encryption))
            .map_err(|e| Diagnostic::from(e).with_optional_subject(config.backend().map(|b| b.range.clone())))
    }

    /// Locker honouring `--lock` and `--lock-timeout`.
    pub fn state_locker(&self, state: &arguments::State) -> Box<dyn StateLocker> {
        if state.lock {
            Box::new(Locker::new(state.lock_timeout))
        } else {
            Box::new(NoopLocker)
        }
    }

    /// Collects input variables and resolves them against the declared
    /// ones.
    ///
    /// Later sources win: `MANTLE_VAR_*` environment variables, then
    /// `mantle.mvars`, then `*.auto.mvars` files in name order, then the
    /// command-line items in order.
    pub fn collect_variables(&self, config: &Config, vars: &Vars) -> (BTreeMap<String, Value>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut inputs: BTreeMap<String, Value> = BTreeMap::new();

        for (key, raw) in &self.env {
            if let Some(name) = key.strip_prefix(VAR_ENV_PREFIX) {
                if config.variable(name).is_some() {
                    let _ = inputs.insert(name.to_string(), parse_raw_value(raw));
                }
            }
        }

        let mut files = Vec::new();
        let default_file = self.working_dir.join(DEFAULT_VARS_FILE);
        if default_file.is_file() {
            files.push(default_file);
        }
        files.extend(self.auto_var_files());
        for path in &files {
            self.merge_var_file(config, path, &mut inputs, &mut diags);
        }

        for item in &vars.items {
            match item {
                VarItem::Var { name, raw } => {
                    if config.variable(name).is_none() {
                        diags.push(Diagnostic::error(
                            "Value for undeclared variable",
                            format!(
                                "A variable named \"{name}\" was assigned on the command line, but the root module does not declare a variable of that name. To use this value, add a \"variable\" block to the configuration."
                            ),
                        ));
                        continue;
                    }
                    let _ = inputs.insert(name.clone(), parse_raw_value(raw));
                }
                VarItem::File(path) => {
                    let path = self.working_dir.join(path);
                    self.merge_var_file(config, &path, &mut inputs, &mut diags);
                }
            }
        }
        if diags.has_errors() {
            return (BTreeMap::new(), diags);
        }

        let (values, resolve_diags) = variables::resolve(config, &inputs);
        diags.append(resolve_diags);
        (values, diags)
    }

    fn auto_var_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.working_dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(AUTO_VARS_SUFFIX))
            })
            .collect();
        files.sort();
        files
    }

    fn merge_var_file(
        &self,
        config: &Config,
        path: &Path,
        inputs: &mut BTreeMap<String, Value>,
        diags: &mut Diagnostics,
    ) {
        match parse_var_file(path) {
            Ok(values) => {
                for (name, value) in values {
                    if config.variable(&name).is_none() {
                        diags.push(Diagnostic::warning(
                            "Value for undeclared variable",
                            format!(
                                "The root module does not declare a variable named \"{name}\" but a value was found in file \"{}\". To use this value, add a \"variable\" block to the configuration.",
                                path.strip_prefix(&self.working_dir).unwrap_or(path).display()
                            ),
                        ));
                        continue;
                    }
                    let _ = inputs.insert(name, value);
                }
            }
            Err(errs) => diags.append(errs),
        }
    }

    /// Returns true if `MANTLE_WORKSPACE` selects the workspace.
    pub fn workspace_overridden(&self) -> bool {
        self.env_var(WORKSPACE_ENV).is_some_and(|w| !w.is_empty())
    }

    /// The selected workspace.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic if the recorded name cannot be read or is
    /// invalid.
    pub fn workspace(&self) -> Result<String, Diagnostic> {
        if let Some(ws) = self.env_var(WORKSPACE_ENV).filter(|w| !w.is_empty()) {
            if !is_valid_workspace_name(ws) {
                return Err(Diagnostic::error(
                    "Invalid workspace name",
                    format!(
                        "The workspace name {ws:?} given in the {WORKSPACE_ENV} environment variable is not allowed. The name must contain only URL safe characters, and no path separators."
                    ),
                ));
            }
            return Ok(ws.to_string());
        }
        let path = self.data_dir.join(ENVIRONMENT_FILE);
        let name = match std::fs::read_to_string(&path) {
            Ok(content) => content.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(DEFAULT_WORKSPACE.to_string()),
            Err(e) => {
                return Err(Diagnostic::error(
                    "Failed to read selected workspace",
                    format!("Could not read {}: {e}", path.display()),
                ));
            }
        };
        if name.is_empty() {
            return Ok(DEFAULT_WORKSPACE.to_string());
        }
        if !is_valid_workspace_name(&name) {
            return Err(Diagnostic::error(
                "Invalid selected workspace",
                format!(
                    "The workspace name {name:?} recorded in {} is not valid. Run \"{BIN_NAME} workspace select\" to choose another workspace.",
                    path.display()
                ),
            ));
        }
        Ok(name)
    }

    /// Records the selected workspace.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic if the data directory cannot be written.
    pub fn set_workspace(&self, name: &str) -> Result<(), Diagnostic> {
        let failed = |e: std::io::Error| {
            Diagnostic::error(
                "Failed to select workspace",
                format!("Could not record the selected workspace in {}: {e}", self.data_dir.display()),
            )
        };
        std::fs::create_dir_all(&self.data_dir).map_err(failed)?;
        std::fs::write(self.data_dir.join(ENVIRONMENT_FILE), format!("{name}\n")).map_err(failed)?;
        tracing::debug!(workspace = name, "workspace selected");
        Ok(())
    }

    /// Asks a yes/no question on stdin. Only `yes` approves.
    pub fn confirm(&self, prompt: &str) -> bool {
        self.streams.stdout.print(&format!("\n{prompt}\n\n  Enter a value: "));
        let answer = self.streams.read_line();
        self.streams.stdout.println("");
        answer.is_some_and(|a| a.trim() == "yes")
    }
}
