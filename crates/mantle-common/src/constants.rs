//! System-wide constants and default paths.

use std::path::PathBuf;

/// Application name used in CLI output and state files.
pub const APP_NAME: &str = "mantle";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "mantle";

/// Version string reported by `mantle version` and recorded in state files.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension for Mantle configuration files.
pub const CONFIG_EXTENSION: &str = ".mtl";

/// Default state file for the `default` workspace of the local backend.
pub const DEFAULT_STATE_FILE: &str = "mantle.state";

/// Directory holding the state of non-default workspaces.
pub const WORKSPACE_STATE_DIR: &str = "mantle.state.d";

/// Suffix appended to a state path to form its backup path.
pub const BACKUP_SUFFIX: &str = ".backup";

/// Suffix appended to a state path to form its lock-info path.
pub const LOCK_INFO_SUFFIX: &str = ".lock.info";

/// File extension for variables files.
pub const VARS_EXTENSION: &str = ".mvars";

/// Variables file loaded automatically from the configuration directory.
pub const DEFAULT_VARS_FILE: &str = "mantle.mvars";

/// Suffix of additional variables files loaded automatically.
pub const AUTO_VARS_SUFFIX: &str = ".auto.mvars";

/// Default name of the per-working-directory data directory.
pub const DEFAULT_DATA_DIR: &str = ".mantle";

/// File inside the data directory recording the selected workspace.
pub const ENVIRONMENT_FILE: &str = "environment";

/// File inside the data directory recording the initialised backend.
pub const BACKEND_FILE: &str = "backend.json";

/// Provider selection lock file written next to the configuration.
pub const DEPENDENCY_LOCK_FILE: &str = ".mantle.lock.json";

/// Name of the workspace that always exists.
pub const DEFAULT_WORKSPACE: &str = "default";

/// Limit on concurrent provider operations while walking the graph.
pub const DEFAULT_PARALLELISM: usize = 10;

/// Current version of the on-disk state format.
pub const STATE_FORMAT_VERSION: u32 = 4;

/// Current version of the on-disk plan file format.
pub const PLAN_FORMAT_VERSION: u32 = 1;

/// Prefix of environment variables that set input variables.
pub const VAR_ENV_PREFIX: &str = "MANTLE_VAR_";

/// Environment variable overriding the selected workspace.
pub const WORKSPACE_ENV: &str = "MANTLE_WORKSPACE";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "MANTLE_DATA_DIR";

/// Environment variable hinting that Mantle runs under automation.
pub const IN_AUTOMATION_ENV: &str = "MANTLE_IN_AUTOMATION";

/// Environment variable carrying the default state encryption passphrase.
pub const ENCRYPTION_PASSPHRASE_ENV: &str = "MANTLE_ENCRYPTION_PASSPHRASE";

/// Environment variable pointing at the CLI configuration file.
pub const CLI_CONFIG_FILE_ENV: &str = "MANTLE_CLI_CONFIG_FILE";

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "MANTLE_LOG";

/// Environment variable selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "MANTLE_LOG_FORMAT";

/// Default CLI configuration file name inside the home directory.
pub const CLI_CONFIG_FILE: &str = ".mantlerc.yml";

/// Returns the default location of the CLI configuration file, if a home
/// directory can be determined.
pub fn default_cli_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CLI_CONFIG_FILE))
}

/// Returns the backup path for a state file.
pub fn backup_path_for(state_path: &std::path::Path) -> PathBuf {
    let mut os = state_path.as_os_str().to_owned();
    os.push(BACKUP_SUFFIX);
    PathBuf::from(os)
}

/// Returns the lock-info path for a state file.
pub fn lock_info_path_for(state_path: &std::path::Path) -> PathBuf {
    let mut os = state_path.as_os_str().to_owned();
    os.push(LOCK_INFO_SUFFIX);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn backup_path_appends_suffix() {
        let p = backup_path_for(Path::new("dir/mantle.state"));
        assert_eq!(p, PathBuf::from("dir/mantle.state.backup"));
    }

    #[test]
    fn cli_config_lives_in_home_dir() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(default_cli_config_path(), Some(home.join(CLI_CONFIG_FILE)));
        }
    }

    #[test]
    fn lock_info_path_appends_suffix() {
        let p = lock_info_path_for(Path::new("mantle.state"));
        assert_eq!(p, PathBuf::from("mantle.state.lock.info"));
    }
}
