//! CLI configuration file model.
//!
//! The file is YAML, found at `$MANTLE_CLI_CONFIG_FILE` or
//! `$HOME/.mantlerc.yml`. A missing file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;

/// User-level settings shared by every command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Disable colored output for every command.
    pub no_color: bool,
    /// Default operation parallelism when `--parallelism` is not given.
    pub parallelism: Option<usize>,
    /// Directory recorded by `init` as the provider plugin cache.
    pub plugin_cache_dir: Option<PathBuf>,
    /// Accepted for compatibility; has no effect.
    pub disable_checkpoint: bool,
}

impl CliConfig {
    /// Loads the configuration from `path`.
    ///
    /// A missing file yields the defaults. A malformed file yields the
    /// defaults plus a warning diagnostic, so a broken rc file never blocks
    /// a command.
    pub fn load(path: &Path) -> (Self, Option<Diagnostic>) {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no CLI configuration file");
                return (Self::default(), None);
            }
            Err(e) => {
                return (
                    Self::default(),
                    Some(Diagnostic::warning(
                        "Unable to read CLI configuration",
                        format!("Could not read {}: {e}", path.display()),
                    )),
                );
            }
        };
        if content.trim().is_empty() {
            return (Self::default(), None);
        }
        match serde_yaml::from_str::<Self>(&content) {
            Ok(cfg) => {
                tracing::debug!(path = %path.display(), "loaded CLI configuration");
                (cfg, None)
            }
            Err(e) => (
                Self::default(),
                Some(Diagnostic::warning(
                    "Invalid CLI configuration",
                    format!("Ignoring {}: {e}", path.display()),
                )),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (cfg, diag) = CliConfig::load(&dir.path().join("nope.yml"));
        assert_eq!(cfg, CliConfig::default());
        assert!(diag.is_none());
    }

    #[test]
    fn parses_yaml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rc.yml");
        std::fs::write(&path, "no_color: true\nparallelism: 4\n").expect("write");
        let (cfg, diag) = CliConfig::load(&path);
        assert!(diag.is_none());
        assert!(cfg.no_color);
        assert_eq!(cfg.parallelism, Some(4));
    }

    #[test]
    fn malformed_file_warns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rc.yml");
        std::fs::write(&path, "bogus_key: [1, 2\n").expect("write");
        let (cfg, diag) = CliConfig::load(&path);
        assert_eq!(cfg, CliConfig::default());
        assert!(diag.is_some_and(|d| !d.is_error()));
    }
}
