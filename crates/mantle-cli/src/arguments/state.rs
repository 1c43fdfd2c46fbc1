//! Flags that control state storage.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args};
use mantle_backend::BackendOpts;
use mantle_state::Encryption;

use super::parse_duration;

/// `--lock`, `--lock-timeout`, `--state`, `--state-out` and `--backup`.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct State {
    /// Hold a state lock during the operation.
    #[arg(
        long = "lock",
        default_value_t = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub lock: bool,

    /// How long to retry a held state lock.
    #[arg(long = "lock-timeout", default_value = "0s", value_parser = parse_duration)]
    pub lock_timeout: Duration,

    /// Legacy local state file to read.
    #[arg(long = "state")]
    pub state_path: Option<PathBuf>,

    /// Local state file to write instead of the one read.
    #[arg(long = "state-out")]
    pub state_out_path: Option<PathBuf>,

    /// Backup file path; `-` disables backups.
    #[arg(long = "backup")]
    pub backup_path: Option<String>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            lock: true,
            lock_timeout: Duration::ZERO,
            state_path: None,
            state_out_path: None,
            backup_path: None,
        }
    }
}

impl State {
    /// Backend overrides described by these flags.
    pub fn backend_opts(&self, encryption: Encryption) -> BackendOpts {
        let backup = self.backup_path.as_deref().map(|b| {
            if b == "-" {
                None
            } else {
                Some(PathBuf::from(b))
            }
        });
        BackendOpts {
            state_path: self.state_path.clone(),
            state_out: self.state_out_path.clone(),
            backup,
            encryption,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::arguments::parse_flags;

    #[derive(Debug, Parser)]
    struct Flags {
        #[command(flatten)]
        state: State,
    }

    fn parse(list: &[&str]) -> State {
        let args: Vec<String> = list.iter().map(|s| (*s).to_string()).collect();
        parse_flags::<Flags>(&args).expect("parse").state
    }

    #[test]
    fn defaults_lock_without_timeout() {
        assert_eq!(parse(&[]), State::default());
    }

    #[test]
    fn lock_false_and_timeout() {
        let state = parse(&["--lock=false", "--lock-timeout=3s"]);
        assert!(!state.lock);
        assert_eq!(state.lock_timeout, Duration::from_secs(3));
        assert!(parse(&["--lock"]).lock);
    }

    #[test]
    fn dash_disables_backup() {
        let opts = parse(&["--backup=-", "--state=old.state"]).backend_opts(Encryption::Disabled);
        assert_eq!(opts.backup, Some(None));
        assert_eq!(opts.state_path, Some(PathBuf::from("old.state")));
        let opts = parse(&["--backup", "b.state"]).backend_opts(Encryption::Disabled);
        assert_eq!(opts.backup, Some(Some(PathBuf::from("b.state"))));
    }
}
