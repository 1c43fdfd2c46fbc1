//! Flags that shape a plan: mode, targeting, replacement and parallelism.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Args};
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::types::ResourceAddr;
use mantle_engine::PlanMode;

/// Raw operation flags as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct OperationFlags {
    /// Plan to destroy every managed object.
    #[arg(long)]
    pub destroy: bool,

    /// Only update state to match remote objects.
    #[arg(long = "refresh-only")]
    pub refresh_only: bool,

    /// Refresh state before planning.
    #[arg(
        long,
        default_value_t = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub refresh: bool,

    /// Limit the operation to a resource and its dependencies.
    #[arg(long)]
    pub target: Vec<String>,

    /// File of target addresses, one per line.
    #[arg(long = "target-file")]
    pub target_file: Vec<PathBuf>,

    /// Skip a resource and everything depending on it.
    #[arg(long)]
    pub exclude: Vec<String>,

    /// File of excluded addresses, one per line.
    #[arg(long = "exclude-file")]
    pub exclude_file: Vec<PathBuf>,

    /// Force replacement of a resource.
    #[arg(long)]
    pub replace: Vec<String>,

    /// Concurrent provider operations.
    #[arg(long)]
    pub parallelism: Option<usize>,
}

impl Default for OperationFlags {
    fn default() -> Self {
        Self {
            destroy: false,
            refresh_only: false,
            refresh: true,
            target: Vec::new(),
            target_file: Vec::new(),
            exclude: Vec::new(),
            exclude_file: Vec::new(),
            replace: Vec::new(),
            parallelism: None,
        }
    }
}

/// Validated operation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Planning mode.
    pub plan_mode: PlanMode,
    /// Concurrent provider operations.
    pub parallelism: usize,
    /// Refresh before planning.
    pub refresh: bool,
    /// Target addresses.
    pub targets: Vec<ResourceAddr>,
    /// Excluded addresses.
    pub excludes: Vec<ResourceAddr>,
    /// Addresses to replace.
    pub force_replace: Vec<ResourceAddr>,
}

impl Default for Operation {
    fn default() -> Self {
        Self {
            plan_mode: PlanMode::Normal,
            parallelism: mantle_common::constants::DEFAULT_PARALLELISM,
            refresh: true,
            targets: Vec::new(),
            excludes: Vec::new(),
            force_replace: Vec::new(),
        }
    }
}

impl Operation {
    /// Fills an operation request with these options.
    pub fn apply_to(&self, op: &mut mantle_backend::Operation) {
        op.plan_mode = self.plan_mode;
        op.parallelism = self.parallelism;
        op.refresh = self.refresh;
        op.targets.clone_from(&self.targets);
        op.excludes.clone_from(&self.excludes);
        op.force_replace.clone_from(&self.force_replace);
    }
}

fn parse_addr(raw: &str, what: &str, diags: &mut Diagnostics) -> Option<ResourceAddr> {
    match ResourceAddr::parse(raw.trim()) {
        Ok(addr) => Some(addr),
        Err(e) => {
            diags.push(Diagnostic::error(format!("Invalid {what} {:?}", raw.trim()), e.to_string()));
            None
        }
    }
}

/// Reads addresses from a file, one per line. Blank lines and lines
/// starting with `#` are skipped.
fn read_address_file(path: &Path, what: &str, diags: &mut Diagnostics) -> Vec<ResourceAddr> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            diags.push(Diagnostic::error(
                format!("Failed to read {what} file"),
                format!("Error reading {}: {e}.", path.display()),
            ));
            return Vec::new();
        }
    };
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| parse_addr(l, what, diags))
        .collect()
}

impl OperationFlags {
    /// Validates the flags. `default_parallelism` applies when
    /// `--parallelism` is not given.
    pub fn parse(&self, default_parallelism: usize) -> (Operation, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut op = Operation {
            refresh: self.refresh,
            parallelism: self.parallelism.unwrap_or(default_parallelism),
            ..Operation::default()
        };

        op.targets = self.target.iter().filter_map(|t| parse_addr(t, "target", &mut diags)).collect();
        for file in &self.target_file {
            op.targets.extend(read_address_file(file, "target", &mut diags));
        }
        op.excludes = self.exclude.iter().filter_map(|t| parse_addr(t, "exclude", &mut diags)).collect();
        for file in &self.exclude_file {
            op.excludes.extend(read_address_file(file, "exclude", &mut diags));
        }
        let targeting = !self.target.is_empty() || !self.target_file.is_empty();
        let excluding = !self.exclude.is_empty() || !self.exclude_file.is_empty();
        if targeting && excluding {
            diags.push(Diagnostic::error(
                "Invalid combination of arguments",
                "The --target and --exclude options (or their file variants) cannot be used together.",
            ));
        }

        for raw in &self.replace {
            let Some(addr) = parse_addr(raw, "force-replace address", &mut diags) else {
                continue;
            };
            if addr.is_managed() {
                op.force_replace.push(addr);
            } else {
                diags.push(Diagnostic::error(
                    format!("Invalid force-replace address {raw:?}"),
                    "Can replace only managed resources.",
                ));
            }
        }

        op.plan_mode = match (self.destroy, self.refresh_only) {
            (true, true) => {
                diags.push(Diagnostic::error(
                    "Incompatible plan mode options",
                    "The --destroy and --refresh-only options are mutually-exclusive.",
                ));
                PlanMode::Normal
            }
            (true, false) => PlanMode::Destroy,
            (false, true) => PlanMode::RefreshOnly,
            (false, false) => PlanMode::Normal,
        };
        if self.refresh_only && !self.refresh {
            diags.push(Diagnostic::error(
                "Incompatible refresh options",
                "It doesn't make sense to use --refresh-only at the same time as --refresh=false, because Mantle would have nothing to do.",
            ));
        }
        if op.parallelism == 0 {
            diags.push(Diagnostic::error(
                "Invalid parallelism",
                "The --parallelism value must be at least 1.",
            ));
        }
        (op, diags)
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
        operation: OperationFlags,
    }

    fn parse(list: &[&str]) -> (Operation, Diagnostics) {
        let args: Vec<String> = list.iter().map(|s| (*s).to_string()).collect();
        parse_flags::<Flags>(&args).expect("flags").operation.parse(10)
    }

    fn first_error(diags: &Diagnostics) -> String {
        diags.errors().next().expect("an error").summary.clone()
    }

    #[test]
    fn defaults() {
        let (op, diags) = parse(&[]);
        assert!(diags.is_empty());
        assert_eq!(op, Operation::default());
    }

    #[test]
    fn targets_and_replace_parse() {
        let (op, diags) = parse(&[
            "--target=test_instance.a",
            "--target",
            "data.test_data_source.d",
            "--replace=test_instance.a",
            "--parallelism=3",
        ]);
        assert!(diags.is_empty(), "{}", diags.err_summary());
        assert_eq!(op.targets.len(), 2);
        assert_eq!(op.force_replace, vec![ResourceAddr::managed("test_instance", "a")]);
        assert_eq!(op.parallelism, 3);
    }

    #[test]
    fn target_and_exclude_conflict() {
        let (_, diags) = parse(&["--target=a.b", "--exclude=c.d"]);
        assert_eq!(first_error(&diags), "Invalid combination of arguments");
    }

    #[test]
    fn destroy_and_refresh_only_conflict() {
        let (_, diags) = parse(&["--destroy", "--refresh-only"]);
        assert_eq!(first_error(&diags), "Incompatible plan mode options");
        let (op, diags) = parse(&["--destroy"]);
        assert!(diags.is_empty());
        assert_eq!(op.plan_mode, PlanMode::Destroy);
    }

    #[test]
    fn refresh_only_without_refresh() {
        let (_, diags) = parse(&["--refresh-only", "--refresh=false"]);
        assert_eq!(first_error(&diags), "Incompatible refresh options");
    }

    #[test]
    fn replace_requires_managed_resource() {
        let (_, diags) = parse(&["--replace=data.test_data_source.d"]);
        assert!(first_error(&diags).starts_with("Invalid force-replace address"));
    }

    #[test]
    fn zero_parallelism_rejected() {
        let (_, diags) = parse(&["--parallelism=0"]);
        assert_eq!(first_error(&diags), "Invalid parallelism");
    }

    #[test]
    fn invalid_target_reported() {
        let (_, diags) = parse(&["--target=not an address"]);
        assert!(first_error(&diags).starts_with("Invalid target"));
    }

    #[test]
    fn target_file_skips_comments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("targets");
        std::fs::write(&file, "# infra\ntest_instance.a\n\n  test_instance.b  \n").expect("write");
        let path = file.display().to_string();
        let (op, diags) = parse(&["--target-file", &path]);
        assert!(diags.is_empty(), "{}", diags.err_summary());
        assert_eq!(
            op.targets,
            vec![
                ResourceAddr::managed("test_instance", "a"),
                ResourceAddr::managed("test_instance", "b")
            ]
        );
        let (_, diags) = parse(&["--exclude-file", "/does/not/exist"]);
        assert_eq!(first_error(&diags), "Failed to read exclude file");
    }
}
