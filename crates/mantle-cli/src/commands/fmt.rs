//! `mantle fmt` — rewrite configuration files in canonical style.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use mantle_common::constants::{CONFIG_EXTENSION, VARS_EXTENSION};
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_config::format::format_source;
use similar::{ChangeTag, TextDiff};
use walkdir::WalkDir;

use super::{Command, base_view};
use crate::arguments::parse_flags;
use crate::meta::Meta;
use crate::views::View;

/// Exit code of `--check` when some file is not formatted.
pub const EXIT_NOT_FORMATTED: i32 = 3;

/// Exit code for syntax errors and unreadable paths.
const EXIT_FMT_ERROR: i32 = 2;

#[derive(Debug, Parser)]
struct Flags {
    /// List files whose formatting differs.
    #[arg(long, default_value_t = true, num_args = 0..=1, require_equals = true,
        default_missing_value = "true", action = ArgAction::Set)]
    list: bool,
    /// Write the result back to the source file.
    #[arg(long, default_value_t = true, num_args = 0..=1, require_equals = true,
        default_missing_value = "true", action = ArgAction::Set)]
    write: bool,
    /// Display diffs of formatting changes.
    #[arg(long)]
    diff: bool,
    /// Only check whether the input is formatted.
    #[arg(long)]
    check: bool,
    /// Also process files in subdirectories.
    #[arg(long)]
    recursive: bool,
    paths: Vec<PathBuf>,
}

fn is_formattable(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(CONFIG_EXTENSION) || n.ends_with(VARS_EXTENSION))
}

/// Line diff of `old` against `new`, with `-`/`+`/` ` prefixes.
fn line_diff(name: &str, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut out = format!("--- old/{name}\n+++ new/{name}\n");
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        let _ = write!(out, "{sign}{change}");
        if change.missing_newline() {
            out.push('\n');
        }
    }
    out
}

/// Per-run settings after `--check` is applied.
struct Options {
    list: bool,
    write: bool,
    diff: bool,
    check: bool,
}

/// What formatting the inputs found.
#[derive(Default)]
struct Outcome {
    changed: bool,
    diags: Diagnostics,
}

/// The `fmt` command.
#[derive(Debug)]
pub struct FmtCommand {
    meta: Meta,
}

impl FmtCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }

    /// Formats standard input to standard output.
    fn format_stdin(&self, view: &View, opts: &Options, outcome: &mut Outcome) {
        let text = match self.meta.streams().read_to_string() {
            Ok(text) => text,
            Err(e) => {
                outcome
                    .diags
                    .push(Diagnostic::error("Failed to read from stdin", e.to_string()));
                return;
            }
        };
        match format_source("<stdin>", &text) {
            Ok(formatted) => {
                outcome.changed |= formatted != text;
                if opts.check {
                    return;
                }
                if opts.diff {
                    if formatted != text {
                        view.stdout().print(&line_diff("<stdin>", &text, &formatted));
                    }
                } else {
                    view.stdout().print(&formatted);
                }
            }
            Err(e) => outcome.diags.push(e),
        }
    }

    /// Files under `path` to process, sorted.
    fn collect_files(path: &Path, recursive: bool) -> Vec<PathBuf> {
        let depth = if recursive { usize::MAX } else { 1 };
        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .max_depth(depth)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|p| is_formattable(p))
            .collect();
        files.sort();
        files
    }

    fn format_file(&self, view: &View, opts: &Options, file: &Path, outcome: &mut Outcome) {
        let shown = file.strip_prefix(self.meta.working_dir()).unwrap_or(file).display().to_string();
        let text = match std::fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) => {
                outcome.diags.push(Diagnostic::error(
                    "Failed to read file",
                    format!("Error reading {shown}: {e}"),
                ));
                return;
            }
        };
        let formatted = match format_source(&shown, &text) {
            Ok(formatted) => formatted,
            Err(e) => {
                outcome.diags.push(e);
                return;
            }
        };
        if formatted == text {
            return;
        }
        outcome.changed = true;
        tracing::debug!(file = %shown, "file needs formatting");
        if opts.list {
            view.stdout().println(&shown);
        }
        if opts.write {
            if let Err(e) = std::fs::write(file, &formatted) {
                outcome.diags.push(Diagnostic::error(
                    "Failed to write file",
                    format!("Error writing {shown}: {e}"),
                ));
            }
        }
        if opts.diff {
            view.stdout().print(&line_diff(&shown, &text, &formatted));
        }
    }
}

impl Command for FmtCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let flags = match parse_flags::<Flags>(&args) {
            Ok(flags) => flags,
            Err(diag) => {
                view.diagnostics(Diagnostics::single(diag));
                view.help_prompt("fmt");
                return 1;
            }
        };
        let opts = Options {
            list: flags.list,
            write: flags.write && !flags.check,
            diff: flags.diff,
            check: flags.check,
        };
        let mut outcome = Outcome::default();

        if flags.paths.len() == 1 && flags.paths[0] == Path::new("-") {
            self.format_stdin(&view, &opts, &mut outcome);
        } else {
            let paths = if flags.paths.is_empty() {
                vec![PathBuf::from(".")]
            } else {
                flags.paths
            };
            for path in paths {
                let full = self.meta.working_dir().join(&path);
                if full.is_dir() {
                    for file in Self::collect_files(&full, flags.recursive) {
                        self.format_file(&view, &opts, &file, &mut outcome);
                    }
                } else if full.is_file() {
                    if is_formattable(&full) {
                        self.format_file(&view, &opts, &full, &mut outcome);
                    } else {
                        outcome.diags.push(Diagnostic::error(
                            "Only .mtl and .mvars files can be processed with mantle fmt",
                            format!("{} is not a Mantle configuration or variables file.", path.display()),
                        ));
                    }
                } else {
                    outcome.diags.push(Diagnostic::error(
                        "No file or directory at path",
                        format!("There is no file or directory at {}.", path.display()),
                    ));
                }
            }
        }

        let failed = outcome.diags.has_errors();
        view.diagnostics(outcome.diags);
        if failed {
            EXIT_FMT_ERROR
        } else if opts.check && outcome.changed {
            EXIT_NOT_FORMATTED
        } else {
            0
        }
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] fmt [options] [target...]

  Rewrites all Mantle configuration files to a canonical format. All
  configuration files (.mtl) and variable files (.mvars) are updated.

  By default, fmt scans the current directory for configuration files. If you
  provide a directory for the target argument, then fmt will scan that
  directory instead. If you provide a file, then fmt will process just that
  file. If you provide a single dash (\"-\"), then fmt will read from standard
  input (STDIN).

  The content must be in the Mantle language native syntax; JSON is not
  supported.

Options:

  --list=false    Don't list files whose formatting differs
                  (always disabled if using STDIN)

  --write=false   Don't write to source files
                  (always disabled if using STDIN or --check)

  --diff          Display diffs of formatting changes

  --check         Check if the input is formatted. Exit status will be 0 if all
                  input is properly formatted and non-zero otherwise.

  --no-color      If specified, output won't contain any color.

  --recursive     Also process files in subdirectories. By default, only the
                  given directory (or current directory) is processed.
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "Reformat your configuration in the standard style"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_and_vars_files() {
        assert!(is_formattable(Path::new("main.mtl")));
        assert!(is_formattable(Path::new("dev.auto.mvars")));
        assert!(!is_formattable(Path::new("notes.txt")));
    }

    #[test]
    fn diff_marks_changed_lines() {
        let diff = line_diff("main.mtl", "a\nb  =  1\nc\n", "a\nb = 1\nc\n");
        assert_eq!(
            diff,
            "--- old/main.mtl\n+++ new/main.mtl\n a\n-b  =  1\n+b = 1\n c\n"
        );
    }

    #[test]
    fn diff_terminates_last_line_without_newline() {
        let diff = line_diff("main.mtl", "x=1", "x = 1\n");
        assert_eq!(diff, "--- old/main.mtl\n+++ new/main.mtl\n-x=1\n+x = 1\n");
    }
}
