//! Flags that control how diagnostics are shown. They are accepted by every
//! command and removed before command-specific parsing.

/// Display options shared by every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewArgs {
    /// `--no-color`.
    pub no_color: bool,
    /// `--compact-warnings`: summarise warnings when there are no errors.
    pub compact_warnings: bool,
    /// `--consolidate-warnings[=bool]`.
    pub consolidate_warnings: bool,
    /// `--consolidate-errors[=bool]`.
    pub consolidate_errors: bool,
    /// `--concise`: no progress messages.
    pub concise: bool,
}

impl Default for ViewArgs {
    fn default() -> Self {
        Self {
            no_color: false,
            compact_warnings: false,
            consolidate_warnings: true,
            consolidate_errors: false,
            concise: false,
        }
    }
}

fn bool_flag(arg: &str, name: &str) -> Option<bool> {
    let rest = arg.strip_prefix("--")?.strip_prefix(name)?;
    match rest {
        "" | "=true" => Some(true),
        "=false" => Some(false),
        _ => None,
    }
}

/// Extracts the display flags, returning them and the remaining arguments.
pub fn parse_view(args: Vec<String>) -> (ViewArgs, Vec<String>) {
    let mut view = ViewArgs::default();
    let mut rest = Vec::with_capacity(args.len());
    for arg in args {
        if arg == "--no-color" {
            view.no_color = true;
        } else if arg == "--compact-warnings" {
            view.compact_warnings = true;
        } else if arg == "--concise" {
            view.concise = true;
        } else if let Some(v) = bool_flag(&arg, "consolidate-warnings") {
            view.consolidate_warnings = v;
        } else if let Some(v) = bool_flag(&arg, "consolidate-errors") {
            view.consolidate_errors = v;
        } else {
            rest.push(arg);
        }
    }
    (view, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn extracts_view_flags_and_keeps_the_rest() {
        let (view, rest) = parse_view(args(&[
            "--no-color",
            "--target=a.b",
            "--consolidate-warnings=false",
            "--consolidate-errors",
            "--concise",
        ]));
        assert!(view.no_color);
        assert!(!view.consolidate_warnings);
        assert!(view.consolidate_errors);
        assert!(view.concise);
        assert!(!view.compact_warnings);
        assert_eq!(rest, args(&["--target=a.b"]));
    }

    #[test]
    fn defaults_consolidate_warnings_only() {
        let (view, rest) = parse_view(args(&["plan"]));
        assert_eq!(view, ViewArgs::default());
        assert!(view.consolidate_warnings);
        assert_eq!(rest, args(&["plan"]));
    }
}
