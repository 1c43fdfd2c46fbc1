//! Arguments of `mantle import`.

use clap::Parser;
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::types::ResourceAddr;

use super::vars::extract_vars;
use super::{State, Vars, parse_flags};

#[derive(Debug, Parser)]
struct Flags {
    #[command(flatten)]
    state: State,
    args: Vec<String>,
}

/// Parsed `import` arguments.
#[derive(Debug, Clone, Default)]
pub struct Import {
    /// State flags.
    pub state: State,
    /// Variables.
    pub vars: Vars,
    /// Address to import into.
    pub addr: Option<ResourceAddr>,
    /// Provider-specific object ID.
    pub id: String,
}

/// Parses `import ADDR ID`.
pub fn parse_import(args: Vec<String>) -> (Import, Diagnostics) {
    let (vars, args, mut diags) = extract_vars(args);
    let mut import = Import {
        vars,
        ..Import::default()
    };
    let flags = match parse_flags::<Flags>(&args) {
        Ok(flags) => flags,
        Err(diag) => {
            diags.push(diag);
            return (import, diags);
        }
    };
    import.state = flags.state;
    let [addr, id] = flags.args.as_slice() else {
        diags.push(Diagnostic::error(
            "Invalid number of arguments",
            "The import command expects two arguments: the resource address and the ID of the remote object.",
        ));
        return (import, diags);
    };
    match ResourceAddr::parse(addr) {
        Ok(parsed) => import.addr = Some(parsed),
        Err(e) => diags.push(Diagnostic::error("Invalid address", e.to_string())),
    }
    if id.is_empty() {
        diags.push(Diagnostic::error("Invalid import id", "The import ID cannot be empty."));
    }
    import.id.clone_from(id);
    (import, diags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_address_and_id() {
        let (import, diags) = parse_import(vec!["test_instance.a".into(), "i-123".into()]);
        assert!(diags.is_empty());
        assert_eq!(import.addr, Some(ResourceAddr::managed("test_instance", "a")));
        assert_eq!(import.id, "i-123");
    }

    #[test]
    fn requires_two_arguments() {
        let (_, diags) = parse_import(vec!["test_instance.a".into()]);
        assert_eq!(diags.errors().next().expect("error").summary, "Invalid number of arguments");
    }

    #[test]
    fn invalid_address() {
        let (_, diags) = parse_import(vec!["nope".into(), "x".into()]);
        assert_eq!(diags.errors().next().expect("error").summary, "Invalid address");
    }
}
