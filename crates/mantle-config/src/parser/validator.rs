//! Static analysis and validation of a decoded configuration.
//!
//! Checks for duplicate names, undefined references, and dependency cycles
//! before any provider is involved.

use std::collections::HashMap;

use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::types::ResourceMode;

use crate::expr::{undeclared_resource, undeclared_variable};
use crate::graph::DependencyGraph;
use crate::loader::Config;
use crate::parser::ast::Reference;

/// Validates a configuration for semantic correctness.
///
/// # Checks performed
///
/// 1. No duplicate variable, resource or output names.
/// 2. At most one backend block.
/// 3. Every reference names a declared variable or resource.
/// 4. No resource refers to itself and the dependency graph is acyclic.
pub fn validate(config: &Config) -> Diagnostics {
    tracing::debug!("validating configuration");
    let mut diags = Diagnostics::new();
    check_duplicates(config, &mut diags);
    check_backends(config, &mut diags);
    check_references(config, &mut diags);
    if !diags.has_errors() {
        check_cycles(config, &mut diags);
    }
    diags
}

fn check_duplicates(config: &Config, diags: &mut Diagnostics) {
    let mut seen = HashMap::new();
    for var in &config.variables {
        if let Some(first) = seen.insert(var.name.as_str(), &var.range) {
            diags.push(
                Diagnostic::error(
                    "Duplicate variable declaration",
                    format!(
                        "A variable named {:?} was already declared at {first}. Variable names must be unique within a configuration.",
                        var.name
                    ),
                )
                .with_subject(var.range.clone()),
            );
        }
    }

    let mut seen = HashMap::new();
    for res in &config.resources {
        if let Some(first) = seen.insert(&res.addr, &res.range) {
            let kind = match res.addr.mode {
                ResourceMode::Managed => "resource",
                ResourceMode::Data => "data",
            };
            diags.push(
                Diagnostic::error(
                    format!("Duplicate {kind} {:?} configuration", res.addr.type_name),
                    format!(
                        "A {kind} {:?} {:?} was already declared at {first}. Resource names must be unique per type.",
                        res.addr.type_name, res.addr.name
                    ),
                )
                .with_subject(res.range.clone()),
            );
        }
    }

    let mut seen = HashMap::new();
    for out in &config.outputs {
        if let Some(first) = seen.insert(out.name.as_str(), &out.range) {
            diags.push(
                Diagnostic::error(
                    "Duplicate output definition",
                    format!(
                        "An output named {:?} was already defined at {first}. Output names must be unique.",
                        out.name
                    ),
                )
                .with_subject(out.range.clone()),
            );
        }
    }
}

fn check_backends(config: &Config, diags: &mut Diagnostics) {
    let Some(first) = config.backends.first() else {
        return;
    };
    for extra in config.backends.iter().skip(1) {
        diags.push(
            Diagnostic::error(
                "Duplicate backend configuration",
                format!(
                    "A backend was already configured at {}. Only one backend may be configured.",
                    first.range
                ),
            )
            .with_subject(extra.range.clone()),
        );
    }
}

fn check_references(config: &Config, diags: &mut Diagnostics) {
    let mut refs = Vec::new();
    for res in &config.resources {
        refs.extend(res.references());
        for (addr, range) in &res.depends_on {
            if config.resource(addr).is_none() {
                diags.push(undeclared_resource(addr).with_subject(range.clone()));
            }
        }
    }
    for out in &config.outputs {
        refs.extend(out.value.references());
    }

    for (reference, range) in refs {
        match reference {
            Reference::Variable(name) => {
                if config.variable(name).is_none() {
                    diags.push(undeclared_variable(name).with_subject(range.clone()));
                }
            }
            Reference::Resource { addr, .. } => {
                if config.resource(addr).is_none() {
                    diags.push(undeclared_resource(addr).with_subject(range.clone()));
                }
            }
        }
    }

    for res in &config.resources {
        for (reference, range) in res.references() {
            if matches!(reference, Reference::Resource { addr, .. } if addr == &res.addr) {
                diags.push(
                    Diagnostic::error(
                        "Self-referential block",
                        format!(
                            "Configuration for {} may not refer to itself.",
                            res.addr
                        ),
                    )
                    .with_subject(range.clone()),
                );
            }
        }
    }
}

fn check_cycles(config: &Config, diags: &mut Diagnostics) {
    let graph = DependencyGraph::from_config(config);
    for cycle in graph.cycles() {
        let names: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        diags.push(Diagnostic::error(
            format!("Cycle: {}", names.join(", ")),
            "The configuration contains a dependency cycle. Each object on the cycle depends on the next.",
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;

    use super::*;
    use crate::loader::load_sources;

    fn diags_for(src: &str) -> Diagnostics {
        let mut sources = BTreeMap::new();
        let _ = sources.insert("main.mtl".to_string(), src.to_string());
        load_sources(Path::new("."), sources).1
    }

    fn summaries(diags: &Diagnostics) -> Vec<String> {
        diags.iter().map(|d| d.summary.clone()).collect()
    }

    #[test]
    fn validate_valid_configuration() {
        let diags = diags_for(
            "variable \"x\" {}\nresource \"null_resource\" \"a\" {\n  triggers = { x = var.x }\n}\n",
        );
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn duplicate_variable_fails() {
        let diags = diags_for("variable \"x\" {}\nvariable \"x\" {}\n");
        assert_eq!(summaries(&diags), vec!["Duplicate variable declaration"]);
        let d = diags.iter().next().expect("diag");
        assert!(d.detail.contains("main.mtl:1,1"), "{}", d.detail);
        assert_eq!(d.subject.as_ref().expect("subject").start.line, 2);
    }

    #[test]
    fn duplicate_resource_fails() {
        let diags = diags_for("resource \"null_resource\" \"a\" {}\nresource \"null_resource\" \"a\" {}\n");
        assert_eq!(summaries(&diags), vec!["Duplicate resource \"null_resource\" configuration"]);
    }

    #[test]
    fn duplicate_output_fails() {
        let diags = diags_for("output \"o\" {\n  value = 1\n}\noutput \"o\" {\n  value = 2\n}\n");
        assert_eq!(summaries(&diags), vec!["Duplicate output definition"]);
    }

    #[test]
    fn second_backend_fails() {
        let diags = diags_for("backend \"local\" {}\nbackend \"http\" {}\n");
        assert_eq!(summaries(&diags), vec!["Duplicate backend configuration"]);
    }

    #[test]
    fn undeclared_references_fail() {
        let diags = diags_for(
            "output \"o\" {\n  value = \"${var.nope}-${null_resource.ghost.id}\"\n}\nresource \"null_resource\" \"a\" {\n  depends_on = [data.local_file.ghost]\n}\n",
        );
        let s = summaries(&diags);
        assert_eq!(s.len(), 3, "{s:?}");
        assert!(s.contains(&"Reference to undeclared input variable".to_string()));
        assert_eq!(
            s.iter().filter(|x| *x == "Reference to undeclared resource").count(),
            2
        );
    }

    #[test]
    fn self_reference_fails() {
        let diags = diags_for("resource \"null_resource\" \"a\" {\n  triggers = { x = null_resource.a.id }\n}\n");
        assert_eq!(summaries(&diags), vec!["Self-referential block"]);
    }

    #[test]
    fn cycle_fails() {
        let diags = diags_for(
            "resource \"null_resource\" \"a\" {\n  depends_on = [null_resource.b]\n}\nresource \"null_resource\" \"b\" {\n  depends_on = [null_resource.a]\n}\n",
        );
        assert_eq!(summaries(&diags), vec!["Cycle: null_resource.a, null_resource.b"]);
    }
}
