//! Loading a configuration directory into a [`Config`].
//!
//! Every `*.mtl` file directly inside the directory is parsed, in file name
//! order, and its blocks are decoded into typed declarations. Semantic
//! validation runs last over the merged result.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use mantle_common::constants::{CONFIG_EXTENSION, ENCRYPTION_PASSPHRASE_ENV};
use mantle_common::diagnostics::{Diagnostic, Diagnostics, SourceRange};
use mantle_common::types::{ResourceAddr, ResourceMode, is_valid_identifier};
use mantle_common::value::Value;

use crate::expr::evaluate_literal;
use crate::parser::ast::{Attribute, Block, Body, Expr, ExprKind, Reference};
use crate::parser::{self, validator};

/// A fully decoded configuration directory.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Directory the configuration was loaded from.
    pub dir: PathBuf,
    /// Raw source text of every file, by file name.
    pub sources: BTreeMap<String, String>,
    /// `variable` blocks.
    pub variables: Vec<Variable>,
    /// `resource` and `data` blocks.
    pub resources: Vec<Resource>,
    /// `output` blocks.
    pub outputs: Vec<Output>,
    /// `backend` blocks. More than one is reported by validation.
    pub backends: Vec<BackendBlock>,
    /// The `encryption` block, if any.
    pub encryption: Option<EncryptionBlock>,
}

/// A declared input variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Default value; a variable without one is required.
    pub default: Option<Value>,
    /// Free-form description.
    pub description: Option<String>,
    /// Whether values should be hidden in output.
    pub sensitive: bool,
    /// Location of the block header.
    pub range: SourceRange,
}

/// A declared managed or data resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Resource address.
    pub addr: ResourceAddr,
    /// Provider arguments.
    pub config: BTreeMap<String, Expr>,
    /// Explicit dependencies from `depends_on`.
    pub depends_on: Vec<(ResourceAddr, SourceRange)>,
    /// Location of the block header.
    pub range: SourceRange,
}

impl Resource {
    /// Every reference made by the resource's arguments.
    pub fn references(&self) -> Vec<(&Reference, &SourceRange)> {
        self.config.values().flat_map(Expr::references).collect()
    }

    /// Resources this one depends on, through references or `depends_on`.
    pub fn dependencies(&self) -> BTreeSet<ResourceAddr> {
        let mut deps: BTreeSet<ResourceAddr> = self
            .references()
            .into_iter()
            .filter_map(|(r, _)| match r {
                Reference::Resource { addr, .. } => Some(addr.clone()),
                Reference::Variable(_) => None,
            })
            .collect();
        deps.extend(self.depends_on.iter().map(|(addr, _)| addr.clone()));
        let _ = deps.remove(&self.addr);
        deps
    }
}

/// A declared output value.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    /// Output name.
    pub name: String,
    /// Value expression.
    pub value: Expr,
    /// Free-form description.
    pub description: Option<String>,
    /// Whether the value is hidden in human output.
    pub sensitive: bool,
    /// Location of the block header.
    pub range: SourceRange,
}

/// A `backend "<type>"` block.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendBlock {
    /// Backend type, e.g. `local` or `http`.
    pub kind: String,
    /// Literal settings.
    pub settings: BTreeMap<String, Value>,
    /// Location of the block header.
    pub range: SourceRange,
}

/// The `encryption` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionBlock {
    /// Environment variable holding the passphrase.
    pub passphrase_env: String,
    /// Location of the block header.
    pub range: SourceRange,
}

impl Config {
    /// Returns true if no configuration files were found.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Looks up a variable declaration.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Looks up a resource declaration.
    pub fn resource(&self, addr: &ResourceAddr) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.addr == addr)
    }

    /// Looks up an output declaration.
    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Managed resources in declaration order.
    pub fn managed_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| r.addr.is_managed())
    }

    /// The active backend block.
    pub fn backend(&self) -> Option<&BackendBlock> {
        self.backends.first()
    }

    /// Provider names required by the declared resources.
    pub fn required_providers(&self) -> BTreeSet<String> {
        self.resources
            .iter()
            .map(|r| r.addr.provider().to_string())
            .collect()
    }
}

/// Loads every `.mtl` file in `dir`.
///
/// Files are read in name order. Parse errors in one file do not prevent the
/// others from being decoded.
pub fn load_dir(dir: &Path) -> (Config, Diagnostics) {
    tracing::info!(dir = %dir.display(), "loading configuration");
    let mut diags = Diagnostics::new();
    let mut sources = BTreeMap::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            diags.push(Diagnostic::error(
                "Failed to read configuration directory",
                format!("The directory {} could not be read: {e}.", dir.display()),
            ));
            return (
                Config {
                    dir: dir.to_path_buf(),
                    ..Config::default()
                },
                diags,
            );
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') || !name.ends_with(CONFIG_EXTENSION) || !path.is_file() {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let _ = sources.insert(name, text);
            }
            Err(e) => diags.push(Diagnostic::error(
                "Failed to read file",
                format!("The configuration file {:?} could not be read: {e}.", name),
            )),
        }
    }

    let (config, more) = load_sources(dir, sources);
    diags.append(more);
    (config, diags)
}

/// Decodes already-read sources, keyed by file name.
///
/// Used for directories on disk and for configuration snapshots stored in
/// plan files.
pub fn load_sources(dir: &Path, sources: BTreeMap<String, String>) -> (Config, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut config = Config {
        dir: dir.to_path_buf(),
        ..Config::default()
    };

    for (name, text) in &sources {
        match parser::parse_source(name, text) {
            Ok(file) => decode_body(&file.body, &mut config, &mut diags),
            Err(e) => diags.push(e),
        }
    }
    config.sources = sources;

    if !diags.has_errors() {
        diags.append(validator::validate(&config));
    }
    tracing::debug!(
        resources = config.resources.len(),
        variables = config.variables.len(),
        outputs = config.outputs.len(),
        "configuration decoded"
    );
    (config, diags)
}

fn decode_body(body: &Body, config: &mut Config, diags: &mut Diagnostics) {
    for attr in &body.attributes {
        diags.push(unsupported_argument(attr));
    }
    for block in &body.blocks {
        match block.kind.as_str() {
            "variable" => {
                if let Some(v) = decode_variable(block, diags) {
                    config.variables.push(v);
                }
            }
            "resource" | "data" => {
                if let Some(r) = decode_resource(block, diags) {
                    config.resources.push(r);
                }
            }
            "output" => {
                if let Some(o) = decode_output(block, diags) {
                    config.outputs.push(o);
                }
            }
            "backend" => {
                if let Some(b) = decode_backend(block, diags) {
                    config.backends.push(b);
                }
            }
            "encryption" => {
                if let Some(existing) = &config.encryption {
                    diags.push(
                        Diagnostic::error(
                            "Duplicate encryption configuration",
                            format!(
                                "State encryption was already configured at {}. Only one encryption block is allowed.",
                                existing.range
                            ),
                        )
                        .with_subject(block.range.clone()),
                    );
                } else if let Some(e) = decode_encryption(block, diags) {
                    config.encryption = Some(e);
                }
            }
            other => diags.push(
                Diagnostic::error(
                    "Unsupported block type",
                    format!("Blocks of type {other:?} are not expected here."),
                )
                .with_subject(block.range.clone()),
            ),
        }
    }
}

fn unsupported_argument(attr: &Attribute) -> Diagnostic {
    Diagnostic::error(
        "Unsupported argument",
        format!("An argument named {:?} is not expected here.", attr.name),
    )
    .with_subject(attr.name_range.clone())
}

fn reject_nested_blocks(block: &Block, diags: &mut Diagnostics) {
    for nested in &block.body.blocks {
        diags.push(
            Diagnostic::error(
                "Unsupported block type",
                format!("Blocks of type {:?} are not expected here.", nested.kind),
            )
            .with_subject(nested.range.clone()),
        );
    }
}

fn expect_labels<'b>(block: &'b Block, names: &[&str], diags: &mut Diagnostics) -> Option<&'b [String]> {
    if block.labels.len() == names.len() {
        return Some(&block.labels);
    }
    let detail = if names.is_empty() {
        format!("No labels are expected for {} blocks.", block.kind)
    } else {
        format!(
            "A {} block requires {} label(s): {}.",
            block.kind,
            names.len(),
            names.join(", ")
        )
    };
    let summary = if block.labels.len() < names.len() {
        "Missing name for block"
    } else {
        "Extraneous label for block"
    };
    diags.push(Diagnostic::error(summary, detail).with_subject(block.range.clone()));
    None
}

fn check_name(name: &str, what: &str, block: &Block, diags: &mut Diagnostics) -> bool {
    if is_valid_identifier(name) {
        return true;
    }
    diags.push(
        Diagnostic::error(
            format!("Invalid {what} name"),
            "A name must start with a letter or underscore and may contain only letters, digits, underscores, and dashes.",
        )
        .with_subject(block.range.clone()),
    );
    false
}

fn literal_string(attr: &Attribute, diags: &mut Diagnostics) -> Option<String> {
    match evaluate_literal(&attr.expr) {
        Ok(Value::String(s)) => Some(s),
        Ok(other) => {
            diags.push(
                Diagnostic::error(
                    "Incorrect attribute value type",
                    format!(
                        "Inappropriate value for attribute {:?}: string required, but have {}.",
                        attr.name,
                        other.type_name()
                    ),
                )
                .with_subject(attr.expr.range.clone()),
            );
            None
        }
        Err(e) => {
            diags.append(e);
            None
        }
    }
}

fn literal_bool(attr: &Attribute, diags: &mut Diagnostics) -> bool {
    match evaluate_literal(&attr.expr) {
        Ok(Value::Bool(b)) => b,
        Ok(other) => {
            diags.push(
                Diagnostic::error(
                    "Incorrect attribute value type",
                    format!(
                        "Inappropriate value for attribute {:?}: bool required, but have {}.",
                        attr.name,
                        other.type_name()
                    ),
                )
                .with_subject(attr.expr.range.clone()),
            );
            false
        }
        Err(e) => {
            diags.append(e);
            false
        }
    }
}

fn decode_variable(block: &Block, diags: &mut Diagnostics) -> Option<Variable> {
    let labels = expect_labels(block, &["name"], diags)?;
    let name = labels[0].clone();
    if !check_name(&name, "variable", block, diags) {
        return None;
    }
    reject_nested_blocks(block, diags);

    let mut var = Variable {
        name,
        default: None,
        description: None,
        sensitive: false,
        range: block.range.clone(),
    };
    for attr in &block.body.attributes {
        match attr.name.as_str() {
            "default" => match evaluate_literal(&attr.expr) {
                Ok(v) => var.default = Some(v),
                Err(e) => diags.append(e),
            },
            "description" => var.description = literal_string(attr, diags),
            "sensitive" => var.sensitive = literal_bool(attr, diags),
            // Accepted for readability; values are dynamically typed.
            "type" => {}
            _ => diags.push(unsupported_argument(attr)),
        }
    }
    Some(var)
}

fn decode_resource(block: &Block, diags: &mut Diagnostics) -> Option<Resource> {
    let labels = expect_labels(block, &["type", "name"], diags)?;
    let (type_name, name) = (labels[0].clone(), labels[1].clone());
    if !check_name(&type_name, "resource type", block, diags) || !check_name(&name, "resource", block, diags) {
        return None;
    }
    reject_nested_blocks(block, diags);

    let addr = if block.kind == "data" {
        ResourceAddr::data(type_name, name)
    } else {
        ResourceAddr::managed(type_name, name)
    };
    let mut resource = Resource {
        addr,
        config: BTreeMap::new(),
        depends_on: Vec::new(),
        range: block.range.clone(),
    };

    for attr in &block.body.attributes {
        match attr.name.as_str() {
            "depends_on" => resource.depends_on = decode_depends_on(&attr.expr, diags),
            "count" | "for_each" | "provider" | "lifecycle" => diags.push(
                Diagnostic::error(
                    "Unsupported argument",
                    format!("The meta-argument {:?} is not supported.", attr.name),
                )
                .with_subject(attr.name_range.clone()),
            ),
            _ => {
                let _ = resource.config.insert(attr.name.clone(), attr.expr.clone());
            }
        }
    }
    Some(resource)
}

fn decode_depends_on(expr: &Expr, diags: &mut Diagnostics) -> Vec<(ResourceAddr, SourceRange)> {
    let ExprKind::List(items) = &expr.kind else {
        diags.push(
            Diagnostic::error(
                "Invalid depends_on value",
                "The depends_on argument must be a list of resource references.",
            )
            .with_subject(expr.range.clone()),
        );
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match &item.kind {
            ExprKind::Reference(Reference::Resource { addr, path }) if path.is_empty() => {
                Some((addr.clone(), item.range.clone()))
            }
            _ => {
                diags.push(
                    Diagnostic::error(
                        "Invalid depends_on reference",
                        "References in depends_on must be to a whole resource, without attribute access.",
                    )
                    .with_subject(item.range.clone()),
                );
                None
            }
        })
        .collect()
}

fn decode_output(block: &Block, diags: &mut Diagnostics) -> Option<Output> {
    let labels = expect_labels(block, &["name"], diags)?;
    let name = labels[0].clone();
    if !check_name(&name, "output", block, diags) {
        return None;
    }
    reject_nested_blocks(block, diags);

    let mut value = None;
    let mut description = None;
    let mut sensitive = false;
    for attr in &block.body.attributes {
        match attr.name.as_str() {
            "value" => value = Some(attr.expr.clone()),
            "description" => description = literal_string(attr, diags),
            "sensitive" => sensitive = literal_bool(attr, diags),
            "depends_on" => {
                let _ = decode_depends_on(&attr.expr, diags);
            }
            _ => diags.push(unsupported_argument(attr)),
        }
    }
    let Some(value) = value else {
        diags.push(
            Diagnostic::error(
                "Missing required argument",
                "The argument \"value\" is required, but no definition was found.",
            )
            .with_subject(block.range.clone()),
        );
        return None;
    };
    Some(Output {
        name,
        value,
        description,
        sensitive,
        range: block.range.clone(),
    })
}

fn decode_backend(block: &Block, diags: &mut Diagnostics) -> Option<BackendBlock> {
    let labels = expect_labels(block, &["type"], diags)?;
    reject_nested_blocks(block, diags);
    let mut settings = BTreeMap::new();
    for attr in &block.body.attributes {
        match evaluate_literal(&attr.expr) {
            Ok(v) => {
                let _ = settings.insert(attr.name.clone(), v);
            }
            Err(e) => diags.append(e),
        }
    }
    Some(BackendBlock {
        kind: labels[0].clone(),
        settings,
        range: block.range.clone(),
    })
}

fn decode_encryption(block: &Block, diags: &mut Diagnostics) -> Option<EncryptionBlock> {
    let _ = expect_labels(block, &[], diags)?;
    reject_nested_blocks(block, diags);
    let mut passphrase_env = ENCRYPTION_PASSPHRASE_ENV.to_string();
    for attr in &block.body.attributes {
        match attr.name.as_str() {
            "passphrase_env" => {
                if let Some(s) = literal_string(attr, diags) {
                    passphrase_env = s;
                }
            }
            _ => diags.push(unsupported_argument(attr)),
        }
    }
    Some(EncryptionBlock {
        passphrase_env,
        range: block.range.clone(),
    })
}

/// Returns the mode-qualified block keyword for an address.
pub const fn block_keyword(mode: ResourceMode) -> &'static str {
    match mode {
        ResourceMode::Managed => "resource",
        ResourceMode::Data => "data",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(src: &str) -> (Config, Diagnostics) {
        let mut sources = BTreeMap::new();
        let _ = sources.insert("main.mtl".to_string(), src.to_string());
        load_sources(Path::new("."), sources)
    }

    #[test]
    fn load_full_configuration() {
        let (config, diags) = load(
            r#"
variable "env" {
  default     = "dev"
  description = "Deployment environment"
}

resource "null_resource" "a" {
  triggers = { env = var.env }
}

data "local_file" "seed" {
  filename = "seed.txt"
}

resource "local_file" "b" {
  filename   = "${var.env}.txt"
  content    = data.local_file.seed.content
  depends_on = [null_resource.a]
}

output "file" {
  value     = local_file.b.id
  sensitive = true
}

backend "local" {
  path = "custom.state"
}

encryption {
  passphrase_env = "MY_PASS"
}
"#,
        );
        assert!(!diags.has_errors(), "{diags:?}");
        assert_eq!(config.variables[0].default, Some(Value::from("dev")));
        assert_eq!(config.resources.len(), 3);
        let b = config
            .resource(&ResourceAddr::managed("local_file", "b"))
            .expect("b");
        let deps: Vec<String> = b.dependencies().iter().map(ToString::to_string).collect();
        assert_eq!(deps, vec!["null_resource.a", "data.local_file.seed"]);
        assert!(config.output("file").expect("output").sensitive);
        assert_eq!(config.backend().expect("backend").kind, "local");
        assert_eq!(config.encryption.expect("encryption").passphrase_env, "MY_PASS");
    }

    #[test]
    fn unknown_block_type_is_error() {
        let (_, diags) = load("module \"x\" {}\n");
        assert_eq!(diags.iter().next().expect("diag").summary, "Unsupported block type");
    }

    #[test]
    fn output_requires_value() {
        let (_, diags) = load("output \"x\" {}\n");
        assert_eq!(diags.iter().next().expect("diag").summary, "Missing required argument");
    }

    #[test]
    fn count_is_rejected() {
        let (_, diags) = load("resource \"null_resource\" \"a\" {\n  count = 2\n}\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn variable_default_must_be_literal() {
        let (_, diags) = load("variable \"a\" {\n  default = var.b\n}\n");
        assert_eq!(diags.iter().next().expect("diag").summary, "Variables not allowed");
    }

    #[test]
    fn parse_error_in_one_file_keeps_others() {
        let mut sources = BTreeMap::new();
        let _ = sources.insert("a.mtl".to_string(), "variable \"x\" {}\n".to_string());
        let _ = sources.insert("b.mtl".to_string(), "variable {".to_string());
        let (config, diags) = load_sources(Path::new("."), sources);
        assert!(diags.has_errors());
        assert_eq!(config.variables.len(), 1);
    }

    #[test]
    fn load_dir_reads_only_config_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("main.mtl"), "variable \"x\" {}\n").expect("write");
        std::fs::write(dir.path().join("notes.txt"), "not config").expect("write");
        let (config, diags) = load_dir(dir.path());
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(config.sources.len(), 1);
        assert!(config.variable("x").is_some());
    }

    #[test]
    fn load_missing_dir_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (config, diags) = load_dir(&dir.path().join("absent"));
        assert!(diags.has_errors());
        assert!(config.is_empty());
    }
}
