//! Abstract syntax tree for `.mtl` files.
//!
//! These types represent the parsed structure of a configuration file
//! before it is lowered into a [`crate::Config`].

use mantle_common::diagnostics::SourceRange;
use mantle_common::types::ResourceAddr;
use mantle_common::value::Value;

/// A parsed configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    /// Name the file was loaded under.
    pub filename: String,
    /// Top-level body.
    pub body: Body,
}

/// The contents of a file or a block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    /// `name = expr` attributes in source order.
    pub attributes: Vec<Attribute>,
    /// Nested blocks in source order.
    pub blocks: Vec<Block>,
}

impl Body {
    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// A `name = expr` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Assigned expression.
    pub expr: Expr,
    /// Range of the attribute name.
    pub name_range: SourceRange,
}

/// A block such as `resource "local_file" "motd" { ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Block type keyword.
    pub kind: String,
    /// Labels following the keyword.
    pub labels: Vec<String>,
    /// Block contents.
    pub body: Body,
    /// Range of the block header.
    pub range: SourceRange,
}

/// An expression with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// What kind of expression this is.
    pub kind: ExprKind,
    /// Where it appears.
    pub range: SourceRange,
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A literal number, bool or null.
    Literal(Value),
    /// A string, possibly with interpolations.
    Template(Vec<TemplatePart>),
    /// A reference to a variable or resource attribute.
    Reference(Reference),
    /// A list constructor.
    List(Vec<Expr>),
    /// An object constructor. Keys keep source order.
    Object(Vec<(String, Expr)>),
}

/// Part of a string template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text.
    Literal(String),
    /// An interpolated expression.
    Interpolation(Expr),
}

/// A reference to another object in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    /// `var.<name>`.
    Variable(String),
    /// `<type>.<name>[.<attr>...]` or `data.<type>.<name>[.<attr>...]`.
    Resource {
        /// The referenced resource.
        addr: ResourceAddr,
        /// Attribute path after the resource address.
        path: Vec<String>,
    },
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Variable(name) => write!(f, "var.{name}"),
            Self::Resource { addr, path } => {
                write!(f, "{addr}")?;
                for attr in path {
                    write!(f, ".{attr}")?;
                }
                Ok(())
            }
        }
    }
}

impl Expr {
    /// Returns every reference contained in the expression with its
    /// location, in source order.
    pub fn references(&self) -> Vec<(&Reference, &SourceRange)> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<(&'a Reference, &'a SourceRange)>) {
        match &self.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Reference(r) => out.push((r, &self.range)),
            ExprKind::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Interpolation(e) = part {
                        e.collect_references(out);
                    }
                }
            }
            ExprKind::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            ExprKind::Object(entries) => {
                for (_, e) in entries {
                    e.collect_references(out);
                }
            }
        }
    }

    /// Returns the literal string if the expression is a plain string.
    pub fn as_plain_string(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Template(parts) => match parts.as_slice() {
                [] => Some(""),
                [TemplatePart::Literal(s)] => Some(s),
                _ => None,
            },
            _ => None,
        }
    }
}
