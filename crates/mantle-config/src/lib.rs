//! # mantle-config
//!
//! Parser and resolver for the Mantle configuration language.
//!
//! Handles:
//! - **Parser**: Lexing, AST construction, and validation of `.mtl` files.
//! - **Loader**: Decoding a directory of files into a [`loader::Config`].
//! - **Graph**: Dependency graph construction and topological resolution.
//! - **Expr**: Evaluation of expressions against a scope.
//! - **Vars**: Variable files and command-line variable values.
//! - **Format**: Canonical source formatting for `mantle fmt`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod expr;
pub mod format;
pub mod graph;
pub mod loader;
pub mod parser;
pub mod vars;

pub use loader::{Config, load_dir, load_sources};
