//! # mantle-common
//!
//! Shared types, diagnostics, error definitions, configuration models, and
//! constants used across the entire Mantle workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and provides the foundational primitives that all other
//! crates build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod types;
pub mod value;
