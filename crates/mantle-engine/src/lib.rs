//! # mantle-engine
//!
//! Plans and applies changes to infrastructure through providers.
//!
//! Handles:
//! - **Provider**: The provider interface and the built-in `null` and
//!   `local` providers.
//! - **Plan**: Diffing configuration against refreshed state.
//! - **Apply**: Walking planned changes with bounded parallelism.
//! - **Hooks**: Progress callbacks for the user interface.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod context;
pub mod error;
pub mod hooks;
pub mod plan;
pub mod provider;
pub mod scope;
pub mod variables;
mod walk;

pub use context::{Context, PlanOpts};
pub use error::ProviderError;
pub use hooks::Hook;
pub use plan::{Action, OutputChange, Plan, PlanFile, PlanMode, ResourceChange};
pub use provider::{Provider, ProviderMap};
