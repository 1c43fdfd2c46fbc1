//! # mantle-backend
//!
//! Where state lives and how operations run against it.
//!
//! Handles:
//! - **Backend**: The backend trait with `local` and `http` implementations.
//! - **Init**: Selecting a backend from configuration and recording it.
//! - **Operation**: Running plan, apply and refresh under a state lock.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod http;
pub mod init;
pub mod local;
pub mod operation;

use mantle_common::constants::DEFAULT_WORKSPACE;
use mantle_state::StateManager;

pub use error::BackendError;
pub use http::HttpBackend;
pub use init::{BackendOpts, BackendRecord, backend_from_config, check_initialized};
pub use local::LocalBackend;
pub use operation::{Operation, OperationKind, OperationResult, OperationUi};

/// Storage for the state of every workspace.
pub trait Backend {
    /// Backend type, e.g. `local`.
    fn name(&self) -> &str;

    /// Existing workspaces, sorted, always including `default`.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspaces cannot be listed.
    fn workspaces(&self) -> Result<Vec<String>, BackendError>;

    /// Deletes a workspace and its state.
    ///
    /// `force` also removes a workspace whose state is locked.
    ///
    /// # Errors
    ///
    /// Returns an error for the `default` workspace, unknown workspaces,
    /// and backends without workspace support.
    fn delete_workspace(&self, name: &str, force: bool) -> Result<(), BackendError>;

    /// Creates an empty workspace. Creating `default` is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace cannot be stored, or the backend
    /// has no workspace support.
    fn create_workspace(&self, name: &str) -> Result<(), BackendError> {
        if name == DEFAULT_WORKSPACE {
            Ok(())
        } else {
            Err(BackendError::WorkspacesNotSupported {
                backend: self.name().to_string(),
            })
        }
    }

    /// State manager for a workspace. A workspace that was never created
    /// reads as having no state; nothing is created until state is
    /// written or locked.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot serve that workspace.
    fn state_mgr(&self, workspace: &str) -> Result<Box<dyn StateManager>, BackendError>;

    /// Returns true if workspaces other than `default` are supported.
    fn supports_workspaces(&self) -> bool {
        true
    }
}
