//! Backend errors.

use std::path::PathBuf;

use mantle_common::diagnostics::Diagnostic;
use mantle_state::StateError;
use thiserror::Error;

/// Errors raised while configuring or using a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The configuration names a backend type that does not exist.
    #[error("unknown backend type {kind:?}")]
    UnknownType {
        /// The requested type.
        kind: String,
    },

    /// A backend setting is missing or has the wrong type.
    #[error("invalid setting {name:?} for the {backend} backend: {message}")]
    InvalidSetting {
        /// Backend type.
        backend: String,
        /// Setting name.
        name: String,
        /// What is wrong.
        message: String,
    },

    /// The backend only has the default workspace.
    #[error("the {backend} backend does not support workspaces")]
    WorkspacesNotSupported {
        /// Backend type.
        backend: String,
    },

    /// The named workspace does not exist.
    #[error("workspace {name:?} does not exist")]
    WorkspaceNotFound {
        /// Workspace name.
        name: String,
    },

    /// The workspace name cannot be used as a directory name.
    #[error("workspace name {name:?} is not allowed")]
    InvalidWorkspaceName {
        /// Workspace name.
        name: String,
    },

    /// The default workspace cannot be deleted.
    #[error("the default workspace cannot be deleted")]
    DefaultWorkspace,

    /// The workspace's state is locked and deletion was not forced.
    #[error("workspace {name:?} is locked")]
    WorkspaceLocked {
        /// Workspace name.
        name: String,
    },

    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A state operation failed.
    #[error(transparent)]
    State(#[from] StateError),
}

impl BackendError {
    /// Builds a [`BackendError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn setting(backend: &str, name: &str, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            backend: backend.to_string(),
            name: name.to_string(),
            message: message.into(),
        }
    }
}

impl From<BackendError> for Diagnostic {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::State(e) => e.into(),
            BackendError::UnknownType { .. } => Self::error(
                "Unsupported backend type",
                format!("{err}. The supported backend types are \"local\" and \"http\"."),
            ),
            BackendError::InvalidSetting { .. } => Self::error("Invalid backend configuration", err.to_string()),
            BackendError::WorkspacesNotSupported { .. } => {
                Self::error("Workspaces not supported", err.to_string())
            }
            BackendError::InvalidWorkspaceName { .. } => Self::error("Invalid workspace name", err.to_string()),
            BackendError::WorkspaceNotFound { .. }
            | BackendError::DefaultWorkspace
            | BackendError::WorkspaceLocked { .. } => Self::error("Failed to delete workspace", err.to_string()),
            BackendError::Io { .. } => Self::error("Backend storage error", err.to_string()),
        }
    }
}
