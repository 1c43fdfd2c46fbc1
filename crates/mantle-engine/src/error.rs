//! Errors reported by providers.

use std::path::PathBuf;

use mantle_common::diagnostics::Diagnostic;
use thiserror::Error;

/// Errors a provider can return from any of its operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider does not implement the requested resource type.
    #[error("provider {provider:?} does not support resource type {type_name:?}")]
    UnsupportedType {
        /// Provider name.
        provider: String,
        /// Requested type.
        type_name: String,
    },

    /// A configured argument has an unusable value.
    #[error("invalid value for {attribute:?}: {message}")]
    InvalidArgument {
        /// Argument name.
        attribute: String,
        /// What is wrong with it.
        message: String,
    },

    /// An operation against the managed object failed.
    #[error("{message}")]
    Failed {
        /// One-line summary.
        summary: String,
        /// Details.
        message: String,
    },

    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

impl ProviderError {
    /// Builds a [`ProviderError::Failed`].
    pub fn failed(summary: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            summary: summary.into(),
            message: message.into(),
        }
    }

    /// Builds a [`ProviderError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UnsupportedType { .. } => Self::error("Invalid resource type", err.to_string()),
            ProviderError::InvalidArgument { .. } => Self::error("Invalid argument value", err.to_string()),
            ProviderError::Failed { summary, message } => Self::error(summary, message),
            ProviderError::Io { .. } => Self::error("Provider operation failed", err.to_string()),
        }
    }
}
