//! Unified error types for the Mantle workspace.
//!
//! Each higher-level crate defines its own domain-specific error enum that wraps
//! these common variants when appropriate. Every error can be turned into a
//! [`Diagnostic`](crate::diagnostics::Diagnostic) for rendering.

use std::path::PathBuf;

use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum MantleError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required object was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing object.
        kind: &'static str,
        /// Identifier of the missing object.
        id: String,
    },

    /// An address string could not be parsed.
    #[error("invalid address {input:?}: {message}")]
    InvalidAddress {
        /// The raw input.
        input: String,
        /// Why it was rejected.
        message: String,
    },

    /// Encrypting or decrypting data at rest failed.
    #[error("encryption error: {message}")]
    Encryption {
        /// What went wrong.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl MantleError {
    /// Builds an [`MantleError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<MantleError> for Diagnostic {
    fn from(err: MantleError) -> Self {
        let summary = match &err {
            MantleError::Io { .. } => "Filesystem error",
            MantleError::Config { .. } => "Invalid configuration",
            MantleError::NotFound { .. } => "Object not found",
            MantleError::InvalidAddress { .. } => "Invalid address",
            MantleError::Encryption { .. } => "Encryption failed",
            MantleError::Serialization { .. } => "Serialization failed",
        };
        Self::error(summary, err.to_string())
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, MantleError>;
