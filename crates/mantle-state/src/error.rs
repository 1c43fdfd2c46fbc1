//! State storage errors.

use std::path::PathBuf;

use mantle_common::diagnostics::Diagnostic;
use thiserror::Error;

use crate::lock::LockInfo;

/// Errors raised while reading, writing, or locking state.
#[derive(Debug, Error)]
pub enum StateError {
    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The state file is not valid JSON of the expected shape.
    #[error("failed to decode state from {origin}: {source}")]
    Decode {
        /// File or URL the data came from.
        origin: String,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The state was written by a newer format version.
    #[error("state format version {found} is newer than the supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file.
        found: u32,
        /// Highest version this build reads.
        supported: u32,
    },

    /// Another process holds the lock.
    #[error("state is locked by {}", info.who)]
    Locked {
        /// Information about the current lock holder.
        info: Box<LockInfo>,
    },

    /// Unlock was attempted with the wrong lock ID.
    #[error("lock ID {given:?} does not match existing lock ID {held:?}")]
    LockMismatch {
        /// ID passed to unlock.
        given: String,
        /// ID recorded in the lock file.
        held: String,
    },

    /// The state is encrypted but no key is configured, or decryption failed.
    #[error("state encryption error: {message}")]
    Encryption {
        /// What went wrong.
        message: String,
    },

    /// A resource address is not present in state.
    #[error("no resource at address {addr} in state")]
    ResourceNotFound {
        /// The missing address.
        addr: String,
    },

    /// A move target is already occupied.
    #[error("a resource already exists at address {addr}")]
    ResourceExists {
        /// The occupied address.
        addr: String,
    },

    /// A move between addresses of different mode or resource type.
    #[error("cannot move {src} to {dst}: source and destination must have the same mode and resource type")]
    MoveMismatch {
        /// The source address.
        src: String,
        /// The destination address.
        dst: String,
    },

    /// A remote state store returned an error.
    #[error("remote state error: {message}")]
    Remote {
        /// Error reported by the remote side.
        message: String,
    },
}

impl StateError {
    /// Builds a [`StateError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<StateError> for Diagnostic {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Locked { info } => Self::error(
                "Error acquiring the state lock",
                format!(
                    "Error message: state is locked\n{info}\n\nMantle acquires a state lock to protect the state from being written by multiple users at the same time. Please resolve the issue above and try again. For most commands, you can disable locking with the \"--lock=false\" flag, but this is not recommended."
                ),
            ),
            StateError::LockMismatch { .. } => Self::error("Error releasing the state lock", err.to_string()),
            StateError::Encryption { .. } => Self::error("State encryption failed", err.to_string()),
            StateError::ResourceNotFound { .. }
            | StateError::ResourceExists { .. }
            | StateError::MoveMismatch { .. } => {
                Self::error("Invalid state address", err.to_string())
            }
            StateError::UnsupportedVersion { .. } => {
                Self::error("Unsupported state file format", err.to_string())
            }
            StateError::Decode { .. } => Self::error("Failed to load state", err.to_string()),
            StateError::Io { .. } | StateError::Remote { .. } => {
                Self::error("State storage error", err.to_string())
            }
        }
    }
}
