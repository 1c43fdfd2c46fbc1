//! # mantle-state
//!
//! Persistent record of what Mantle manages.
//!
//! Handles:
//! - **State**: The serializable model of resources and outputs.
//! - **Manager**: Reading, writing and persisting state snapshots.
//! - **Lock**: Exclusive lock files with retry and timeout.
//! - **Encryption**: Optional AES-256-GCM encryption of state at rest.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod encryption;
pub mod error;
pub mod lock;
pub mod manager;
pub mod state;

pub use encryption::Encryption;
pub use error::StateError;
pub use lock::{LockInfo, Locker, NoopLocker, StateLocker};
pub use manager::{LocalStateManager, StateManager, write_atomic};
pub use state::{OutputState, ResourceState, State};
