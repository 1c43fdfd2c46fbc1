//! State locking.
//!
//! A lock protects a state snapshot from concurrent writers. Local state is
//! locked with an exclusively created `<state>.lock.info` file holding a
//! JSON [`LockInfo`].

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use mantle_common::constants::VERSION;
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::manager::StateManager;

const RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Metadata recorded by the holder of a lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock ID, needed to unlock.
    #[serde(rename = "ID")]
    pub id: String,
    /// Operation that took the lock, e.g. `OperationTypeApply`.
    #[serde(rename = "Operation")]
    pub operation: String,
    /// `user@host` of the holder.
    #[serde(rename = "Who")]
    pub who: String,
    /// Mantle version of the holder.
    #[serde(rename = "Version")]
    pub version: String,
    /// When the lock was taken.
    #[serde(rename = "Created")]
    pub created: DateTime<Utc>,
    /// Path or URL of the locked state.
    #[serde(rename = "Path")]
    pub path: String,
}

impl LockInfo {
    /// Creates lock metadata for an operation.
    pub fn new(operation: impl Into<String>) -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".into());
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            who: format!("{user}@{host}"),
            version: VERSION.to_string(),
            created: Utc::now(),
            path: String::new(),
        }
    }
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Lock Info:")?;
        writeln!(f, "  ID:        {}", self.id)?;
        writeln!(f, "  Path:      {}", self.path)?;
        writeln!(f, "  Operation: {}", self.operation)?;
        writeln!(f, "  Who:       {}", self.who)?;
        writeln!(f, "  Version:   {}", self.version)?;
        write!(f, "  Created:   {}", self.created)
    }
}

/// Acquires and releases the lock of a state manager for one command.
pub trait StateLocker {
    /// Locks the state for `operation`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired.
    fn lock(&mut self, mgr: &mut dyn StateManager, operation: &str) -> Result<(), StateError>;

    /// Releases a lock taken by [`StateLocker::lock`]. Does nothing if no
    /// lock is held.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be released.
    fn unlock(&mut self, mgr: &mut dyn StateManager) -> Result<(), StateError>;
}

/// Locker that retries until a timeout.
#[derive(Debug, Default)]
pub struct Locker {
    timeout: Duration,
    held: Option<String>,
}

impl Locker {
    /// Creates a locker that keeps retrying for up to `timeout`.
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout, held: None }
    }
}

impl StateLocker for Locker {
    fn lock(&mut self, mgr: &mut dyn StateManager, operation: &str) -> Result<(), StateError> {
        let started = Instant::now();
        loop {
            let info = LockInfo::new(operation);
            match mgr.lock(&info) {
                Ok(id) => {
                    tracing::debug!(id = %id, operation, "state locked");
                    self.held = Some(id);
                    return Ok(());
                }
                Err(StateError::Locked { info }) => {
                    let elapsed = started.elapsed();
                    if elapsed >= self.timeout {
                        return Err(StateError::Locked { info });
                    }
                    tracing::debug!(holder = %info.who, "state is locked, retrying");
                    std::thread::sleep(RETRY_INTERVAL.min(self.timeout - elapsed));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn unlock(&mut self, mgr: &mut dyn StateManager) -> Result<(), StateError> {
        match self.held.take() {
            Some(id) => {
                tracing::debug!(id = %id, "state unlocked");
                mgr.unlock(&id)
            }
            None => Ok(()),
        }
    }
}

/// Locker used with `--lock=false`; never touches the lock.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLocker;

impl StateLocker for NoopLocker {
    fn lock(&mut self, _mgr: &mut dyn StateManager, _operation: &str) -> Result<(), StateError> {
        Ok(())
    }

    fn unlock(&mut self, _mgr: &mut dyn StateManager) -> Result<(), StateError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::LocalStateManager;

    #[test]
    fn lock_info_display_lists_fields() {
        let mut info = LockInfo::new("OperationTypePlan");
        info.path = "mantle.state".into();
        let text = info.to_string();
        assert!(text.starts_with("Lock Info:"));
        assert!(text.contains("Operation: OperationTypePlan"));
        assert!(text.contains("Path:      mantle.state"));
    }

    #[test]
    fn locker_times_out_on_held_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mantle.state");
        let mut first = LocalStateManager::new(&path);
        let mut second = LocalStateManager::new(&path);

        let mut holder = Locker::new(Duration::ZERO);
        holder.lock(&mut first, "OperationTypeApply").expect("first lock");

        let mut waiter = Locker::new(Duration::from_millis(250));
        let started = Instant::now();
        let err = waiter.lock(&mut second, "OperationTypePlan").expect_err("should time out");
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(matches!(err, StateError::Locked { .. }));

        holder.unlock(&mut first).expect("unlock");
        waiter.lock(&mut second, "OperationTypePlan").expect("lock after release");
        waiter.unlock(&mut second).expect("unlock");
    }

    #[test]
    fn noop_locker_never_blocks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mantle.state");
        let mut mgr = LocalStateManager::new(&path);
        let mut holder = Locker::new(Duration::ZERO);
        holder.lock(&mut mgr, "OperationTypeApply").expect("lock");
        let mut other = LocalStateManager::new(&path);
        NoopLocker.lock(&mut other, "OperationTypePlan").expect("noop lock");
        NoopLocker.unlock(&mut other).expect("noop unlock");
    }
}
