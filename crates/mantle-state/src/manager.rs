//! State managers: reading, writing and persisting snapshots.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use mantle_common::constants::{VERSION, backup_path_for, lock_info_path_for};

use crate::encryption::Encryption;
use crate::error::StateError;
use crate::lock::LockInfo;
use crate::state::State;

/// Storage for one workspace's state.
///
/// `write_state` only updates the in-memory snapshot; `persist` makes it
/// durable.
pub trait StateManager: Send {
    /// Reloads the snapshot from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if stored state exists but cannot be read.
    fn refresh(&mut self) -> Result<(), StateError>;

    /// The current snapshot, or `None` if there is no state yet.
    fn state(&self) -> Option<&State>;

    /// Replaces the in-memory snapshot.
    fn write_state(&mut self, state: State);

    /// Writes the in-memory snapshot to storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    fn persist(&mut self) -> Result<(), StateError>;

    /// Takes the lock, returning its ID.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Locked`] if another holder has the lock.
    fn lock(&mut self, info: &LockInfo) -> Result<String, StateError>;

    /// Releases the lock with the given ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID does not match the held lock.
    fn unlock(&mut self, id: &str) -> Result<(), StateError>;
}

/// State stored in a local file.
#[derive(Debug)]
pub struct LocalStateManager {
    path: PathBuf,
    out_path: PathBuf,
    backup_path: Option<PathBuf>,
    encryption: Encryption,
    current: Option<State>,
    /// Last snapshot read from or written to storage.
    stored: Option<State>,
    backed_up: bool,
}

impl LocalStateManager {
    /// Creates a manager reading and writing `path`, with the default
    /// backup path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            out_path: path.clone(),
            backup_path: Some(backup_path_for(&path)),
            path,
            encryption: Encryption::Disabled,
            current: None,
            stored: None,
            backed_up: false,
        }
    }

    /// Writes to `out` instead of the read path.
    #[must_use]
    pub fn with_out_path(mut self, out: impl Into<PathBuf>) -> Self {
        self.out_path = out.into();
        self
    }

    /// Sets the backup path; `None` disables backups.
    #[must_use]
    pub fn with_backup_path(mut self, backup: Option<PathBuf>) -> Self {
        self.backup_path = backup;
        self
    }

    /// Sets state encryption.
    #[must_use]
    pub fn with_encryption(mut self, encryption: Encryption) -> Self {
        self.encryption = encryption;
        self
    }

    /// Path state is read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_backup(&mut self) -> Result<(), StateError> {
        if self.backed_up {
            return Ok(());
        }
        self.backed_up = true;
        let Some(backup) = &self.backup_path else {
            return Ok(());
        };
        match std::fs::read(&self.out_path) {
            Ok(previous) => {
                tracing::debug!(backup = %backup.display(), "writing state backup");
                write_atomic(backup, &previous)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::io(&self.out_path, e)),
        }
    }
}

impl StateManager for LocalStateManager {
    fn refresh(&mut self) -> Result<(), StateError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no state file");
                self.current = None;
                self.stored = None;
                return Ok(());
            }
            Err(e) => return Err(StateError::io(&self.path, e)),
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            self.current = None;
            self.stored = None;
            return Ok(());
        }
        let plain = self.encryption.decrypt(&data)?;
        let state = State::from_json(&plain, &self.path.display().to_string())?;
        tracing::debug!(
            path = %self.path.display(),
            serial = state.serial,
            resources = state.resources.len(),
            "state loaded"
        );
        self.stored = Some(state.clone());
        self.current = Some(state);
        Ok(())
    }

    fn state(&self) -> Option<&State> {
        self.current.as_ref()
    }

    fn write_state(&mut self, state: State) {
        self.current = Some(state);
    }

    fn persist(&mut self) -> Result<(), StateError> {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        if let Some(stored) = &self.stored {
            if stored.lineage == current.lineage && stored.same_content(current) && self.out_path == self.path {
                tracing::debug!("state unchanged, not persisting");
                return Ok(());
            }
            if stored.lineage == current.lineage {
                current.serial = current.serial.max(stored.serial) + 1;
            }
        } else {
            current.serial += 1;
        }
        current.mantle_version = VERSION.to_string();
        let bytes = self.encryption.encrypt(&current.to_json()?)?;
        let snapshot = current.clone();

        self.write_backup()?;
        write_atomic(&self.out_path, &bytes)?;
        tracing::info!(path = %self.out_path.display(), serial = snapshot.serial, "state persisted");
        self.stored = Some(snapshot);
        Ok(())
    }

    fn lock(&mut self, info: &LockInfo) -> Result<String, StateError> {
        let lock_path = lock_info_path_for(&self.path);
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }
        let mut info = info.clone();
        info.path = self.path.display().to_string();

        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(mut file) => {
                let json = serde_json::to_vec_pretty(&info).map_err(|source| StateError::Decode {
                    origin: lock_path.display().to_string(),
                    source,
                })?;
                file.write_all(&json).map_err(|e| StateError::io(&lock_path, e))?;
                Ok(info.id)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let held = read_lock_info(&lock_path)?;
                Err(StateError::Locked { info: Box::new(held) })
            }
            Err(e) => Err(StateError::io(&lock_path, e)),
        }
    }

    fn unlock(&mut self, id: &str) -> Result<(), StateError> {
        let lock_path = lock_info_path_for(&self.path);
        let held = read_lock_info(&lock_path)?;
        if held.id != id {
            return Err(StateError::LockMismatch {
                given: id.to_string(),
                held: held.id,
            });
        }
        std::fs::remove_file(&lock_path).map_err(|e| StateError::io(&lock_path, e))
    }
}

fn read_lock_info(path: &Path) -> Result<LockInfo, StateError> {
    let data = std::fs::read(path).map_err(|e| StateError::io(path, e))?;
    serde_json::from_slice(&data).map_err(|source| StateError::Decode {
        origin: path.display().to_string(),
        source,
    })
}

/// Writes `data` to `path` through a temporary file and rename.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StateError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| StateError::io(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StateError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| StateError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| StateError::io(tmp.path(), e))?;
    let _ = tmp.persist(path).map_err(|e| StateError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ResourceState;
    use mantle_common::types::ResourceAddr;

    fn sample() -> State {
        let mut state = State::new();
        state.set_resource(ResourceState::new(
            &ResourceAddr::managed("null_resource", "a"),
            serde_json::json!({"id": "1"}),
        ));
        state
    }

    #[test]
    fn missing_file_means_no_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut mgr = LocalStateManager::new(dir.path().join("mantle.state"));
        mgr.refresh().expect("refresh");
        assert!(mgr.state().is_none());
    }

    #[test]
    fn persist_bumps_serial_only_on_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mantle.state");
        let mut mgr = LocalStateManager::new(&path);
        mgr.write_state(sample());
        mgr.persist().expect("persist");
        assert_eq!(mgr.state().expect("state").serial, 1);

        let mut reread = LocalStateManager::new(&path);
        reread.refresh().expect("refresh");
        let state = reread.state().expect("state").clone();
        reread.write_state(state.clone());
        reread.persist().expect("persist unchanged");
        assert_eq!(reread.state().expect("state").serial, 1);

        let mut changed = state;
        let _ = changed.outputs.insert(
            "x".into(),
            crate::state::OutputState {
                value: serde_json::json!(1),
                sensitive: false,
            },
        );
        reread.write_state(changed);
        reread.persist().expect("persist changed");
        assert_eq!(reread.state().expect("state").serial, 2);
    }

    #[test]
    fn backup_written_once_with_previous_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mantle.state");
        let mut first = LocalStateManager::new(&path);
        first.write_state(sample());
        first.persist().expect("persist");
        assert!(!backup_path_for(&path).exists());

        let mut second = LocalStateManager::new(&path);
        second.refresh().expect("refresh");
        let mut state = second.state().expect("state").clone();
        let _ = state.remove(&ResourceAddr::managed("null_resource", "a"));
        second.write_state(state);
        second.persist().expect("persist");

        let mut backup = LocalStateManager::new(backup_path_for(&path));
        backup.refresh().expect("refresh backup");
        assert_eq!(backup.state().expect("backup state").resources.len(), 1);
    }

    #[test]
    fn disabled_backup_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mantle.state");
        std::fs::write(&path, sample().to_json().expect("json")).expect("write");
        let mut mgr = LocalStateManager::new(&path).with_backup_path(None);
        mgr.refresh().expect("refresh");
        mgr.write_state(State::new());
        mgr.persist().expect("persist");
        assert!(!backup_path_for(&path).exists());
    }

    #[test]
    fn out_path_redirects_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mantle.state");
        let out = dir.path().join("out.state");
        let mut mgr = LocalStateManager::new(&path).with_out_path(&out);
        mgr.write_state(sample());
        mgr.persist().expect("persist");
        assert!(out.exists());
        assert!(!path.exists());
    }

    #[test]
    fn encrypted_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mantle.state");
        let enc = Encryption::from_passphrase("pw").expect("key");
        let mut mgr = LocalStateManager::new(&path).with_encryption(enc.clone());
        mgr.write_state(sample());
        mgr.persist().expect("persist");
        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("aes_gcm"));

        let mut plain = LocalStateManager::new(&path);
        assert!(plain.refresh().is_err());

        let mut keyed = LocalStateManager::new(&path).with_encryption(enc);
        keyed.refresh().expect("refresh");
        assert_eq!(keyed.state().expect("state").resources.len(), 1);
    }

    #[test]
    fn lock_is_exclusive_and_checks_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mantle.state");
        let mut a = LocalStateManager::new(&path);
        let mut b = LocalStateManager::new(&path);
        let id = a.lock(&LockInfo::new("OperationTypeApply")).expect("lock");
        let err = b.lock(&LockInfo::new("OperationTypePlan")).expect_err("locked");
        let StateError::Locked { info } = err else {
            panic!("expected lock error");
        };
        assert_eq!(info.id, id);
        assert!(matches!(a.unlock("wrong"), Err(StateError::LockMismatch { .. })));
        a.unlock(&id).expect("unlock");
        assert!(!lock_info_path_for(&path).exists());
    }
}
