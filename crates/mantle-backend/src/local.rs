//! The `local` backend: state files in the working directory.
//!
//! The default workspace lives at `mantle.state`; every other workspace at
//! `mantle.state.d/<name>/mantle.state`.

use std::path::{Path, PathBuf};

use mantle_common::constants::{DEFAULT_STATE_FILE, DEFAULT_WORKSPACE, WORKSPACE_STATE_DIR, lock_info_path_for};
use mantle_common::types::is_valid_workspace_name;
use mantle_state::{Encryption, LocalStateManager, StateManager};

use crate::Backend;
use crate::error::BackendError;

/// State stored in local files.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    state_path: Option<PathBuf>,
    state_out: Option<PathBuf>,
    backup: Option<Option<PathBuf>>,
    workspace_dir: PathBuf,
    encryption: Encryption,
}

impl LocalBackend {
    /// Creates a backend rooted at the working directory.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            state_path: None,
            state_out: None,
            backup: None,
            workspace_dir: PathBuf::from(WORKSPACE_STATE_DIR),
            encryption: Encryption::Disabled,
        }
    }

    /// Reads the default workspace's state from `path` instead.
    #[must_use]
    pub fn with_state_path(mut self, path: Option<PathBuf>) -> Self {
        self.state_path = path;
        self
    }

    /// Writes state to `path` instead of where it was read from.
    #[must_use]
    pub fn with_state_out(mut self, path: Option<PathBuf>) -> Self {
        self.state_out = path;
        self
    }

    /// Overrides the backup path. `Some(None)` disables backups.
    #[must_use]
    pub fn with_backup(mut self, backup: Option<Option<PathBuf>>) -> Self {
        self.backup = backup;
        self
    }

    /// Stores non-default workspaces under `dir`.
    #[must_use]
    pub fn with_workspace_dir(mut self, dir: PathBuf) -> Self {
        self.workspace_dir = dir;
        self
    }

    /// Encrypts state with `encryption`.
    #[must_use]
    pub fn with_encryption(mut self, encryption: Encryption) -> Self {
        self.encryption = encryption;
        self
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn workspaces_root(&self) -> PathBuf {
        self.absolute(&self.workspace_dir)
    }

    /// Path of a workspace's state file.
    pub fn state_path(&self, workspace: &str) -> PathBuf {
        if workspace == DEFAULT_WORKSPACE {
            let path = self.state_path.as_deref().unwrap_or_else(|| Path::new(DEFAULT_STATE_FILE));
            self.absolute(path)
        } else {
            self.workspaces_root().join(workspace).join(DEFAULT_STATE_FILE)
        }
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn workspaces(&self) -> Result<Vec<String>, BackendError> {
        let mut names = vec![DEFAULT_WORKSPACE.to_string()];
        let dir = self.workspaces_root();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(BackendError::io(dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| BackendError::io(&dir, e))?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names[1..].sort();
        Ok(names)
    }

    fn delete_workspace(&self, name: &str, force: bool) -> Result<(), BackendError> {
        if name == DEFAULT_WORKSPACE {
            return Err(BackendError::DefaultWorkspace);
        }
        check_workspace_name(name)?;
        let dir = self.workspaces_root().join(name);
        if !dir.is_dir() {
            return Err(BackendError::WorkspaceNotFound { name: name.to_string() });
        }
        if !force && lock_info_path_for(&self.state_path(name)).exists() {
            return Err(BackendError::WorkspaceLocked { name: name.to_string() });
        }
        std::fs::remove_dir_all(&dir).map_err(|e| BackendError::io(&dir, e))?;
        tracing::info!(workspace = name, "workspace deleted");
        Ok(())
    }

    fn create_workspace(&self, name: &str) -> Result<(), BackendError> {
        check_workspace_name(name)?;
        if name == DEFAULT_WORKSPACE {
            return Ok(());
        }
        let dir = self.workspaces_root().join(name);
        std::fs::create_dir_all(&dir).map_err(|e| BackendError::io(&dir, e))?;
        tracing::info!(workspace = name, "workspace created");
        Ok(())
    }

    fn state_mgr(&self, workspace: &str) -> Result<Box<dyn StateManager>, BackendError> {
        check_workspace_name(workspace)?;
        let path = self.state_path(workspace);
        let mut mgr = LocalStateManager::new(&path).with_encryption(self.encryption.clone());
        if let Some(out) = &self.state_out {
            mgr = mgr.with_out_path(self.absolute(out));
        }
        if let Some(backup) = &self.backup {
            mgr = mgr.with_backup_path(backup.as_deref().map(|p| self.absolute(p)));
        }
        Ok(Box::new(mgr))
    }
}

/// Workspace names become directory names under the working directory.
fn check_workspace_name(name: &str) -> Result<(), BackendError> {
    if is_valid_workspace_name(name) {
        Ok(())
    } else {
        Err(BackendError::InvalidWorkspaceName { name: name.to_string() })
    }
}
