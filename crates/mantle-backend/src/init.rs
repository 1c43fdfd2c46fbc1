//! Backend selection and the record of the initialised backend.
//!
//! `mantle init` stores the backend type and settings in
//! `.mantle/backend.json`. Later commands compare that record with the
//! configuration and ask for `mantle init` when they differ.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mantle_common::constants::BACKEND_FILE;
use mantle_common::diagnostics::Diagnostic;
use mantle_common::value::Value;
use mantle_config::loader::BackendBlock;
use mantle_state::{Encryption, write_atomic};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Backend;
use crate::error::BackendError;
use crate::http::{HttpBackend, HttpSettings};
use crate::local::LocalBackend;

/// Command-line overrides applied to the selected backend.
#[derive(Debug, Clone, Default)]
pub struct BackendOpts {
    /// `-state`: read the default workspace from this path.
    pub state_path: Option<PathBuf>,
    /// `-state-out`: write state here instead.
    pub state_out: Option<PathBuf>,
    /// `-backup`: `Some(None)` disables backups.
    pub backup: Option<Option<PathBuf>>,
    /// State encryption.
    pub encryption: Encryption,
}

/// Builds the backend described by a `backend` block, or the local
/// backend when there is none.
///
/// # Errors
///
/// Returns an error for unknown backend types and invalid settings.
pub fn backend_from_config(
    block: Option<&BackendBlock>,
    root: &Path,
    opts: BackendOpts,
) -> Result<Box<dyn Backend>, BackendError> {
    let kind = block.map_or("local", |b| b.kind.as_str());
    let empty = BTreeMap::new();
    let settings = block.map_or(&empty, |b| &b.settings);
    tracing::debug!(backend = kind, "selecting backend");
    match kind {
        "local" => {
            let mut backend = LocalBackend::new(root)
                .with_state_out(opts.state_out)
                .with_backup(opts.backup)
                .with_encryption(opts.encryption);
            let mut configured_path = None;
            for (name, value) in settings {
                let Value::String(s) = value else {
                    return Err(BackendError::setting("local", name, "must be a string"));
                };
                match name.as_str() {
                    "path" => configured_path = Some(PathBuf::from(s)),
                    "workspace_dir" => backend = backend.with_workspace_dir(PathBuf::from(s)),
                    _ => return Err(BackendError::setting("local", name, "unsupported argument")),
                }
            }
            Ok(Box::new(backend.with_state_path(opts.state_path.or(configured_path))))
        }
        "http" => {
            if opts.state_path.is_some() || opts.state_out.is_some() {
                tracing::warn!("state path overrides are ignored by the http backend");
            }
            let settings = HttpSettings::from_block(settings)?;
            Ok(Box::new(HttpBackend::new(settings).with_encryption(opts.encryption)))
        }
        other => Err(BackendError::UnknownType { kind: other.to_string() }),
    }
}

/// The backend recorded by the last `mantle init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRecord {
    /// Backend type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Settings as JSON.
    pub config: serde_json::Value,
    /// SHA-256 of the type and settings.
    pub hash: String,
}

impl BackendRecord {
    /// Describes a backend block; `None` is the implicit local backend.
    pub fn from_block(block: Option<&BackendBlock>) -> Self {
        let kind = block.map_or_else(|| "local".to_string(), |b| b.kind.clone());
        let config: serde_json::Map<String, serde_json::Value> = block
            .map(|b| {
                b.settings
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json_lossy()))
                    .collect()
            })
            .unwrap_or_default();
        let config = serde_json::Value::Object(config);
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update([0]);
        hasher.update(config.to_string().as_bytes());
        Self {
            kind,
            config,
            hash: hex::encode(hasher.finalize()),
        }
    }

    /// Loads the record from the data directory, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn load(data_dir: &Path) -> Result<Option<Self>, BackendError> {
        let path = data_dir.join(BACKEND_FILE);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::io(path, e)),
        };
        serde_json::from_slice(&data).map(Some).map_err(|e| {
            BackendError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    /// Writes the record into the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, data_dir: &Path) -> Result<(), BackendError> {
        let path = data_dir.join(BACKEND_FILE);
        let mut json = serde_json::to_vec_pretty(self).map_err(|e| {
            BackendError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        json.push(b'\n');
        write_atomic(&path, &json)?;
        tracing::debug!(path = %path.display(), backend = %self.kind, "backend recorded");
        Ok(())
    }
}

/// Checks that the configured backend matches the initialised one.
///
/// The implicit local backend needs no initialisation.
///
/// # Errors
///
/// Returns a diagnostic asking for `mantle init` when the backend changed
/// or was never initialised, or the record cannot be read.
pub fn check_initialized(block: Option<&BackendBlock>, data_dir: &Path) -> Result<(), Diagnostic> {
    let wanted = BackendRecord::from_block(block);
    let recorded = BackendRecord::load(data_dir).map_err(Diagnostic::from)?;
    match recorded {
        None if block.is_none() => Ok(()),
        Some(r) if r.hash == wanted.hash => Ok(()),
        None => Err(Diagnostic::error(
            "Backend initialization required, please run \"mantle init\"",
            format!(
                "The \"{}\" backend is configured but has not been initialized. Run \"mantle init\" to initialize it.",
                wanted.kind
            ),
        )
        .with_optional_subject(block.map(|b| b.range.clone()))),
        Some(r) => Err(Diagnostic::error(
            "Backend initialization required, please run \"mantle init\"",
            format!(
                "The backend configuration changed since the last \"mantle init\" (was \"{}\", now \"{}\"). Run \"mantle init --reconfigure\" to use the new configuration.",
                r.kind, wanted.kind
            ),
        )
        .with_optional_subject(block.map(|b| b.range.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use mantle_common::diagnostics::{SourcePos, SourceRange};

    use super::*;

    fn block(kind: &str, settings: &[(&str, &str)]) -> BackendBlock {
        BackendBlock {
            kind: kind.to_string(),
            settings: settings
                .iter()
                .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
                .collect(),
            range: SourceRange {
                filename: "main.mtl".to_string(),
                start: SourcePos::default(),
                end: SourcePos::default(),
            },
        }
    }

    #[test]
    fn no_block_selects_local() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend_from_config(None, dir.path(), BackendOpts::default()).expect("backend");
        assert_eq!(backend.name(), "local");
    }

    #[test]
    fn local_path_setting_and_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        let b = block("local", &[("path", "custom.state")]);
        let backend = backend_from_config(Some(&b), dir.path(), BackendOpts::default()).expect("backend");
        let mut mgr = backend.state_mgr("default").expect("mgr");
        mgr.write_state(mantle_state::State::new());
        mgr.persist().expect("persist");
        assert!(dir.path().join("custom.state").exists());

        let opts = BackendOpts {
            state_path: Some(PathBuf::from("cli.state")),
            ..BackendOpts::default()
        };
        let backend = backend_from_config(Some(&b), dir.path(), opts).expect("backend");
        let mut mgr = backend.state_mgr("default").expect("mgr");
        mgr.write_state(mantle_state::State::new());
        mgr.persist().expect("persist");
        assert!(dir.path().join("cli.state").exists());
    }

    #[test]
    fn unknown_type_and_setting_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = backend_from_config(Some(&block("s3", &[])), dir.path(), BackendOpts::default())
            .err()
            .expect("error");
        assert!(matches!(err, BackendError::UnknownType { .. }));
        let diag = Diagnostic::from(err);
        assert_eq!(diag.summary, "Unsupported backend type");

        let err = backend_from_config(Some(&block("local", &[("bucket", "x")])), dir.path(), BackendOpts::default())
            .err()
            .expect("error");
        assert!(matches!(err, BackendError::InvalidSetting { .. }));
    }

    #[test]
    fn http_requires_address() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(backend_from_config(Some(&block("http", &[])), dir.path(), BackendOpts::default()).is_err());
        let backend = backend_from_config(
            Some(&block("http", &[("address", "http://127.0.0.1:1/state")])),
            dir.path(),
            BackendOpts::default(),
        )
        .expect("backend");
        assert_eq!(backend.name(), "http");
    }

    #[test]
    fn record_round_trip_and_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        check_initialized(None, dir.path()).expect("implicit local needs no init");

        let http = block("http", &[("address", "http://x/state")]);
        let err = check_initialized(Some(&http), dir.path()).expect_err("needs init");
        assert!(err.summary.starts_with("Backend initialization required"));

        let record = BackendRecord::from_block(Some(&http));
        record.save(dir.path()).expect("save");
        assert_eq!(BackendRecord::load(dir.path()).expect("load"), Some(record));
        check_initialized(Some(&http), dir.path()).expect("initialised");

        let changed = block("http", &[("address", "http://y/state")]);
        assert!(check_initialized(Some(&changed), dir.path()).is_err());
        assert!(check_initialized(None, dir.path()).is_err());
    }
}
