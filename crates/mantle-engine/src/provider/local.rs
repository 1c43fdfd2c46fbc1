//! The `local` provider: files on the machine running Mantle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::value::Value;
use sha2::{Digest, Sha256};

use super::{ApplyRequest, AttributeSchema, Provider, ProviderSchema, Schema, unsupported};
use crate::error::ProviderError;

const FILE: &str = "local_file";

/// The built-in `local` provider.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    base_dir: PathBuf,
}

impl LocalProvider {
    /// Creates the provider. Relative filenames resolve against `base_dir`.
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    fn resolve(&self, filename: &str) -> PathBuf {
        let path = Path::new(filename);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn read_file(&self, filename: &str) -> Result<Option<String>, ProviderError> {
        let path = self.resolve(filename);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProviderError::io(path, e)),
        }
    }
}

fn content_id(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn string_attr(obj: &Value, name: &str) -> Result<String, ProviderError> {
    obj.get_attr(name)
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| ProviderError::InvalidArgument {
            attribute: name.to_string(),
            message: "a known string value is required".into(),
        })
}

fn file_object(filename: &str, content: String) -> Value {
    Value::Map(BTreeMap::from([
        ("id".to_string(), Value::String(content_id(&content))),
        ("filename".to_string(), Value::String(filename.to_string())),
        ("content".to_string(), Value::String(content)),
    ]))
}

impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn version(&self) -> &str {
        "2.5.1"
    }

    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::default();
        let _ = schema.resources.insert(
            FILE.into(),
            Schema::new([
                ("content", AttributeSchema::required().force_new()),
                ("filename", AttributeSchema::required().force_new()),
                ("id", AttributeSchema::computed()),
            ]),
        );
        let _ = schema.data_sources.insert(
            FILE.into(),
            Schema::new([
                ("content", AttributeSchema::computed()),
                ("filename", AttributeSchema::required()),
                ("id", AttributeSchema::computed()),
            ]),
        );
        schema
    }

    fn validate_resource_config(&self, _type_name: &str, config: &Value) -> Diagnostics {
        let mut diags = Diagnostics::new();
        if config.get_attr("filename").and_then(|v| v.as_str().map(str::is_empty)) == Some(true) {
            diags.push(Diagnostic::error(
                "Invalid argument value",
                "The \"filename\" argument must not be empty.",
            ));
        }
        diags
    }

    fn apply_resource_change(&self, req: ApplyRequest<'_>) -> Result<Option<Value>, ProviderError> {
        if req.type_name != FILE {
            return Err(unsupported(self.name(), req.type_name));
        }
        let Some(planned) = req.planned else {
            if let Some(prior) = req.prior {
                let path = self.resolve(&string_attr(prior, "filename")?);
                match std::fs::remove_file(&path) {
                    Ok(()) => tracing::debug!(path = %path.display(), "file removed"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(ProviderError::io(path, e)),
                }
            }
            return Ok(None);
        };

        let filename = string_attr(planned, "filename")?;
        let content = string_attr(planned, "content")?;
        let path = self.resolve(&filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProviderError::io(parent, e))?;
        }
        std::fs::write(&path, &content).map_err(|e| ProviderError::io(&path, e))?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "file written");
        Ok(Some(file_object(&filename, content)))
    }

    fn read_resource(&self, type_name: &str, current: &Value) -> Result<Option<Value>, ProviderError> {
        if type_name != FILE {
            return Err(unsupported(self.name(), type_name));
        }
        let filename = string_attr(current, "filename")?;
        let Some(content) = self.read_file(&filename)? else {
            return Ok(None);
        };
        let recorded = current.get_attr("id");
        if recorded.as_ref().and_then(Value::as_str) != Some(content_id(&content).as_str()) {
            // Changed outside Mantle; the recorded object is gone.
            return Ok(None);
        }
        Ok(Some(current.clone()))
    }

    fn import_resource(&self, type_name: &str, id: &str) -> Result<Value, ProviderError> {
        if type_name != FILE {
            return Err(unsupported(self.name(), type_name));
        }
        match self.read_file(id)? {
            Some(content) => Ok(file_object(id, content)),
            None => Err(ProviderError::failed(
                "Cannot import non-existent remote object",
                format!("The file {id:?} does not exist."),
            )),
        }
    }

    fn read_data_source(&self, type_name: &str, config: &Value) -> Result<Value, ProviderError> {
        if type_name != FILE {
            return Err(unsupported(self.name(), type_name));
        }
        let filename = string_attr(config, "filename")?;
        match self.read_file(&filename)? {
            Some(content) => Ok(file_object(&filename, content)),
            None => Err(ProviderError::failed(
                "Failed to read file",
                format!("The file {filename:?} does not exist."),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_config(filename: &str, content: &str) -> Value {
        Value::Map(BTreeMap::from([
            ("filename".to_string(), Value::String(filename.into())),
            ("content".to_string(), Value::String(content.into())),
            ("id".to_string(), Value::Unknown),
        ]))
    }

    #[test]
    fn create_read_delete_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = LocalProvider::new(dir.path());
        let planned = file_config("out/motd.txt", "hello");
        let state = provider
            .apply_resource_change(ApplyRequest {
                type_name: FILE,
                prior: None,
                planned: Some(&planned),
            })
            .expect("apply")
            .expect("created");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out/motd.txt")).expect("read"),
            "hello"
        );
        assert_eq!(state.get_attr("id"), Some(Value::String(content_id("hello"))));
        assert_eq!(provider.read_resource(FILE, &state).expect("read"), Some(state.clone()));

        let gone = provider
            .apply_resource_change(ApplyRequest {
                type_name: FILE,
                prior: Some(&state),
                planned: None,
            })
            .expect("delete");
        assert!(gone.is_none());
        assert!(!dir.path().join("out/motd.txt").exists());
        assert_eq!(provider.read_resource(FILE, &state).expect("read"), None);
    }

    #[test]
    fn edited_file_reads_as_gone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = LocalProvider::new(dir.path());
        std::fs::write(dir.path().join("a.txt"), "edited").expect("write");
        let recorded = file_object("a.txt", "original".into());
        assert_eq!(provider.read_resource(FILE, &recorded).expect("read"), None);
    }

    #[test]
    fn import_and_data_source_read_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = LocalProvider::new(dir.path());
        std::fs::write(dir.path().join("seed.txt"), "42").expect("write");
        let imported = provider.import_resource(FILE, "seed.txt").expect("import");
        assert_eq!(imported.get_attr("content"), Some(Value::String("42".into())));

        let config = Value::Map(BTreeMap::from([("filename".to_string(), Value::String("seed.txt".into()))]));
        let read = provider.read_data_source(FILE, &config).expect("read");
        assert_eq!(read.get_attr("content"), Some(Value::String("42".into())));
        assert!(provider.import_resource(FILE, "missing.txt").is_err());
    }

    #[test]
    fn empty_filename_is_invalid() {
        let provider = LocalProvider::new(Path::new("."));
        let diags = provider.validate_resource_config(FILE, &file_config("", "x"));
        assert!(diags.has_errors());
    }
}
