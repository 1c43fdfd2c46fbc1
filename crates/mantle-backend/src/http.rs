//! The `http` backend: state stored behind a REST endpoint.
//!
//! State is fetched with `GET`, stored with the update method (`POST` by
//! default) and, when a lock address is configured, locked and unlocked
//! with the `LOCK` and `UNLOCK` methods carrying a JSON [`LockInfo`].

use std::collections::BTreeMap;

use mantle_common::constants::{DEFAULT_WORKSPACE, VERSION};
use mantle_common::value::Value;
use mantle_state::{Encryption, LockInfo, State, StateError, StateManager};
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};

use crate::Backend;
use crate::error::BackendError;

const BACKEND: &str = "http";

/// Settings of the `http` backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// State endpoint.
    pub address: String,
    /// Method used to store state.
    pub update_method: String,
    /// Lock endpoint; locking is disabled without one.
    pub lock_address: Option<String>,
    /// Method used to lock.
    pub lock_method: String,
    /// Unlock endpoint; defaults to the lock address.
    pub unlock_address: Option<String>,
    /// Method used to unlock.
    pub unlock_method: String,
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
}

impl HttpSettings {
    /// Reads settings from a `backend "http"` block.
    ///
    /// # Errors
    ///
    /// Returns an error if `address` is missing, a setting is not a string,
    /// a URL is not `http(s)`, or a method name is invalid.
    pub fn from_block(settings: &BTreeMap<String, Value>) -> Result<Self, BackendError> {
        const KNOWN: [&str; 8] = [
            "address",
            "update_method",
            "lock_address",
            "lock_method",
            "unlock_address",
            "unlock_method",
            "username",
            "password",
        ];
        if let Some(unknown) = settings.keys().find(|k| !KNOWN.contains(&k.as_str())) {
            return Err(BackendError::setting(BACKEND, unknown, "unsupported argument"));
        }
        let get = |name: &str| -> Result<Option<String>, BackendError> {
            match settings.get(name) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(_) => Err(BackendError::setting(BACKEND, name, "must be a string")),
            }
        };
        let url = |name: &str| -> Result<Option<String>, BackendError> {
            let value = get(name)?;
            if let Some(u) = &value {
                if !(u.starts_with("http://") || u.starts_with("https://")) {
                    return Err(BackendError::setting(BACKEND, name, "must be an http or https URL"));
                }
            }
            Ok(value)
        };
        let method = |name: &str, default: &str| -> Result<String, BackendError> {
            let m = get(name)?.unwrap_or_else(|| default.to_string());
            Method::from_bytes(m.as_bytes())
                .map_err(|_| BackendError::setting(BACKEND, name, format!("{m:?} is not a valid HTTP method")))?;
            Ok(m)
        };
        let address = url("address")?.ok_or_else(|| BackendError::setting(BACKEND, "address", "is required"))?;
        Ok(Self {
            address,
            update_method: method("update_method", "POST")?,
            lock_address: url("lock_address")?,
            lock_method: method("lock_method", "LOCK")?,
            unlock_address: url("unlock_address")?,
            unlock_method: method("unlock_method", "UNLOCK")?,
            username: get("username")?,
            password: get("password")?,
        })
    }
}

/// State stored by a REST service. Only the default workspace exists.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    settings: HttpSettings,
    client: Client,
    encryption: Encryption,
}

impl HttpBackend {
    /// Creates a backend from parsed settings.
    pub fn new(settings: HttpSettings) -> Self {
        Self {
            settings,
            client: Client::new(),
            encryption: Encryption::Disabled,
        }
    }

    /// Encrypts state with `encryption`.
    #[must_use]
    pub fn with_encryption(mut self, encryption: Encryption) -> Self {
        self.encryption = encryption;
        self
    }
}

impl Backend for HttpBackend {
    fn name(&self) -> &str {
        BACKEND
    }

    fn workspaces(&self) -> Result<Vec<String>, BackendError> {
        Ok(vec![DEFAULT_WORKSPACE.to_string()])
    }

    fn delete_workspace(&self, _name: &str, _force: bool) -> Result<(), BackendError> {
        Err(BackendError::WorkspacesNotSupported {
            backend: BACKEND.to_string(),
        })
    }

    fn state_mgr(&self, workspace: &str) -> Result<Box<dyn StateManager>, BackendError> {
        if workspace != DEFAULT_WORKSPACE {
            return Err(BackendError::WorkspacesNotSupported {
                backend: BACKEND.to_string(),
            });
        }
        Ok(Box::new(HttpStateManager {
            settings: self.settings.clone(),
            client: self.client.clone(),
            encryption: self.encryption.clone(),
            current: None,
            stored: None,
            lock_id: None,
        }))
    }

    fn supports_workspaces(&self) -> bool {
        false
    }
}

/// State manager talking to the REST endpoint.
#[derive(Debug)]
pub struct HttpStateManager {
    settings: HttpSettings,
    client: Client,
    encryption: Encryption,
    current: Option<State>,
    stored: Option<State>,
    lock_id: Option<String>,
}

fn remote(message: impl Into<String>) -> StateError {
    StateError::Remote {
        message: message.into(),
    }
}

impl HttpStateManager {
    fn request(&self, method: &str, url: &str) -> Result<RequestBuilder, StateError> {
        let method =
            Method::from_bytes(method.as_bytes()).map_err(|_| remote(format!("invalid HTTP method {method:?}")))?;
        let mut req = self.client.request(method, url);
        if let Some(user) = &self.settings.username {
            req = req.basic_auth(user, self.settings.password.as_deref());
        }
        Ok(req)
    }

    fn send(&self, req: RequestBuilder, url: &str) -> Result<reqwest::blocking::Response, StateError> {
        req.send().map_err(|e| remote(format!("failed to reach {url}: {e}")))
    }
}

impl StateManager for HttpStateManager {
    fn refresh(&mut self) -> Result<(), StateError> {
        let url = self.settings.address.clone();
        let resp = self.send(self.request("GET", &url)?, &url)?;
        match resp.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => {
                tracing::debug!(url = %url, "no remote state");
                self.current = None;
                self.stored = None;
                return Ok(());
            }
            status => return Err(remote(format!("HTTP {status} fetching state from {url}"))),
        }
        let body = resp
            .bytes()
            .map_err(|e| remote(format!("failed to read response body from {url}: {e}")))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            self.current = None;
            self.stored = None;
            return Ok(());
        }
        let plain = self.encryption.decrypt(&body)?;
        let state = State::from_json(&plain, &url)?;
        tracing::debug!(url = %url, serial = state.serial, "remote state loaded");
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
            if stored.lineage == current.lineage && stored.same_content(current) {
                return Ok(());
            }
            if stored.lineage == current.lineage {
                current.serial = current.serial.max(stored.serial) + 1;
            }
        } else {
            current.serial += 1;
        }
        current.mantle_version = VERSION.to_string();
        let body = self.encryption.encrypt(&current.to_json()?)?;
        let snapshot = current.clone();

        let mut url = self.settings.address.clone();
        if let Some(id) = &self.lock_id {
            let sep = if url.contains('?') { '&' } else { '?' };
            url = format!("{url}{sep}ID={id}");
        }
        let req = self
            .request(&self.settings.update_method, &url)?
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let resp = self.send(req, &url)?;
        if !resp.status().is_success() {
            return Err(remote(format!("HTTP {} storing state at {url}", resp.status())));
        }
        tracing::info!(url = %self.settings.address, serial = snapshot.serial, "remote state persisted");
        self.stored = Some(snapshot);
        Ok(())
    }

    fn lock(&mut self, info: &LockInfo) -> Result<String, StateError> {
        let Some(url) = self.settings.lock_address.clone() else {
            return Ok(String::new());
        };
        let mut info = info.clone();
        info.path = self.settings.address.clone();
        let body = serde_json::to_vec(&info).map_err(|source| StateError::Decode {
            origin: url.clone(),
            source,
        })?;
        let req = self
            .request(&self.settings.lock_method, &url)?
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let resp = self.send(req, &url)?;
        match resp.status() {
            s if s.is_success() => {
                self.lock_id = Some(info.id.clone());
                Ok(info.id)
            }
            StatusCode::LOCKED | StatusCode::CONFLICT => {
                let body = resp.bytes().unwrap_or_default();
                match serde_json::from_slice::<LockInfo>(&body) {
                    Ok(held) => Err(StateError::Locked { info: Box::new(held) }),
                    Err(_) => Err(remote(format!(
                        "HTTP remote state already locked: {}",
                        String::from_utf8_lossy(&body).trim()
                    ))),
                }
            }
            status => Err(remote(format!("HTTP {status} locking state at {url}"))),
        }
    }

    fn unlock(&mut self, id: &str) -> Result<(), StateError> {
        let Some(lock_url) = &self.settings.lock_address else {
            return Ok(());
        };
        let url = self.settings.unlock_address.clone().unwrap_or_else(|| lock_url.clone());
        let body = serde_json::json!({ "ID": id }).to_string();
        let req = self
            .request(&self.settings.unlock_method, &url)?
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let resp = self.send(req, &url)?;
        if !resp.status().is_success() {
            return Err(remote(format!("HTTP {} unlocking state at {url}", resp.status())));
        }
        self.lock_id = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Clone)]
    struct Request {
        method: String,
        path: String,
        body: String,
    }

    /// Serves one scripted response per connection and records requests.
    fn serve(responses: Vec<(u16, String)>) -> (String, Arc<Mutex<Vec<Request>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let log = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&log);
        let _ = std::thread::spawn(move || {
            for (status, body) in responses {
                let Ok((stream, _)) = listener.accept() else { return };
                let mut reader = BufReader::new(stream.try_clone().expect("clone"));
                let mut line = String::new();
                let _ = reader.read_line(&mut line).expect("request line");
                let mut parts = line.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let path = parts.next().unwrap_or_default().to_string();
                let mut length = 0usize;
                loop {
                    let mut header = String::new();
                    let _ = reader.read_line(&mut header).expect("header");
                    if header.trim().is_empty() {
                        break;
                    }
                    if let Some((name, value)) = header.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            length = value.trim().parse().unwrap_or(0);
                        }
                    }
                }
                let mut buf = vec![0; length];
                reader.read_exact(&mut buf).expect("body");
                recorded.lock().expect("log").push(Request {
                    method,
                    path,
                    body: String::from_utf8_lossy(&buf).into_owned(),
                });
                let mut stream = stream;
                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).expect("reply");
            }
        });
        (format!("http://{addr}"), log)
    }

    fn settings(base: &str, lock: bool) -> HttpSettings {
        let mut block = BTreeMap::new();
        let _ = block.insert("address".to_string(), Value::String(format!("{base}/state")));
        if lock {
            let _ = block.insert("lock_address".to_string(), Value::String(format!("{base}/lock")));
        }
        HttpSettings::from_block(&block).expect("settings")
    }

    #[test]
    fn settings_validation() {
        let mut block = BTreeMap::new();
        assert!(HttpSettings::from_block(&block).is_err());
        let _ = block.insert("address".to_string(), Value::String("ftp://x".into()));
        assert!(HttpSettings::from_block(&block).is_err());
        let _ = block.insert("address".to_string(), Value::String("https://x/state".into()));
        let parsed = HttpSettings::from_block(&block).expect("valid");
        assert_eq!(parsed.update_method, "POST");
        assert_eq!(parsed.lock_method, "LOCK");
        let _ = block.insert("retries".to_string(), Value::Number(3.0));
        assert!(HttpSettings::from_block(&block).is_err());
    }

    #[test]
    fn missing_remote_state_is_empty() {
        let (base, _) = serve(vec![(404, String::new())]);
        let backend = HttpBackend::new(settings(&base, false));
        let mut mgr = backend.state_mgr("default").expect("mgr");
        mgr.refresh().expect("refresh");
        assert!(mgr.state().is_none());
    }

    #[test]
    fn persist_posts_state_with_lock_id() {
        let (base, log) = serve(vec![(200, String::new()), (200, String::new()), (200, String::new())]);
        let backend = HttpBackend::new(settings(&base, true));
        let mut mgr = backend.state_mgr("default").expect("mgr");
        let id = mgr.lock(&LockInfo::new("OperationTypeApply")).expect("lock");
        mgr.write_state(State::new());
        mgr.persist().expect("persist");
        mgr.unlock(&id).expect("unlock");

        let requests = log.lock().expect("log").clone();
        assert_eq!(requests[0].method, "LOCK");
        assert!(requests[0].body.contains("OperationTypeApply"));
        assert_eq!(requests[1].method, "POST");
        assert_eq!(requests[1].path, format!("/state?ID={id}"));
        assert!(requests[1].body.contains("\"serial\": 1"));
        assert_eq!(requests[2].method, "UNLOCK");
    }

    #[test]
    fn locked_response_reports_holder() {
        let holder = serde_json::to_string(&LockInfo::new("OperationTypePlan")).expect("json");
        let (base, _) = serve(vec![(423, holder)]);
        let backend = HttpBackend::new(settings(&base, true));
        let mut mgr = backend.state_mgr("default").expect("mgr");
        let err = mgr.lock(&LockInfo::new("OperationTypeApply")).expect_err("locked");
        assert!(matches!(err, StateError::Locked { .. }));
    }

    #[test]
    fn only_default_workspace() {
        let backend = HttpBackend::new(settings("http://127.0.0.1:1", false));
        assert!(!backend.supports_workspaces());
        assert_eq!(backend.workspaces().expect("list"), vec!["default"]);
        assert!(backend.state_mgr("dev").is_err());
        assert!(backend.delete_workspace("dev", false).is_err());
    }
}
