//! The state model.
//!
//! A [`State`] snapshot records every resource Mantle manages together with
//! the root output values. Snapshots are serialized as pretty-printed JSON.

use std::collections::BTreeMap;

use mantle_common::constants::{STATE_FORMAT_VERSION, VERSION};
use mantle_common::types::{ResourceAddr, ResourceMode};
use mantle_common::value::Value;
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// A snapshot of managed infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Format version.
    pub version: u32,
    /// Incremented every time a changed snapshot is persisted.
    pub serial: u64,
    /// Unique ID of this state's history, fixed at creation.
    pub lineage: String,
    /// Version of Mantle that last wrote the state.
    #[serde(default)]
    pub mantle_version: String,
    /// Tracked resources, sorted by address.
    #[serde(default)]
    pub resources: Vec<ResourceState>,
    /// Root output values.
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputState>,
}

/// The recorded state of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Managed or data.
    pub mode: ResourceMode,
    /// Resource type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Resource name.
    pub name: String,
    /// Provider that manages the resource.
    pub provider: String,
    /// Attribute values as a JSON object.
    pub attributes: serde_json::Value,
    /// Addresses this resource depended on when it was last applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// A recorded output value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputState {
    /// The value.
    pub value: serde_json::Value,
    /// Whether human output should hide it.
    #[serde(default)]
    pub sensitive: bool,
}

impl ResourceState {
    /// Creates a resource record from an address and attributes.
    pub fn new(addr: &ResourceAddr, attributes: serde_json::Value) -> Self {
        Self {
            mode: addr.mode,
            type_name: addr.type_name.clone(),
            name: addr.name.clone(),
            provider: addr.provider().to_string(),
            attributes,
            dependencies: Vec::new(),
        }
    }

    /// The resource's address.
    pub fn addr(&self) -> ResourceAddr {
        ResourceAddr {
            mode: self.mode,
            type_name: self.type_name.clone(),
            name: self.name.clone(),
        }
    }

    /// Attributes as a configuration value.
    pub fn value(&self) -> Value {
        Value::from_json(&self.attributes)
    }

    /// The `id` attribute, if set.
    pub fn id(&self) -> Option<&str> {
        self.attributes.get("id").and_then(serde_json::Value::as_str)
    }
}

impl State {
    /// Creates an empty state with a fresh lineage.
    pub fn new() -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            mantle_version: VERSION.to_string(),
            resources: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Returns true if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }

    /// Returns true if any managed resource is recorded.
    pub fn has_managed_resources(&self) -> bool {
        self.resources.iter().any(|r| r.mode == ResourceMode::Managed)
    }

    /// Looks up a resource.
    pub fn resource(&self, addr: &ResourceAddr) -> Option<&ResourceState> {
        self.resources.iter().find(|r| &r.addr() == addr)
    }

    /// Every recorded address, sorted.
    pub fn addresses(&self) -> Vec<ResourceAddr> {
        let mut out: Vec<ResourceAddr> = self.resources.iter().map(ResourceState::addr).collect();
        out.sort();
        out
    }

    /// Inserts or replaces a resource record.
    pub fn set_resource(&mut self, resource: ResourceState) {
        let addr = resource.addr();
        if let Some(existing) = self.resources.iter_mut().find(|r| r.addr() == addr) {
            *existing = resource;
        } else {
            self.resources.push(resource);
            self.resources.sort_by_key(ResourceState::addr);
        }
    }

    /// Removes a resource record, returning it.
    pub fn remove(&mut self, addr: &ResourceAddr) -> Option<ResourceState> {
        let idx = self.resources.iter().position(|r| &r.addr() == addr)?;
        Some(self.resources.remove(idx))
    }

    /// Moves a resource record to a new address.
    ///
    /// # Errors
    ///
    /// Returns an error if `src` is not in state, `dst` is already
    /// occupied, or the two addresses differ in mode or resource type.
    pub fn move_resource(&mut self, src: &ResourceAddr, dst: &ResourceAddr) -> Result<(), StateError> {
        if self.resource(dst).is_some() {
            return Err(StateError::ResourceExists { addr: dst.to_string() });
        }
        if src.mode != dst.mode || src.type_name != dst.type_name {
            return Err(StateError::MoveMismatch {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }
        let mut resource = self
            .remove(src)
            .ok_or_else(|| StateError::ResourceNotFound { addr: src.to_string() })?;
        resource.name.clone_from(&dst.name);
        self.set_resource(resource);
        Ok(())
    }

    /// Returns true if resources and outputs are equal, ignoring metadata.
    pub fn same_content(&self, other: &Self) -> bool {
        self.resources == other.resources && self.outputs == other.outputs
    }

    /// Decodes a state snapshot from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the format version is
    /// newer than supported.
    pub fn from_json(data: &[u8], origin: &str) -> Result<Self, StateError> {
        let state: Self = serde_json::from_slice(data).map_err(|source| StateError::Decode {
            origin: origin.to_string(),
            source,
        })?;
        if state.version > STATE_FORMAT_VERSION {
            return Err(StateError::UnsupportedVersion {
                found: state.version,
                supported: STATE_FORMAT_VERSION,
            });
        }
        Ok(state)
    }

    /// Encodes the snapshot as pretty JSON with a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, StateError> {
        let mut out = serde_json::to_vec_pretty(self).map_err(|source| StateError::Decode {
            origin: "state snapshot".into(),
            source,
        })?;
        out.push(b'\n');
        Ok(out)
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> ResourceState {
        ResourceState::new(
            &ResourceAddr::managed("local_file", name),
            serde_json::json!({"id": format!("id-{name}"), "filename": format!("{name}.txt")}),
        )
    }

    #[test]
    fn new_state_is_empty() {
        let state = State::new();
        assert!(state.is_empty());
        assert_eq!(state.version, STATE_FORMAT_VERSION);
        assert_eq!(state.lineage.len(), 36);
    }

    #[test]
    fn set_resource_keeps_sorted_and_replaces() {
        let mut state = State::new();
        state.set_resource(file("b"));
        state.set_resource(file("a"));
        let mut replaced = file("b");
        replaced.attributes = serde_json::json!({"id": "new"});
        state.set_resource(replaced);
        assert_eq!(state.resources.len(), 2);
        assert_eq!(state.resources[0].name, "a");
        assert_eq!(state.resource(&ResourceAddr::managed("local_file", "b")).and_then(ResourceState::id), Some("new"));
    }

    #[test]
    fn move_resource_renames() {
        let mut state = State::new();
        state.set_resource(file("a"));
        let src = ResourceAddr::managed("local_file", "a");
        let dst = ResourceAddr::managed("local_file", "z");
        state.move_resource(&src, &dst).expect("move");
        assert!(state.resource(&src).is_none());
        assert!(state.resource(&dst).is_some());
    }

    #[test]
    fn move_resource_errors() {
        let mut state = State::new();
        state.set_resource(file("a"));
        state.set_resource(file("b"));
        let a = ResourceAddr::managed("local_file", "a");
        let b = ResourceAddr::managed("local_file", "b");
        assert!(matches!(state.move_resource(&a, &b), Err(StateError::ResourceExists { .. })));
        let missing = ResourceAddr::managed("local_file", "zz");
        let other = ResourceAddr::managed("local_file", "yy");
        assert!(matches!(state.move_resource(&missing, &other), Err(StateError::ResourceNotFound { .. })));
        let typed = ResourceAddr::managed("null_resource", "a2");
        assert!(matches!(state.move_resource(&a, &typed), Err(StateError::MoveMismatch { .. })));
        assert!(state.resource(&a).is_some());
    }

    #[test]
    fn json_round_trip_uses_type_key() {
        let mut state = State::new();
        state.set_resource(file("a"));
        let bytes = state.to_json().expect("encode");
        let text = String::from_utf8(bytes.clone()).expect("utf8");
        assert!(text.contains("\"type\": \"local_file\""));
        let back = State::from_json(&bytes, "test").expect("decode");
        assert_eq!(back, state);
    }

    #[test]
    fn newer_version_is_rejected() {
        let data = br#"{"version": 99, "serial": 1, "lineage": "x"}"#;
        assert!(matches!(
            State::from_json(data, "test"),
            Err(StateError::UnsupportedVersion { found: 99, .. })
        ));
    }
}
