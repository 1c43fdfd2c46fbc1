//! Planned changes and saved plan files.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use mantle_common::constants::{PLAN_FORMAT_VERSION, VERSION};
use mantle_common::error::{MantleError, Result};
use mantle_common::types::ResourceAddr;
use mantle_common::value::Value;
use mantle_state::{Encryption, State};
use serde::{Deserialize, Serialize};

/// What a plan does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanMode {
    /// Converge infrastructure on the configuration.
    #[default]
    Normal,
    /// Destroy every managed object.
    Destroy,
    /// Only update state to match real infrastructure.
    RefreshOnly,
}

/// The change planned for one resource or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Nothing to do.
    NoOp,
    /// Create a new object.
    Create,
    /// Read a data source during apply.
    Read,
    /// Update the object in place.
    Update,
    /// Destroy the object, then create a new one.
    Replace,
    /// Destroy the object.
    Delete,
}

impl Action {
    /// Marker shown next to the address in plan output.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::NoOp => " ",
            Self::Create => "+",
            Self::Read => "<=",
            Self::Update => "~",
            Self::Replace => "-/+",
            Self::Delete => "-",
        }
    }

    /// Past-tense verb used in progress messages.
    pub const fn past_tense(self) -> &'static str {
        match self {
            Self::NoOp => "Unchanged",
            Self::Create => "Creation",
            Self::Read => "Read",
            Self::Update => "Modifications",
            Self::Replace => "Replacement",
            Self::Delete => "Destruction",
        }
    }

    /// Progressive verb used in progress messages.
    pub const fn progressive(self) -> &'static str {
        match self {
            Self::NoOp => "Checking",
            Self::Create => "Creating",
            Self::Read => "Reading",
            Self::Update => "Modifying",
            Self::Replace => "Replacing",
            Self::Delete => "Destroying",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// A planned or detected change to one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceChange {
    /// Resource address.
    pub addr: ResourceAddr,
    /// What will happen.
    pub action: Action,
    /// Attributes before the change.
    pub before: Option<serde_json::Value>,
    /// Attributes after the change, with unknown parts as `null`.
    pub after: Option<serde_json::Value>,
    /// Top-level attributes only known after apply.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub after_unknown: BTreeSet<String>,
    /// Attributes whose change forces replacement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_replace: Vec<String>,
    /// Attributes hidden in human output.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub sensitive: BTreeSet<String>,
    /// Why the action was chosen, when not obvious.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ResourceChange {
    /// Builds a change from before and after values.
    pub fn new(addr: ResourceAddr, action: Action, before: Option<&Value>, after: Option<&Value>) -> Self {
        let after_unknown = after
            .and_then(Value::as_map)
            .map(|m| {
                m.iter()
                    .filter(|(_, v)| !v.is_known())
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            addr,
            action,
            before: before.map(Value::to_json_lossy),
            after: after.map(Value::to_json_lossy),
            after_unknown,
            requires_replace: Vec::new(),
            sensitive: BTreeSet::new(),
            reason: None,
        }
    }

    /// Sets the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

/// A planned change to a root output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputChange {
    /// Output name.
    pub name: String,
    /// What will happen.
    pub action: Action,
    /// Value before the change.
    pub before: Option<serde_json::Value>,
    /// Value after the change, `null` when unknown.
    pub after: Option<serde_json::Value>,
    /// Whether the new value is only known after apply.
    #[serde(default)]
    pub after_unknown: bool,
    /// Whether the value is hidden in human output.
    #[serde(default)]
    pub sensitive: bool,
}

/// The result of planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Planning mode.
    pub mode: PlanMode,
    /// Resource changes in dependency order.
    pub changes: Vec<ResourceChange>,
    /// Output changes, sorted by name.
    pub outputs: Vec<OutputChange>,
    /// Changes made outside Mantle, found while refreshing.
    #[serde(default)]
    pub drift: Vec<ResourceChange>,
    /// State after refresh and plan-time data reads; apply starts here.
    pub prior_state: State,
    /// `--target` addresses the plan was restricted to.
    #[serde(default)]
    pub targets: Vec<ResourceAddr>,
    /// `--exclude` addresses the plan skipped.
    #[serde(default)]
    pub excludes: Vec<ResourceAddr>,
}

impl Plan {
    /// Returns true if applying the plan would change nothing.
    pub fn is_empty(&self) -> bool {
        let resources_unchanged = if self.mode == PlanMode::RefreshOnly {
            self.drift.is_empty()
        } else {
            self.changes.iter().all(|c| c.action == Action::NoOp)
        };
        resources_unchanged && self.outputs.iter().all(|o| o.action == Action::NoOp)
    }

    /// Changes that do something, in apply order.
    pub fn actionable(&self) -> impl Iterator<Item = &ResourceChange> {
        self.changes.iter().filter(|c| c.action != Action::NoOp)
    }

    /// Counts of `(add, change, destroy)`.
    pub fn counts(&self) -> (usize, usize, usize) {
        self.changes.iter().fold((0, 0, 0), |(add, change, destroy), c| match c.action {
            Action::Create => (add + 1, change, destroy),
            Action::Update => (add, change + 1, destroy),
            Action::Replace => (add + 1, change, destroy + 1),
            Action::Delete => (add, change, destroy + 1),
            Action::NoOp | Action::Read => (add, change, destroy),
        })
    }

    /// Returns true if the plan was restricted by targets or excludes.
    pub fn is_targeted(&self) -> bool {
        !self.targets.is_empty() || !self.excludes.is_empty()
    }
}

/// A plan saved to disk by `plan --out`, with everything needed to apply
/// it later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFile {
    /// Plan file format version.
    pub format_version: u32,
    /// Mantle version that wrote the file.
    pub mantle_version: String,
    /// Workspace the plan was made in.
    pub workspace: String,
    /// Lineage of the state the plan was made against.
    pub state_lineage: Option<String>,
    /// Serial of the state the plan was made against.
    pub state_serial: Option<u64>,
    /// Variable values used for planning.
    pub variables: BTreeMap<String, serde_json::Value>,
    /// Configuration sources by file name.
    pub config: BTreeMap<String, String>,
    /// The plan.
    pub plan: Plan,
}

impl PlanFile {
    /// Bundles a plan with its inputs.
    pub fn new(
        plan: Plan,
        workspace: &str,
        prior: Option<&State>,
        variables: &BTreeMap<String, Value>,
        config: BTreeMap<String, String>,
    ) -> Self {
        Self {
            format_version: PLAN_FORMAT_VERSION,
            mantle_version: VERSION.to_string(),
            workspace: workspace.to_string(),
            state_lineage: prior.map(|s| s.lineage.clone()),
            state_serial: prior.map(|s| s.serial),
            variables: variables
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json_lossy()))
                .collect(),
            config,
            plan,
        }
    }

    /// Variable values as configuration values.
    pub fn variable_values(&self) -> BTreeMap<String, Value> {
        self.variables
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect()
    }

    /// Returns true if the state has not changed since the plan was made.
    pub fn matches_state(&self, current: Option<&State>) -> bool {
        match (current, &self.state_lineage) {
            (None, None) => true,
            (Some(state), Some(lineage)) => {
                &state.lineage == lineage && Some(state.serial) == self.state_serial
            }
            (Some(state), None) => state.is_empty(),
            (None, Some(_)) => false,
        }
    }

    /// Writes the plan file, encrypted the same way as state.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan cannot be encrypted or written.
    pub fn write(&self, path: &Path, encryption: &Encryption) -> Result<()> {
        let mut data = serde_json::to_vec_pretty(self)?;
        data.push(b'\n');
        let data = encryption.encrypt(&data).map_err(encryption_error)?;
        std::fs::write(path, data).map_err(|e| MantleError::io(path, e))?;
        tracing::info!(path = %path.display(), encrypted = encryption.is_enabled(), "plan saved");
        Ok(())
    }

    /// Reads a plan file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be decrypted, is
    /// malformed, or was written by an unsupported format version.
    pub fn read(path: &Path, encryption: &Encryption) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| MantleError::io(path, e))?;
        let data = encryption.decrypt(&data).map_err(encryption_error)?;
        let value: serde_json::Value = serde_json::from_slice(&data)?;
        let version = value.get("format_version").and_then(serde_json::Value::as_u64);
        if version != Some(u64::from(PLAN_FORMAT_VERSION)) {
            return Err(MantleError::Config {
                message: format!(
                    "{} is not a plan file of format version {PLAN_FORMAT_VERSION}",
                    path.display()
                ),
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Returns true if the file at `path` looks like a plan file once
    /// decrypted.
    pub fn is_plan_file(path: &Path, encryption: &Encryption) -> bool {
        std::fs::read(path)
            .ok()
            .and_then(|d| encryption.decrypt(&d).ok())
            .and_then(|d| serde_json::from_slice::<serde_json::Value>(&d).ok())
            .is_some_and(|v| v.get("format_version").is_some() && v.get("plan").is_some())
    }
}

fn encryption_error(err: mantle_state::StateError) -> MantleError {
    MantleError::Encryption {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(action: Action) -> ResourceChange {
        ResourceChange::new(ResourceAddr::managed("null_resource", "a"), action, None, None)
    }

    fn plan(changes: Vec<ResourceChange>) -> Plan {
        Plan {
            mode: PlanMode::Normal,
            changes,
            outputs: Vec::new(),
            drift: Vec::new(),
            prior_state: State::new(),
            targets: Vec::new(),
            excludes: Vec::new(),
        }
    }

    #[test]
    fn counts_treat_replace_as_add_and_destroy() {
        let p = plan(vec![
            change(Action::Create),
            change(Action::Replace),
            change(Action::Update),
            change(Action::NoOp),
        ]);
        assert_eq!(p.counts(), (2, 1, 1));
        assert!(!p.is_empty());
        assert_eq!(p.actionable().count(), 3);
    }

    #[test]
    fn noop_plan_is_empty() {
        assert!(plan(vec![change(Action::NoOp)]).is_empty());
    }

    #[test]
    fn unknown_attributes_are_listed() {
        let after = Value::Map(BTreeMap::from([
            ("id".to_string(), Value::Unknown),
            ("name".to_string(), Value::String("x".into())),
        ]));
        let c = ResourceChange::new(ResourceAddr::managed("test_instance", "a"), Action::Create, None, Some(&after));
        assert_eq!(c.after_unknown.iter().collect::<Vec<_>>(), vec!["id"]);
        assert_eq!(c.after, Some(serde_json::json!({"id": null, "name": "x"})));
    }

    #[test]
    fn plan_file_round_trip_and_staleness() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tfplan");
        let state = State::new();
        let vars = BTreeMap::from([("region".to_string(), Value::String("eu".into()))]);
        let file = PlanFile::new(plan(Vec::new()), "default", Some(&state), &vars, BTreeMap::new());
        file.write(&path, &Encryption::Disabled).expect("write");
        assert!(PlanFile::is_plan_file(&path, &Encryption::Disabled));

        let back = PlanFile::read(&path, &Encryption::Disabled).expect("read");
        assert_eq!(back.variable_values(), vars);
        assert!(back.matches_state(Some(&state)));
        let mut newer = state;
        newer.serial += 1;
        assert!(!back.matches_state(Some(&newer)));
    }

    #[test]
    fn non_plan_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("main.mtl");
        std::fs::write(&path, "{}").expect("write");
        assert!(!PlanFile::is_plan_file(&path, &Encryption::Disabled));
        assert!(PlanFile::read(&path, &Encryption::Disabled).is_err());
    }

    #[test]
    fn encrypted_plan_file_hides_variables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tfplan");
        let enc = Encryption::from_passphrase("hunter2").expect("key");
        let vars = BTreeMap::from([("token".to_string(), Value::String("topsecretvalue".into()))]);
        let file = PlanFile::new(plan(Vec::new()), "default", None, &vars, BTreeMap::new());
        file.write(&path, &enc).expect("write");

        let raw = std::fs::read_to_string(&path).expect("read raw");
        assert!(!raw.contains("topsecretvalue"));
        assert!(PlanFile::is_plan_file(&path, &enc));
        assert!(!PlanFile::is_plan_file(&path, &Encryption::Disabled));
        assert!(matches!(
            PlanFile::read(&path, &Encryption::Disabled),
            Err(MantleError::Encryption { .. })
        ));
        assert_eq!(PlanFile::read(&path, &enc).expect("read").variable_values(), vars);
    }
}
