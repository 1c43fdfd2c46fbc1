//! Running plan, apply and refresh against a backend.
//!
//! An [`Operation`] is built from the command-line arguments and handed to
//! [`run`], which takes the state lock, loads state, plans, asks for
//! approval, applies and persists. State is persisted after every resource
//! change so an interrupted apply loses nothing that completed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::types::ResourceAddr;
use mantle_common::value::Value;
use mantle_config::{Config, load_sources};
use mantle_engine::hooks::Hook;
use mantle_engine::{Context, Plan, PlanFile, PlanMode, PlanOpts};
use mantle_state::{Encryption, Locker, NoopLocker, State, StateLocker, StateManager};

use crate::Backend;

/// What kind of operation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Plan only.
    Plan,
    /// Plan, approve and apply, or apply a saved plan.
    Apply,
    /// Refresh-only apply without approval.
    Refresh,
}

impl OperationKind {
    /// Operation name recorded in the state lock.
    pub const fn lock_name(self) -> &'static str {
        match self {
            Self::Plan => "OperationTypePlan",
            Self::Apply => "OperationTypeApply",
            Self::Refresh => "OperationTypeRefresh",
        }
    }
}

/// A request to run an operation.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Operation kind.
    pub kind: OperationKind,
    /// Planning mode.
    pub plan_mode: PlanMode,
    /// Concurrent provider operations.
    pub parallelism: usize,
    /// Refresh state before planning.
    pub refresh: bool,
    /// Resources to target.
    pub targets: Vec<ResourceAddr>,
    /// Resources to exclude.
    pub excludes: Vec<ResourceAddr>,
    /// Resources to replace.
    pub force_replace: Vec<ResourceAddr>,
    /// Skip interactive approval.
    pub auto_approve: bool,
    /// Saved plan to apply instead of planning.
    pub plan_file: Option<PlanFile>,
    /// Where to save the plan.
    pub plan_out: Option<PathBuf>,
    /// Configuration directory.
    pub config_dir: PathBuf,
    /// Resolved input variables.
    pub variables: BTreeMap<String, Value>,
    /// Selected workspace.
    pub workspace: String,
    /// Take the state lock.
    pub lock: bool,
    /// How long to retry a held lock.
    pub lock_timeout: Duration,
    /// Protection for the saved plan file.
    pub encryption: Encryption,
}

impl Operation {
    /// Creates a request with default options.
    pub fn new(kind: OperationKind, config_dir: impl Into<PathBuf>, workspace: &str) -> Self {
        Self {
            kind,
            plan_mode: PlanMode::Normal,
            parallelism: mantle_common::constants::DEFAULT_PARALLELISM,
            refresh: true,
            targets: Vec::new(),
            excludes: Vec::new(),
            force_replace: Vec::new(),
            auto_approve: false,
            plan_file: None,
            plan_out: None,
            config_dir: config_dir.into(),
            variables: BTreeMap::new(),
            workspace: workspace.to_string(),
            lock: true,
            lock_timeout: Duration::ZERO,
            encryption: Encryption::Disabled,
        }
    }

    fn plan_opts(&self) -> PlanOpts {
        let mode = if self.kind == OperationKind::Refresh {
            PlanMode::RefreshOnly
        } else {
            self.plan_mode
        };
        PlanOpts {
            mode,
            refresh: self.refresh,
            targets: self.targets.clone(),
            excludes: self.excludes.clone(),
            force_replace: self.force_replace.clone(),
        }
    }
}

/// Outcome of [`run`].
#[derive(Debug, Default)]
pub struct OperationResult {
    /// True if the operation completed without errors.
    pub success: bool,
    /// True if the plan had no changes.
    pub plan_empty: bool,
    /// The plan, if planning succeeded.
    pub plan: Option<Plan>,
    /// The state after apply.
    pub state: Option<State>,
    /// Diagnostics from every phase.
    pub diagnostics: Diagnostics,
}

/// Interaction points of an operation.
pub trait OperationUi {
    /// Shows a finished plan.
    fn plan(&mut self, plan: &Plan);

    /// Asks whether to apply the plan.
    fn confirm_apply(&mut self, plan: &Plan) -> bool;
}

type SharedManager = Arc<Mutex<Box<dyn StateManager>>>;

/// Persists state every time the engine reports a change.
struct PersistHook {
    mgr: SharedManager,
    first_error: Mutex<Option<String>>,
}

impl PersistHook {
    fn new(mgr: &SharedManager) -> Self {
        Self {
            mgr: Arc::clone(mgr),
            first_error: Mutex::new(None),
        }
    }

    /// The first failure to persist, if any.
    fn take_error(&self) -> Option<String> {
        self.first_error.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl Hook for PersistHook {
    fn post_state_update(&self, state: &State) {
        let mut mgr = self.mgr.lock().unwrap_or_else(PoisonError::into_inner);
        mgr.write_state(state.clone());
        if let Err(e) = mgr.persist() {
            tracing::warn!(error = %e, "failed to persist intermediate state");
            let mut first = self.first_error.lock().unwrap_or_else(PoisonError::into_inner);
            if first.is_none() {
                *first = Some(e.to_string());
            }
        }
    }
}

/// Runs an operation.
///
/// `config` is the loaded configuration; when applying a saved plan the
/// configuration stored in the plan is used instead.
pub fn run(
    backend: &dyn Backend,
    op: Operation,
    ctx: &Context,
    config: &Config,
    ui: &mut dyn OperationUi,
) -> OperationResult {
    let mut result = OperationResult::default();
    tracing::info!(kind = ?op.kind, workspace = %op.workspace, backend = backend.name(), "running operation");

    let mgr = match backend.state_mgr(&op.workspace) {
        Ok(mgr) => mgr,
        Err(e) => {
            result.diagnostics.push(Diagnostic::from(e));
            return result;
        }
    };
    let mgr: SharedManager = Arc::new(Mutex::new(mgr));
    let mut locker: Box<dyn StateLocker> = if op.lock {
        Box::new(Locker::new(op.lock_timeout))
    } else {
        Box::new(NoopLocker)
    };
    {
        let mut guard = mgr.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = locker.lock(guard.as_mut(), op.kind.lock_name()) {
            result.diagnostics.push(Diagnostic::from(e));
            return result;
        }
    }

    run_locked(&mgr, &op, ctx, config, ui, &mut result);

    let mut guard = mgr.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = locker.unlock(guard.as_mut()) {
        result.diagnostics.push(Diagnostic::from(e));
    }
    result.success = !result.diagnostics.has_errors();
    result
}

fn run_locked(
    mgr: &SharedManager,
    op: &Operation,
    ctx: &Context,
    config: &Config,
    ui: &mut dyn OperationUi,
    result: &mut OperationResult,
) {
    let prior = {
        let mut guard = mgr.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = guard.refresh() {
            result.diagnostics.push(Diagnostic::from(e));
            return;
        }
        guard.state().cloned()
    };

    let saved_config;
    let (plan, config, variables) = if let Some(file) = &op.plan_file {
        if file.workspace != op.workspace {
            result.diagnostics.push(Diagnostic::error(
                "Saved plan is for a different workspace",
                format!(
                    "The plan was created for workspace \"{}\", but the current workspace is \"{}\".",
                    file.workspace, op.workspace
                ),
            ));
            return;
        }
        if !file.matches_state(prior.as_ref()) {
            result.diagnostics.push(Diagnostic::error(
                "Saved plan is stale",
                "The given plan file can no longer be applied because the state was changed by another operation after the plan was created.",
            ));
            return;
        }
        let (loaded, diags) = load_sources(&op.config_dir, file.config.clone());
        let failed = diags.has_errors();
        result.diagnostics.append(diags);
        if failed {
            return;
        }
        saved_config = loaded;
        (file.plan.clone(), &saved_config, file.variable_values())
    } else {
        let (plan, diags) = ctx.plan(config, prior.as_ref(), &op.variables, &op.plan_opts());
        result.diagnostics.append(diags);
        let Some(plan) = plan else {
            return;
        };
        (plan, config, op.variables.clone())
    };
    result.plan_empty = plan.is_empty();

    if op.kind == OperationKind::Plan {
        ui.plan(&plan);
        if let Some(out) = &op.plan_out {
            let file = PlanFile::new(plan.clone(), &op.workspace, prior.as_ref(), &variables, config.sources.clone());
            if let Err(e) = file.write(out, &op.encryption) {
                result.diagnostics.push(Diagnostic::error(
                    "Failed to write plan file",
                    format!("The plan file could not be written: {e}."),
                ));
            }
        }
        result.plan = Some(plan);
        return;
    }

    if op.plan_file.is_none() {
        ui.plan(&plan);
        let needs_approval = op.kind == OperationKind::Apply && !op.auto_approve && !result.plan_empty;
        if needs_approval && !ui.confirm_apply(&plan) {
            result
                .diagnostics
                .push(Diagnostic::error("Apply cancelled", "The plan was not approved, so no changes were made."));
            result.plan = Some(plan);
            return;
        }
    }

    let persist = Arc::new(PersistHook::new(mgr));
    let apply_ctx = ctx
        .clone()
        .with_parallelism(op.parallelism)
        .with_hook(Arc::clone(&persist) as Arc<dyn Hook>);
    let (state, diags) = apply_ctx.apply(&plan, config, &variables);
    result.diagnostics.append(diags);
    if let Some(e) = persist.take_error() {
        result.diagnostics.push(Diagnostic::warning(
            "Failed to save intermediate state",
            format!("Error saving state during apply: {e}\n\nThe state was not saved after every change, so an interruption during apply could have lost track of created objects."),
        ));
    }

    let mut guard = mgr.lock().unwrap_or_else(PoisonError::into_inner);
    guard.write_state(state.clone());
    if let Err(e) = guard.persist() {
        result.diagnostics.push(Diagnostic::error(
            "Failed to save state",
            format!("Error saving state: {e}\n\nMantle was unable to persist the state. The state is held in memory only; the apply results may be lost."),
        ));
    }
    result.plan = Some(plan);
    result.state = Some(state);
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use mantle_engine::provider::mock::{MOCK_RESOURCE, MockProvider};
    use mantle_engine::{Provider, ProviderMap};

    use super::*;
    use crate::local::LocalBackend;

    const CONFIG: &str = r#"
resource "test_instance" "a" {
  ami = "ami-1"
}

output "id" {
  value = test_instance.a.id
}
"#;

    struct ScriptedUi {
        approve: bool,
        plans: usize,
        asked: usize,
    }

    impl OperationUi for ScriptedUi {
        fn plan(&mut self, _plan: &Plan) {
            self.plans += 1;
        }

        fn confirm_apply(&mut self, _plan: &Plan) -> bool {
            self.asked += 1;
            self.approve
        }
    }

    fn ui(approve: bool) -> ScriptedUi {
        ScriptedUi {
            approve,
            plans: 0,
            asked: 0,
        }
    }

    fn setup(dir: &Path) -> (LocalBackend, Context, Config) {
        let provider: Arc<dyn Provider> = Arc::new(MockProvider::new());
        let ctx = Context::new(ProviderMap::from([("test".to_string(), provider)]));
        let (config, diags) = load_sources(dir, BTreeMap::from([("main.mtl".to_string(), CONFIG.to_string())]));
        assert!(!diags.has_errors());
        (LocalBackend::new(dir), ctx, config)
    }

    fn stored(backend: &LocalBackend) -> Option<State> {
        let mut mgr = backend.state_mgr("default").expect("mgr");
        mgr.refresh().expect("refresh");
        mgr.state().cloned()
    }

    #[test]
    fn apply_persists_state_and_releases_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (backend, ctx, config) = setup(dir.path());
        let mut ui = ui(true);
        let result = run(&backend, Operation::new(OperationKind::Apply, dir.path(), "default"), &ctx, &config, &mut ui);
        assert!(result.success, "{}", result.diagnostics.err_summary());
        assert_eq!(ui.asked, 1);
        let state = stored(&backend).expect("state");
        assert_eq!(state.resources.len(), 1);
        assert_eq!(state.outputs["id"].value, serde_json::json!("mock-1"));
        assert!(!mantle_common::constants::lock_info_path_for(&dir.path().join("mantle.state")).exists());
    }

    #[test]
    fn rejected_approval_cancels() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (backend, ctx, config) = setup(dir.path());
        let mut ui = ui(false);
        let result = run(&backend, Operation::new(OperationKind::Apply, dir.path(), "default"), &ctx, &config, &mut ui);
        assert!(!result.success);
        assert_eq!(result.diagnostics.errors().next().expect("error").summary, "Apply cancelled");
        assert!(stored(&backend).is_none());
    }

    #[test]
    fn plan_writes_plan_file_and_saved_plan_applies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (backend, ctx, config) = setup(dir.path());
        let out = dir.path().join("tfplan");
        let mut op = Operation::new(OperationKind::Plan, dir.path(), "default");
        op.plan_out = Some(out.clone());
        let result = run(&backend, op, &ctx, &config, &mut ui(false));
        assert!(result.success);
        assert!(!result.plan_empty);
        assert!(stored(&backend).is_none());

        let mut apply = Operation::new(OperationKind::Apply, dir.path(), "default");
        apply.plan_file = Some(PlanFile::read(&out, &Encryption::Disabled).expect("read plan"));
        let mut ui = ui(false);
        let result = run(&backend, apply.clone(), &ctx, &config, &mut ui);
        assert!(result.success, "{}", result.diagnostics.err_summary());
        assert_eq!(ui.asked, 0);
        assert_eq!(stored(&backend).expect("state").resources.len(), 1);

        let result = run(&backend, apply, &ctx, &config, &mut ui);
        assert_eq!(result.diagnostics.errors().next().expect("error").summary, "Saved plan is stale");
    }

    #[test]
    fn plan_file_is_encrypted_with_state_encryption() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (backend, ctx, config) = setup(dir.path());
        let out = dir.path().join("tfplan");
        let mut op = Operation::new(OperationKind::Plan, dir.path(), "default");
        op.plan_out = Some(out.clone());
        op.encryption = Encryption::from_passphrase("hunter2").expect("key");
        assert!(run(&backend, op.clone(), &ctx, &config, &mut ui(false)).success);

        let raw = std::fs::read_to_string(&out).expect("read raw");
        assert!(!raw.contains("ami-1"));
        assert!(!raw.contains("test_instance"));
        assert!(PlanFile::read(&out, &Encryption::Disabled).is_err());
        assert!(PlanFile::read(&out, &op.encryption).is_ok());
    }

    #[test]
    fn failed_intermediate_persist_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("blocker"), "").expect("write");
        let (_, ctx, config) = setup(dir.path());
        let backend = LocalBackend::new(dir.path()).with_state_out(Some(PathBuf::from("blocker/mantle.state")));
        let mut op = Operation::new(OperationKind::Apply, dir.path(), "default");
        op.auto_approve = true;
        let result = run(&backend, op, &ctx, &config, &mut ui(false));
        assert!(!result.success);
        assert!(
            result
                .diagnostics
                .warnings()
                .any(|d| d.summary == "Failed to save intermediate state")
        );
        assert!(result.diagnostics.errors().any(|d| d.summary == "Failed to save state"));
    }

    #[test]
    fn held_lock_fails_operation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (backend, ctx, config) = setup(dir.path());
        let mut holder = backend.state_mgr("default").expect("mgr");
        let _ = holder.lock(&mantle_state::LockInfo::new("OperationTypeApply")).expect("lock");
        let result = run(&backend, Operation::new(OperationKind::Plan, dir.path(), "default"), &ctx, &config, &mut ui(true));
        assert_eq!(
            result.diagnostics.errors().next().expect("error").summary,
            "Error acquiring the state lock"
        );

        let mut unlocked = Operation::new(OperationKind::Plan, dir.path(), "default");
        unlocked.lock = false;
        assert!(run(&backend, unlocked, &ctx, &config, &mut ui(true)).success);
    }

    #[test]
    fn refresh_needs_no_approval() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (backend, ctx, config) = setup(dir.path());
        let mut op = Operation::new(OperationKind::Apply, dir.path(), "default");
        op.auto_approve = true;
        assert!(run(&backend, op, &ctx, &config, &mut ui(false)).success);

        let mut ui = ui(false);
        let result = run(&backend, Operation::new(OperationKind::Refresh, dir.path(), "default"), &ctx, &config, &mut ui);
        assert!(result.success, "{}", result.diagnostics.err_summary());
        assert_eq!(ui.asked, 0);
        assert_eq!(result.plan.expect("plan").mode, PlanMode::RefreshOnly);
        assert_eq!(stored(&backend).expect("state").resources[0].type_name, MOCK_RESOURCE);
    }
}
