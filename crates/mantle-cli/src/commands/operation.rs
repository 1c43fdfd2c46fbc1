//! The steps shared by `plan`, `apply`, `destroy` and `refresh`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use mantle_backend::{OperationKind, OperationResult, OperationUi};
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_config::{Config, load_sources};
use mantle_engine::{Plan, PlanFile, PlanMode};

use super::{current_workspace, plan_encryption};
use crate::arguments::{Operation, State, Vars};
use crate::meta::Meta;
use crate::views::View;
use crate::views::operation::OperationView;

/// Everything a command contributes to an operation request.
pub(crate) struct Request<'a> {
    pub kind: OperationKind,
    pub state: &'a State,
    pub operation: &'a Operation,
    pub vars: &'a Vars,
    pub auto_approve: bool,
    pub plan_path: Option<PathBuf>,
    pub plan_out: Option<PathBuf>,
}

/// Asks for approval and shows plans through an [`OperationView`].
struct Ui<'a> {
    meta: &'a Meta,
    view: &'a dyn OperationView,
    kind: OperationKind,
    workspace: &'a str,
}

impl OperationUi for Ui<'_> {
    fn plan(&mut self, plan: &Plan) {
        if self.kind != OperationKind::Refresh {
            self.view.plan(plan);
        }
    }

    fn confirm_apply(&mut self, plan: &Plan) -> bool {
        let in_workspace = if self.workspace == mantle_common::constants::DEFAULT_WORKSPACE {
            String::new()
        } else {
            format!(" in workspace \"{}\"", self.workspace)
        };
        let prompt = match plan.mode {
            PlanMode::Destroy => format!(
                "Do you really want to destroy all resources{in_workspace}?\n  Mantle will destroy all your managed infrastructure, as shown above.\n  There is no undo. Only 'yes' will be accepted to confirm."
            ),
            PlanMode::RefreshOnly => format!(
                "Would you like to update the Mantle state{in_workspace} to reflect these detected changes?\n  Mantle will write these changes to the state without modifying any real infrastructure.\n  There is no undo. Only 'yes' will be accepted to confirm."
            ),
            PlanMode::Normal => format!(
                "Do you want to perform these actions{in_workspace}?\n  Mantle will perform the actions described above.\n  Only 'yes' will be accepted to approve."
            ),
        };
        self.meta.confirm(&prompt)
    }
}

/// Loads what the operation needs and runs it against the backend.
///
/// Diagnostics from the preparation steps go into `diags`; the result
/// carries the diagnostics of the operation itself.
pub(crate) fn run_operation(
    meta: &Meta,
    view: &View,
    op_view: &dyn OperationView,
    req: Request<'_>,
    diags: &mut Diagnostics,
) -> Option<OperationResult> {
    let plan_file = match &req.plan_path {
        Some(path) => {
            let encryption = plan_encryption(meta, diags)?;
            match PlanFile::read(&meta.working_dir().join(path), &encryption) {
                Ok(file) => Some(file),
                Err(e) => {
                    diags.push(Diagnostic::error(
                        "Failed to load saved plan",
                        format!("The given plan file {} could not be read: {e}.", path.display()),
                    ));
                    return None;
                }
            }
        }
        None => None,
    };

    let (config, config_diags): (Config, Diagnostics) = match &plan_file {
        Some(file) => load_sources(meta.working_dir(), file.config.clone()),
        None => meta.load_config(req.kind != OperationKind::Refresh),
    };
    view.set_sources(config.sources.clone());
    let failed = config_diags.has_errors();
    diags.append(config_diags);
    if failed {
        return None;
    }

    let encryption = match meta.encryption_for_config(&config) {
        Ok(enc) => enc,
        Err(diag) => {
            diags.push(diag);
            return None;
        }
    };
    let backend = match meta.backend_for_config(&config, req.state, encryption.clone()) {
        Ok(backend) => backend,
        Err(diag) => {
            diags.push(diag);
            return None;
        }
    };
    let workspace = current_workspace(meta, diags)?;

    let variables = if plan_file.is_some() {
        BTreeMap::new()
    } else {
        let (values, var_diags) = meta.collect_variables(&config, req.vars);
        let failed = var_diags.has_errors();
        diags.append(var_diags);
        if failed {
            return None;
        }
        values
    };

    let mut op = mantle_backend::Operation::new(req.kind, meta.working_dir(), &workspace);
    req.operation.apply_to(&mut op);
    op.auto_approve = req.auto_approve;
    op.plan_file = plan_file;
    op.plan_out = req.plan_out.map(|p| meta.working_dir().join(p));
    op.variables = variables;
    op.lock = req.state.lock;
    op.lock_timeout = req.state.lock_timeout;
    op.encryption = encryption;

    let ctx = meta.context(op.parallelism).with_hook(op_view.hook());
    let mut ui = Ui {
        meta,
        view: op_view,
        kind: req.kind,
        workspace: &workspace,
    };
    let result = mantle_backend::operation::run(backend.as_ref(), op, &ctx, &config, &mut ui);
    if meta.stop_flag().load(Ordering::SeqCst) {
        op_view.interrupted();
    }
    Some(result)
}
