//! The engine entry point.
//!
//! A [`Context`] holds the providers, hooks and limits for one command and
//! exposes the operations commands delegate to: validate, plan, apply,
//! refresh, import, and building an evaluation scope.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mantle_common::constants::DEFAULT_PARALLELISM;
use mantle_common::diagnostics::{Diagnostic, Diagnostics, SourceRange};
use mantle_common::types::{ResourceAddr, ResourceMode};
use mantle_common::value::Value;
use mantle_config::Config;
use mantle_config::expr::evaluate_map;
use mantle_config::graph::{DependencyGraph, GraphNode};
use mantle_config::loader::Resource;
use mantle_state::{OutputState, ResourceState, State};

use crate::error::ProviderError;
use crate::hooks::Hook;
use crate::plan::{Action, OutputChange, Plan, PlanMode, ResourceChange};
use crate::provider::{PlanRequest, PlannedChange, Provider, ProviderMap, Schema};
use crate::scope::EvalScope;
use crate::walk;

/// Options for [`Context::plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOpts {
    /// Planning mode.
    pub mode: PlanMode,
    /// Whether to refresh prior state first.
    pub refresh: bool,
    /// Restrict the plan to these resources and their dependencies.
    pub targets: Vec<ResourceAddr>,
    /// Skip these resources and their dependents.
    pub excludes: Vec<ResourceAddr>,
    /// Replace these resources even if nothing changed.
    pub force_replace: Vec<ResourceAddr>,
}

impl Default for PlanOpts {
    fn default() -> Self {
        Self {
            mode: PlanMode::Normal,
            refresh: true,
            targets: Vec::new(),
            excludes: Vec::new(),
            force_replace: Vec::new(),
        }
    }
}

/// Providers, hooks and limits for engine operations.
#[derive(Clone)]
pub struct Context {
    providers: ProviderMap,
    parallelism: usize,
    hooks: Vec<Arc<dyn Hook>>,
    stop: Arc<AtomicBool>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("parallelism", &self.parallelism)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

/// Which resources a targeted or excluding plan covers.
struct Selection {
    included: Option<BTreeSet<ResourceAddr>>,
    excluded: BTreeSet<ResourceAddr>,
}

impl Selection {
    fn contains(&self, addr: &ResourceAddr) -> bool {
        self.included.as_ref().is_none_or(|s| s.contains(addr)) && !self.excluded.contains(addr)
    }
}

impl Context {
    /// Creates a context with the default parallelism and no hooks.
    #[must_use]
    pub fn new(providers: ProviderMap) -> Self {
        Self {
            providers,
            parallelism: DEFAULT_PARALLELISM,
            hooks: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the maximum number of concurrent provider operations.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Adds a hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Uses `flag` as the stop flag; setting it halts apply scheduling.
    #[must_use]
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = flag;
        self
    }

    /// The providers.
    pub const fn providers(&self) -> &ProviderMap {
        &self.providers
    }

    /// The maximum number of concurrent provider operations.
    pub const fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub(crate) fn hooks(&self) -> &[Arc<dyn Hook>] {
        &self.hooks
    }

    pub(crate) fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub(crate) fn provider_for(&self, addr: &ResourceAddr) -> Result<&Arc<dyn Provider>, Diagnostic> {
        self.providers.get(addr.provider()).ok_or_else(|| {
            Diagnostic::error(
                "Missing required provider",
                format!(
                    "This configuration requires provider {:?}, but that provider isn't available.",
                    addr.provider()
                ),
            )
        })
    }

    fn type_schema(&self, addr: &ResourceAddr) -> Option<Schema> {
        let schema = self.providers.get(addr.provider())?.schema();
        match addr.mode {
            ResourceMode::Managed => schema.resources.get(&addr.type_name).cloned(),
            ResourceMode::Data => schema.data_sources.get(&addr.type_name).cloned(),
        }
    }

    /// Checks every resource block against its provider's schema.
    pub fn validate(&self, config: &Config) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for resource in &config.resources {
            diags.append(self.validate_resource(resource));
        }
        diags
    }

    fn validate_resource(&self, resource: &Resource) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let addr = &resource.addr;
        if let Err(diag) = self.provider_for(addr) {
            diags.push(diag.with_subject(resource.range.clone()));
            return diags;
        }
        let Some(schema) = self.type_schema(addr) else {
            let (summary, kind) = match addr.mode {
                ResourceMode::Managed => ("Invalid resource type", "resource type"),
                ResourceMode::Data => ("Invalid data source", "data source"),
            };
            diags.push(
                Diagnostic::error(
                    summary,
                    format!("The provider {:?} does not support {kind} {:?}.", addr.provider(), addr.type_name),
                )
                .with_subject(resource.range.clone()),
            );
            return diags;
        };
        for (name, expr) in &resource.config {
            match schema.attributes.get(name) {
                None => diags.push(
                    Diagnostic::error(
                        "Unsupported argument",
                        format!("An argument named {name:?} is not expected here."),
                    )
                    .with_subject(expr.range.clone()),
                ),
                Some(attr) if !attr.is_configurable() => diags.push(
                    Diagnostic::error(
                        "Value for unconfigurable attribute",
                        format!(
                            "Can't configure a value for {name:?}: its value will be decided automatically based on the result of applying this configuration."
                        ),
                    )
                    .with_subject(expr.range.clone()),
                ),
                Some(_) => {}
            }
        }
        for (name, attr) in &schema.attributes {
            if attr.required && !resource.config.contains_key(name) {
                diags.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!("The argument {name:?} is required, but no definition was found."),
                    )
                    .with_subject(resource.range.clone()),
                );
            }
        }
        diags
    }

    /// Plans the changes needed to converge `prior` on `config`.
    ///
    /// `variables` must hold a value for every declared variable, see
    /// [`crate::variables::resolve`]. Returns `None` when planning failed.
    pub fn plan(
        &self,
        config: &Config,
        prior: Option<&State>,
        variables: &BTreeMap<String, Value>,
        opts: &PlanOpts,
    ) -> (Option<Plan>, Diagnostics) {
        let mut diags = self.validate(config);
        if diags.has_errors() {
            return (None, diags);
        }
        let graph = DependencyGraph::from_config(config);
        let order = match graph.resolve_order() {
            Ok(order) => order,
            Err(e) => {
                diags.push(e);
                return (None, diags);
            }
        };
        tracing::info!(mode = ?opts.mode, resources = config.resources.len(), "planning");

        let prior = prior.cloned().unwrap_or_default();
        let (mut refreshed, drift) = if opts.refresh {
            self.refresh_state(&prior, &mut diags)
        } else {
            (prior, Vec::new())
        };
        refreshed
            .resources
            .retain(|r| r.mode == ResourceMode::Managed || config.resource(&r.addr()).is_some());

        if !opts.targets.is_empty() {
            diags.push(targeting_warning("Resource targeting is in effect", "--target"));
        }
        if !opts.excludes.is_empty() {
            diags.push(targeting_warning("Resource exclusion is in effect", "--exclude"));
        }

        let mut changes = Vec::new();
        let mut outputs = Vec::new();
        if opts.mode == PlanMode::Destroy {
            let selection = destroy_selection(&graph, &refreshed, opts);
            for resource in refreshed.resources.iter().filter(|r| r.mode == ResourceMode::Managed) {
                let addr = resource.addr();
                if selection.contains(&addr) {
                    let before = resource.value();
                    changes.push(ResourceChange::new(addr, Action::Delete, Some(&before), None));
                }
            }
            if opts.targets.is_empty() && opts.excludes.is_empty() {
                outputs = refreshed
                    .outputs
                    .iter()
                    .map(|(name, o)| OutputChange {
                        name: name.clone(),
                        action: Action::Delete,
                        before: Some(o.value.clone()),
                        after: None,
                        after_unknown: false,
                        sensitive: o.sensitive,
                    })
                    .collect();
            }
        } else {
            let selection = normal_selection(&graph, opts);
            let mut scope = EvalScope::from_state(config, None, variables);
            for node in &order {
                let GraphNode::Resource(addr) = node else {
                    continue;
                };
                let Some(resource) = config.resource(addr) else {
                    continue;
                };
                if !selection.contains(addr) || (opts.mode == PlanMode::RefreshOnly && addr.is_managed()) {
                    if let Some(current) = refreshed.resource(addr) {
                        scope.set_resource(addr.clone(), current.value());
                    }
                    continue;
                }
                match addr.mode {
                    ResourceMode::Data => {
                        self.plan_data(resource, &mut scope, &mut refreshed, &mut changes, &mut diags);
                    }
                    ResourceMode::Managed => {
                        self.plan_managed(resource, opts, &mut scope, &refreshed, &mut changes, &mut diags);
                    }
                }
            }
            if opts.mode == PlanMode::Normal {
                for resource in refreshed.resources.iter().filter(|r| r.mode == ResourceMode::Managed) {
                    let addr = resource.addr();
                    let directly_selected = (opts.targets.is_empty() || opts.targets.contains(&addr))
                        && !selection.excluded.contains(&addr);
                    if config.resource(&addr).is_none() && directly_selected {
                        let before = resource.value();
                        changes.push(
                            ResourceChange::new(addr, Action::Delete, Some(&before), None)
                                .with_reason("delete_because_no_resource_config"),
                        );
                    }
                }
            }
            outputs = plan_outputs(config, &refreshed, &scope, &selection, &graph, &mut diags);
        }

        for addr in &opts.force_replace {
            if !changes.iter().any(|c| &c.addr == addr && c.action == Action::Replace) {
                diags.push(Diagnostic::warning(
                    "Replace target not found",
                    format!("The resource {addr} is not part of this plan, so --replace has no effect on it."),
                ));
            }
        }

        if diags.has_errors() {
            return (None, diags);
        }
        let plan = Plan {
            mode: opts.mode,
            changes,
            outputs,
            drift,
            prior_state: refreshed,
            targets: opts.targets.clone(),
            excludes: opts.excludes.clone(),
        };
        let (add, change, destroy) = plan.counts();
        tracing::info!(add, change, destroy, "plan complete");
        (Some(plan), diags)
    }

    /// Reads every managed resource in `prior` from its provider.
    fn refresh_state(&self, prior: &State, diags: &mut Diagnostics) -> (State, Vec<ResourceChange>) {
        let mut refreshed = prior.clone();
        let mut drift = Vec::new();
        for resource in prior.resources.iter().filter(|r| r.mode == ResourceMode::Managed) {
            let addr = resource.addr();
            let provider = match self.provider_for(&addr) {
                Ok(p) => p,
                Err(diag) => {
                    diags.push(diag);
                    continue;
                }
            };
            for hook in &self.hooks {
                hook.pre_refresh(&addr, resource.id());
            }
            let before = resource.value();
            match provider.read_resource(&addr.type_name, &before) {
                Ok(Some(after)) if after != before => {
                    tracing::debug!(addr = %addr, "drift detected");
                    drift.push(ResourceChange::new(addr.clone(), Action::Update, Some(&before), Some(&after)));
                    let mut updated = resource.clone();
                    updated.attributes = after.to_json_lossy();
                    refreshed.set_resource(updated);
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::debug!(addr = %addr, "object no longer exists");
                    drift.push(ResourceChange::new(addr.clone(), Action::Delete, Some(&before), None));
                    let _ = refreshed.remove(&addr);
                }
                Err(e) => diags.push(provider_diag(&addr, None, e)),
            }
            for hook in &self.hooks {
                hook.post_refresh(&addr);
            }
        }
        (refreshed, drift)
    }

    fn plan_data(
        &self,
        resource: &Resource,
        scope: &mut EvalScope,
        refreshed: &mut State,
        changes: &mut Vec<ResourceChange>,
        diags: &mut Diagnostics,
    ) {
        let addr = &resource.addr;
        let Some(config) = self.evaluate_config(resource, scope, diags) else {
            scope.set_resource(addr.clone(), Value::Unknown);
            return;
        };
        if !config.is_known() {
            changes.push(
                ResourceChange::new(addr.clone(), Action::Read, None, Some(&config))
                    .with_reason("read_because_config_unknown"),
            );
            scope.set_resource(addr.clone(), Value::Unknown);
            return;
        }
        let provider = match self.provider_for(addr) {
            Ok(p) => p,
            Err(diag) => {
                diags.push(diag.with_subject(resource.range.clone()));
                return;
            }
        };
        match provider.read_data_source(&addr.type_name, &config) {
            Ok(value) => {
                refreshed.set_resource(resource_state(resource, &value));
                scope.set_resource(addr.clone(), value);
            }
            Err(e) => {
                diags.push(provider_diag(addr, Some(&resource.range), e));
                scope.set_resource(addr.clone(), Value::Unknown);
            }
        }
    }

    fn plan_managed(
        &self,
        resource: &Resource,
        opts: &PlanOpts,
        scope: &mut EvalScope,
        refreshed: &State,
        changes: &mut Vec<ResourceChange>,
        diags: &mut Diagnostics,
    ) {
        let addr = &resource.addr;
        let Some(config) = self.evaluate_config(resource, scope, diags) else {
            scope.set_resource(addr.clone(), Value::Unknown);
            return;
        };
        let provider = match self.provider_for(addr) {
            Ok(p) => p,
            Err(diag) => {
                diags.push(diag.with_subject(resource.range.clone()));
                return;
            }
        };
        let prior = refreshed.resource(addr).map(ResourceState::value);
        let force = prior.is_some() && opts.force_replace.contains(addr);
        let request = PlanRequest {
            type_name: &addr.type_name,
            prior: if force { None } else { prior.as_ref() },
            config: &config,
        };
        let planned = match provider.plan_resource_change(request) {
            Ok(p) => p,
            Err(e) => {
                diags.push(provider_diag(addr, Some(&resource.range), e));
                scope.set_resource(addr.clone(), Value::Unknown);
                return;
            }
        };
        let PlannedChange {
            planned,
            requires_replace,
        } = planned;
        let (action, reason) = match &prior {
            None => (Action::Create, None),
            Some(_) if force => (Action::Replace, Some("replace_by_request")),
            Some(_) if !requires_replace.is_empty() => (Action::Replace, Some("cannot_update")),
            Some(p) if *p == planned => (Action::NoOp, None),
            Some(_) => (Action::Update, None),
        };
        let mut change = ResourceChange::new(addr.clone(), action, prior.as_ref(), Some(&planned));
        change.reason = reason.map(str::to_string);
        change.requires_replace = requires_replace;
        if let Some(schema) = self.type_schema(addr) {
            change.sensitive = schema.sensitive_attributes().map(str::to_string).collect();
        }
        changes.push(change);
        scope.set_resource(addr.clone(), planned);
    }

    /// Evaluates a resource's arguments and runs provider validation.
    fn evaluate_config(&self, resource: &Resource, scope: &EvalScope, diags: &mut Diagnostics) -> Option<Value> {
        let config = match evaluate_map(&resource.config, scope) {
            Ok(values) => Value::Map(values),
            Err(errs) => {
                diags.append(errs);
                return None;
            }
        };
        if let Ok(provider) = self.provider_for(&resource.addr) {
            let found = provider.validate_resource_config(&resource.addr.type_name, &config);
            let failed = found.has_errors();
            diags.extend(found.into_iter().map(|d| {
                let subject = d.subject.clone().unwrap_or_else(|| resource.range.clone());
                d.with_subject(subject)
            }));
            if failed {
                return None;
            }
        }
        Some(config)
    }

    /// Applies a plan, returning the new state.
    ///
    /// The returned state reflects every change that succeeded, even when
    /// diagnostics contain errors.
    pub fn apply(&self, plan: &Plan, config: &Config, variables: &BTreeMap<String, Value>) -> (State, Diagnostics) {
        walk::apply(self, plan, config, variables)
    }

    /// Updates state to match real infrastructure without changing it.
    pub fn refresh(
        &self,
        config: &Config,
        prior: Option<&State>,
        variables: &BTreeMap<String, Value>,
    ) -> (Option<State>, Diagnostics) {
        let opts = PlanOpts {
            mode: PlanMode::RefreshOnly,
            ..PlanOpts::default()
        };
        let (plan, mut diags) = self.plan(config, prior, variables, &opts);
        let Some(plan) = plan else {
            return (None, diags);
        };
        let (state, apply_diags) = self.apply(&plan, config, variables);
        diags.append(apply_diags);
        (Some(state), diags)
    }

    /// Brings an existing object under management at `addr`.
    pub fn import(
        &self,
        config: &Config,
        prior: Option<&State>,
        addr: &ResourceAddr,
        id: &str,
    ) -> (Option<State>, Diagnostics) {
        let mut diags = Diagnostics::new();
        if !addr.is_managed() {
            diags.push(Diagnostic::error(
                "Invalid import address",
                "A managed resource address is required. Importing into a data resource is not allowed.",
            ));
            return (None, diags);
        }
        let Some(resource) = config.resource(addr) else {
            diags.push(Diagnostic::error(
                "Configuration for import target does not exist",
                format!(
                    "The configuration for the given import target {addr} does not exist. All target resources must have an associated configuration to be imported."
                ),
            ));
            return (None, diags);
        };
        let mut state = prior.cloned().unwrap_or_default();
        if state.resource(addr).is_some() {
            diags.push(
                Diagnostic::error(
                    "Resource already managed by Mantle",
                    format!(
                        "Mantle is already managing a remote object for {addr}. To import to this address you must first remove the existing object from the state."
                    ),
                )
                .with_subject(resource.range.clone()),
            );
            return (None, diags);
        }
        let provider = match self.provider_for(addr) {
            Ok(p) => p,
            Err(diag) => {
                diags.push(diag.with_subject(resource.range.clone()));
                return (None, diags);
            }
        };
        let imported = provider
            .import_resource(&addr.type_name, id)
            .and_then(|value| provider.read_resource(&addr.type_name, &value));
        match imported {
            Ok(Some(value)) => {
                tracing::info!(addr = %addr, id, "imported");
                state.set_resource(resource_state(resource, &value));
                for hook in &self.hooks {
                    hook.post_state_update(&state);
                }
                (Some(state), diags)
            }
            Ok(None) => {
                diags.push(Diagnostic::error(
                    "Cannot import non-existent remote object",
                    format!(
                        "While attempting to import an existing object to {addr}, the provider detected that no object exists with the given id. Only pre-existing objects can be imported; check that the id is correct."
                    ),
                ));
                (None, diags)
            }
            Err(e) => {
                diags.push(provider_diag(addr, Some(&resource.range), e));
                (None, diags)
            }
        }
    }

    /// Builds the scope used by `output` and `console`.
    pub fn eval_scope(&self, config: &Config, state: Option<&State>, variables: &BTreeMap<String, Value>) -> EvalScope {
        EvalScope::from_state(config, state, variables)
    }
}

fn targeting_warning(summary: &str, flag: &str) -> Diagnostic {
    Diagnostic::warning(
        summary,
        format!(
            "You are creating a plan with the {flag} option, which means that the result of this plan may not represent all of the changes requested by the current configuration.\n\nThe {flag} option is not for routine use, and is provided only for exceptional situations such as recovering from errors or mistakes."
        ),
    )
    .no_consolidate()
}

/// Targets plus everything they depend on; excludes plus everything that
/// depends on them.
fn normal_selection(graph: &DependencyGraph, opts: &PlanOpts) -> Selection {
    let included = (!opts.targets.is_empty()).then(|| {
        let mut set: BTreeSet<ResourceAddr> = opts.targets.iter().cloned().collect();
        for target in &opts.targets {
            set.extend(resource_nodes(graph.dependencies_of(&GraphNode::Resource(target.clone()))));
        }
        set
    });
    let mut excluded: BTreeSet<ResourceAddr> = opts.excludes.iter().cloned().collect();
    for exclude in &opts.excludes {
        excluded.extend(resource_nodes(graph.dependents_of(&GraphNode::Resource(exclude.clone()))));
    }
    Selection { included, excluded }
}

/// Destroying a target also destroys everything that depends on it;
/// excluding a resource also keeps everything it depends on. Dependencies
/// recorded in state cover resources no longer in the configuration.
fn destroy_selection(graph: &DependencyGraph, state: &State, opts: &PlanOpts) -> Selection {
    let recorded = recorded_dependencies(state);
    let included = (!opts.targets.is_empty()).then(|| {
        let mut set: BTreeSet<ResourceAddr> = opts.targets.iter().cloned().collect();
        for target in &opts.targets {
            set.extend(resource_nodes(graph.dependents_of(&GraphNode::Resource(target.clone()))));
        }
        close_over(&mut set, |addr| {
            recorded
                .iter()
                .filter(|(_, deps)| deps.contains(addr))
                .map(|(dependent, _)| dependent.clone())
                .collect()
        });
        set
    });
    let mut excluded: BTreeSet<ResourceAddr> = opts.excludes.iter().cloned().collect();
    for exclude in &opts.excludes {
        excluded.extend(resource_nodes(graph.dependencies_of(&GraphNode::Resource(exclude.clone()))));
    }
    close_over(&mut excluded, |addr| {
        recorded.get(addr).map(|deps| deps.iter().cloned().collect()).unwrap_or_default()
    });
    Selection { included, excluded }
}

/// Grows `set` until `next` adds nothing new.
fn close_over(set: &mut BTreeSet<ResourceAddr>, next: impl Fn(&ResourceAddr) -> Vec<ResourceAddr>) {
    let mut queue: Vec<ResourceAddr> = set.iter().cloned().collect();
    while let Some(addr) = queue.pop() {
        for found in next(&addr) {
            if set.insert(found.clone()) {
                queue.push(found);
            }
        }
    }
}

fn resource_nodes(nodes: BTreeSet<GraphNode>) -> BTreeSet<ResourceAddr> {
    nodes
        .into_iter()
        .filter_map(|n| match n {
            GraphNode::Resource(addr) => Some(addr),
            GraphNode::Output(_) => None,
        })
        .collect()
}

/// Dependencies recorded in state, by dependent address.
pub(crate) fn recorded_dependencies(state: &State) -> BTreeMap<ResourceAddr, BTreeSet<ResourceAddr>> {
    state
        .resources
        .iter()
        .map(|r| {
            let deps = r
                .dependencies
                .iter()
                .filter_map(|d| ResourceAddr::parse(d).ok())
                .collect();
            (r.addr(), deps)
        })
        .collect()
}

fn plan_outputs(
    config: &Config,
    refreshed: &State,
    scope: &EvalScope,
    selection: &Selection,
    graph: &DependencyGraph,
    diags: &mut Diagnostics,
) -> Vec<OutputChange> {
    let mut changes = Vec::new();
    for output in &config.outputs {
        let deps = resource_nodes(graph.dependencies_of(&GraphNode::Output(output.name.clone())));
        if !deps.iter().all(|d| selection.contains(d)) {
            continue;
        }
        let value = match scope.evaluate(&output.value) {
            Ok(v) => v,
            Err(errs) => {
                diags.append(errs);
                continue;
            }
        };
        let before = refreshed.outputs.get(&output.name).map(|o| o.value.clone());
        let after = value.to_json();
        let action = match (&before, &after) {
            (None, _) => Action::Create,
            (Some(b), Some(a)) if b == a => Action::NoOp,
            _ => Action::Update,
        };
        changes.push(OutputChange {
            name: output.name.clone(),
            action,
            before,
            after_unknown: after.is_none(),
            after: Some(value.to_json_lossy()),
            sensitive: output.sensitive,
        });
    }
    if selection.included.is_none() && selection.excluded.is_empty() {
        for (name, previous) in &refreshed.outputs {
            if config.output(name).is_none() {
                changes.push(OutputChange {
                    name: name.clone(),
                    action: Action::Delete,
                    before: Some(previous.value.clone()),
                    after: None,
                    after_unknown: false,
                    sensitive: previous.sensitive,
                });
            }
        }
    }
    changes.sort_by(|a, b| a.name.cmp(&b.name));
    changes
}

/// Builds the state record for a configured resource.
pub(crate) fn resource_state(resource: &Resource, value: &Value) -> ResourceState {
    let mut state = ResourceState::new(&resource.addr, value.to_json_lossy());
    state.dependencies = resource.dependencies().iter().map(ToString::to_string).collect();
    state
}

/// Evaluates outputs against `state` and records them.
pub(crate) fn record_outputs(
    config: &Config,
    state: &mut State,
    variables: &BTreeMap<String, Value>,
    report: bool,
    diags: &mut Diagnostics,
) {
    let scope = EvalScope::from_state(config, Some(state), variables);
    for output in &config.outputs {
        match scope.evaluate(&output.value) {
            Ok(value) => {
                if let Some(json) = value.to_json() {
                    let _ = state.outputs.insert(
                        output.name.clone(),
                        OutputState {
                            value: json,
                            sensitive: output.sensitive,
                        },
                    );
                }
            }
            Err(errs) if report => diags.append(errs),
            Err(_) => {}
        }
    }
    state.outputs.retain(|name, _| config.output(name).is_some());
}

/// Converts a provider error into a diagnostic naming the resource.
pub(crate) fn provider_diag(addr: &ResourceAddr, range: Option<&SourceRange>, err: ProviderError) -> Diagnostic {
    let mut diag = Diagnostic::from(err);
    diag.detail = format!("{addr}: {}", diag.detail);
    diag.with_optional_subject(range.cloned())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use mantle_config::load_sources;

    use super::*;
    use crate::hooks::RecordingHook;
    use crate::provider::mock::{MockCall, MockProvider};

    const CHAIN: &str = r#"
resource "test_instance" "a" {
  ami = "ami-1"
}

resource "test_instance" "b" {
  value = test_instance.a.id
}

output "b_value" {
  value = test_instance.b.value
}
"#;

    fn load(src: &str) -> Config {
        let (config, diags) = load_sources(
            Path::new("."),
            BTreeMap::from([("main.mtl".to_string(), src.to_string())]),
        );
        assert!(!diags.has_errors(), "{}", diags.err_summary());
        config
    }

    fn context(mock: &Arc<MockProvider>) -> Context {
        let provider: Arc<dyn Provider> = mock.clone();
        Context::new(ProviderMap::from([("test".to_string(), provider)]))
    }

    fn plan(ctx: &Context, config: &Config, state: Option<&State>, opts: &PlanOpts) -> (Plan, Diagnostics) {
        let (plan, diags) = ctx.plan(config, state, &BTreeMap::new(), opts);
        (plan.expect(&diags.err_summary()), diags)
    }

    fn plan_and_apply(ctx: &Context, config: &Config, state: Option<&State>) -> State {
        let (plan, _) = plan(ctx, config, state, &PlanOpts::default());
        let (state, diags) = ctx.apply(&plan, config, &BTreeMap::new());
        assert!(!diags.has_errors(), "{}", diags.err_summary());
        state
    }

    fn addr(name: &str) -> ResourceAddr {
        ResourceAddr::managed("test_instance", name)
    }

    fn actions(plan: &Plan) -> Vec<(String, Action)> {
        plan.changes.iter().map(|c| (c.addr.to_string(), c.action)).collect()
    }

    #[test]
    fn plan_creates_in_dependency_order_with_unknowns() {
        let mock = Arc::new(MockProvider::new());
        let config = load(CHAIN);
        let (plan, _) = plan(&context(&mock), &config, None, &PlanOpts::default());
        assert_eq!(
            actions(&plan),
            vec![
                ("test_instance.a".to_string(), Action::Create),
                ("test_instance.b".to_string(), Action::Create),
            ]
        );
        assert!(plan.changes[1].after_unknown.contains("value"));
        assert_eq!(plan.outputs[0].action, Action::Create);
        assert!(plan.outputs[0].after_unknown);
        assert_eq!(plan.counts(), (2, 0, 0));
    }

    #[test]
    fn apply_passes_computed_values_downstream() {
        let mock = Arc::new(MockProvider::new());
        let config = load(CHAIN);
        let state = plan_and_apply(&context(&mock), &config, None);
        let a_id = state.resource(&addr("a")).and_then(ResourceState::id).expect("a id").to_string();
        let b = state.resource(&addr("b")).expect("b");
        assert_eq!(b.attributes["value"], serde_json::json!(a_id));
        assert_eq!(b.dependencies, vec!["test_instance.a".to_string()]);
        assert_eq!(state.outputs["b_value"].value, serde_json::json!(a_id));
    }

    #[test]
    fn converged_state_plans_no_changes() {
        let mock = Arc::new(MockProvider::new());
        let ctx = context(&mock);
        let config = load(CHAIN);
        let state = plan_and_apply(&ctx, &config, None);
        let (plan, _) = plan(&ctx, &config, Some(&state), &PlanOpts::default());
        assert!(plan.is_empty(), "{:?}", actions(&plan));
        assert!(plan.drift.is_empty());
    }

    #[test]
    fn argument_change_updates_in_place_and_force_new_replaces() {
        let mock = Arc::new(MockProvider::new());
        let ctx = context(&mock);
        let state = plan_and_apply(&ctx, &load("resource \"test_instance\" \"a\" {\n  ami = \"1\"\n  replace_me = \"x\"\n}\n"), None);

        let updated = load("resource \"test_instance\" \"a\" {\n  ami = \"2\"\n  replace_me = \"x\"\n}\n");
        let (p, _) = plan(&ctx, &updated, Some(&state), &PlanOpts::default());
        assert_eq!(p.changes[0].action, Action::Update);

        let replaced = load("resource \"test_instance\" \"a\" {\n  ami = \"1\"\n  replace_me = \"y\"\n}\n");
        let (p, _) = plan(&ctx, &replaced, Some(&state), &PlanOpts::default());
        assert_eq!(p.changes[0].action, Action::Replace);
        assert_eq!(p.changes[0].requires_replace, vec!["replace_me".to_string()]);
        assert_eq!(p.changes[0].reason.as_deref(), Some("cannot_update"));

        let new_state = {
            let (state, diags) = ctx.apply(&p, &replaced, &BTreeMap::new());
            assert!(!diags.has_errors());
            state
        };
        assert_eq!(mock.apply_count("delete"), 1);
        assert_ne!(
            new_state.resource(&addr("a")).and_then(ResourceState::id),
            state.resource(&addr("a")).and_then(ResourceState::id)
        );
    }

    #[test]
    fn force_replace_replaces_unchanged_resource() {
        let mock = Arc::new(MockProvider::new());
        let ctx = context(&mock);
        let config = load(CHAIN);
        let state = plan_and_apply(&ctx, &config, None);
        let opts = PlanOpts {
            force_replace: vec![addr("a")],
            ..PlanOpts::default()
        };
        let (p, _) = plan(&ctx, &config, Some(&state), &opts);
        assert_eq!(p.changes[0].action, Action::Replace);
        assert_eq!(p.changes[0].reason.as_deref(), Some("replace_by_request"));
        // b references a.id, which becomes unknown.
        assert_eq!(p.changes[1].action, Action::Update);
    }

    #[test]
    fn removed_resource_is_deleted() {
        let mock = Arc::new(MockProvider::new());
        let ctx = context(&mock);
        let state = plan_and_apply(&ctx, &load(CHAIN), None);
        let config = load("resource \"test_instance\" \"a\" {\n  ami = \"ami-1\"\n}\n");
        let (p, _) = plan(&ctx, &config, Some(&state), &PlanOpts::default());
        let delete = p.changes.iter().find(|c| c.addr == addr("b")).expect("b change");
        assert_eq!(delete.action, Action::Delete);
        assert_eq!(delete.reason.as_deref(), Some("delete_because_no_resource_config"));
        assert_eq!(p.outputs[0].action, Action::Delete);
    }

    #[test]
    fn destroy_removes_dependents_first() {
        let mock = Arc::new(MockProvider::new());
        let hook = Arc::new(RecordingHook::default());
        let ctx = context(&mock).with_hook(hook.clone());
        let config = load(CHAIN);
        let state = plan_and_apply(&ctx, &config, None);
        let opts = PlanOpts {
            mode: PlanMode::Destroy,
            ..PlanOpts::default()
        };
        let (p, _) = plan(&ctx, &config, Some(&state), &opts);
        assert_eq!(p.counts(), (0, 0, 2));
        let (after, diags) = ctx.apply(&p, &config, &BTreeMap::new());
        assert!(!diags.has_errors());
        assert!(after.is_empty());

        let events = hook.events();
        let pos = |e: &str| events.iter().position(|x| x == e).expect(e);
        assert!(pos("pre_apply test_instance.b delete") < pos("pre_apply test_instance.a delete"));
    }

    #[test]
    fn failed_resource_skips_dependents() {
        let mock = Arc::new(MockProvider::new());
        mock.fail_apply_when_value("boom");
        let ctx = context(&mock);
        let config = load(
            "resource \"test_instance\" \"a\" {\n  value = \"boom\"\n}\nresource \"test_instance\" \"b\" {\n  ami = test_instance.a.id\n}\nresource \"test_instance\" \"c\" {\n  ami = \"independent\"\n}\n",
        );
        let (p, _) = plan(&ctx, &config, None, &PlanOpts::default());
        let (state, diags) = ctx.apply(&p, &config, &BTreeMap::new());
        assert!(diags.has_errors());
        assert!(diags.err_summary().contains("Test failure"));
        assert!(state.resource(&addr("a")).is_none());
        assert!(state.resource(&addr("b")).is_none());
        assert!(state.resource(&addr("c")).is_some());
        assert_eq!(mock.apply_count("create"), 2);
    }

    #[test]
    fn apply_respects_parallelism_limit() {
        let mock = Arc::new(MockProvider::new());
        mock.set_apply_delay(Duration::from_millis(30));
        let ctx = context(&mock).with_parallelism(2);
        let src: String = (0..5)
            .map(|i| format!("resource \"test_instance\" \"r{i}\" {{\n  ami = \"{i}\"\n}}\n"))
            .collect();
        let state = plan_and_apply(&ctx, &load(&src), None);
        assert_eq!(state.resources.len(), 5);
        assert!(mock.max_concurrent_applies() <= 2);
        assert!(mock.max_concurrent_applies() >= 1);
    }

    #[test]
    fn stop_flag_halts_before_any_change() {
        let mock = Arc::new(MockProvider::new());
        let hook = Arc::new(RecordingHook::default());
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = context(&mock).with_hook(hook.clone()).with_stop_flag(flag.clone());
        let config = load(CHAIN);
        let (p, _) = plan(&ctx, &config, None, &PlanOpts::default());
        flag.store(true, Ordering::SeqCst);
        let (state, diags) = ctx.apply(&p, &config, &BTreeMap::new());
        assert!(diags.err_summary().contains("Operation interrupted"));
        assert!(state.resources.is_empty());
        assert_eq!(mock.apply_count("create"), 0);
        assert!(hook.events().contains(&"stopping".to_string()));
    }

    #[test]
    fn state_updates_are_reported_per_change() {
        let mock = Arc::new(MockProvider::new());
        let hook = Arc::new(RecordingHook::default());
        let ctx = context(&mock).with_hook(hook.clone());
        let _ = plan_and_apply(&ctx, &load(CHAIN), None);
        // One per resource plus the final snapshot with outputs.
        assert_eq!(hook.state_updates(), 3);
    }

    #[test]
    fn refresh_detects_drift_and_deleted_objects() {
        let mock = Arc::new(MockProvider::new());
        let ctx = context(&mock);
        let config = load(CHAIN);
        let state = plan_and_apply(&ctx, &config, None);
        let a_id = state.resource(&addr("a")).and_then(ResourceState::id).expect("id").to_string();
        mock.set_read_response(&a_id, None);

        let (p, _) = plan(&ctx, &config, Some(&state), &PlanOpts::default());
        assert_eq!(p.drift.len(), 1);
        assert_eq!(p.drift[0].action, Action::Delete);
        assert_eq!(p.changes[0].action, Action::Create);

        let no_refresh = PlanOpts {
            refresh: false,
            ..PlanOpts::default()
        };
        let (p, _) = plan(&ctx, &config, Some(&state), &no_refresh);
        assert!(p.drift.is_empty());
        assert!(p.is_empty());
    }

    #[test]
    fn refresh_only_updates_state_without_changes() {
        let mock = Arc::new(MockProvider::new());
        let ctx = context(&mock);
        let config = load(CHAIN);
        let state = plan_and_apply(&ctx, &config, None);
        let a = state.resource(&addr("a")).expect("a");
        let mut drifted = a.value();
        if let Value::Map(m) = &mut drifted {
            let _ = m.insert("ami".into(), Value::String("ami-2".into()));
        }
        mock.set_read_response(a.id().expect("id"), Some(drifted));

        let opts = PlanOpts {
            mode: PlanMode::RefreshOnly,
            ..PlanOpts::default()
        };
        let (p, _) = plan(&ctx, &config, Some(&state), &opts);
        assert!(p.changes.is_empty());
        assert_eq!(p.drift.len(), 1);
        assert!(!p.is_empty());

        let (refreshed, diags) = ctx.refresh(&config, Some(&state), &BTreeMap::new());
        assert!(!diags.has_errors());
        let refreshed = refreshed.expect("state");
        assert_eq!(
            refreshed.resource(&addr("a")).expect("a").attributes["ami"],
            serde_json::json!("ami-2")
        );
        assert_eq!(mock.apply_count("update"), 0);
    }

    #[test]
    fn targets_include_dependencies_only() {
        let mock = Arc::new(MockProvider::new());
        let config = load(
            "resource \"test_instance\" \"a\" {}\nresource \"test_instance\" \"b\" {}\nresource \"test_instance\" \"c\" {\n  ami = test_instance.a.id\n}\n",
        );
        let opts = PlanOpts {
            targets: vec![addr("c")],
            ..PlanOpts::default()
        };
        let (p, diags) = plan(&context(&mock), &config, None, &opts);
        let names: Vec<String> = p.changes.iter().map(|c| c.addr.name.clone()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(diags.warnings().any(|d| d.summary == "Resource targeting is in effect"));
    }

    #[test]
    fn excludes_drop_dependents() {
        let mock = Arc::new(MockProvider::new());
        let config = load(
            "resource \"test_instance\" \"a\" {}\nresource \"test_instance\" \"b\" {}\nresource \"test_instance\" \"c\" {\n  ami = test_instance.a.id\n}\n",
        );
        let opts = PlanOpts {
            excludes: vec![addr("a")],
            ..PlanOpts::default()
        };
        let (p, diags) = plan(&context(&mock), &config, None, &opts);
        let names: Vec<String> = p.changes.iter().map(|c| c.addr.name.clone()).collect();
        assert_eq!(names, vec!["b"]);
        assert!(diags.warnings().any(|d| d.summary == "Resource exclusion is in effect"));
    }

    #[test]
    fn known_data_source_is_read_during_plan() {
        let mock = Arc::new(MockProvider::new());
        let config = load(
            "data \"test_data_source\" \"d\" {\n  input = \"hello\"\n}\nresource \"test_instance\" \"a\" {\n  ami = data.test_data_source.d.output\n}\n",
        );
        let (p, _) = plan(&context(&mock), &config, None, &PlanOpts::default());
        assert_eq!(p.changes.len(), 1);
        assert_eq!(p.changes[0].after.as_ref().expect("after")["ami"], serde_json::json!("hello"));
        assert!(p.prior_state.resource(&ResourceAddr::data("test_data_source", "d")).is_some());
        assert!(mock.calls().contains(&MockCall::ReadData("test_data_source".into())));
    }

    #[test]
    fn unknown_data_source_config_defers_read_to_apply() {
        let mock = Arc::new(MockProvider::new());
        let ctx = context(&mock);
        let config = load(
            "resource \"test_instance\" \"a\" {}\ndata \"test_data_source\" \"d\" {\n  input = test_instance.a.id\n}\n",
        );
        let (p, _) = plan(&ctx, &config, None, &PlanOpts::default());
        assert_eq!(p.changes[1].action, Action::Read);
        let (state, diags) = ctx.apply(&p, &config, &BTreeMap::new());
        assert!(!diags.has_errors());
        let data = state.resource(&ResourceAddr::data("test_data_source", "d")).expect("data");
        assert_eq!(data.attributes["output"], state.resource(&addr("a")).expect("a").attributes["id"]);
    }

    #[test]
    fn import_adds_configured_resource() {
        let mock = Arc::new(MockProvider::new());
        mock.set_import_response("i-123", Value::Map(BTreeMap::from([("id".to_string(), Value::String("i-123".into()))])));
        let ctx = context(&mock);
        let config = load(CHAIN);

        let (state, diags) = ctx.import(&config, None, &addr("a"), "i-123");
        assert!(!diags.has_errors(), "{}", diags.err_summary());
        let state = state.expect("state");
        assert_eq!(state.resource(&addr("a")).and_then(ResourceState::id), Some("i-123"));

        let (_, diags) = ctx.import(&config, Some(&state), &addr("a"), "i-123");
        assert!(diags.err_summary().contains("Resource already managed by Mantle"));

        let (_, diags) = ctx.import(&config, None, &addr("zzz"), "i-123");
        assert!(diags.err_summary().contains("Configuration for import target does not exist"));

        let (_, diags) = ctx.import(&config, None, &addr("b"), "missing");
        assert!(diags.err_summary().contains("Cannot import non-existent remote object"));
    }

    #[test]
    fn validate_checks_schema() {
        let mock = Arc::new(MockProvider::new());
        let config = load(
            "resource \"test_instance\" \"a\" {\n  bogus = 1\n  id = \"x\"\n}\nresource \"test_widget\" \"w\" {}\nresource \"other_thing\" \"o\" {}\n",
        );
        let diags = context(&mock).validate(&config);
        let summaries: Vec<&str> = diags.errors().map(|d| d.summary.as_str()).collect();
        assert!(summaries.contains(&"Unsupported argument"));
        assert!(summaries.contains(&"Value for unconfigurable attribute"));
        assert!(summaries.contains(&"Invalid resource type"));
        assert!(summaries.contains(&"Missing required provider"));
    }

    #[test]
    fn provider_validation_fails_the_plan() {
        let mock = Arc::new(MockProvider::new());
        mock.reject_value("nope");
        let config = load("resource \"test_instance\" \"a\" {\n  value = \"nope\"\n}\n");
        let (p, diags) = context(&mock).plan(&config, None, &BTreeMap::new(), &PlanOpts::default());
        assert!(p.is_none());
        let err = diags.errors().next().expect("error");
        assert_eq!(err.summary, "Invalid value");
        assert!(err.subject.is_some());
    }

    #[test]
    fn eval_scope_reads_state() {
        let mock = Arc::new(MockProvider::new());
        let ctx = context(&mock);
        let config = load(CHAIN);
        let state = plan_and_apply(&ctx, &config, None);
        let scope = ctx.eval_scope(&config, Some(&state), &BTreeMap::new());
        let expr = mantle_config::parser::parse_expression("<console>", "test_instance.a.ami").expect("parse");
        assert_eq!(scope.evaluate(&expr).expect("eval"), Value::String("ami-1".into()));
    }
}
