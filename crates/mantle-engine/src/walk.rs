//! The apply walk.
//!
//! Planned changes form a dependency graph: creates and updates wait for
//! the resources they reference, deletes wait for the resources that
//! depend on them. Ready nodes run in waves of at most `parallelism`
//! scoped threads. A failed node causes its dependents to be skipped, and
//! a set stop flag halts scheduling after the current wave.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::types::{ResourceAddr, ResourceMode};
use mantle_common::value::Value;
use mantle_config::Config;
use mantle_config::expr::evaluate_map;
use mantle_state::State;

use crate::context::{Context, provider_diag, record_outputs, recorded_dependencies, resource_state};
use crate::plan::{Action, Plan, PlanMode};
use crate::provider::{ApplyRequest, PlanRequest};
use crate::scope::EvalScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pending,
    Done,
    Failed,
    Skipped,
}

struct Walker<'a> {
    ctx: &'a Context,
    config: &'a Config,
    variables: &'a BTreeMap<String, Value>,
    state: Mutex<State>,
}

pub(crate) fn apply(
    ctx: &Context,
    plan: &Plan,
    config: &Config,
    variables: &BTreeMap<String, Value>,
) -> (State, Diagnostics) {
    let mut diags = Diagnostics::new();
    let actions: BTreeMap<ResourceAddr, Action> = plan
        .actionable()
        .map(|c| (c.addr.clone(), c.action))
        .collect();
    let deps = apply_dependencies(plan, config, &actions);
    tracing::info!(changes = actions.len(), parallelism = ctx.parallelism(), "applying");

    let walker = Walker {
        ctx,
        config,
        variables,
        state: Mutex::new(plan.prior_state.clone()),
    };
    let mut status: BTreeMap<ResourceAddr, Status> =
        actions.keys().map(|a| (a.clone(), Status::Pending)).collect();

    loop {
        if ctx.stopped() {
            for hook in ctx.hooks() {
                hook.stopping();
            }
            diags.push(Diagnostic::error(
                "Operation interrupted",
                "Mantle was interrupted and did not start the remaining changes. The state records every change that completed.",
            ));
            break;
        }
        skip_blocked(&mut status, &deps);
        let ready: Vec<ResourceAddr> = status
            .iter()
            .filter(|(addr, s)| {
                **s == Status::Pending
                    && deps
                        .get(*addr)
                        .is_none_or(|d| d.iter().all(|dep| status.get(dep) == Some(&Status::Done)))
            })
            .map(|(addr, _)| addr.clone())
            .collect();
        if ready.is_empty() {
            break;
        }
        for wave in ready.chunks(ctx.parallelism()) {
            let results: Vec<(ResourceAddr, Result<(), Diagnostics>)> = std::thread::scope(|s| {
                let handles: Vec<_> = wave
                    .iter()
                    .map(|addr| {
                        let action = actions[addr];
                        let walker = &walker;
                        (addr, s.spawn(move || walker.execute(addr, action)))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|(addr, handle)| {
                        let result = handle.join().unwrap_or_else(|_| {
                            Err(Diagnostics::single(Diagnostic::error(
                                "Provider crashed",
                                format!("The provider panicked while applying {addr}."),
                            )))
                        });
                        (addr.clone(), result)
                    })
                    .collect()
            });
            for (addr, result) in results {
                let outcome = match result {
                    Ok(()) => Status::Done,
                    Err(errs) => {
                        diags.append(errs);
                        Status::Failed
                    }
                };
                let _ = status.insert(addr, outcome);
            }
            if ctx.stopped() {
                break;
            }
        }
    }

    let mut state = walker.state.into_inner().unwrap_or_else(PoisonError::into_inner);
    if plan.mode == PlanMode::Destroy {
        if !plan.is_targeted() {
            state.resources.retain(|r| r.mode == ResourceMode::Managed);
            state.outputs.clear();
        }
    } else {
        let report = !diags.has_errors();
        record_outputs(config, &mut state, variables, report, &mut diags);
    }
    for hook in ctx.hooks() {
        hook.post_state_update(&state);
    }
    let failed = status.values().filter(|s| **s == Status::Failed).count();
    tracing::info!(failed, "apply complete");
    (state, diags)
}

/// Marks pending nodes whose dependencies failed or were skipped.
fn skip_blocked(status: &mut BTreeMap<ResourceAddr, Status>, deps: &BTreeMap<ResourceAddr, BTreeSet<ResourceAddr>>) {
    loop {
        let blocked: Vec<ResourceAddr> = status
            .iter()
            .filter(|(addr, s)| {
                **s == Status::Pending
                    && deps.get(*addr).is_some_and(|d| {
                        d.iter()
                            .any(|dep| matches!(status.get(dep), Some(Status::Failed | Status::Skipped)))
                    })
            })
            .map(|(addr, _)| addr.clone())
            .collect();
        if blocked.is_empty() {
            return;
        }
        for addr in blocked {
            tracing::debug!(addr = %addr, "skipped because a dependency failed");
            let _ = status.insert(addr, Status::Skipped);
        }
    }
}

/// Edges of the apply graph, as the set of nodes each node waits for.
fn apply_dependencies(
    plan: &Plan,
    config: &Config,
    actions: &BTreeMap<ResourceAddr, Action>,
) -> BTreeMap<ResourceAddr, BTreeSet<ResourceAddr>> {
    let recorded = recorded_dependencies(&plan.prior_state);
    let depends_on = |addr: &ResourceAddr| -> BTreeSet<ResourceAddr> {
        config.resource(addr).map_or_else(
            || recorded.get(addr).cloned().unwrap_or_default(),
            mantle_config::loader::Resource::dependencies,
        )
    };
    let mut deps: BTreeMap<ResourceAddr, BTreeSet<ResourceAddr>> = BTreeMap::new();
    for (addr, action) in actions {
        let entry = deps.entry(addr.clone()).or_default();
        if *action == Action::Delete {
            continue;
        }
        for dep in depends_on(addr) {
            if actions.get(&dep).is_some_and(|a| *a != Action::Delete) {
                let _ = entry.insert(dep);
            }
        }
    }
    for (addr, action) in actions {
        if *action != Action::Delete {
            continue;
        }
        for dependency in depends_on(addr) {
            if actions.get(&dependency) == Some(&Action::Delete) {
                let _ = deps.entry(dependency).or_default().insert(addr.clone());
            }
        }
    }
    deps
}

impl Walker<'_> {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn execute(&self, addr: &ResourceAddr, action: Action) -> Result<(), Diagnostics> {
        for hook in self.ctx.hooks() {
            hook.pre_apply(addr, action);
        }
        let started = Instant::now();
        let result = self.execute_change(addr, action);
        let error = result.as_ref().err().map(Diagnostics::err_summary);
        for hook in self.ctx.hooks() {
            hook.post_apply(addr, action, started.elapsed(), error.as_deref());
        }
        result
    }

    fn execute_change(&self, addr: &ResourceAddr, action: Action) -> Result<(), Diagnostics> {
        let provider = self.ctx.provider_for(addr).map_err(Diagnostics::single)?;
        let range = self.config.resource(addr).map(|r| &r.range);
        let prior = self.lock_state().resource(addr).map(mantle_state::ResourceState::value);

        if matches!(action, Action::Delete | Action::Replace) {
            if let Some(prior) = &prior {
                let _ = provider
                    .apply_resource_change(ApplyRequest {
                        type_name: &addr.type_name,
                        prior: Some(prior),
                        planned: None,
                    })
                    .map_err(|e| Diagnostics::single(provider_diag(addr, range, e)))?;
            }
            let mut state = self.lock_state();
            let _ = state.remove(addr);
            self.state_updated(&state);
            if action == Action::Delete {
                return Ok(());
            }
        }

        let resource = self.config.resource(addr).ok_or_else(|| {
            Diagnostics::single(Diagnostic::error(
                "Resource configuration missing",
                format!("{addr} is not declared in the configuration the plan was made from."),
            ))
        })?;
        let scope = EvalScope::from_state(self.config, Some(&self.lock_state()), self.variables);
        let config = Value::Map(evaluate_map(&resource.config, &scope)?);
        if !config.is_known() {
            return Err(Diagnostics::single(
                Diagnostic::error(
                    "Configuration contains unknown value",
                    format!("{addr}: a value this resource depends on is still unknown after its dependencies were applied."),
                )
                .with_subject(resource.range.clone()),
            ));
        }

        let new_value = if action == Action::Read {
            provider
                .read_data_source(&addr.type_name, &config)
                .map_err(|e| Diagnostics::single(provider_diag(addr, range, e)))?
        } else {
            let prior = if action == Action::Replace { None } else { prior.as_ref() };
            let planned = provider
                .plan_resource_change(PlanRequest {
                    type_name: &addr.type_name,
                    prior,
                    config: &config,
                })
                .map_err(|e| Diagnostics::single(provider_diag(addr, range, e)))?;
            provider
                .apply_resource_change(ApplyRequest {
                    type_name: &addr.type_name,
                    prior,
                    planned: Some(&planned.planned),
                })
                .map_err(|e| Diagnostics::single(provider_diag(addr, range, e)))?
                .ok_or_else(|| {
                    Diagnostics::single(Diagnostic::error(
                        "Provider returned no object",
                        format!("{addr}: the provider reported success but returned no object."),
                    ))
                })?
        };
        tracing::debug!(addr = %addr, action = %action, "applied");
        let mut state = self.lock_state();
        state.set_resource(resource_state(resource, &new_value));
        self.state_updated(&state);
        Ok(())
    }

    fn state_updated(&self, state: &State) {
        for hook in self.ctx.hooks() {
            hook.post_state_update(state);
        }
    }
}
