//! Output of `plan`, `apply`, `destroy` and `refresh`.
//!
//! Handles:
//! - **Plan**: The rendered plan and what to do next.
//! - **Progress**: A [`Hook`] printing one line per resource as it is
//!   refreshed or applied, counting completed changes.
//! - **Summary**: `Apply complete!` and the root outputs.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mantle_common::constants::BIN_NAME;
use mantle_common::diagnostics::Diagnostics;
use mantle_common::types::{ResourceAddr, provider_for_type};
use mantle_engine::hooks::Hook;
use mantle_engine::{Action, Plan, PlanMode, ResourceChange};
use mantle_state::State;
use serde_json::{Map, Value, json};

use super::json::JsonView;
use super::render::{render_outputs, render_plan};
use super::{Style, View};
use crate::arguments::ViewType;

/// What an operation shows.
pub trait OperationView: Send + Sync {
    /// Shows a plan.
    fn plan(&self, plan: &Plan);

    /// Explains how to apply the plan, after `plan`.
    fn plan_next_step(&self, plan: &Plan, out: Option<&Path>);

    /// Reports the counts of completed changes.
    fn apply_summary(&self, mode: PlanMode);

    /// Shows the root outputs of the new state.
    fn outputs(&self, state: &State);

    /// Progress hook to register with the engine.
    fn hook(&self) -> Arc<dyn Hook>;

    /// Reports that an interrupt was received.
    fn interrupted(&self);

    /// Shows diagnostics.
    fn diagnostics(&self, diags: Diagnostics);

    /// Suggests the command's help after an argument error.
    fn help_prompt(&self, command: &str);
}

/// Creates the view for the requested output format.
pub fn new_operation_view(view_type: ViewType, view: &View) -> Box<dyn OperationView> {
    match view_type {
        ViewType::Human => Box::new(HumanOperation::new(view.clone())),
        ViewType::Json => Box::new(JsonOperation::new(view.clone())),
    }
}

/// Changes applied so far.
#[derive(Debug, Default)]
struct Counts {
    added: AtomicUsize,
    changed: AtomicUsize,
    destroyed: AtomicUsize,
}

impl Counts {
    fn record(&self, action: Action) {
        match action {
            Action::Create => {
                let _ = self.added.fetch_add(1, Ordering::Relaxed);
            }
            Action::Update => {
                let _ = self.changed.fetch_add(1, Ordering::Relaxed);
            }
            Action::Replace => {
                let _ = self.added.fetch_add(1, Ordering::Relaxed);
                let _ = self.destroyed.fetch_add(1, Ordering::Relaxed);
            }
            Action::Delete => {
                let _ = self.destroyed.fetch_add(1, Ordering::Relaxed);
            }
            Action::NoOp | Action::Read => {}
        }
    }

    fn get(&self) -> (usize, usize, usize) {
        (
            self.added.load(Ordering::Relaxed),
            self.changed.load(Ordering::Relaxed),
            self.destroyed.load(Ordering::Relaxed),
        )
    }
}

fn seconds(elapsed: Duration) -> u64 {
    elapsed.as_secs()
}

/// Human progress lines.
struct HumanHook {
    view: View,
    counts: Arc<Counts>,
}

impl Hook for HumanHook {
    fn pre_apply(&self, addr: &ResourceAddr, action: Action) {
        if self.view.concise() {
            return;
        }
        let line = format!("{addr}: {}...", action.progressive());
        self.view.stdout().println(&self.view.colorize(&line, Style::Bold));
    }

    fn post_apply(&self, addr: &ResourceAddr, action: Action, elapsed: Duration, error: Option<&str>) {
        if error.is_some() {
            return;
        }
        self.counts.record(action);
        if self.view.concise() {
            return;
        }
        let line = format!("{addr}: {} complete after {}s", action.past_tense(), seconds(elapsed));
        self.view.stdout().println(&self.view.colorize(&line, Style::Bold));
    }

    fn pre_refresh(&self, addr: &ResourceAddr, id: Option<&str>) {
        if self.view.concise() {
            return;
        }
        let line = match id {
            Some(id) => format!("{addr}: Refreshing state... [id={id}]"),
            None => format!("{addr}: Refreshing state..."),
        };
        self.view.stdout().println(&self.view.colorize(&line, Style::Bold));
    }

    fn stopping(&self) {
        self.view.stderr().println("Stopping operation...");
    }
}

/// Human output of an operation.
pub struct HumanOperation {
    view: View,
    counts: Arc<Counts>,
}

impl HumanOperation {
    /// Creates the view.
    pub fn new(view: View) -> Self {
        Self {
            view,
            counts: Arc::new(Counts::default()),
        }
    }
}

impl OperationView for HumanOperation {
    fn plan(&self, plan: &Plan) {
        self.view.stdout().print(&render_plan(&self.view, plan));
    }

    fn plan_next_step(&self, plan: &Plan, out: Option<&Path>) {
        if let Some(path) = out {
            let path = path.display();
            self.view.stdout().println(&format!(
                "\nSaved the plan to: {path}\n\nTo perform exactly these actions, run the following command to apply:\n    {BIN_NAME} apply \"{path}\""
            ));
            return;
        }
        if self.view.in_automation() || plan.is_empty() {
            return;
        }
        self.view.stdout().println(&format!(
            "\n─────────────────────────────────────────────────────────────────────────────\n\nNote: You didn't use the --out option to save this plan, so Mantle can't\nguarantee to take exactly these actions if you run \"{BIN_NAME} apply\" now."
        ));
    }

    fn apply_summary(&self, mode: PlanMode) {
        let (added, changed, destroyed) = self.counts.get();
        let text = if mode == PlanMode::Destroy {
            format!("Destroy complete! Resources: {destroyed} destroyed.")
        } else {
            format!("Apply complete! Resources: {added} added, {changed} changed, {destroyed} destroyed.")
        };
        self.view.stdout().println(&format!("\n{}", self.view.colorize(&text, Style::Green)));
    }

    fn outputs(&self, state: &State) {
        if state.outputs.is_empty() {
            return;
        }
        self.view.stdout().print(&format!(
            "\n{}\n\n{}",
            self.view.colorize("Outputs:", Style::Green),
            render_outputs(&self.view, state)
        ));
    }

    fn hook(&self) -> Arc<dyn Hook> {
        Arc::new(HumanHook {
            view: self.view.clone(),
            counts: Arc::clone(&self.counts),
        })
    }

    fn interrupted(&self) {
        self.view.stderr().println(
            "\nInterrupt received.\nPlease wait for Mantle to exit or data loss may occur.\nGracefully shutting down...",
        );
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.view.diagnostics(diags);
    }

    fn help_prompt(&self, command: &str) {
        self.view.help_prompt(command);
    }
}

fn resource_json(addr: &ResourceAddr) -> Value {
    json!({
        "addr": addr.to_string(),
        "resource_type": addr.type_name,
        "resource_name": addr.name,
        "implied_provider": provider_for_type(&addr.type_name),
    })
}

fn change_json(change: &ResourceChange) -> Value {
    let mut obj = json!({
        "resource": resource_json(&change.addr),
        "action": change.action.to_string(),
    });
    if let (Some(reason), Value::Object(map)) = (&change.reason, &mut obj) {
        let _ = map.insert("reason".into(), json!(reason));
    }
    obj
}

/// JSON progress messages.
struct JsonHook {
    json: JsonView,
    counts: Arc<Counts>,
}

impl Hook for JsonHook {
    fn pre_apply(&self, addr: &ResourceAddr, action: Action) {
        self.json.log(
            "info",
            &format!("{addr}: {}...", action.progressive()),
            "apply_start",
            json!({ "hook": { "resource": resource_json(addr), "action": action.to_string() } }),
        );
    }

    fn post_apply(&self, addr: &ResourceAddr, action: Action, elapsed: Duration, error: Option<&str>) {
        let hook = json!({
            "resource": resource_json(addr),
            "action": action.to_string(),
            "elapsed_seconds": seconds(elapsed),
        });
        match error {
            Some(error) => self.json.log(
                "error",
                &format!("{addr}: {} errored after {}s: {error}", action.past_tense(), seconds(elapsed)),
                "apply_errored",
                json!({ "hook": hook }),
            ),
            None => {
                self.counts.record(action);
                self.json.log(
                    "info",
                    &format!("{addr}: {} complete after {}s", action.past_tense(), seconds(elapsed)),
                    "apply_complete",
                    json!({ "hook": hook }),
                );
            }
        }
    }

    fn pre_refresh(&self, addr: &ResourceAddr, id: Option<&str>) {
        self.json.log(
            "info",
            &format!("{addr}: Refreshing state..."),
            "refresh_start",
            json!({ "hook": { "resource": resource_json(addr), "id_key": "id", "id_value": id } }),
        );
    }

    fn post_refresh(&self, addr: &ResourceAddr) {
        self.json.log(
            "info",
            &format!("{addr}: Refresh complete"),
            "refresh_complete",
            json!({ "hook": { "resource": resource_json(addr) } }),
        );
    }

    fn stopping(&self) {
        self.json.info("Stopping operation...");
    }
}

/// Machine-readable output of an operation.
pub struct JsonOperation {
    json: JsonView,
    counts: Arc<Counts>,
}

impl JsonOperation {
    /// Creates the view and writes the version message.
    pub fn new(view: View) -> Self {
        Self {
            json: JsonView::new(view.stdout().clone()),
            counts: Arc::new(Counts::default()),
        }
    }

    fn change_summary(&self, operation: &str, (add, change, remove): (usize, usize, usize)) {
        let message = match operation {
            "plan" => format!("Plan: {add} to add, {change} to change, {remove} to destroy."),
            "destroy" => format!("Destroy complete! Resources: {remove} destroyed."),
            _ => format!("Apply complete! Resources: {add} added, {change} changed, {remove} destroyed."),
        };
        self.json.log(
            "info",
            &message,
            "change_summary",
            json!({ "changes": { "add": add, "change": change, "remove": remove, "operation": operation } }),
        );
    }
}

impl OperationView for JsonOperation {
    fn plan(&self, plan: &Plan) {
        for change in &plan.drift {
            self.json.log(
                "info",
                &format!("{}: Drift detected ({})", change.addr, change.action),
                "resource_drift",
                json!({ "change": change_json(change) }),
            );
        }
        for change in plan.actionable() {
            self.json.log(
                "info",
                &format!("{}: Plan to {}", change.addr, change.action),
                "planned_change",
                json!({ "change": change_json(change) }),
            );
        }
        self.change_summary("plan", plan.counts());
        let mut outputs = Map::new();
        for o in &plan.outputs {
            let _ = outputs.insert(
                o.name.clone(),
                json!({ "sensitive": o.sensitive, "action": o.action.to_string() }),
            );
        }
        if !outputs.is_empty() {
            self.json.log("info", "Outputs: planned", "outputs", json!({ "outputs": outputs }));
        }
    }

    fn plan_next_step(&self, _plan: &Plan, _out: Option<&Path>) {}

    fn apply_summary(&self, mode: PlanMode) {
        let operation = if mode == PlanMode::Destroy { "destroy" } else { "apply" };
        self.change_summary(operation, self.counts.get());
    }

    fn outputs(&self, state: &State) {
        if state.outputs.is_empty() {
            return;
        }
        let outputs: Map<String, Value> = state
            .outputs
            .iter()
            .map(|(name, o)| (name.clone(), json!({ "sensitive": o.sensitive, "value": o.value })))
            .collect();
        self.json.log(
            "info",
            &format!("Outputs: {}", outputs.len()),
            "outputs",
            json!({ "outputs": outputs }),
        );
    }

    fn hook(&self) -> Arc<dyn Hook> {
        Arc::new(JsonHook {
            json: self.json.clone(),
            counts: Arc::clone(&self.counts),
        })
    }

    fn interrupted(&self) {
        self.json.info("Interrupt received, gracefully shutting down");
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.json.diagnostics(&diags);
    }

    fn help_prompt(&self, _command: &str) {}
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use mantle_common::value::Value as MValue;
    use mantle_state::OutputState;

    use super::*;
    use crate::arguments::ViewArgs;
    use crate::streams::{Captured, Streams};

    fn view(concise: bool) -> (View, Captured) {
        let (streams, captured) = Streams::for_testing("");
        let args = ViewArgs {
            no_color: true,
            concise,
            ..ViewArgs::default()
        };
        (View::new(streams, args, false, false), captured)
    }

    fn addr() -> ResourceAddr {
        ResourceAddr::managed("test_instance", "a")
    }

    fn create_plan() -> Plan {
        let after = MValue::Map(BTreeMap::from([("ami".to_string(), MValue::from("ami-1"))]));
        Plan {
            mode: PlanMode::Normal,
            changes: vec![ResourceChange::new(addr(), Action::Create, None, Some(&after))],
            outputs: Vec::new(),
            drift: Vec::new(),
            prior_state: State::new(),
            targets: Vec::new(),
            excludes: Vec::new(),
        }
    }

    #[test]
    fn human_progress_and_summary() {
        let (view, captured) = view(false);
        let op = HumanOperation::new(view);
        let hook = op.hook();
        hook.pre_apply(&addr(), Action::Create);
        hook.post_apply(&addr(), Action::Create, Duration::from_secs(2), None);
        hook.post_apply(&addr(), Action::Replace, Duration::ZERO, None);
        hook.post_apply(&addr(), Action::Delete, Duration::ZERO, Some("boom"));
        op.apply_summary(PlanMode::Normal);
        let out = captured.stdout();
        assert!(out.contains("test_instance.a: Creating...\n"), "{out}");
        assert!(out.contains("test_instance.a: Creation complete after 2s\n"), "{out}");
        assert!(out.contains("Apply complete! Resources: 2 added, 0 changed, 1 destroyed."), "{out}");
    }

    #[test]
    fn concise_suppresses_progress_but_counts() {
        let (view, captured) = view(true);
        let op = HumanOperation::new(view);
        let hook = op.hook();
        hook.pre_refresh(&addr(), Some("mock-1"));
        hook.pre_apply(&addr(), Action::Delete);
        hook.post_apply(&addr(), Action::Delete, Duration::ZERO, None);
        op.apply_summary(PlanMode::Destroy);
        let out = captured.stdout();
        assert!(!out.contains("Destroying"), "{out}");
        assert!(!out.contains("Refreshing"), "{out}");
        assert!(out.contains("Destroy complete! Resources: 1 destroyed."), "{out}");
    }

    #[test]
    fn human_next_step_mentions_saved_plan() {
        let (view, captured) = view(false);
        let op = HumanOperation::new(view);
        op.plan_next_step(&create_plan(), Some(Path::new("tfplan")));
        assert!(captured.stdout().contains("mantle apply \"tfplan\""));
        captured.clear();
        op.plan_next_step(&create_plan(), None);
        assert!(captured.stdout().contains("You didn't use the --out option"));
    }

    #[test]
    fn human_outputs_hide_sensitive() {
        let (view, captured) = view(false);
        let op = HumanOperation::new(view);
        let mut state = State::new();
        let _ = state.outputs.insert(
            "token".into(),
            OutputState {
                value: json!("abc"),
                sensitive: true,
            },
        );
        let _ = state.outputs.insert(
            "name".into(),
            OutputState {
                value: json!("web"),
                sensitive: false,
            },
        );
        op.outputs(&state);
        let out = captured.stdout();
        assert!(out.contains("Outputs:\n\nname = \"web\"\ntoken = <sensitive>\n"), "{out}");
    }

    fn messages(captured: &Captured) -> Vec<Value> {
        captured
            .stdout()
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect()
    }

    #[test]
    fn json_plan_messages() {
        let (view, captured) = view(false);
        let op = JsonOperation::new(view);
        op.plan(&create_plan());
        let msgs = messages(&captured);
        let kinds: Vec<&str> = msgs.iter().filter_map(|m| m["type"].as_str()).collect();
        assert_eq!(kinds, ["version", "planned_change", "change_summary"]);
        assert_eq!(msgs[1]["change"]["resource"]["addr"], "test_instance.a");
        assert_eq!(msgs[1]["change"]["action"], "create");
        assert_eq!(msgs[2]["changes"]["add"], 1);
        assert_eq!(msgs[2]["changes"]["operation"], "plan");
    }

    #[test]
    fn json_apply_messages() {
        let (view, captured) = view(false);
        let op = JsonOperation::new(view);
        let hook = op.hook();
        hook.pre_apply(&addr(), Action::Create);
        hook.post_apply(&addr(), Action::Create, Duration::ZERO, None);
        op.apply_summary(PlanMode::Normal);
        let msgs = messages(&captured);
        assert_eq!(msgs[1]["type"], "apply_start");
        assert_eq!(msgs[2]["type"], "apply_complete");
        assert_eq!(msgs[3]["changes"]["add"], 1);
        assert_eq!(msgs[3]["changes"]["operation"], "apply");
    }
}
