//! Output of `show`.

use mantle_common::constants::VERSION;
use mantle_common::diagnostics::Diagnostics;
use mantle_common::types::ResourceMode;
use mantle_engine::{Plan, PlanFile, ResourceChange};
use mantle_state::State;
use serde_json::{Map, Value, json};

use super::View;
use super::render::{render_plan, render_state};
use crate::arguments::ViewType;

/// Format version of the `show --json` documents.
pub const SHOW_FORMAT_VERSION: &str = "1.0";

/// What `show` shows.
pub trait ShowView {
    /// Shows a state snapshot; `None` means no state exists.
    fn state(&self, state: Option<&State>);

    /// Shows a saved plan.
    fn plan(&self, file: &PlanFile);

    /// Shows diagnostics.
    fn diagnostics(&self, diags: Diagnostics);
}

/// Creates the view for the requested output format.
pub fn new_show_view(view_type: ViewType, view: &View) -> Box<dyn ShowView> {
    match view_type {
        ViewType::Human => Box::new(HumanShow { view: view.clone() }),
        ViewType::Json => Box::new(JsonShow { view: view.clone() }),
    }
}

struct HumanShow {
    view: View,
}

impl ShowView for HumanShow {
    fn state(&self, state: Option<&State>) {
        match state {
            Some(state) if !state.is_empty() => self.view.stdout().print(&render_state(&self.view, state)),
            _ => self.view.stdout().println("No state."),
        }
    }

    fn plan(&self, file: &PlanFile) {
        self.view.stdout().print(&render_plan(&self.view, &file.plan));
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.view.diagnostics(diags);
    }
}

struct JsonShow {
    view: View,
}

const fn mode_name(mode: ResourceMode) -> &'static str {
    match mode {
        ResourceMode::Managed => "managed",
        ResourceMode::Data => "data",
    }
}

/// The JSON form of state values, shared by state and plan documents.
pub fn state_values(state: &State) -> Value {
    let outputs: Map<String, Value> = state
        .outputs
        .iter()
        .map(|(name, o)| (name.clone(), json!({ "sensitive": o.sensitive, "value": o.value })))
        .collect();
    let resources: Vec<Value> = state
        .resources
        .iter()
        .map(|r| {
            json!({
                "address": r.addr().to_string(),
                "mode": mode_name(r.mode),
                "type": r.type_name,
                "name": r.name,
                "provider_name": r.provider,
                "values": r.attributes,
            })
        })
        .collect();
    json!({ "outputs": outputs, "root_module": { "resources": resources } })
}

fn change_json(change: &ResourceChange) -> Value {
    let unknown: Map<String, Value> = change.after_unknown.iter().map(|k| (k.clone(), json!(true))).collect();
    json!({
        "address": change.addr.to_string(),
        "mode": mode_name(change.addr.mode),
        "type": change.addr.type_name,
        "name": change.addr.name,
        "change": {
            "actions": [change.action.to_string()],
            "before": change.before,
            "after": change.after,
            "after_unknown": unknown,
            "replace_paths": change.requires_replace,
        },
    })
}

/// The JSON form of a plan.
pub fn plan_json(plan: &Plan) -> Value {
    let outputs: Map<String, Value> = plan
        .outputs
        .iter()
        .map(|o| {
            (
                o.name.clone(),
                json!({
                    "actions": [o.action.to_string()],
                    "before": o.before,
                    "after": o.after,
                    "after_unknown": o.after_unknown,
                    "after_sensitive": o.sensitive,
                }),
            )
        })
        .collect();
    json!({
        "format_version": SHOW_FORMAT_VERSION,
        "mantle_version": VERSION,
        "resource_drift": plan.drift.iter().map(change_json).collect::<Vec<_>>(),
        "resource_changes": plan.changes.iter().map(change_json).collect::<Vec<_>>(),
        "output_changes": outputs,
        "prior_state": {
            "format_version": SHOW_FORMAT_VERSION,
            "values": state_values(&plan.prior_state),
        },
    })
}

impl ShowView for JsonShow {
    fn state(&self, state: Option<&State>) {
        let mut doc = json!({ "format_version": SHOW_FORMAT_VERSION });
        if let (Some(state), Value::Object(map)) = (state, &mut doc) {
            let _ = map.insert("mantle_version".into(), json!(state.mantle_version));
            let _ = map.insert("values".into(), state_values(state));
        }
        self.view.stdout().println(&doc.to_string());
    }

    fn plan(&self, file: &PlanFile) {
        self.view.stdout().println(&plan_json(&file.plan).to_string());
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.view.diagnostics(diags);
    }
}

#[cfg(test)]
mod tests {
    use mantle_common::types::ResourceAddr;
    use mantle_state::ResourceState;

    use super::*;
    use crate::arguments::ViewArgs;
    use crate::streams::{Captured, Streams};

    fn view() -> (View, Captured) {
        let (streams, captured) = Streams::for_testing("");
        let args = ViewArgs {
            no_color: true,
            ..ViewArgs::default()
        };
        (View::new(streams, args, false, false), captured)
    }

    fn state() -> State {
        let mut state = State::new();
        state.set_resource(ResourceState::new(
            &ResourceAddr::managed("test_instance", "a"),
            json!({ "id": "mock-1" }),
        ));
        state
    }

    #[test]
    fn human_empty_state() {
        let (view, captured) = view();
        new_show_view(ViewType::Human, &view).state(None);
        assert_eq!(captured.stdout(), "No state.\n");
    }

    #[test]
    fn human_state() {
        let (view, captured) = view();
        new_show_view(ViewType::Human, &view).state(Some(&state()));
        assert!(captured.stdout().contains("# test_instance.a:"));
    }

    #[test]
    fn json_state() {
        let (view, captured) = view();
        new_show_view(ViewType::Json, &view).state(Some(&state()));
        let doc: Value = serde_json::from_str(captured.stdout().trim()).expect("json");
        let resource = &doc["values"]["root_module"]["resources"][0];
        assert_eq!(resource["address"], "test_instance.a");
        assert_eq!(resource["mode"], "managed");
        assert_eq!(resource["values"]["id"], "mock-1");
    }

    #[test]
    fn json_without_state_has_no_values() {
        let (view, captured) = view();
        new_show_view(ViewType::Json, &view).state(None);
        let doc: Value = serde_json::from_str(captured.stdout().trim()).expect("json");
        assert!(doc.get("values").is_none());
    }
}
