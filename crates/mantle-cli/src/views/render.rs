//! Human rendering of plans, state and values.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use mantle_common::types::{ResourceAddr, ResourceMode};
use mantle_common::value::Value;
use mantle_engine::{Action, Plan, PlanMode, ResourceChange};
use mantle_state::State;

use super::{Style, View};

const SENSITIVE: &str = "(sensitive value)";
const UNKNOWN: &str = "(known after apply)";

/// Renders a JSON value in configuration syntax.
pub fn format_value(value: &serde_json::Value) -> String {
    Value::from_json(value).render()
}

fn attributes(value: Option<&serde_json::Value>) -> BTreeMap<String, serde_json::Value> {
    match value {
        Some(serde_json::Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => BTreeMap::new(),
    }
}

fn block_header(addr: &ResourceAddr) -> String {
    let keyword = match addr.mode {
        ResourceMode::Managed => "resource",
        ResourceMode::Data => "data",
    };
    format!("{keyword} \"{}\" \"{}\"", addr.type_name, addr.name)
}

fn action_style(action: Action) -> Style {
    match action {
        Action::Create => Style::Green,
        Action::Delete | Action::Replace => Style::Red,
        Action::Update | Action::Read => Style::Yellow,
        Action::NoOp => Style::Bold,
    }
}

fn change_heading(change: &ResourceChange, drift: bool) -> String {
    let addr = &change.addr;
    if drift {
        return match change.action {
            Action::Delete => format!("# {addr} has been deleted"),
            _ => format!("# {addr} has changed"),
        };
    }
    let mut heading = match change.action {
        Action::Create => format!("# {addr} will be created"),
        Action::Update => format!("# {addr} will be updated in-place"),
        Action::Replace => format!("# {addr} must be replaced"),
        Action::Delete => format!("# {addr} will be destroyed"),
        Action::Read => format!("# {addr} will be read during apply"),
        Action::NoOp => format!("# {addr} is unchanged"),
    };
    match change.reason.as_deref() {
        Some("delete_because_no_resource_config") => {
            let _ = write!(heading, "\n  # (because {addr} is not in configuration)");
        }
        Some("read_because_config_unknown") => {
            heading.push_str("\n  # (config refers to values not yet known)");
        }
        Some("replace_by_request") => {
            heading.push_str(", as requested");
        }
        _ => {}
    }
    heading
}

/// Renders one resource change as a block of attribute lines.
pub fn render_change(view: &View, change: &ResourceChange, drift: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  {}", view.colorize(&change_heading(change, drift), Style::Bold));
    let symbol = change.action.symbol();
    let _ = writeln!(
        out,
        "{} {} {{",
        view.colorize(&format!("{symbol:>3}"), action_style(change.action)),
        block_header(&change.addr)
    );

    let before = attributes(change.before.as_ref());
    let after = attributes(change.after.as_ref());
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    let width = keys.iter().map(|k| k.len()).max().unwrap_or(0);
    let show = |key: &str, value: &serde_json::Value| -> String {
        if change.sensitive.contains(key) && !view.show_sensitive() {
            SENSITIVE.to_string()
        } else {
            format_value(value)
        }
    };
    let null = serde_json::Value::Null;
    let mut unchanged = 0usize;
    for key in keys {
        let old = before.get(key).unwrap_or(&null);
        let new = after.get(key).unwrap_or(&null);
        let unknown = change.after_unknown.contains(key);
        let line = match change.action {
            Action::Delete => {
                if old.is_null() {
                    continue;
                }
                format!("- {key:<width$} = {} -> null", show(key, old))
            }
            Action::Create | Action::Read => {
                if unknown {
                    format!("+ {key:<width$} = {UNKNOWN}")
                } else if new.is_null() {
                    continue;
                } else {
                    format!("+ {key:<width$} = {}", show(key, new))
                }
            }
            _ => {
                let forces = if change.requires_replace.iter().any(|a| a == key) {
                    " # forces replacement"
                } else {
                    ""
                };
                if unknown {
                    format!("~ {key:<width$} = {} -> {UNKNOWN}{forces}", show(key, old))
                } else if old == new {
                    unchanged += 1;
                    continue;
                } else if old.is_null() {
                    format!("+ {key:<width$} = {}{forces}", show(key, new))
                } else if new.is_null() {
                    format!("- {key:<width$} = {} -> null{forces}", show(key, old))
                } else {
                    format!("~ {key:<width$} = {} -> {}{forces}", show(key, old), show(key, new))
                }
            }
        };
        for (i, l) in line.lines().enumerate() {
            if i == 0 {
                let _ = writeln!(out, "      {l}");
            } else {
                let _ = writeln!(out, "        {l}");
            }
        }
    }
    if unchanged > 0 {
        let plural = if unchanged == 1 { "" } else { "s" };
        let _ = writeln!(out, "        # ({unchanged} unchanged attribute{plural} hidden)");
    }
    out.push_str("    }\n");
    out
}

fn render_drift(view: &View, plan: &Plan, out: &mut String) {
    if plan.drift.is_empty() {
        return;
    }
    let _ = writeln!(
        out,
        "\n{}\n\nMantle detected the following changes made outside of Mantle since the\nlast \"mantle apply\" which may have affected this plan:\n",
        view.colorize("Note: Objects have changed outside of Mantle", Style::Bold)
    );
    for change in &plan.drift {
        out.push_str(&render_change(view, change, true));
        out.push('\n');
    }
    if plan.mode == PlanMode::RefreshOnly {
        out.push_str("\nThis is a refresh-only plan, so Mantle will not take any actions to undo\nthese. If you were expecting these changes then you can apply this plan to\nrecord the updated values in the Mantle state without changing any remote\nobjects.\n");
    } else {
        out.push_str("\nUnless you have made equivalent changes to your configuration, or ignored the\nrelevant attributes using ignore_changes, the following plan may include\nactions to undo or respond to these changes.\n");
    }
    out.push_str("\n─────────────────────────────────────────────────────────────────────────────\n");
}

/// Renders a plan for the terminal.
pub fn render_plan(view: &View, plan: &Plan) -> String {
    let mut out = String::new();
    render_drift(view, plan, &mut out);

    if plan.is_empty() {
        let _ = writeln!(out, "\n{}", view.colorize(no_changes_heading(plan.mode), Style::Green));
        out.push_str(match plan.mode {
            PlanMode::Destroy => "\nEither you have not created any objects yet or the existing objects were\nalready deleted outside of Mantle.\n",
            PlanMode::RefreshOnly => "\nMantle has checked that the real remote objects still match the result of\nyour most recent changes, and found no differences.\n",
            PlanMode::Normal => "\nMantle has compared your real infrastructure against your configuration\nand found no differences, so no changes are needed.\n",
        });
        return out;
    }

    let actions: BTreeSet<Action> = plan.actionable().map(|c| c.action).collect();
    if !actions.is_empty() {
        out.push_str("\nMantle used the selected providers to generate the following execution\nplan. Resource actions are indicated with the following symbols:\n");
        for action in &actions {
            let label = match action {
                Action::Create => "create",
                Action::Update => "update in-place",
                Action::Replace => "destroy and then create replacement",
                Action::Delete => "destroy",
                Action::Read => "read (data resources)",
                Action::NoOp => continue,
            };
            let _ = writeln!(out, "{} {label}", view.colorize(&format!("{:>3}", action.symbol()), action_style(*action)));
        }
        out.push_str("\nMantle will perform the following actions:\n\n");
        for change in plan.actionable() {
            out.push_str(&render_change(view, change, false));
            out.push('\n');
        }
        let (add, change, destroy) = plan.counts();
        let _ = writeln!(
            out,
            "{} {add} to add, {change} to change, {destroy} to destroy.",
            view.colorize("Plan:", Style::Bold)
        );
    }

    let outputs: Vec<_> = plan.outputs.iter().filter(|o| o.action != Action::NoOp).collect();
    if !outputs.is_empty() {
        out.push_str("\nChanges to Outputs:\n");
        let width = outputs.iter().map(|o| o.name.len()).max().unwrap_or(0);
        for o in outputs {
            let show = |v: Option<&serde_json::Value>| match v {
                _ if o.sensitive && !view.show_sensitive() => SENSITIVE.to_string(),
                Some(v) => format_value(v),
                None => "null".to_string(),
            };
            let new = if o.after_unknown { UNKNOWN.to_string() } else { show(o.after.as_ref()) };
            let line = match o.action {
                Action::Create => format!("+ {:<width$} = {new}", o.name),
                Action::Delete => format!("- {:<width$} = {} -> null", o.name, show(o.before.as_ref())),
                _ => format!("~ {:<width$} = {} -> {new}", o.name, show(o.before.as_ref())),
            };
            let _ = writeln!(out, "  {line}");
        }
    }
    out
}

const fn no_changes_heading(mode: PlanMode) -> &'static str {
    match mode {
        PlanMode::Normal => "No changes. Your infrastructure matches the configuration.",
        PlanMode::Destroy => "No changes. No objects need to be destroyed.",
        PlanMode::RefreshOnly => "No changes. Your infrastructure still matches the configuration.",
    }
}

/// Renders state as resource blocks followed by outputs.
pub fn render_state(view: &View, state: &State) -> String {
    let mut out = String::new();
    for resource in &state.resources {
        let addr = resource.addr();
        let _ = writeln!(out, "# {addr}:");
        let _ = writeln!(out, "{} {{", block_header(&addr));
        let mut attrs = attributes(Some(&resource.attributes));
        attrs.retain(|_, v| !v.is_null());
        let width = attrs.keys().map(String::len).max().unwrap_or(0);
        for (key, value) in &attrs {
            let rendered = format_value(value);
            let mut lines = rendered.lines();
            let _ = writeln!(out, "    {key:<width$} = {}", lines.next().unwrap_or_default());
            for l in lines {
                let _ = writeln!(out, "    {l}");
            }
        }
        out.push_str("}\n\n");
    }
    if !state.outputs.is_empty() {
        out.push_str("\nOutputs:\n\n");
        out.push_str(&render_outputs(view, state));
    }
    out
}

/// Renders root outputs as `name = value` lines.
pub fn render_outputs(view: &View, state: &State) -> String {
    let mut out = String::new();
    for (name, output) in &state.outputs {
        let value = if output.sensitive && !view.show_sensitive() {
            "<sensitive>".to_string()
        } else {
            format_value(&output.value)
        };
        let _ = writeln!(out, "{name} = {value}");
    }
    out
}

#[cfg(test)]
mod tests {
    use mantle_common::types::ResourceAddr;
    use mantle_engine::OutputChange;
    use mantle_state::{OutputState, ResourceState};
    use serde_json::json;

    use super::*;
    use crate::arguments::ViewArgs;
    use crate::streams::Streams;

    fn view() -> View {
        let (streams, _) = Streams::for_testing("");
        View::new(
            streams,
            ViewArgs {
                no_color: true,
                ..ViewArgs::default()
            },
            false,
            false,
        )
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

    fn addr(name: &str) -> ResourceAddr {
        ResourceAddr::managed("test_instance", name)
    }

    #[test]
    fn create_shows_known_and_unknown_attributes() {
        let after = Value::Map(BTreeMap::from([
            ("ami".to_string(), Value::from("ami-1")),
            ("id".to_string(), Value::Unknown),
        ]));
        let text = render_plan(&view(), &plan(vec![ResourceChange::new(addr("a"), Action::Create, None, Some(&after))]));
        assert!(text.contains("# test_instance.a will be created"), "{text}");
        assert!(text.contains("  + resource \"test_instance\" \"a\" {"), "{text}");
        assert!(text.contains("+ ami = \"ami-1\""), "{text}");
        assert!(text.contains("+ id  = (known after apply)"), "{text}");
        assert!(text.contains("Plan: 1 to add, 0 to change, 0 to destroy."), "{text}");
    }

    #[test]
    fn update_hides_unchanged_and_marks_replacement() {
        let before = Value::Map(BTreeMap::from([
            ("ami".to_string(), Value::from("ami-1")),
            ("id".to_string(), Value::from("mock-1")),
        ]));
        let after = Value::Map(BTreeMap::from([
            ("ami".to_string(), Value::from("ami-2")),
            ("id".to_string(), Value::from("mock-1")),
        ]));
        let mut change = ResourceChange::new(addr("a"), Action::Replace, Some(&before), Some(&after));
        change.requires_replace = vec!["ami".to_string()];
        let text = render_plan(&view(), &plan(vec![change]));
        assert!(text.contains("# test_instance.a must be replaced"), "{text}");
        assert!(text.contains("-/+ resource"), "{text}");
        assert!(text.contains("~ ami = \"ami-1\" -> \"ami-2\" # forces replacement"), "{text}");
        assert!(text.contains("# (1 unchanged attribute hidden)"), "{text}");
        assert!(text.contains("Plan: 1 to add, 0 to change, 1 to destroy."), "{text}");
    }

    #[test]
    fn sensitive_attributes_masked() {
        let after = Value::Map(BTreeMap::from([("password".to_string(), Value::from("hunter2"))]));
        let mut change = ResourceChange::new(addr("a"), Action::Create, None, Some(&after));
        let _ = change.sensitive.insert("password".to_string());
        let text = render_plan(&view(), &plan(vec![change]));
        assert!(text.contains("+ password = (sensitive value)"), "{text}");
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn orphan_delete_explains_reason() {
        let before = Value::Map(BTreeMap::from([("id".to_string(), Value::from("mock-1"))]));
        let change = ResourceChange::new(addr("gone"), Action::Delete, Some(&before), None)
            .with_reason("delete_because_no_resource_config");
        let text = render_plan(&view(), &plan(vec![change]));
        assert!(text.contains("# (because test_instance.gone is not in configuration)"), "{text}");
        assert!(text.contains("- id = \"mock-1\" -> null"), "{text}");
    }

    #[test]
    fn empty_plans_by_mode() {
        let mut p = plan(Vec::new());
        assert!(render_plan(&view(), &p).contains("No changes. Your infrastructure matches the configuration."));
        p.mode = PlanMode::Destroy;
        assert!(render_plan(&view(), &p).contains("No objects need to be destroyed."));
    }

    #[test]
    fn output_changes_listed() {
        let mut p = plan(Vec::new());
        p.outputs.push(OutputChange {
            name: "id".into(),
            action: Action::Create,
            before: None,
            after: None,
            after_unknown: true,
            sensitive: false,
        });
        let text = render_plan(&view(), &p);
        assert!(text.contains("Changes to Outputs:"), "{text}");
        assert!(text.contains("  + id = (known after apply)"), "{text}");
        assert!(!text.contains("Plan:"), "{text}");
    }

    #[test]
    fn state_rendering_masks_sensitive_outputs() {
        let mut state = State::new();
        state.set_resource(ResourceState::new(&addr("a"), json!({"id": "mock-1", "value": null})));
        let _ = state.outputs.insert(
            "secret".into(),
            OutputState {
                value: json!("s3cr3t"),
                sensitive: true,
            },
        );
        let text = render_state(&view(), &state);
        assert!(text.contains("# test_instance.a:\nresource \"test_instance\" \"a\" {\n    id = \"mock-1\"\n}"), "{text}");
        assert!(text.contains("secret = <sensitive>"), "{text}");
    }
}
