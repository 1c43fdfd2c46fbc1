//! `mantle graph` — print the dependency graph in DOT format.

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::types::ResourceMode;
use mantle_config::graph::{DependencyGraph, GraphNode};
use mantle_config::load_sources;
use mantle_engine::PlanFile;

use super::{Command, base_view, exit_code, plan_encryption};
use crate::arguments::parse_flags;
use crate::meta::Meta;

/// Which operation's graph to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GraphType {
    Plan,
    PlanDestroy,
    PlanRefreshOnly,
    Apply,
}

#[derive(Debug, Parser)]
struct Flags {
    /// Graph type.
    #[arg(long = "type", value_enum)]
    graph_type: Option<GraphType>,
    /// Saved plan whose apply graph is drawn.
    #[arg(long)]
    plan: Option<PathBuf>,
    /// Highlight cycles in red.
    #[arg(long = "draw-cycles")]
    draw_cycles: bool,
}

/// Nodes drawn for a graph type; `None` draws everything.
fn selection(
    graph: &DependencyGraph,
    graph_type: GraphType,
    plan: Option<&PlanFile>,
) -> Option<BTreeSet<GraphNode>> {
    let resources = |keep: fn(&GraphNode) -> bool| graph.nodes().into_iter().filter(keep).collect();
    match graph_type {
        GraphType::Plan => None,
        GraphType::PlanRefreshOnly => Some(resources(|n| matches!(n, GraphNode::Resource(_)))),
        GraphType::PlanDestroy => Some(resources(
            |n| matches!(n, GraphNode::Resource(addr) if addr.mode == ResourceMode::Managed),
        )),
        GraphType::Apply => plan.map(|file| {
            let mut nodes: BTreeSet<GraphNode> = file
                .plan
                .actionable()
                .map(|change| GraphNode::Resource(change.addr.clone()))
                .collect();
            nodes.extend(file.plan.outputs.iter().map(|o| GraphNode::Output(o.name.clone())));
            nodes
        }),
    }
}

/// The `graph` command.
#[derive(Debug)]
pub struct GraphCommand {
    meta: Meta,
}

impl GraphCommand {
    /// Creates the command.
    pub const fn new(meta: Meta) -> Self {
        Self { meta }
    }
}

impl Command for GraphCommand {
    fn run(&mut self, args: Vec<String>) -> i32 {
        let (view, _, args) = base_view(&self.meta, args);
        let flags = match parse_flags::<Flags>(&args) {
            Ok(flags) => flags,
            Err(diag) => {
                view.diagnostics(Diagnostics::single(diag));
                view.help_prompt("graph");
                return 1;
            }
        };
        let graph_type = match (flags.graph_type, &flags.plan) {
            (Some(graph_type), None) => graph_type,
            (None | Some(GraphType::Apply), Some(_)) => GraphType::Apply,
            (None, None) => GraphType::Plan,
            (Some(_), Some(_)) => {
                view.diagnostics(Diagnostics::single(Diagnostic::error(
                    "Incompatible graph type",
                    "The --plan option can only be combined with --type=apply.",
                )));
                return 1;
            }
        };

        let mut diags = self.meta.startup_diagnostics();
        let plan_file = match &flags.plan {
            Some(path) => {
                let Some(encryption) = plan_encryption(&self.meta, &mut diags) else {
                    view.diagnostics(diags);
                    return 1;
                };
                match PlanFile::read(&self.meta.working_dir().join(path), &encryption) {
                    Ok(file) => Some(file),
                    Err(e) => {
                        diags.push(Diagnostic::error("Failed to read plan file", e.to_string()));
                        view.diagnostics(diags);
                        return 1;
                    }
                }
            }
            None => None,
        };
        let (config, config_diags) = match &plan_file {
            Some(file) => load_sources(self.meta.working_dir(), file.config.clone()),
            None => self.meta.load_config(true),
        };
        view.set_sources(config.sources.clone());
        let failed = config_diags.has_errors();
        diags.append(config_diags);
        if failed {
            view.diagnostics(diags);
            return 1;
        }

        let graph = DependencyGraph::from_config(&config);
        let only = selection(&graph, graph_type, plan_file.as_ref());
        view.stdout().print(&graph.to_dot(only.as_ref(), flags.draw_cycles));
        let code = exit_code(&diags);
        view.diagnostics(diags);
        code
    }

    fn help(&self) -> String {
        "\
Usage: mantle [global options] graph [options]

  Produces a representation of the dependency graph between different
  objects in the current configuration and state.

  The graph is presented in the DOT language. The typical program that can
  read this format is GraphViz, but many web services are also available
  to read this format.

Options:

  --plan=tfplan     Render graph using the specified plan file instead of the
                    configuration in the current directory. Implies --type=apply.

  --draw-cycles     Highlight any cycles in the graph with colored edges.
                    This helps when diagnosing cycle errors.

  --type=plan       Type of operation graph to output. Can be: plan,
                    plan-refresh-only, plan-destroy, or apply. By default
                    Mantle chooses \"plan\", or \"apply\" if you also set the
                    --plan=... option.
"
        .to_string()
    }

    fn synopsis(&self) -> &'static str {
        "Generate a Graphviz graph of the steps in an operation"
    }
}
