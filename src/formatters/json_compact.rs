use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{CallGraph, DependencyGraph, Graphs};

pub const GRAPHS_DIR: &str = "graphs";
pub const DEPENDENCY_GRAPH_FILE: &str = "dependency_graph.json";
pub const CALL_GRAPH_FILE: &str = "call_graph.json";

/// Writes both graphs as `{meta, nodes, edges}` documents with sorted contents.
pub struct JsonGraphFormatter {
    /// Indented output instead of a single line.
    pretty: bool,
}

impl JsonGraphFormatter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn compact() -> Self {
        Self { pretty: false }
    }

    /// Writes `<output>/graphs/{dependency_graph,call_graph}.json`.
    pub fn export(&self, graphs: &Graphs, output: &Path) -> Result<Vec<PathBuf>> {
        let dir = output.join(GRAPHS_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating graph directory {}", dir.display()))?;

        let dependency_path = dir.join(DEPENDENCY_GRAPH_FILE);
        self.write(&dependency_path, &self.format_dependency_graph(&graphs.dependencies))?;

        let call_path = dir.join(CALL_GRAPH_FILE);
        self.write(&call_path, &self.format_call_graph(&graphs.calls))?;

        Ok(vec![dependency_path, call_path])
    }

    pub fn format_dependency_graph(&self, graph: &DependencyGraph) -> Value {
        let nodes: Vec<Value> = graph
            .nodes()
            .into_iter()
            .map(|node| {
                json!({
                    "id": node.path,
                    "kind": node.kind,
                    "stub": node.stub,
                    "unresolved": node.unresolved,
                })
            })
            .collect();

        let edges: Vec<Value> = graph
            .edges()
            .into_iter()
            .map(|(source, target, weight)| {
                json!({ "source": source, "target": target, "weight": weight })
            })
            .collect();

        let cycles = graph.cycles();

        json!({
            "meta": {
                "graph": "dependency",
                "nodes": graph.node_count(),
                "edges": graph.edge_count(),
                "cycles": cycles.len(),
            },
            "nodes": nodes,
            "edges": edges,
            "cycles": cycles,
        })
    }

    pub fn format_call_graph(&self, graph: &CallGraph) -> Value {
        let nodes: Vec<Value> = graph
            .nodes()
            .into_iter()
            .map(|node| {
                let mut value = json!({
                    "id": node.id,
                    "path": node.path,
                    "kind": node.kind,
                    "stub": node.stub,
                });
                if let Some(name) = &node.name {
                    value["name"] = json!(name);
                }
                if let Some(span) = node.span {
                    value["span"] = json!(span);
                }
                value
            })
            .collect();

        let edges: Vec<Value> = graph
            .edges()
            .into_iter()
            .map(|(source, target, weight)| {
                json!({ "source": source, "target": target, "weight": weight })
            })
            .collect();

        json!({
            "meta": {
                "graph": "call",
                "nodes": graph.node_count(),
                "edges": graph.edge_count(),
                "unresolvedCalls": graph.unresolved_calls(),
            },
            "nodes": nodes,
            "edges": edges,
        })
    }

    fn write(&self, path: &Path, value: &Value) -> Result<()> {
        let content = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

impl Default for JsonGraphFormatter {
    fn default() -> Self {
        Self::new()
    }
}
