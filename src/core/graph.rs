use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use super::record::{AnalysisRecord, EntityKind, FileKind, Span};
use super::resolver::{CallSite, FunctionEntry, FunctionResolver, ImportResolver};

/// A file in the dependency graph. Stubs stand in for files that were never
/// analyzed (skipped, failed, or only seen as an import target so far).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub path: String,
    pub kind: FileKind,
    pub stub: bool,
    pub unresolved: Vec<String>,
}

impl FileNode {
    fn stub(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: FileKind::Unknown,
            stub: true,
            unresolved: Vec::new(),
        }
    }
}

/// File-to-file import graph. Edge weight is the number of import statements.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<FileNode, usize>,
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_node(&mut self, path: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(path) {
            return index;
        }
        let index = self.graph.add_node(FileNode::stub(path));
        self.node_map.insert(path.to_string(), index);
        index
    }

    fn clear_outgoing(&mut self, index: NodeIndex) {
        let outgoing: Vec<_> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .map(|edge| edge.id())
            .collect();
        for edge in outgoing {
            self.graph.remove_edge(edge);
        }
    }

    /// Replaces everything known about `path`: its kind, its outgoing edges and
    /// its unresolved targets.
    pub fn upsert_file(
        &mut self,
        path: &str,
        kind: FileKind,
        targets: &[String],
        unresolved: Vec<String>,
    ) {
        let index = self.ensure_node(path);
        self.graph[index] = FileNode {
            path: path.to_string(),
            kind,
            stub: false,
            unresolved,
        };
        self.clear_outgoing(index);

        let mut weights: BTreeMap<&str, usize> = BTreeMap::new();
        for target in targets {
            *weights.entry(target.as_str()).or_default() += 1;
        }
        for (target, weight) in weights {
            let target = self.ensure_node(target);
            self.graph.add_edge(index, target, weight);
        }
    }

    /// Marks `path` as a stub, dropping whatever an earlier analysis added.
    pub fn add_stub(&mut self, path: &str) {
        let index = self.ensure_node(path);
        self.graph[index] = FileNode::stub(path);
        self.clear_outgoing(index);
    }

    pub fn node(&self, path: &str) -> Option<&FileNode> {
        self.node_map.get(path).map(|&index| &self.graph[index])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.node_map.contains_key(path)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Nodes sorted by path.
    pub fn nodes(&self) -> Vec<&FileNode> {
        let mut nodes: Vec<_> = self
            .graph
            .node_indices()
            .map(|index| &self.graph[index])
            .collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        nodes
    }

    /// `(source, target, weight)` triples, sorted.
    pub fn edges(&self) -> Vec<(String, String, usize)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|edge| {
                (
                    self.graph[edge.source()].path.clone(),
                    self.graph[edge.target()].path.clone(),
                    *edge.weight(),
                )
            })
            .collect();
        edges.sort();
        edges
    }

    pub fn dependencies_of(&self, path: &str) -> Vec<String> {
        let Some(&index) = self.node_map.get(path) else {
            return Vec::new();
        };
        let mut targets: Vec<_> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .map(|target| self.graph[target].path.clone())
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }

    /// Every file reachable from `path`, excluding `path` itself. Terminates on cycles.
    pub fn transitive_dependencies(&self, path: &str) -> Vec<String> {
        let Some(&start) = self.node_map.get(path) else {
            return Vec::new();
        };

        let mut visited = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut reached = BTreeSet::new();

        while let Some(current) = queue.pop_front() {
            for next in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if visited.insert(next) {
                    reached.insert(self.graph[next].path.clone());
                    queue.push_back(next);
                }
            }
        }
        reached.into_iter().collect()
    }

    /// Import cycles: strongly connected components with more than one file.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut paths: Vec<_> = component
                    .into_iter()
                    .map(|index| self.graph[index].path.clone())
                    .collect();
                paths.sort();
                paths
            })
            .collect();
        cycles.sort();
        cycles
    }
}

/// A call-graph node: a function (`path::name`) or a file stub (`path`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallNode {
    pub id: String,
    pub path: String,
    pub name: Option<String>,
    pub kind: FileKind,
    pub span: Option<Span>,
    pub stub: bool,
}

/// Function-level call graph. Call sites are kept per file and only turned into
/// edges by [`CallGraph::resolve`].
#[derive(Debug, Default)]
pub struct CallGraph {
    graph: StableDiGraph<CallNode, usize>,
    node_map: HashMap<String, NodeIndex>,
    functions_by_file: HashMap<String, Vec<FunctionEntry>>,
    pending_calls: HashMap<String, Vec<CallSite>>,
    unresolved_calls: usize,
}

pub fn function_id(path: &str, name: &str) -> String {
    format!("{path}::{name}")
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_file(&mut self, path: &str) {
        if let Some(functions) = self.functions_by_file.remove(path) {
            for function in functions {
                if let Some(index) = self.node_map.remove(&function.node_id) {
                    self.graph.remove_node(index);
                }
            }
        }
        if let Some(index) = self.node_map.remove(path) {
            self.graph.remove_node(index);
        }
        self.pending_calls.remove(path);
    }

    /// Replaces the functions and pending call sites of `path`.
    pub fn replace_file(
        &mut self,
        path: &str,
        kind: FileKind,
        functions: &[(String, Span)],
        calls: Vec<CallSite>,
    ) {
        self.remove_file(path);

        let mut entries = Vec::with_capacity(functions.len());
        for (name, span) in functions {
            let id = function_id(path, name);
            if self.node_map.contains_key(&id) {
                continue;
            }
            let index = self.graph.add_node(CallNode {
                id: id.clone(),
                path: path.to_string(),
                name: Some(name.clone()),
                kind,
                span: Some(*span),
                stub: false,
            });
            self.node_map.insert(id.clone(), index);
            entries.push(FunctionEntry {
                node_id: id,
                file_path: path.to_string(),
                name: name.clone(),
            });
        }

        self.functions_by_file.insert(path.to_string(), entries);
        self.pending_calls.insert(path.to_string(), calls);
    }

    pub fn add_stub(&mut self, path: &str) {
        self.remove_file(path);
        let index = self.graph.add_node(CallNode {
            id: path.to_string(),
            path: path.to_string(),
            name: None,
            kind: FileKind::Unknown,
            span: None,
            stub: true,
        });
        self.node_map.insert(path.to_string(), index);
    }

    /// Rebuilds every call edge from the pending call sites of all files.
    pub fn resolve(&mut self) {
        self.graph.clear_edges();

        let mut resolver = FunctionResolver::new();
        resolver.build_indexes(self.functions_by_file.values().flatten());

        let mut call_sites: Vec<CallSite> =
            self.pending_calls.values().flatten().cloned().collect();
        call_sites.sort_by(|a, b| {
            (&a.file_path, a.line_number, &a.called_name).cmp(&(
                &b.file_path,
                b.line_number,
                &b.called_name,
            ))
        });

        let resolution = resolver.resolve_calls(&call_sites);
        let mut weights: BTreeMap<(String, String), usize> = BTreeMap::new();
        for edge in resolution.edges {
            *weights.entry(edge).or_default() += 1;
        }

        let mut unresolved = resolution.unresolved;
        for ((caller, callee), weight) in weights {
            match (self.node_map.get(&caller), self.node_map.get(&callee)) {
                (Some(&source), Some(&target)) => {
                    self.graph.add_edge(source, target, weight);
                }
                _ => unresolved += weight,
            }
        }
        self.unresolved_calls = unresolved;
    }

    pub fn unresolved_calls(&self) -> usize {
        self.unresolved_calls
    }

    pub fn node(&self, id: &str) -> Option<&CallNode> {
        self.node_map.get(id).map(|&index| &self.graph[index])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> Vec<&CallNode> {
        let mut nodes: Vec<_> = self
            .graph
            .node_indices()
            .map(|index| &self.graph[index])
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    pub fn edges(&self) -> Vec<(String, String, usize)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|edge| {
                (
                    self.graph[edge.source()].id.clone(),
                    self.graph[edge.target()].id.clone(),
                    *edge.weight(),
                )
            })
            .collect();
        edges.sort();
        edges
    }
}

/// Outcome of linking one file's imports against the scanned tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileLinkage {
    pub resolved: Vec<String>,
    pub unresolved: Vec<String>,
}

/// The finished graphs of a run.
#[derive(Debug, Default)]
pub struct Graphs {
    pub dependencies: DependencyGraph,
    pub calls: CallGraph,
}

/// Folds analysis records into both graphs. Safe to share between workers; each
/// graph sits behind its own lock and every call applies one file atomically.
#[derive(Debug)]
pub struct GraphBuilder {
    dependencies: Mutex<DependencyGraph>,
    calls: Mutex<CallGraph>,
    imports: ImportResolver,
}

impl GraphBuilder {
    pub fn new(imports: ImportResolver) -> Self {
        Self {
            dependencies: Mutex::new(DependencyGraph::new()),
            calls: Mutex::new(CallGraph::new()),
            imports,
        }
    }

    pub fn add_file(&self, record: &AnalysisRecord) -> FileLinkage {
        let mut linkage = FileLinkage::default();
        for import in record.entities_of(EntityKind::Import) {
            let target = import.target_module.as_deref().unwrap_or(&import.name);
            match self.imports.resolve(&record.path, target) {
                Some(path) => linkage.resolved.push(path),
                None => {
                    if !linkage.unresolved.iter().any(|seen| seen == target) {
                        linkage.unresolved.push(target.to_string());
                    }
                }
            }
        }

        let functions: Vec<(String, Span)> = record
            .entities_of(EntityKind::Function)
            .map(|function| (function.name.clone(), function.span))
            .collect();
        let calls = attribute_calls(record, &functions);

        self.dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert_file(
                &record.path,
                record.kind,
                &linkage.resolved,
                linkage.unresolved.clone(),
            );
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace_file(&record.path, record.kind, &functions, calls);

        linkage
    }

    pub fn add_stub(&self, path: &str) {
        self.dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_stub(path);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_stub(path);
    }

    /// Resolves the call graph and hands both graphs over, leaving the builder empty.
    pub fn finish(&self) -> Graphs {
        let dependencies = std::mem::take(
            &mut *self
                .dependencies
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let mut calls = std::mem::take(
            &mut *self.calls.lock().unwrap_or_else(PoisonError::into_inner),
        );
        calls.resolve();
        Graphs {
            dependencies,
            calls,
        }
    }
}

/// Pairs each call entity with the innermost function whose span contains it.
/// Calls outside every function have no caller and are dropped.
fn attribute_calls(record: &AnalysisRecord, functions: &[(String, Span)]) -> Vec<CallSite> {
    record
        .entities_of(EntityKind::Call)
        .filter_map(|call| {
            let caller = functions
                .iter()
                .filter(|(_, span)| span.contains(&call.span))
                .min_by(|(_, a), (_, b)| a.width().cmp(&b.width()).then(b.start.cmp(&a.start)))
                .map(|(name, _)| function_id(&record.path, name))?;
            Some(CallSite {
                caller_id: caller,
                file_path: record.path.clone(),
                called_name: call.callee_name.clone().unwrap_or_else(|| call.name.clone()),
                line_number: call.span.start,
            })
        })
        .collect()
}
