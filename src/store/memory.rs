//! In-memory Store
//!
//! A petgraph-backed property graph with the same merge-by-key semantics as
//! the Neo4j backend. Used for dry runs, DOT export and tests.
//!
//! The store is a cheap handle over shared state: clones see the same graph,
//! so a test can keep one handle for inspection while the pipeline owns another.

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    Constraint, EdgeBatch, EdgeLabel, GraphSession, GraphStore, IndexSpec, NodeBatch, NodeLabel,
    PropertyMap, StoreError, StoreResult,
};
use crate::identity::DiagramIdentity;
use crate::version::ServerVersion;

/// Labels whose nodes are addressable by `fqn`
const FQN_LABELS: [NodeLabel; 3] = [NodeLabel::Entity, NodeLabel::RefType, NodeLabel::Field];

/// A stored node
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub label: NodeLabel,
    pub properties: PropertyMap,
}

impl StoredNode {
    /// Value of the label's key property
    pub fn key(&self) -> &str {
        self.properties
            .get(self.label.key_property())
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

/// A stored edge
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEdge {
    pub label: EdgeLabel,
    pub properties: PropertyMap,
}

/// An edge with its endpoint keys resolved, for inspection
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EdgeView {
    pub label: EdgeLabel,
    pub from: String,
    pub to: String,
    /// Properties rendered as sorted `key=value` pairs
    pub properties: Vec<(String, String)>,
}

impl EdgeView {
    pub fn get(&self, property: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == property)
            .map(|(_, v)| v.as_str())
    }
}

/// Order-independent picture of the whole graph, for state comparisons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub nodes: Vec<(NodeLabel, String, String)>,
    pub edges: Vec<EdgeView>,
}

#[derive(Debug)]
struct MemoryGraph {
    graph: DiGraph<StoredNode, StoredEdge>,
    by_key: HashMap<(NodeLabel, String), NodeIndex>,
    constraints: BTreeSet<&'static str>,
    indexes: BTreeSet<&'static str>,
    server_version: Option<ServerVersion>,
    offline: bool,
    open_sessions: usize,
    sessions_opened: usize,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self {
            graph: DiGraph::new(),
            by_key: HashMap::new(),
            constraints: BTreeSet::new(),
            indexes: BTreeSet::new(),
            server_version: Some(ServerVersion::new(semver::Version::new(5, 0, 0))),
            offline: false,
            open_sessions: 0,
            sessions_opened: 0,
        }
    }
}

impl MemoryGraph {
    fn nodes_by_fqn(&self, fqn: &str) -> Vec<NodeIndex> {
        FQN_LABELS
            .iter()
            .filter_map(|label| self.by_key.get(&(*label, fqn.to_string())).copied())
            .collect()
    }

    fn find_edge(&self, from: NodeIndex, to: NodeIndex, label: EdgeLabel, identity: &PropertyMap) -> Option<EdgeIndex> {
        self.graph
            .edges_connecting(from, to)
            .find(|e| {
                let edge = e.weight();
                edge.label == label
                    && label.merge_properties().iter().all(|p| {
                        edge.properties.get(*p).unwrap_or(&Value::Null)
                            == identity.get(*p).unwrap_or(&Value::Null)
                    })
            })
            .map(|e| e.id())
    }

    fn merge_edge(&mut self, from: NodeIndex, to: NodeIndex, label: EdgeLabel, identity: &PropertyMap) -> EdgeIndex {
        if let Some(idx) = self.find_edge(from, to, label, identity) {
            return idx;
        }
        let properties = label
            .merge_properties()
            .iter()
            .filter_map(|p| identity.get(*p).map(|v| (p.to_string(), v.clone())))
            .collect();
        self.graph.add_edge(from, to, StoredEdge { label, properties })
    }

    fn edge_view(&self, idx: EdgeIndex) -> Option<EdgeView> {
        let (from, to) = self.graph.edge_endpoints(idx)?;
        let edge = self.graph.edge_weight(idx)?;
        Some(EdgeView {
            label: edge.label,
            from: self.graph[from].key().to_string(),
            to: self.graph[to].key().to_string(),
            properties: edge
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), render(v)))
                .collect(),
        })
    }
}

fn apply_properties(target: &mut PropertyMap, updates: &PropertyMap) {
    for (name, value) in updates {
        if value.is_null() {
            target.remove(name);
        } else {
            target.insert(name.clone(), value.clone());
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Shared in-memory property graph
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryGraph>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryGraph> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Version the capability probe reports; `None` makes the probe fail
    pub fn set_server_version(&self, version: Option<ServerVersion>) {
        self.lock().server_version = version;
    }

    /// Simulate an unreachable store
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn node_count(&self) -> usize {
        self.lock().graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.lock().graph.edge_count()
    }

    pub fn count_nodes(&self, label: NodeLabel) -> usize {
        self.lock().graph.node_weights().filter(|n| n.label == label).count()
    }

    pub fn count_edges(&self, label: EdgeLabel) -> usize {
        self.lock().graph.edge_weights().filter(|e| e.label == label).count()
    }

    /// Properties of the node with the given label and key
    pub fn node(&self, label: NodeLabel, key: &str) -> Option<PropertyMap> {
        let graph = self.lock();
        let idx = graph.by_key.get(&(label, key.to_string()))?;
        Some(graph.graph[*idx].properties.clone())
    }

    /// All edges of one type, sorted
    pub fn edges(&self, label: EdgeLabel) -> Vec<EdgeView> {
        let graph = self.lock();
        let mut edges: Vec<EdgeView> = graph
            .graph
            .edge_indices()
            .filter_map(|idx| graph.edge_view(idx))
            .filter(|e| e.label == label)
            .collect();
        edges.sort();
        edges
    }

    pub fn constraint_names(&self) -> Vec<&'static str> {
        self.lock().constraints.iter().copied().collect()
    }

    pub fn index_names(&self) -> Vec<&'static str> {
        self.lock().indexes.iter().copied().collect()
    }

    /// Sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }

    /// Sessions opened over the store's lifetime
    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let graph = self.lock();
        let mut nodes: Vec<(NodeLabel, String, String)> = graph
            .graph
            .node_weights()
            .map(|n| {
                let props = serde_json::to_string(&n.properties).unwrap_or_default();
                (n.label, n.key().to_string(), props)
            })
            .collect();
        nodes.sort();

        let mut edges: Vec<EdgeView> = graph
            .graph
            .edge_indices()
            .filter_map(|idx| graph.edge_view(idx))
            .collect();
        edges.sort();

        GraphSnapshot { nodes, edges }
    }

    /// Export the graph to GraphViz DOT format
    pub fn to_dot(&self) -> String {
        let graph = self.lock();
        let mut output = String::new();

        output.push_str("digraph DiagramGraph {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8];\n\n");

        let color_map = [
            (NodeLabel::SchemaBlock, "#FF9800"),
            (NodeLabel::Entity, "#00BCD4"),
            (NodeLabel::RefType, "#9C27B0"),
            (NodeLabel::Field, "#E0E0E0"),
        ];

        for idx in graph.graph.node_indices() {
            let node = &graph.graph[idx];
            let color = color_map
                .iter()
                .find(|(label, _)| *label == node.label)
                .map(|(_, color)| *color)
                .unwrap_or("#9E9E9E");
            let caption = node
                .properties
                .get("name")
                .or_else(|| node.properties.get("id"))
                .map(render)
                .unwrap_or_default();
            output.push_str(&format!(
                "  n{} [label=\"{}\\n{}\", fillcolor=\"{}\"];\n",
                idx.index(),
                escape(&caption),
                node.label,
                color
            ));
        }

        output.push('\n');

        for edge in graph.graph.edge_references() {
            let caption = match edge.weight().label {
                EdgeLabel::RelatesTo => edge
                    .weight()
                    .properties
                    .get("type")
                    .map(render)
                    .unwrap_or_default(),
                other => other.to_string(),
            };
            output.push_str(&format!(
                "  n{} -> n{} [label=\"{}\"];\n",
                edge.source().index(),
                edge.target().index(),
                escape(&caption)
            ));
        }

        output.push_str("}\n");
        output
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl GraphStore for MemoryStore {
    type Session = MemorySession;

    fn session(&self) -> StoreResult<MemorySession> {
        let mut graph = self.lock();
        if graph.offline {
            return Err(offline_error());
        }
        graph.open_sessions += 1;
        graph.sessions_opened += 1;
        Ok(MemorySession {
            store: self.clone(),
        })
    }
}

fn offline_error() -> StoreError {
    StoreError::Connectivity {
        uri: "memory://".to_string(),
        reason: "store is offline".to_string(),
    }
}

/// Session over a [`MemoryStore`]
#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
}

impl MemorySession {
    fn online(&self) -> StoreResult<MutexGuard<'_, MemoryGraph>> {
        let graph = self.store.lock();
        if graph.offline {
            return Err(offline_error());
        }
        Ok(graph)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let mut graph = self.store.lock();
        graph.open_sessions = graph.open_sessions.saturating_sub(1);
    }
}

impl GraphSession for MemorySession {
    fn declare_constraint(&mut self, constraint: &Constraint) -> StoreResult<()> {
        self.online()?.constraints.insert(constraint.name);
        Ok(())
    }

    fn declare_index(&mut self, index: &IndexSpec) -> StoreResult<()> {
        let mut graph = self.online()?;
        if let IndexSpec::Relationship { name, .. } = index {
            let supported = graph
                .server_version
                .as_ref()
                .map(|v| v.supports_relationship_property_indexes())
                .unwrap_or(false);
            if !supported {
                return Err(StoreError::Unsupported(format!("relationship property index {}", name)));
            }
        }
        graph.indexes.insert(index.name());
        Ok(())
    }

    fn server_version(&mut self) -> StoreResult<ServerVersion> {
        self.online()?
            .server_version
            .clone()
            .ok_or_else(|| StoreError::Unsupported("dbms.components".to_string()))
    }

    fn merge_nodes(&mut self, batch: &NodeBatch) -> StoreResult<Vec<String>> {
        let mut graph = self.online()?;
        let key_property = batch.label.key_property();
        let mut keys = Vec::with_capacity(batch.rows.len());

        for row in &batch.rows {
            let lookup = (batch.label, row.key.clone());
            let existing = graph.by_key.get(&lookup).copied();
            let idx = match existing {
                Some(idx) => idx,
                None => {
                    let mut properties = PropertyMap::new();
                    properties.insert(key_property.to_string(), Value::String(row.key.clone()));
                    let idx = graph.graph.add_node(StoredNode {
                        label: batch.label,
                        properties,
                    });
                    graph.by_key.insert(lookup, idx);
                    idx
                }
            };
            apply_properties(&mut graph.graph[idx].properties, &row.properties);
            keys.push(row.key.clone());
        }

        Ok(keys)
    }

    fn merge_edges(&mut self, batch: &EdgeBatch) -> StoreResult<usize> {
        let mut graph = self.online()?;
        let mut merged = 0;

        for row in &batch.rows {
            let sources = graph.nodes_by_fqn(&row.from_fqn);
            let targets = graph.nodes_by_fqn(&row.to_fqn);
            for &from in &sources {
                for &to in &targets {
                    let idx = graph.merge_edge(from, to, batch.label, &row.identity);
                    apply_properties(&mut graph.graph[idx].properties, &row.properties);
                    merged += 1;
                }
            }
        }

        Ok(merged)
    }

    fn link_containment(&mut self, identity: &DiagramIdentity) -> StoreResult<usize> {
        let mut graph = self.online()?;
        let diagram_id = Value::String(identity.diagram_id.clone());
        let spec_id = Value::String(identity.spec_id.clone());

        let blocks: Vec<NodeIndex> = graph
            .graph
            .node_indices()
            .filter(|&i| {
                let n = &graph.graph[i];
                n.label == NodeLabel::SchemaBlock && n.properties.get("diagramId") == Some(&diagram_id)
            })
            .collect();
        // Fields and sibling SchemaBlocks share the specId but are not members
        let members: Vec<NodeIndex> = graph
            .graph
            .node_indices()
            .filter(|&i| {
                let n = &graph.graph[i];
                matches!(n.label, NodeLabel::Entity | NodeLabel::RefType)
                    && n.properties.get("specId") == Some(&spec_id)
            })
            .collect();

        let empty = PropertyMap::new();
        let mut linked = 0;
        for &block in &blocks {
            for &member in &members {
                graph.merge_edge(block, member, EdgeLabel::ContainsEntity, &empty);
                linked += 1;
            }
        }
        Ok(linked)
    }
}
