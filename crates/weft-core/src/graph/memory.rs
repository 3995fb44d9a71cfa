//! In-process graph store used by tests and `--dry-run`.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::GraphError;
use super::model::{BatchOutcome, EdgeWrite, Label, NodeRef, NodeWrite, Properties, Relationship, Statement};
use super::{Connector, GraphStore};

/// Point-in-time copy of a [`MemoryStore`]. Ordered, so two snapshots of the
/// same graph compare equal regardless of write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub nodes: BTreeMap<NodeRef, Properties>,
    pub edges: BTreeSet<EdgeWrite>,
    pub constraints: BTreeSet<(Label, String)>,
}

impl GraphSnapshot {
    /// Find a node by key alone.
    pub fn node(&self, key: &str) -> Option<(&NodeRef, &Properties)> {
        self.nodes.iter().find(|(node, _)| node.key == key)
    }

    /// Whether an edge exists, addressed by endpoint keys.
    pub fn has_edge(&self, from: &str, relationship: Relationship, to: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.from.key == from && e.relationship == relationship && e.to.key == to)
    }

    pub fn edges_of(&self, relationship: Relationship) -> Vec<&EdgeWrite> {
        self.edges.iter().filter(|e| e.relationship == relationship).collect()
    }
}

#[derive(Debug, Default)]
struct MemoryGraph {
    snapshot: GraphSnapshot,
    executed: Vec<String>,
}

impl MemoryGraph {
    fn merge_node(&mut self, node: &NodeRef, properties: &Properties) {
        self.snapshot
            .nodes
            .entry(node.clone())
            .or_default()
            .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    fn merge_edge(&mut self, edge: &EdgeWrite) -> bool {
        let nodes = &self.snapshot.nodes;
        if !nodes.contains_key(&edge.from) || !nodes.contains_key(&edge.to) {
            return false;
        }
        self.snapshot.edges.insert(edge.clone());
        true
    }
}

/// Shared, cloneable in-memory graph. Clones observe the same graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryGraph>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.lock().snapshot.clone()
    }

    /// Raw statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryGraph> {
        // A panicking test thread must not hide the graph from the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn execute(&self, statement: &Statement) -> Result<(), GraphError> {
        self.lock().executed.push(statement.text.clone());
        Ok(())
    }

    async fn merge_node(&self, node: &NodeRef, properties: &Properties) -> Result<(), GraphError> {
        self.lock().merge_node(node, properties);
        Ok(())
    }

    async fn merge_edge(&self, edge: &EdgeWrite) -> Result<bool, GraphError> {
        Ok(self.lock().merge_edge(edge))
    }

    async fn create_constraint(&self, label: Label, property: &str) -> Result<(), GraphError> {
        self.lock()
            .snapshot
            .constraints
            .insert((label, property.to_string()));
        Ok(())
    }

    async fn delete_tagged(&self, property: &str, value: &str) -> Result<u64, GraphError> {
        let mut graph = self.lock();
        let doomed: BTreeSet<NodeRef> = graph
            .snapshot
            .nodes
            .iter()
            .filter(|(_, props)| props.get(property).map(String::as_str) == Some(value))
            .map(|(node, _)| node.clone())
            .collect();

        graph.snapshot.nodes.retain(|node, _| !doomed.contains(node));
        graph
            .snapshot
            .edges
            .retain(|e| !doomed.contains(&e.from) && !doomed.contains(&e.to));
        Ok(doomed.len() as u64)
    }

    async fn delete_unreferenced(&self, label: Label) -> Result<u64, GraphError> {
        let mut graph = self.lock();
        let MemoryGraph { snapshot, .. } = &mut *graph;
        let before = snapshot.nodes.len();
        let edges = &snapshot.edges;
        snapshot
            .nodes
            .retain(|node, _| node.label != label || edges.iter().any(|e| &e.from == node || &e.to == node));
        Ok((before - snapshot.nodes.len()) as u64)
    }

    async fn write_batch(
        &self,
        nodes: &[NodeWrite],
        edges: &[EdgeWrite],
    ) -> Result<BatchOutcome, GraphError> {
        let mut graph = self.lock();
        for write in nodes {
            graph.merge_node(&write.node, &write.properties);
        }
        let written = edges.iter().filter(|edge| graph.merge_edge(edge)).count();
        Ok(BatchOutcome {
            nodes: nodes.len(),
            edges: written,
        })
    }
}

#[async_trait]
impl Connector for MemoryStore {
    fn endpoint(&self) -> String {
        "memory://".to_string()
    }

    async fn open(&self) -> Result<Arc<dyn GraphStore>, GraphError> {
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(key: &str, project: &str) -> NodeWrite {
        NodeWrite::new(NodeRef::new(Label::Class, key)).with("project", project)
    }

    #[tokio::test]
    async fn test_delete_tagged_keeps_other_projects_and_shared_nodes() {
        let store = MemoryStore::new();
        let service = NodeWrite::new(NodeRef::new(Label::ExternalService, "service:http://x"));
        let edge = EdgeWrite::new(
            NodeRef::new(Label::Class, "A:Foo"),
            Relationship::CallsService,
            service.node.clone(),
        );
        store
            .write_batch(&[tagged("A:Foo", "A"), tagged("B:Foo", "B"), service], &[edge])
            .await
            .unwrap();

        let removed = store.delete_tagged("project", "A").await.unwrap();
        assert_eq!(removed, 1);

        let snapshot = store.snapshot();
        assert!(snapshot.node("A:Foo").is_none());
        assert!(snapshot.node("B:Foo").is_some());
        assert!(snapshot.node("service:http://x").is_some());
        assert!(snapshot.edges.is_empty());
    }

    #[tokio::test]
    async fn test_delete_unreferenced_spares_linked_nodes() {
        let store = MemoryStore::new();
        let used = NodeWrite::new(NodeRef::new(Label::ExternalService, "service:http://used"));
        let stale = NodeWrite::new(NodeRef::new(Label::ExternalService, "service:http://stale"));
        let lonely_class = NodeWrite::new(NodeRef::new(Label::Class, "B:Bar"));
        let edge = EdgeWrite::new(
            NodeRef::new(Label::Class, "A:Foo"),
            Relationship::CallsService,
            used.node.clone(),
        );
        store
            .write_batch(&[tagged("A:Foo", "A"), used, stale, lonely_class], &[edge])
            .await
            .unwrap();

        assert_eq!(store.delete_unreferenced(Label::ExternalService).await.unwrap(), 1);
        assert_eq!(store.delete_unreferenced(Label::ExternalService).await.unwrap(), 0);

        let snapshot = store.snapshot();
        assert!(snapshot.node("service:http://used").is_some());
        assert!(snapshot.node("service:http://stale").is_none());
        assert!(snapshot.node("B:Bar").is_some());
    }

    #[tokio::test]
    async fn test_batch_writes_nodes_before_edges() {
        let store = MemoryStore::new();
        let a = NodeWrite::new(NodeRef::new(Label::Method, "P:T.a()"));
        let b = NodeWrite::new(NodeRef::new(Label::Method, "P:T.b()"));
        let edge = EdgeWrite::new(a.node.clone(), Relationship::Calls, b.node.clone());

        // The edge is listed with the batch; node order inside it does not matter.
        let outcome = store.write_batch(&[b, a], &[edge]).await.unwrap();
        assert_eq!(outcome, BatchOutcome { nodes: 2, edges: 1 });
    }

    #[tokio::test]
    async fn test_constraints_are_idempotent() {
        let store = MemoryStore::new();
        store.create_constraint(Label::Class, "id").await.unwrap();
        store.create_constraint(Label::Class, "id").await.unwrap();
        assert_eq!(store.snapshot().constraints.len(), 1);
    }
}
