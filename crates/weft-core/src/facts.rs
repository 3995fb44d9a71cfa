//! Facts emitted by extraction.
//!
//! A file's facts split three ways: nodes and edges that can be written
//! together in one atomic batch, and deferred facts whose target lives
//! outside the file (or does not exist yet at all) and are handed to the
//! deferred resolver instead.

use std::collections::HashSet;

use crate::graph::{EdgeWrite, Label, NodeRef, NodeWrite, Properties, Relationship};
use crate::identity::Identity;

/// What a deferred fact points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeferredTarget {
    /// A node some other file declares. It only has to exist.
    Declared(NodeRef),
    /// A resource that no source file declares; synthesized on flush.
    Resource {
        store: String,
        database: String,
        collection: String,
    },
}

impl DeferredTarget {
    /// The node this target resolves to, plus the properties to merge into it
    /// when it must be synthesized.
    pub fn materialize(&self) -> (NodeRef, Option<Properties>) {
        match self {
            DeferredTarget::Declared(node) => (node.clone(), None),
            DeferredTarget::Resource {
                store,
                database,
                collection,
            } => {
                let key = Identity::Resource {
                    store,
                    database,
                    collection,
                }
                .key();
                let mut props = Properties::new();
                props.insert("name".to_string(), collection.clone());
                props.insert("database".to_string(), database.clone());
                (NodeRef::new(Label::Collection, key), Some(props))
            }
        }
    }
}

/// A relationship buffered until its target can be guaranteed to exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeferredFact {
    pub source: NodeRef,
    pub relationship: Relationship,
    pub target: DeferredTarget,
}

/// A call or base type that could not be bound to a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub line: u32,
    pub detail: String,
}

/// Everything extracted from one file.
#[derive(Debug, Default)]
pub struct FileFacts {
    /// Path relative to the scan root.
    pub path: String,

    /// Node writes, applied before any edge of the batch.
    pub nodes: Vec<NodeWrite>,

    /// Edges between nodes of this batch (or the run's root).
    pub edges: Vec<EdgeWrite>,

    /// Relationships to nodes this file does not create.
    pub deferred: Vec<DeferredFact>,

    /// Calls and bases left unbound.
    pub unresolved: Vec<Unresolved>,

    local: HashSet<NodeRef>,
    anchors: HashSet<NodeRef>,
    links: Vec<EdgeWrite>,
}

impl FileFacts {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// A node known to exist before this file is written (the run's root).
    pub fn anchor(&mut self, node: NodeRef) {
        self.anchors.insert(node);
    }

    /// Add a node, merging properties if it was already added.
    pub fn add_node(&mut self, node: NodeRef, properties: Properties) {
        if self.local.insert(node.clone()) {
            self.nodes.push(NodeWrite { node, properties });
        } else if let Some(existing) = self.nodes.iter_mut().find(|w| w.node == node) {
            existing.properties.extend(properties);
        }
    }

    /// Request an edge. Whether it is written with the batch or deferred is
    /// decided by [`FileFacts::finish`], once every node is known.
    pub fn link(&mut self, from: NodeRef, relationship: Relationship, to: NodeRef) {
        self.links.push(EdgeWrite::new(from, relationship, to));
    }

    /// Buffer a relationship to a resource that has to be synthesized.
    pub fn defer_resource(&mut self, source: NodeRef, relationship: Relationship, target: DeferredTarget) {
        let fact = DeferredFact {
            source,
            relationship,
            target,
        };
        if !self.deferred.contains(&fact) {
            self.deferred.push(fact);
        }
    }

    pub fn unresolved(&mut self, line: u32, detail: impl Into<String>) {
        self.unresolved.push(Unresolved {
            line,
            detail: detail.into(),
        });
    }

    /// Route every requested link: immediate when both endpoints are created
    /// by this file (or anchored), deferred otherwise.
    pub fn finish(mut self) -> Self {
        let mut seen = HashSet::new();
        for edge in std::mem::take(&mut self.links) {
            if !seen.insert(edge.clone()) {
                continue;
            }
            if self.is_present(&edge.from) && self.is_present(&edge.to) {
                self.edges.push(edge);
            } else {
                self.deferred.push(DeferredFact {
                    source: edge.from,
                    relationship: edge.relationship,
                    target: DeferredTarget::Declared(edge.to),
                });
            }
        }
        self
    }

    fn is_present(&self, node: &NodeRef) -> bool {
        self.local.contains(node) || self.anchors.contains(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(key: &str) -> NodeRef {
        NodeRef::new(Label::Method, key)
    }

    #[test]
    fn test_routing() {
        let mut facts = FileFacts::new("a.cs");
        let root = NodeRef::new(Label::Root, "root:P");
        let ns = NodeRef::new(Label::Namespace, "P:app");
        facts.anchor(root.clone());
        facts.add_node(ns.clone(), Properties::new());
        facts.add_node(method("P:app.T.a()"), Properties::new());

        facts.link(root, Relationship::Contains, ns);
        facts.link(method("P:app.T.a()"), Relationship::Calls, method("P:app.U.b()"));
        let facts = facts.finish();

        assert_eq!(facts.edges.len(), 1);
        assert_eq!(facts.deferred.len(), 1);
        assert_eq!(
            facts.deferred[0].target,
            DeferredTarget::Declared(method("P:app.U.b()"))
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let mut facts = FileFacts::new("a.cs");
        facts.add_node(method("k"), Properties::new());
        let mut props = Properties::new();
        props.insert("name".to_string(), "a".to_string());
        facts.add_node(method("k"), props);
        facts.link(method("k"), Relationship::Calls, method("k"));
        facts.link(method("k"), Relationship::Calls, method("k"));
        let facts = facts.finish();

        assert_eq!(facts.nodes.len(), 1);
        assert_eq!(facts.nodes[0].properties["name"], "a");
        assert_eq!(facts.edges.len(), 1);
    }

    #[test]
    fn test_resource_materializes_collection() {
        let target = DeferredTarget::Resource {
            store: "mongo".to_string(),
            database: "FanApp".to_string(),
            collection: "users".to_string(),
        };
        let (node, props) = target.materialize();
        assert_eq!(node, NodeRef::new(Label::Collection, "mongo:FanApp.users"));
        assert_eq!(props.unwrap()["database"], "FanApp");
    }
}
