//! Labels, relationship types and write records shared by every store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Node properties. Every value the engine writes is textual.
pub type Properties = BTreeMap<String, String>;

/// Property holding a node's canonical key.
pub const KEY_PROPERTY: &str = "id";

/// Property carrying the project tag used for the per-run wipe.
pub const PROJECT_PROPERTY: &str = "project";

/// Node label. One label per entity kind; languages pick the namespace and
/// type labels that match their own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Label {
    Root,
    Namespace,
    Package,
    Module,
    Class,
    Interface,
    Struct,
    Method,
    Function,
    ExternalService,
    Collection,
}

impl Label {
    /// Labels whose nodes merge across projects and carry no project tag.
    pub const SHARED: [Label; 2] = [Label::ExternalService, Label::Collection];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Root => "Root",
            Label::Namespace => "Namespace",
            Label::Package => "Package",
            Label::Module => "Module",
            Label::Class => "Class",
            Label::Interface => "Interface",
            Label::Struct => "Struct",
            Label::Method => "Method",
            Label::Function => "Function",
            Label::ExternalService => "ExternalService",
            Label::Collection => "Collection",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Relationship {
    /// Root to namespace.
    Contains,
    /// Namespace to type or function, type to method.
    Declares,
    InheritsFrom,
    Implements,
    /// Callable to callable.
    Calls,
    /// Callable to external service.
    CallsService,
    /// Callable to resource.
    Queries,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Contains => "CONTAINS",
            Relationship::Declares => "DECLARES",
            Relationship::InheritsFrom => "INHERITS_FROM",
            Relationship::Implements => "IMPLEMENTS",
            Relationship::Calls => "CALLS",
            Relationship::CallsService => "CALLS_SERVICE",
            Relationship::Queries => "QUERIES",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node addressed by label and canonical key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: Label,
    pub key: String,
}

impl NodeRef {
    pub fn new(label: Label, key: impl Into<String>) -> Self {
        Self {
            label,
            key: key.into(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.label, self.key)
    }
}

/// Create-or-merge of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeWrite {
    pub node: NodeRef,
    pub properties: Properties,
}

impl NodeWrite {
    pub fn new(node: NodeRef) -> Self {
        Self {
            node,
            properties: Properties::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// Merge of one directed edge between existing nodes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeWrite {
    pub from: NodeRef,
    pub relationship: Relationship,
    pub to: NodeRef,
}

impl EdgeWrite {
    pub fn new(from: NodeRef, relationship: Relationship, to: NodeRef) -> Self {
        Self {
            from,
            relationship,
            to,
        }
    }
}

impl fmt::Display for EdgeWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-[:{}]->{}", self.from, self.relationship, self.to)
    }
}

/// A raw parameterized statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    pub params: Properties,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Properties::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// The trivial statement used to probe liveness.
    pub fn liveness() -> Self {
        Self::new("RETURN 1")
    }
}

/// What one atomic batch wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub nodes: usize,
    pub edges: usize,
}

/// Whether a name is safe to splice into a statement as a label, property or
/// constraint name.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_names() {
        assert_eq!(Relationship::InheritsFrom.as_str(), "INHERITS_FROM");
        assert_eq!(Relationship::CallsService.to_string(), "CALLS_SERVICE");
    }

    #[test]
    fn test_identifier_check() {
        assert!(is_identifier("project"));
        assert!(is_identifier("_id2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2id"));
        assert!(!is_identifier("id}) DETACH DELETE n //"));
    }
}
