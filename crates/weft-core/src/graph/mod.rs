//! Property-graph access.
//!
//! [`GraphClient`] is the facade every other component writes through. It
//! owns the connect retry loop and stamps palette colors onto nodes; the
//! statement-level work happens in a [`GraphStore`]:
//!
//! - [`Neo4jStore`] - Bolt connection pool via `neo4rs`
//! - [`MemoryStore`] - in-process graph for tests and dry runs
//!
//! All writes are idempotent merges. An edge whose endpoints do not both
//! exist is silently skipped and reported as `false`, never as an error.

mod error;
mod memory;
mod model;
mod neo4j;
mod palette;

pub use error::GraphError;
pub use memory::{GraphSnapshot, MemoryStore};
pub use model::{
    is_identifier, BatchOutcome, EdgeWrite, Label, NodeRef, NodeWrite, Properties, Relationship,
    Statement, KEY_PROPERTY, PROJECT_PROPERTY,
};
pub use neo4j::{Neo4jConnector, Neo4jStore};
pub use palette::{Palette, COLOR_PROPERTY};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::retry::{CancelToken, RetryPolicy};

/// Statement-level access to one graph database.
///
/// Implementations must be safe to share between concurrent file workers.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run a raw statement, discarding any rows.
    async fn execute(&self, statement: &Statement) -> Result<(), GraphError>;

    /// Create the node if absent, then merge `properties` into it.
    async fn merge_node(&self, node: &NodeRef, properties: &Properties) -> Result<(), GraphError>;

    /// Merge an edge. `Ok(false)` when either endpoint is missing.
    async fn merge_edge(&self, edge: &EdgeWrite) -> Result<bool, GraphError>;

    /// Declare `property` unique for `label`; repeated calls are no-ops.
    async fn create_constraint(&self, label: Label, property: &str) -> Result<(), GraphError>;

    /// Detach-delete every node whose `property` equals `value`.
    async fn delete_tagged(&self, property: &str, value: &str) -> Result<u64, GraphError>;

    /// Delete nodes of `label` that no edge touches.
    async fn delete_unreferenced(&self, label: Label) -> Result<u64, GraphError>;

    /// Apply one file's nodes then edges atomically.
    async fn write_batch(
        &self,
        nodes: &[NodeWrite],
        edges: &[EdgeWrite],
    ) -> Result<BatchOutcome, GraphError>;
}

/// Opens a store. Each call is a single attempt; retrying is the facade's job.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Where the store lives, for logs and errors.
    fn endpoint(&self) -> String;

    async fn open(&self) -> Result<Arc<dyn GraphStore>, GraphError>;
}

/// Facade over a connected graph store.
#[derive(Clone)]
pub struct GraphClient {
    store: Arc<dyn GraphStore>,
    palette: Arc<Palette>,
}

impl GraphClient {
    /// Wrap an already-open store.
    pub fn new(store: Arc<dyn GraphStore>, palette: Palette) -> Self {
        Self {
            store,
            palette: Arc::new(palette),
        }
    }

    /// Connect with bounded exponential backoff.
    ///
    /// The first attempt is immediate. An attempt only counts as connected
    /// once a liveness probe succeeds on the opened store.
    pub async fn connect(
        connector: &dyn Connector,
        policy: &RetryPolicy,
        palette: Palette,
        cancel: &CancelToken,
    ) -> Result<Self, GraphError> {
        let endpoint = connector.endpoint();
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=policy.max_attempts {
            if attempt > 1 {
                let delay = policy.delay_after(attempt - 1);
                info!(%endpoint, attempt, delay_ms = delay.as_millis() as u64, "Retrying graph store connection");
                if !cancel.sleep(delay).await {
                    return Err(GraphError::Cancelled);
                }
            }

            match Self::probe(connector).await {
                Ok(store) => {
                    info!(%endpoint, attempt, "Connected to graph store");
                    return Ok(Self::new(store, palette));
                }
                Err(e) => {
                    warn!(%endpoint, attempt, max_attempts = policy.max_attempts, error = %e, "Graph store not reachable");
                    last_error = e.to_string();
                }
            }
        }

        Err(GraphError::Connectivity {
            endpoint,
            attempts: policy.max_attempts,
            last_error,
        })
    }

    async fn probe(connector: &dyn Connector) -> Result<Arc<dyn GraphStore>, GraphError> {
        let store = connector.open().await?;
        store.execute(&Statement::liveness()).await?;
        Ok(store)
    }

    /// Create or merge a node. Never fails because the node already exists.
    pub async fn upsert_node(&self, node: &NodeRef, properties: Properties) -> Result<(), GraphError> {
        let properties = self.styled(node.label, properties);
        self.store.merge_node(node, &properties).await
    }

    /// Merge an edge; `Ok(false)` when an endpoint does not exist yet.
    pub async fn upsert_edge(
        &self,
        from: &NodeRef,
        to: &NodeRef,
        relationship: Relationship,
    ) -> Result<bool, GraphError> {
        let edge = EdgeWrite::new(from.clone(), relationship, to.clone());
        let written = self.store.merge_edge(&edge).await?;
        if !written {
            debug!(%edge, "Edge skipped, endpoint missing");
        }
        Ok(written)
    }

    pub async fn declare_uniqueness(&self, label: Label, property: &str) -> Result<(), GraphError> {
        self.store.create_constraint(label, property).await
    }

    /// Remove every node tagged `tag_property = tag_value`, with its edges.
    pub async fn delete_subgraph(&self, tag_property: &str, tag_value: &str) -> Result<u64, GraphError> {
        self.store.delete_tagged(tag_property, tag_value).await
    }

    /// Remove nodes of the given labels left without any edge.
    pub async fn prune_unreferenced(&self, labels: &[Label]) -> Result<u64, GraphError> {
        let mut removed = 0;
        for &label in labels {
            removed += self.store.delete_unreferenced(label).await?;
        }
        Ok(removed)
    }

    pub async fn execute(&self, statement: &Statement) -> Result<(), GraphError> {
        self.store.execute(statement).await
    }

    /// Apply one file's immediate facts atomically, nodes first.
    pub async fn apply(&self, nodes: &[NodeWrite], edges: &[EdgeWrite]) -> Result<BatchOutcome, GraphError> {
        let styled: Vec<NodeWrite> = nodes
            .iter()
            .map(|write| NodeWrite {
                node: write.node.clone(),
                properties: self.styled(write.node.label, write.properties.clone()),
            })
            .collect();
        self.store.write_batch(&styled, edges).await
    }

    /// Release the connection. Pending work must be finished first.
    pub async fn close(self) {
        // Dropping the last handle closes the pool.
        drop(self.store);
        info!("Graph store connection released");
    }

    fn styled(&self, label: Label, mut properties: Properties) -> Properties {
        self.palette.apply(label, &mut properties);
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakyConnector {
        store: MemoryStore,
        failures_left: AtomicU32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        fn endpoint(&self) -> String {
            "memory://flaky".to_string()
        }

        async fn open(&self) -> Result<Arc<dyn GraphStore>, GraphError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(GraphError::Connection("connection refused".to_string()));
            }
            Ok(Arc::new(self.store.clone()))
        }
    }

    fn flaky(failures: u32) -> FlakyConnector {
        FlakyConnector {
            store: MemoryStore::new(),
            failures_left: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        }
    }

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1), attempts)
    }

    #[tokio::test]
    async fn test_connect_after_transient_failures() {
        let connector = flaky(2);
        let client = GraphClient::connect(&connector, &quick(5), Palette::default(), &CancelToken::never()).await;
        assert!(client.is_ok());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(connector.store.executed(), vec!["RETURN 1".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_budget_exhausted() {
        let connector = flaky(10);
        let result = GraphClient::connect(&connector, &quick(3), Palette::default(), &CancelToken::never()).await;
        match result {
            Err(GraphError::Connectivity { attempts, last_error, .. }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("refused"));
            }
            other => panic!("expected connectivity error, got {:?}", other.err()),
        }
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connect_cancelled_while_waiting() {
        let connector = flaky(10);
        let (handle, token) = CancelToken::pair();
        handle.cancel();
        let policy = RetryPolicy::new(Duration::from_secs(3600), 3);
        let result = GraphClient::connect(&connector, &policy, Palette::default(), &token).await;
        assert!(matches!(result, Err(GraphError::Cancelled)));
    }

    #[tokio::test]
    async fn test_upsert_node_is_idempotent_and_colored() {
        let store = MemoryStore::new();
        let client = GraphClient::new(Arc::new(store.clone()), Palette::default());
        let node = NodeRef::new(Label::Class, "P:Foo");

        let mut props = Properties::new();
        props.insert("name".to_string(), "Foo".to_string());
        client.upsert_node(&node, props.clone()).await.unwrap();
        client.upsert_node(&node, props).await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[&node]["color"], "#4287f5");
    }

    #[tokio::test]
    async fn test_edge_to_missing_node_is_not_an_error() {
        let store = MemoryStore::new();
        let client = GraphClient::new(Arc::new(store.clone()), Palette::default());
        let a = NodeRef::new(Label::Method, "P:Foo.Bar()");
        let b = NodeRef::new(Label::Method, "P:Foo.Baz()");
        client.upsert_node(&a, Properties::new()).await.unwrap();

        assert!(!client.upsert_edge(&a, &b, Relationship::Calls).await.unwrap());
        client.upsert_node(&b, Properties::new()).await.unwrap();
        assert!(client.upsert_edge(&a, &b, Relationship::Calls).await.unwrap());
        assert!(client.upsert_edge(&a, &b, Relationship::Calls).await.unwrap());
        assert_eq!(store.snapshot().edges.len(), 1);
    }
}
