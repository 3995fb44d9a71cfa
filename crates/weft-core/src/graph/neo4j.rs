//! Neo4j store over Bolt.

use async_trait::async_trait;
use neo4rs::{query, BoltType, ConfigBuilder, Graph, Query, Txn};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::GraphError;
use super::model::{
    is_identifier, BatchOutcome, EdgeWrite, Label, NodeRef, NodeWrite, Properties, Statement,
    KEY_PROPERTY,
};
use super::{Connector, GraphStore};
use crate::config::GraphConnection;

/// Opens [`Neo4jStore`]s for one endpoint.
#[derive(Debug, Clone)]
pub struct Neo4jConnector {
    connection: GraphConnection,
}

impl Neo4jConnector {
    pub fn new(connection: GraphConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl Connector for Neo4jConnector {
    fn endpoint(&self) -> String {
        self.connection.endpoint.clone()
    }

    async fn open(&self) -> Result<Arc<dyn GraphStore>, GraphError> {
        Ok(Arc::new(Neo4jStore::connect(&self.connection).await?))
    }
}

/// Graph store backed by a `neo4rs` connection pool.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Build the pool. `neo4rs` connects lazily, so reachability is only
    /// known after the first statement.
    pub async fn connect(connection: &GraphConnection) -> Result<Self, GraphError> {
        let config = ConfigBuilder::default()
            .uri(&connection.endpoint)
            .user(&connection.user)
            .password(&connection.password)
            .db(connection.database.as_str())
            .max_connections(connection.max_connections)
            .fetch_size(connection.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        Ok(Self { graph })
    }

    async fn run_in(txn: &mut Txn, nodes: &[NodeWrite], edges: &[EdgeWrite]) -> Result<(), neo4rs::Error> {
        // Same lock order in every batch for nodes several files merge.
        let mut ordered: Vec<&NodeWrite> = nodes.iter().collect();
        ordered.sort_by(|a, b| a.node.cmp(&b.node));
        for write in ordered {
            txn.run(node_query(&write.node, &write.properties)).await?;
        }
        for edge in edges {
            txn.run(edge_query(edge)).await?;
        }
        Ok(())
    }

    /// Run a delete statement that returns `count(n) AS deleted`.
    async fn deleted_count(&self, statement: Query) -> Result<u64, GraphError> {
        let mut rows = self.graph.execute(statement).await?;
        let deleted = match rows.next().await? {
            Some(row) => row
                .get::<i64>("deleted")
                .map_err(|e| GraphError::Query(format!("{:?}", e)))?,
            None => 0,
        };
        Ok(deleted.max(0) as u64)
    }
}

fn bolt_map(properties: &Properties) -> HashMap<String, BoltType> {
    properties
        .iter()
        .map(|(k, v)| (k.clone(), BoltType::from(v.clone())))
        .collect()
}

fn node_statement(node: &NodeRef) -> String {
    format!(
        "MERGE (n:{label} {{{key}: $key}}) SET n += $props",
        label = node.label,
        key = KEY_PROPERTY
    )
}

fn edge_statement(edge: &EdgeWrite) -> String {
    format!(
        "MATCH (a:{from} {{{key}: $from}}), (b:{to} {{{key}: $to}}) \
         MERGE (a)-[:{rel}]->(b) RETURN count(*) AS matched",
        from = edge.from.label,
        to = edge.to.label,
        rel = edge.relationship,
        key = KEY_PROPERTY
    )
}

fn unreferenced_statement(label: Label) -> String {
    format!("MATCH (n:{label}) WHERE NOT EXISTS {{ (n)--() }} DELETE n RETURN count(n) AS deleted")
}

fn node_query(node: &NodeRef, properties: &Properties) -> Query {
    query(&node_statement(node))
        .param("key", node.key.as_str())
        .param("props", bolt_map(properties))
}

fn edge_query(edge: &EdgeWrite) -> Query {
    query(&edge_statement(edge))
        .param("from", edge.from.key.as_str())
        .param("to", edge.to.key.as_str())
}

fn checked(name: &str) -> Result<&str, GraphError> {
    if is_identifier(name) {
        Ok(name)
    } else {
        Err(GraphError::InvalidIdentifier(name.to_string()))
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn execute(&self, statement: &Statement) -> Result<(), GraphError> {
        let mut q = query(&statement.text);
        for (key, value) in &statement.params {
            q = q.param(key, value.as_str());
        }
        self.graph.run(q).await?;
        Ok(())
    }

    async fn merge_node(&self, node: &NodeRef, properties: &Properties) -> Result<(), GraphError> {
        self.graph.run(node_query(node, properties)).await?;
        Ok(())
    }

    async fn merge_edge(&self, edge: &EdgeWrite) -> Result<bool, GraphError> {
        let mut rows = self.graph.execute(edge_query(edge)).await?;
        let matched = match rows.next().await? {
            Some(row) => row
                .get::<i64>("matched")
                .map_err(|e| GraphError::Query(format!("{:?}", e)))?,
            None => 0,
        };
        Ok(matched > 0)
    }

    async fn create_constraint(&self, label: Label, property: &str) -> Result<(), GraphError> {
        let property = checked(property)?;
        let name = format!("{}_{}_unique", label.as_str().to_lowercase(), property);
        let text = format!(
            "CREATE CONSTRAINT {name} IF NOT EXISTS FOR (n:{label}) REQUIRE n.{property} IS UNIQUE"
        );
        debug!(%label, property, "Declaring uniqueness constraint");
        self.graph.run(query(&text)).await?;
        Ok(())
    }

    async fn delete_tagged(&self, property: &str, value: &str) -> Result<u64, GraphError> {
        let property = checked(property)?;
        let text = format!(
            "MATCH (n) WHERE n.{property} = $value DETACH DELETE n RETURN count(n) AS deleted"
        );
        self.deleted_count(query(&text).param("value", value)).await
    }

    async fn delete_unreferenced(&self, label: Label) -> Result<u64, GraphError> {
        self.deleted_count(query(&unreferenced_statement(label))).await
    }

    async fn write_batch(
        &self,
        nodes: &[NodeWrite],
        edges: &[EdgeWrite],
    ) -> Result<BatchOutcome, GraphError> {
        let mut txn = self.graph.start_txn().await?;

        match Self::run_in(&mut txn, nodes, edges).await {
            Ok(()) => {
                txn.commit().await?;
                Ok(BatchOutcome {
                    nodes: nodes.len(),
                    edges: edges.len(),
                })
            }
            Err(e) => {
                warn!(error = %e, "Batch failed, rolling back");
                if let Err(rollback) = txn.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Relationship;

    #[test]
    fn test_checked_rejects_injection() {
        assert!(checked("project").is_ok());
        assert!(matches!(
            checked("project = '' OR true //"),
            Err(GraphError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_unreferenced_statement_only_touches_isolated_nodes() {
        assert_eq!(
            unreferenced_statement(Label::Collection),
            "MATCH (n:Collection) WHERE NOT EXISTS { (n)--() } DELETE n RETURN count(n) AS deleted"
        );
    }

    #[test]
    fn test_statement_shapes() {
        let edge = EdgeWrite::new(
            NodeRef::new(Label::Method, "P:Foo.Bar()"),
            Relationship::Calls,
            NodeRef::new(Label::Method, "P:Foo.Baz()"),
        );
        assert_eq!(
            edge_statement(&edge),
            "MATCH (a:Method {id: $from}), (b:Method {id: $to}) MERGE (a)-[:CALLS]->(b) RETURN count(*) AS matched"
        );
        assert_eq!(
            node_statement(&edge.from),
            "MERGE (n:Method {id: $key}) SET n += $props"
        );
    }
}
