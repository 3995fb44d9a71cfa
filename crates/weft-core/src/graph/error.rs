//! Graph store error types.

use thiserror::Error;

/// Errors raised by the graph facade and its stores.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The store stayed unreachable for the whole retry budget.
    #[error("Graph store at {endpoint} unreachable after {attempts} attempt(s): {last_error}")]
    Connectivity {
        endpoint: String,
        attempts: u32,
        last_error: String,
    },

    /// Driver-level connection failure for a single attempt.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement was rejected or failed mid-flight.
    #[error("Query error: {0}")]
    Query(String),

    /// A label, property or constraint name that cannot be spliced safely.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The run was cancelled while waiting to retry.
    #[error("Cancelled while waiting for the graph store")]
    Cancelled,
}

impl GraphError {
    /// Whether retrying the same statement may succeed, as for a lost
    /// connection or a transaction aborted as a deadlock victim.
    pub fn is_transient(&self) -> bool {
        matches!(self, GraphError::Connection(_) | GraphError::Query(_))
    }
}

impl From<neo4rs::Error> for GraphError {
    fn from(err: neo4rs::Error) -> Self {
        GraphError::Query(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(GraphError::Query("DeadlockDetected".into()).is_transient());
        assert!(GraphError::Connection("reset".into()).is_transient());
        assert!(!GraphError::InvalidIdentifier("a b".into()).is_transient());
        assert!(!GraphError::Cancelled.is_transient());
    }
}
