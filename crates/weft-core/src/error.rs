//! Run-level error taxonomy.

use thiserror::Error;

use crate::config::ConfigError;
use crate::extract::ExtractError;
use crate::graph::GraphError;

/// Everything that can go wrong during an ingestion run.
///
/// Only [`IngestError::Configuration`] and [`IngestError::Connectivity`]
/// abort a run. The other classes are contained: they are logged and
/// counted in the run report while the run carries on.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing or malformed settings. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The graph store could not be reached, or failed a run-wide statement.
    #[error("Connectivity error: {0}")]
    Connectivity(#[from] GraphError),

    /// One file could not be read or parsed; only that file is skipped.
    #[error("Parse error: {0}")]
    Parse(#[from] ExtractError),

    /// A call could not be bound to a declaration.
    #[error("Unresolved call in {path} at line {line}: {detail}")]
    Resolution { path: String, line: u32, detail: String },

    /// Deferred relationships still unwritten after the flush budget.
    #[error("{pending} of {received} deferred relationship(s) could not be written")]
    DeferredWrite { pending: usize, received: usize },
}

/// Error class, as reported and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Connectivity,
    Parse,
    Resolution,
    DeferredWrite,
}

impl IngestError {
    pub fn class(&self) -> ErrorClass {
        match self {
            IngestError::Configuration(_) => ErrorClass::Configuration,
            IngestError::Connectivity(_) => ErrorClass::Connectivity,
            IngestError::Parse(_) => ErrorClass::Parse,
            IngestError::Resolution { .. } => ErrorClass::Resolution,
            IngestError::DeferredWrite { .. } => ErrorClass::DeferredWrite,
        }
    }

    /// Whether this error ends the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Configuration | ErrorClass::Connectivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_and_connectivity_are_fatal() {
        let missing = IngestError::from(ConfigError::Missing("GRAPH_ENDPOINT"));
        assert!(missing.is_fatal());
        assert!(missing.to_string().contains("GRAPH_ENDPOINT"));

        let unreachable = IngestError::from(GraphError::Connectivity {
            endpoint: "bolt://db:7687".into(),
            attempts: 8,
            last_error: "refused".into(),
        });
        assert!(unreachable.is_fatal());

        let parse = IngestError::from(ExtractError::Syntax {
            path: "a.py".into(),
            line: 3,
        });
        assert_eq!(parse.class(), ErrorClass::Parse);
        assert!(!parse.is_fatal());

        let deferred = IngestError::DeferredWrite { pending: 2, received: 10 };
        assert!(!deferred.is_fatal());
        assert_eq!(deferred.to_string(), "2 of 10 deferred relationship(s) could not be written");
    }
}
