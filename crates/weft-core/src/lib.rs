pub mod config;
pub mod deferred;
pub mod error;
pub mod extract;
pub mod facts;
pub mod graph;
pub mod identity;
pub mod retry;
pub mod run;

pub use config::{Config, ConfigError};
pub use deferred::{DeferredResolver, FlushReport};
pub use error::{ErrorClass, IngestError};
pub use extract::{Extractor, ExtractorRegistry, Language};
pub use graph::{GraphClient, GraphStore, MemoryStore, Neo4jConnector};
pub use identity::Identity;
pub use retry::{CancelHandle, CancelToken, RetryPolicy};
pub use run::{RunCoordinator, RunObserver, RunPhase, RunReport};
