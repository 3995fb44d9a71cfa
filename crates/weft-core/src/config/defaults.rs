//! Default values for weft configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Graph Store Defaults
// ============================================================================

/// Logical database used when none is configured.
pub const DEFAULT_GRAPH_DATABASE: &str = "neo4j";

/// Connection pool size for the graph store.
pub const DEFAULT_MAX_CONNECTIONS: usize = 16;

/// Rows fetched per round trip when reading results back.
pub const DEFAULT_FETCH_SIZE: usize = 500;

// ============================================================================
// Project Defaults
// ============================================================================

/// Project tag used when `PROJECT_NAME` is not set.
pub const DEFAULT_PROJECT_NAME: &str = "UnknownRoot";

/// Prefix of the human-readable source link stamped on every node.
pub const DEFAULT_SOURCE_URL_BASE: &str = "http://localhost";

/// Directory scanned when no root is given (the container mount point).
pub const DEFAULT_SOURCE_ROOT: &str = "/app";

/// Directories pruned during discovery.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    // Version control
    ".git",
    ".svn",
    ".hg",
    // Dependencies
    "node_modules",
    "vendor",
    "venv",
    ".venv",
    "env",
    "__pycache__",
    ".pytest_cache",
    "site-packages",
    // Build outputs
    "target",
    "build",
    "dist",
    "out",
    "bin",
    "obj",
    // IDE/Editor
    ".idea",
    ".vscode",
    ".vs",
    // Other common excludes
    "coverage",
    ".gradle",
    ".mvn",
];

// ============================================================================
// Retry Defaults
// ============================================================================

/// Connection attempts before the run is abandoned.
pub const DEFAULT_CONNECT_MAX_ATTEMPTS: u32 = 8;

/// First connection backoff (5 seconds), doubled per attempt.
pub const DEFAULT_CONNECT_BASE_DELAY_MS: u64 = 5_000;

/// Deferred flush rounds before pending relationships are reported.
pub const DEFAULT_FLUSH_MAX_ROUNDS: u32 = 5;

/// First deferred flush backoff (1 second), doubled per round.
pub const DEFAULT_FLUSH_BASE_DELAY_MS: u64 = 1_000;

// ============================================================================
// Extraction Defaults
// ============================================================================

/// Store prefix for synthesized resource keys.
pub const DEFAULT_RESOURCE_STORE: &str = "mongo";

/// Database used when no literal database lookup is visible at a call site.
pub const DEFAULT_RESOURCE_DATABASE: &str = "UnknownDatabase";

// ============================================================================
// Palette Defaults
// ============================================================================

/// Node colors keyed by label.
pub const DEFAULT_PALETTE: &[(&str, &str)] = &[
    ("Root", "orange"),
    ("Namespace", "#4287f5"),
    ("Package", "#4287f5"),
    ("Module", "#4287f5"),
    ("Class", "#4287f5"),
    ("Struct", "#f54242"),
    ("Interface", "#f5a442"),
    ("Method", "#42f54e"),
    ("Function", "#42f54e"),
    ("ExternalService", "#f5f542"),
    ("Collection", "#8A2BE2"),
];
