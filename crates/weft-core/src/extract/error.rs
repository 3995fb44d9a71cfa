//! Extraction error types.

use thiserror::Error;

/// Errors that fail one file. They never abort a run.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file could not be read (or is not UTF-8).
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The grammar rejected the file.
    #[error("Syntax error in {path} at line {line}")]
    Syntax { path: String, line: u32 },

    /// The parser could not be set up or produced no tree.
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },
}

impl ExtractError {
    pub fn path(&self) -> &str {
        match self {
            ExtractError::Read { path, .. }
            | ExtractError::Syntax { path, .. }
            | ExtractError::Parse { path, .. } => path,
        }
    }
}
