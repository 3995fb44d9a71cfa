//! Source file discovery.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use tracing::debug;

use crate::config::{ConfigError, ENV_SOURCE_ROOT};

/// A discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    pub absolute: PathBuf,
    /// Relative to the scan root, `/`-separated.
    pub relative: String,
}

/// Every file under `root` that `accepts` claims, sorted by relative path.
///
/// Hidden entries are skipped, ignore files are honored and directories
/// named in `exclude_dirs` are pruned without being entered.
pub fn discover<F>(root: &Path, exclude_dirs: &[String], accepts: F) -> Result<Vec<SourcePath>, ConfigError>
where
    F: Fn(&Path) -> bool,
{
    if !root.is_dir() {
        return Err(ConfigError::Invalid {
            key: ENV_SOURCE_ROOT,
            message: format!("{} is not a directory", root.display()),
        });
    }

    let excluded: HashSet<String> = exclude_dirs.iter().cloned().collect();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && entry.depth() > 0 && excluded.contains(entry.file_name().to_string_lossy().as_ref()))
        })
        .build();

    let mut found = Vec::new();
    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !accepts(relative) {
            continue;
        }
        found.push(SourcePath {
            absolute: path.to_path_buf(),
            relative: slash_path(relative),
        });
    }
    found.sort_by(|a, b| a.relative.cmp(&b.relative));
    debug!(root = %root.display(), files = found.len(), "Discovered source files");
    Ok(found)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
