use crate::model::Database;
use crate::util::{Result, SchemaError};
use glob::glob;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{merge_databases, parse_definition_file};

/// Load a definition from multiple sources (files, directories, glob patterns) and merge it
/// into one tree. A file matched by several sources is read once.
pub fn load_definition_sources(sources: &[String]) -> Result<Database> {
    if sources.is_empty() {
        return Err(SchemaError::ParseError(
            "No definition sources given".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    let mut db = Database::new();
    for source in sources {
        for path in resolve_source(source)? {
            if !seen.insert(path.clone()) {
                continue;
            }
            debug!(path = %path.display(), "loading definition");
            merge_databases(&mut db, parse_definition_file(&path)?)?;
        }
    }
    Ok(db)
}

/// Resolve a source pattern to a list of definition file paths.
/// Handles: single files, directories (recursive *.json), and glob patterns.
pub fn resolve_source(source: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(source);

    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if path.is_dir() {
        let pattern = path.join("**/*.json");
        return resolve_glob(pattern.to_str().unwrap_or(source));
    }

    resolve_glob(source)
}

fn resolve_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob(pattern)
        .map_err(|e| SchemaError::ParseError(format!("Invalid glob pattern: {e}")))?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| SchemaError::IoError(format!("Glob error: {e}")))?;
        if path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(SchemaError::ParseError(format!(
            "No definition files found matching pattern: {pattern}"
        )));
    }

    files.sort();
    Ok(files)
}
