//! Reading Schema Trees from their JSON form.
//!
//! A definition may be split across files. Files are merged in the order they are loaded:
//! schemas with the same name are combined object by object, database-level custom SQL is
//! concatenated.

mod loader;

use std::path::Path;

use crate::model::{Database, Schema};
use crate::util::{Result, SchemaError};

pub use loader::{load_definition_sources, resolve_source};

pub fn parse_definition_str(json: &str) -> Result<Database> {
    serde_json::from_str(json).map_err(|e| {
        SchemaError::ParseError(format!("line {} column {}: {e}", e.line(), e.column()))
    })
}

pub fn parse_definition_file(path: &Path) -> Result<Database> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SchemaError::IoError(format!("Failed to read {}: {e}", path.display())))?;
    parse_definition_str(&content)
        .map_err(|e| SchemaError::ParseError(format!("{}: {e}", path.display())))
}

/// Fold `other` into `target`. Duplicate object names are left for validation to report.
pub fn merge_databases(target: &mut Database, other: Database) -> Result<()> {
    for schema in other.schemas {
        match target.schemas.iter_mut().find(|s| s.name == schema.name) {
            Some(existing) => merge_schema(existing, schema)?,
            None => target.schemas.push(schema),
        }
    }
    target.sql.extend(other.sql);
    Ok(())
}

fn merge_schema(target: &mut Schema, other: Schema) -> Result<()> {
    merge_attribute(&target.name, "owner", &mut target.owner, other.owner)?;
    merge_attribute(
        &target.name,
        "description",
        &mut target.description,
        other.description,
    )?;
    target.grants.extend(other.grants);
    target.tables.extend(other.tables);
    target.sequences.extend(other.sequences);
    target.types.extend(other.types);
    target.views.extend(other.views);
    target.functions.extend(other.functions);
    target.triggers.extend(other.triggers);
    Ok(())
}

fn merge_attribute(
    schema: &str,
    attribute: &str,
    target: &mut Option<String>,
    other: Option<String>,
) -> Result<()> {
    match (target.as_deref(), other) {
        (_, None) => Ok(()),
        (None, Some(value)) => {
            *target = Some(value);
            Ok(())
        }
        (Some(current), Some(value)) if current == value => Ok(()),
        (Some(current), Some(value)) => Err(SchemaError::definition(
            schema,
            format!("conflicting {attribute}: {current} and {value}"),
        )),
    }
}
