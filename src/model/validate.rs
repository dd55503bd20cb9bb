//! Construction-time validation of a schema tree.
//!
//! Everything checked here would otherwise surface halfway through a diff; a tree that passes
//! can be walked by the differ without re-checking references at every use site.

use std::collections::HashSet;

use super::resolve::{constraint_target, find_column, resolve_column_type};
use super::{Database, Schema, Table};
use crate::util::{Result, SchemaError};

pub fn validate_database(db: &Database) -> Result<()> {
    let mut schema_names = HashSet::new();
    for schema in &db.schemas {
        if schema.name.trim().is_empty() {
            return Err(SchemaError::definition("<schema>", "schema name is required"));
        }
        if !schema_names.insert(schema.name.as_str()) {
            return Err(SchemaError::definition(&schema.name, "duplicate schema name"));
        }
        validate_schema(db, schema)?;
    }
    Ok(())
}

fn validate_schema(db: &Database, schema: &Schema) -> Result<()> {
    let s = &schema.name;

    unique_names(s, "table", schema.tables.iter().map(|t| t.name.as_str()))?;
    unique_names(s, "sequence", schema.sequences.iter().map(|q| q.name.as_str()))?;
    unique_names(s, "type", schema.types.iter().map(|t| t.name.as_str()))?;
    unique_names(s, "view", schema.views.iter().map(|v| v.name.as_str()))?;

    let mut signatures = HashSet::new();
    for func in &schema.functions {
        if !signatures.insert(func.signature()) {
            return Err(SchemaError::definition(
                format!("{s}.{}", func.signature()),
                "ambiguous function overload: signature declared more than once",
            ));
        }
    }

    let mut trigger_names = HashSet::new();
    for trigger in &schema.triggers {
        if schema.table(&trigger.table).is_none() {
            return Err(SchemaError::definition(
                format!("{s}.{}", trigger.name),
                format!("trigger table {s}.{} does not exist", trigger.table),
            ));
        }
        if trigger.events.is_empty() {
            return Err(SchemaError::definition(
                format!("{s}.{}.{}", trigger.table, trigger.name),
                "trigger declares no events",
            ));
        }
        if !trigger_names.insert((trigger.table.as_str(), trigger.name.as_str())) {
            return Err(SchemaError::definition(
                format!("{s}.{}.{}", trigger.table, trigger.name),
                "duplicate trigger name",
            ));
        }
    }

    for table in &schema.tables {
        validate_table(db, schema, table)?;
    }
    Ok(())
}

fn unique_names<'a>(
    schema: &str,
    kind: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(SchemaError::definition(
                schema,
                format!("{kind} name is required"),
            ));
        }
        if !seen.insert(name) {
            return Err(SchemaError::definition(
                format!("{schema}.{name}"),
                format!("duplicate {kind} name"),
            ));
        }
    }
    Ok(())
}

fn validate_table(db: &Database, schema: &Schema, table: &Table) -> Result<()> {
    let qualified = format!("{}.{}", schema.name, table.name);

    if let Some(ref parent) = table.inherits {
        let parent_schema = parent.schema_or(&schema.name);
        if db.table(parent_schema, &parent.table).is_none() {
            return Err(SchemaError::definition(
                &qualified,
                format!("inherited table {parent_schema}.{} does not exist", parent.table),
            ));
        }
    }

    let mut column_names = HashSet::new();
    for column in &table.columns {
        let object = format!("{qualified}.{}", column.name);
        if column.name.trim().is_empty() {
            return Err(SchemaError::definition(&qualified, "column name is required"));
        }
        if !column_names.insert(column.name.as_str()) {
            return Err(SchemaError::definition(&object, "duplicate column name"));
        }
        match (&column.data_type, &column.foreign_key) {
            (Some(_), Some(_)) => {
                return Err(SchemaError::definition(
                    &object,
                    "a foreign-keyed column must not also declare a type",
                ));
            }
            (None, None) => {
                return Err(SchemaError::definition(
                    &object,
                    "column requires either a type or a foreign key",
                ));
            }
            (Some(t), None) if t.trim().is_empty() => {
                return Err(SchemaError::definition(&object, "column type is empty"));
            }
            _ => {}
        }
        resolve_column_type(db, &schema.name, &table.name, &column.name)?;
    }

    for pk in &table.primary_key {
        if find_column(db, &schema.name, &table.name, pk).is_none() {
            return Err(SchemaError::definition(
                &qualified,
                format!("primary key column {pk} does not exist locally or via inheritance"),
            ));
        }
    }

    for decl in &table.constraints {
        if let Some(target) = constraint_target(decl) {
            let target_schema = target.schema_or(&schema.name);
            if db.table(target_schema, &target.table).is_none() {
                return Err(SchemaError::definition(
                    format!("{qualified}.{}", decl.name),
                    format!(
                        "foreign key target {target_schema}.{} does not exist",
                        target.table
                    ),
                ));
            }
        }
    }

    let mut index_names = HashSet::new();
    for index in &table.indexes {
        if !index_names.insert(index.name.as_str()) {
            return Err(SchemaError::definition(
                format!("{qualified}.{}", index.name),
                "duplicate index name",
            ));
        }
        if index.dimensions.is_empty() {
            return Err(SchemaError::definition(
                format!("{qualified}.{}", index.name),
                "index declares no dimensions",
            ));
        }
    }

    if let Some(ref cluster) = table.cluster_index {
        if table.index(cluster).is_none() {
            return Err(SchemaError::definition(
                &qualified,
                format!("cluster index {cluster} is not an index of this table"),
            ));
        }
    }

    if let Some(ref rows) = table.rows {
        validate_rows(db, schema, table, rows)?;
    }
    Ok(())
}

fn validate_rows(db: &Database, schema: &Schema, table: &Table, rows: &super::Rows) -> Result<()> {
    let qualified = format!("{}.{}", schema.name, table.name);

    if table.primary_key.is_empty() {
        return Err(SchemaError::definition(
            &qualified,
            "static rows require a primary key",
        ));
    }
    for column in &rows.columns {
        if find_column(db, &schema.name, &table.name, column).is_none() {
            return Err(SchemaError::definition(
                format!("{qualified}.{column}"),
                "rows reference a column the table does not have",
            ));
        }
    }

    let mut pk_positions = Vec::new();
    for pk in &table.primary_key {
        let position = rows.columns.iter().position(|c| c == pk).ok_or_else(|| {
            SchemaError::definition(
                &qualified,
                format!("rows do not declare primary key column {pk}"),
            )
        })?;
        pk_positions.push(position);
    }

    let mut identities = HashSet::new();
    for (n, row) in rows.rows.iter().enumerate() {
        if row.cells.len() > rows.columns.len() {
            return Err(SchemaError::definition(
                &qualified,
                format!(
                    "row {n} has {} cells but only {} columns are declared",
                    row.cells.len(),
                    rows.columns.len()
                ),
            ));
        }
        let mut identity = Vec::with_capacity(pk_positions.len());
        for &position in &pk_positions {
            let cell = row.cell(position).ok_or_else(|| {
                SchemaError::definition(
                    &qualified,
                    format!("row {n} has no value for primary key column {}", rows.columns[position]),
                )
            })?;
            identity.push(cell.identity());
        }
        if !identities.insert(identity.clone()) {
            return Err(SchemaError::definition(
                &qualified,
                format!("duplicate primary key ({}) in rows", identity.join(", ")),
            ));
        }
    }
    Ok(())
}
