//! Lookups that follow references through the tree: inherited columns and foreign-key types.

use std::collections::HashSet;

use regex::Regex;
use std::sync::OnceLock;

use super::{Column, ConstraintDecl, ConstraintKind, Database, Schema, Table, TableRef};
use crate::util::{serial_storage_type, Result, SchemaError};

/// Find a column on a table or, failing that, on its inheritance ancestors.
pub fn find_column<'a>(
    db: &'a Database,
    schema: &str,
    table: &str,
    column: &str,
) -> Option<(&'a Schema, &'a Table, &'a Column)> {
    let mut visited: HashSet<(String, String)> = HashSet::new();
    let mut current = (schema.to_string(), table.to_string());

    loop {
        if !visited.insert(current.clone()) {
            return None;
        }
        let (s, t) = db.table(&current.0, &current.1)?;
        if let Some(c) = t.column(column) {
            return Some((s, t, c));
        }
        let parent = t.inherits.as_ref()?;
        current = (
            parent.schema_or(&s.name).to_string(),
            parent.table.clone(),
        );
    }
}

/// Effective type of a column. Foreign-keyed columns take the type of the column they
/// reference, transitively; auto-incrementing targets resolve to their storage type.
pub fn resolve_column_type(
    db: &Database,
    schema: &str,
    table: &str,
    column: &str,
) -> Result<String> {
    let mut visited: HashSet<(String, String, String)> = HashSet::new();
    let mut current = (schema.to_string(), table.to_string(), column.to_string());
    let mut hops = 0usize;

    loop {
        let object = format!("{}.{}.{}", current.0, current.1, current.2);
        if !visited.insert(current.clone()) {
            return Err(SchemaError::definition(
                format!("{schema}.{table}.{column}"),
                format!("circular foreign-key type reference through {object}"),
            ));
        }

        let (s, _, col) = find_column(db, &current.0, &current.1, &current.2).ok_or_else(|| {
            SchemaError::definition(
                format!("{schema}.{table}.{column}"),
                format!("foreign key target {object} does not exist"),
            )
        })?;

        if let Some(ref data_type) = col.data_type {
            return Ok(if hops == 0 {
                data_type.clone()
            } else {
                serial_storage_type(data_type)
            });
        }

        let fk = col.foreign_key.as_ref().ok_or_else(|| {
            SchemaError::definition(&object, "column has neither a type nor a foreign key")
        })?;
        current = (
            fk.schema.clone().unwrap_or_else(|| s.name.clone()),
            fk.table.clone(),
            fk.column.clone().unwrap_or_else(|| col.name.clone()),
        );
        hops += 1;
    }
}

/// Declared default of a column, chasing inheritance.
pub fn column_default<'a>(
    db: &'a Database,
    schema: &str,
    table: &str,
    column: &str,
) -> Option<&'a str> {
    find_column(db, schema, table, column).and_then(|(_, _, c)| c.default.as_deref())
}

/// All columns visible on a table, ancestors first.
pub fn all_columns<'a>(db: &'a Database, schema: &str, table: &str) -> Vec<&'a Column> {
    let mut chain = Vec::new();
    let mut visited: HashSet<(String, String)> = HashSet::new();
    let mut current = Some((schema.to_string(), table.to_string()));

    while let Some((s_name, t_name)) = current.take() {
        if !visited.insert((s_name.clone(), t_name.clone())) {
            break;
        }
        let Some((s, t)) = db.table(&s_name, &t_name) else {
            break;
        };
        chain.push(t);
        current = t
            .inherits
            .as_ref()
            .map(|p| (p.schema_or(&s.name).to_string(), p.table.clone()));
    }

    let mut columns: Vec<&Column> = Vec::new();
    for t in chain.into_iter().rev() {
        for c in &t.columns {
            if !columns.iter().any(|existing| existing.name == c.name) {
                columns.push(c);
            }
        }
    }
    columns
}

/// Table targeted by an explicit foreign key declaration: the `references` attribute, or
/// the `REFERENCES schema.table` clause of its definition text.
pub fn constraint_target(decl: &ConstraintDecl) -> Option<TableRef> {
    if decl.kind != ConstraintKind::ForeignKey {
        return None;
    }
    if let Some(ref target) = decl.references {
        return Some(target.clone());
    }

    static REFERENCES: OnceLock<Regex> = OnceLock::new();
    let re = REFERENCES.get_or_init(|| {
        Regex::new(r#"(?i)\bREFERENCES\s+("[^"]+"|[A-Za-z_][A-Za-z0-9_$]*)(?:\s*\.\s*("[^"]+"|[A-Za-z_][A-Za-z0-9_$]*))?"#)
            .expect("static regex")
    });
    let caps = re.captures(&decl.definition)?;
    let unquote = |s: &str| s.trim_matches('"').to_string();
    let first = unquote(caps.get(1)?.as_str());
    Some(match caps.get(2) {
        Some(second) => TableRef {
            schema: Some(first),
            table: unquote(second.as_str()),
        },
        None => TableRef {
            schema: None,
            table: first,
        },
    })
}
