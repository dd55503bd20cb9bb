//! Static data reconciliation.
//!
//! Rows are matched across versions by the values of their primary-key columns alone; the
//! two sides may declare different column lists. Deletes run first, in reverse dependency
//! order, then inserts and updates in forward order. Everything lands in stage 2.

use std::collections::HashMap;

use super::planner::StagedOps;
use super::tables::column_counterpart;
use super::{DiffContext, MigrationOp, SerialValue};
use crate::model::resolve::{column_default, resolve_column_type};
use crate::model::{qualified_name, Cell, Database, Row, Rows, Schema, Table};
use crate::util::{is_serial_type, Result, SchemaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowPass {
    /// Insert rows missing from the old side and update rows whose values changed.
    Upsert,
    /// Delete old rows absent from the new side and rows flagged for deletion.
    Delete,
}

/// One side of a comparison: a table's rows with its primary-key positions resolved.
struct RowSet<'a> {
    db: &'a Database,
    schema: &'a Schema,
    table: &'a Table,
    rows: &'a Rows,
    key_positions: Vec<usize>,
}

impl<'a> RowSet<'a> {
    fn new(db: &'a Database, schema: &'a Schema, table: &'a Table) -> Result<Option<Self>> {
        let Some(ref rows) = table.rows else {
            return Ok(None);
        };
        let key_positions = table
            .primary_key
            .iter()
            .map(|pk| {
                rows.columns.iter().position(|c| c == pk).ok_or_else(|| {
                    SchemaError::definition(
                        qualified_name(&schema.name, &table.name),
                        format!("rows do not declare primary key column {pk}"),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if key_positions.is_empty() {
            return Err(SchemaError::definition(
                qualified_name(&schema.name, &table.name),
                "static rows require a primary key",
            ));
        }
        Ok(Some(Self {
            db,
            schema,
            table,
            rows,
            key_positions,
        }))
    }

    fn identity(&self, row: &Row) -> Vec<String> {
        self.key_positions
            .iter()
            .map(|&p| row.cell(p).map(Cell::identity).unwrap_or_default())
            .collect()
    }

    /// Rows that should exist, keyed by identity.
    fn present(&self) -> HashMap<Vec<String>, &'a Row> {
        self.rows
            .rows
            .iter()
            .filter(|r| !r.delete)
            .map(|r| (self.identity(r), r))
            .collect()
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.rows.columns.iter().position(|c| c == column)
    }

    /// SQL literal of a cell. Unset cells take the column default, or NULL.
    fn literal(&self, ctx: &DiffContext, column: &str, cell: Option<&Cell>) -> Result<String> {
        let unset = match cell {
            None => true,
            Some(c) => !c.null && !c.empty && c.value.is_none(),
        };
        if unset {
            return Ok(
                column_default(self.db, &self.schema.name, &self.table.name, column)
                    .unwrap_or("NULL")
                    .to_string(),
            );
        }
        let data_type = resolve_column_type(self.db, &self.schema.name, &self.table.name, column)?;
        Ok(ctx.renderer.literal(&data_type, cell.unwrap_or(&Cell::null())))
    }

    fn value(&self, ctx: &DiffContext, row: &Row, column: &str) -> Result<String> {
        let cell = self.position(column).and_then(|p| row.cell(p));
        self.literal(ctx, column, cell)
    }

    fn key(&self, ctx: &DiffContext, names: &[String], row: &Row) -> Result<Vec<(String, String)>> {
        names
            .iter()
            .zip(&self.key_positions)
            .map(|(name, &p)| {
                let column = &self.rows.columns[p];
                Ok((name.clone(), self.literal(ctx, column, row.cell(p))?))
            })
            .collect()
    }
}

/// Row operations for one table of the new tree.
pub fn reconcile_rows(
    ctx: &DiffContext,
    schema: &Schema,
    table: &Table,
    pass: RowPass,
) -> Result<Vec<MigrationOp>> {
    let Some(new_rows) = RowSet::new(ctx.new, schema, table)? else {
        return Ok(Vec::new());
    };
    let old_rows = match (ctx.old, ctx.old_table_for(&schema.name, &table.name)) {
        (Some(old), Some((old_schema, old_table))) => RowSet::new(old, old_schema, old_table)?,
        _ => None,
    };
    let old_rows = old_rows.filter(|o| o.key_positions.len() == new_rows.key_positions.len());

    let qualified = qualified_name(&schema.name, &table.name);
    match pass {
        RowPass::Delete => delete_rows(ctx, &qualified, &new_rows, old_rows.as_ref()),
        RowPass::Upsert => upsert_rows(ctx, &qualified, &new_rows, old_rows.as_ref()),
    }
}

fn delete_rows(
    ctx: &DiffContext,
    qualified: &str,
    new_rows: &RowSet,
    old_rows: Option<&RowSet>,
) -> Result<Vec<MigrationOp>> {
    let Some(old_rows) = old_rows else {
        return Ok(Vec::new());
    };
    // Rows flagged for deletion are not part of `wanted`, so a flagged row that still
    // exists on the old side is removed here as well.
    let wanted = new_rows.present();
    let mut ops = Vec::new();

    for row in old_rows.rows.rows.iter().filter(|r| !r.delete) {
        if !wanted.contains_key(&old_rows.identity(row)) {
            ops.push(MigrationOp::DeleteRow {
                table: qualified.to_string(),
                key: old_rows.key(ctx, &new_rows.table.primary_key, row)?,
            });
        }
    }
    Ok(ops)
}

/// Name a column of the new table had on the old side, following a declared rename.
fn previous_column_name(
    ctx: &DiffContext,
    new_rows: &RowSet,
    old_rows: &RowSet,
    column: &str,
) -> Result<String> {
    let Some(current) = new_rows.table.column(column) else {
        return Ok(column.to_string());
    };
    let object = format!(
        "{}.{}",
        qualified_name(&new_rows.schema.name, &new_rows.table.name),
        column
    );
    Ok(column_counterpart(ctx, old_rows.table, current, &object)?
        .map(|(previous, _)| previous.name.clone())
        .unwrap_or_else(|| column.to_string()))
}

fn upsert_rows(
    ctx: &DiffContext,
    qualified: &str,
    new_rows: &RowSet,
    old_rows: Option<&RowSet>,
) -> Result<Vec<MigrationOp>> {
    let existing = old_rows.map(RowSet::present).unwrap_or_default();
    let columns = &new_rows.rows.columns;
    let mut ops = Vec::new();
    let mut inserted = false;

    for row in new_rows.rows.rows.iter().filter(|r| !r.delete) {
        let previous = existing.get(&new_rows.identity(row));
        let (Some(old_rows), Some(previous)) = (old_rows, previous) else {
            let values = columns
                .iter()
                .map(|c| new_rows.value(ctx, row, c))
                .collect::<Result<Vec<_>>>()?;
            ops.push(MigrationOp::InsertRow {
                table: qualified.to_string(),
                columns: columns.clone(),
                values,
            });
            inserted = true;
            continue;
        };

        let mut assignments = Vec::new();
        let mut was = Vec::new();
        for column in columns {
            if new_rows.table.primary_key.contains(column) {
                continue;
            }
            let value = new_rows.value(ctx, row, column)?;
            let old_column = previous_column_name(ctx, new_rows, old_rows, column)?;
            match old_rows.position(&old_column) {
                Some(p) => {
                    let old_value = old_rows.literal(ctx, &old_column, previous.cell(p))?;
                    if old_value != value {
                        assignments.push((column.clone(), value));
                        was.push((column.clone(), old_value));
                    }
                }
                None => assignments.push((column.clone(), value)),
            }
        }
        if !assignments.is_empty() {
            ops.push(MigrationOp::UpdateRow {
                table: qualified.to_string(),
                assignments,
                key: new_rows.key(ctx, &new_rows.table.primary_key, row)?,
                previous: was,
            });
        }
    }

    if inserted {
        if let Some(op) = advance_serial(new_rows, qualified) {
            ops.push(op);
        }
    }
    Ok(ops)
}

/// A single auto-incrementing key without an explicit start is moved past the inserted rows.
fn advance_serial(rows: &RowSet, qualified: &str) -> Option<MigrationOp> {
    let [pk] = rows.table.primary_key.as_slice() else {
        return None;
    };
    let column = rows.table.column(pk)?;
    let data_type = column.data_type.as_deref()?;
    if !is_serial_type(data_type) || column.serial_start.is_some() {
        return None;
    }
    Some(MigrationOp::SetSerialValue {
        table: qualified.to_string(),
        column: pk.clone(),
        value: SerialValue::AfterMax,
    })
}

pub(crate) fn diff_data(ctx: &DiffContext, ops: &mut StagedOps) -> Result<()> {
    let tables: Vec<(&Schema, &Table)> = ctx
        .new_order
        .iter()
        .filter_map(|item| ctx.new.table(&item.schema, item.table.as_deref()?))
        .collect();

    for &(schema, table) in tables.iter().rev() {
        ops.stage2
            .extend(reconcile_rows(ctx, schema, table, RowPass::Delete)?);
    }
    for &(schema, table) in &tables {
        ops.stage2
            .extend(reconcile_rows(ctx, schema, table, RowPass::Upsert)?);
    }
    Ok(())
}
