use tracing::warn;

use super::planner::{old_tables_reversed, StagedOps};
use super::{ColumnChange, ColumnDef, CommentTarget, DiffContext, MigrationOp, SerialValue};
use crate::model::resolve::resolve_column_type;
use crate::model::{qualified_name, Column, Database, Schema, Table};
use crate::util::{
    is_now_expression, is_serial_type, optional_expressions_equal, serial_storage_type,
    types_equal, Result, SchemaError,
};

/// Inheritance cannot be changed incrementally; any difference between a table and its
/// previous version is fatal.
pub(crate) fn check_inheritance(ctx: &DiffContext) -> Result<()> {
    for (schema, table) in ctx.new.tables() {
        let Some((old_schema, old_table)) = ctx.old_table_for(&schema.name, &table.name) else {
            continue;
        };

        let new_parent = table
            .inherits
            .as_ref()
            .map(|p| (p.schema_or(&schema.name).to_string(), p.table.clone()));
        let old_parent = old_table.inherits.as_ref().map(|p| {
            let key = (p.schema_or(&old_schema.name).to_string(), p.table.clone());
            match ctx.new_table_for(&key.0, &key.1) {
                Some((s, t)) => (s.name.clone(), t.name.clone()),
                None => key,
            }
        });

        if new_parent != old_parent {
            let describe = |p: &Option<(String, String)>| match p {
                Some((s, t)) => qualified_name(s, t),
                None => "nothing".to_string(),
            };
            return Err(SchemaError::unsupported(
                qualified_name(&schema.name, &table.name),
                format!(
                    "inheritance changed from {} to {}",
                    describe(&old_parent),
                    describe(&new_parent)
                ),
            ));
        }
    }
    Ok(())
}

pub(crate) fn diff_table(
    ctx: &DiffContext,
    schema: &Schema,
    table: &Table,
    ops: &mut StagedOps,
) -> Result<()> {
    match ctx.old_table_for(&schema.name, &table.name) {
        None => create_table(ctx, schema, table, ops),
        Some((old_schema, old_table)) => {
            rename_table(old_schema, old_table, schema, table, ops);
            diff_columns(ctx, old_schema, old_table, schema, table, ops)?;
            if old_table.description != table.description {
                ops.stage1.push(MigrationOp::SetComment {
                    target: CommentTarget::Table(qualified_name(&schema.name, &table.name)),
                    text: table.description.clone(),
                });
            }
            Ok(())
        }
    }
}

fn create_table(
    ctx: &DiffContext,
    schema: &Schema,
    table: &Table,
    ops: &mut StagedOps,
) -> Result<()> {
    let qualified = qualified_name(&schema.name, &table.name);
    let mut columns = Vec::with_capacity(table.columns.len());
    for column in &table.columns {
        columns.push(ColumnDef {
            name: column.name.clone(),
            data_type: resolve_column_type(ctx.new, &schema.name, &table.name, &column.name)?,
            nullable: column.nullable,
            default: column.default.clone(),
        });
    }

    ops.stage1.push(MigrationOp::CreateTable {
        table: qualified.clone(),
        columns,
        inherits: table
            .inherits
            .as_ref()
            .map(|p| qualified_name(p.schema_or(&schema.name), &p.table)),
    });

    if table.description.is_some() {
        ops.stage1.push(MigrationOp::SetComment {
            target: CommentTarget::Table(qualified.clone()),
            text: table.description.clone(),
        });
    }
    for column in &table.columns {
        if column.description.is_some() {
            ops.stage1.push(MigrationOp::SetComment {
                target: CommentTarget::Column {
                    table: qualified.clone(),
                    column: column.name.clone(),
                },
                text: column.description.clone(),
            });
        }
        if let Some(start) = column.serial_start {
            ops.stage1.push(MigrationOp::SetSerialValue {
                table: qualified.clone(),
                column: column.name.clone(),
                value: SerialValue::Start(start),
            });
        }
    }
    Ok(())
}

fn rename_table(
    old_schema: &Schema,
    old_table: &Table,
    schema: &Schema,
    table: &Table,
    ops: &mut StagedOps,
) {
    let mut current = qualified_name(&old_schema.name, &old_table.name);
    if old_schema.name != schema.name {
        ops.stage1.push(MigrationOp::SetTableSchema {
            table: current,
            schema: schema.name.clone(),
        });
        current = qualified_name(&schema.name, &old_table.name);
    }
    if old_table.name != table.name {
        ops.stage1.push(MigrationOp::RenameTable {
            table: current,
            new_name: table.name.clone(),
        });
    }
}

/// Previous version of a column. The second value is true when it is reached through a
/// rename marker.
pub(crate) fn column_counterpart<'a>(
    ctx: &DiffContext,
    old_table: &'a Table,
    column: &Column,
    object: &str,
) -> Result<Option<(&'a Column, bool)>> {
    if ctx.options.rename_tracking {
        if let Some(ref old_name) = column.old_name {
            if *old_name != column.name {
                if let Some(previous) = old_table.column(old_name) {
                    if old_table.column(&column.name).is_some() {
                        return Err(SchemaError::definition(
                            object,
                            format!(
                                "ambiguous rename: both {old_name} and {} exist in the previous version",
                                column.name
                            ),
                        ));
                    }
                    return Ok(Some((previous, true)));
                }
            }
        }
    }
    Ok(old_table.column(&column.name).map(|c| (c, false)))
}

fn diff_columns(
    ctx: &DiffContext,
    old_schema: &Schema,
    old_table: &Table,
    schema: &Schema,
    table: &Table,
    ops: &mut StagedOps,
) -> Result<()> {
    let qualified = qualified_name(&schema.name, &table.name);
    let old_db = ctx.old.unwrap_or(ctx.new);
    let mut renamed_from: Vec<(&str, &str)> = Vec::new();
    let mut matched: Vec<&str> = Vec::new();

    for column in &table.columns {
        let object = format!("{qualified}.{}", column.name);
        let new_type = resolve_column_type(ctx.new, &schema.name, &table.name, &column.name)?;

        match column_counterpart(ctx, old_table, column, &object)? {
            None => add_column(ctx, &qualified, column, new_type, ops),
            Some((previous, renamed)) => {
                matched.push(previous.name.as_str());
                if renamed {
                    renamed_from.push((previous.name.as_str(), column.name.as_str()));
                    ops.stage1.push(MigrationOp::RenameColumn {
                        table: qualified.clone(),
                        from: previous.name.clone(),
                        to: column.name.clone(),
                    });
                }
                let old_type =
                    resolve_column_type(old_db, &old_schema.name, &old_table.name, &previous.name)?;
                alter_column(ctx, &qualified, &object, previous, &old_type, column, &new_type, ops)?;
            }
        }
    }

    for previous in &old_table.columns {
        if let Some((_, to)) = renamed_from.iter().find(|(from, _)| *from == previous.name) {
            ops.stage3.push(MigrationOp::Comment(format!(
                "{qualified}.{} was renamed to {to}; nothing to drop",
                previous.name
            )));
        } else if !matched.contains(&previous.name.as_str()) {
            ops.stage3.push(MigrationOp::DropColumn {
                table: qualified.clone(),
                column: previous.name.clone(),
            });
        }
    }
    Ok(())
}

fn add_column(
    ctx: &DiffContext,
    qualified: &str,
    column: &Column,
    data_type: String,
    ops: &mut StagedOps,
) {
    let serial = is_serial_type(&data_type);
    ops.stage1.push(MigrationOp::AddColumn {
        table: qualified.to_string(),
        column: ColumnDef {
            name: column.name.clone(),
            data_type,
            nullable: true,
            default: None,
        },
    });

    if serial {
        if let Some(start) = column.serial_start {
            ops.stage1.push(MigrationOp::SetSerialValue {
                table: qualified.to_string(),
                column: column.name.clone(),
                value: SerialValue::Start(start),
            });
        }
    } else {
        if let Some(ref default) = column.default {
            ops.stage1.push(MigrationOp::AlterColumn {
                table: qualified.to_string(),
                column: column.name.clone(),
                change: ColumnChange::SetDefault(default.clone()),
            });
        }
        backfill(qualified, column, ops);
        if !column.nullable {
            set_not_null(ctx, qualified, &column.name, ops);
        }
    }

    if column.description.is_some() {
        ops.stage1.push(MigrationOp::SetComment {
            target: CommentTarget::Column {
                table: qualified.to_string(),
                column: column.name.clone(),
            },
            text: column.description.clone(),
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn alter_column(
    ctx: &DiffContext,
    qualified: &str,
    object: &str,
    previous: &Column,
    old_type: &str,
    column: &Column,
    new_type: &str,
    ops: &mut StagedOps,
) -> Result<()> {
    let alter = |change: ColumnChange| MigrationOp::AlterColumn {
        table: qualified.to_string(),
        column: column.name.clone(),
        change,
    };

    if !types_equal(old_type, new_type) {
        if is_serial_type(new_type) && !is_serial_type(old_type) {
            return Err(SchemaError::unsupported(
                object,
                format!("cannot alter a {old_type} column to auto-incrementing {new_type}"),
            ));
        }
        ops.stage1.push(alter(ColumnChange::Type {
            data_type: serial_storage_type(new_type),
            using: column.convert_using.clone(),
        }));
    }

    if !optional_expressions_equal(&previous.default, &column.default) {
        ops.stage1.push(match column.default {
            Some(ref default) => alter(ColumnChange::SetDefault(default.clone())),
            None => alter(ColumnChange::DropDefault),
        });
    }

    match (previous.nullable, column.nullable) {
        (true, false) => {
            backfill(qualified, column, ops);
            set_not_null(ctx, qualified, &column.name, ops);
        }
        (false, true) => ops.stage1.push(alter(ColumnChange::DropNotNull)),
        _ => {}
    }

    if previous.description != column.description {
        ops.stage1.push(MigrationOp::SetComment {
            target: CommentTarget::Column {
                table: qualified.to_string(),
                column: column.name.clone(),
            },
            text: column.description.clone(),
        });
    }
    Ok(())
}

/// Populate NULLs at the end of stage 1. Clock defaults are written as an explicit value so
/// every replica converges on one evaluation.
fn backfill(qualified: &str, column: &Column, ops: &mut StagedOps) {
    let Some(ref default) = column.default else {
        return;
    };
    if is_now_expression(default) {
        ops.stage1_tail.push(MigrationOp::BackfillColumn {
            table: qualified.to_string(),
            column: column.name.clone(),
            value: Some(default.clone()),
        });
    } else if !column.nullable {
        ops.stage1_tail.push(MigrationOp::BackfillColumn {
            table: qualified.to_string(),
            column: column.name.clone(),
            value: None,
        });
    }
}

fn set_not_null(ctx: &DiffContext, qualified: &str, column: &str, ops: &mut StagedOps) {
    if ctx.options.single_stage {
        warn!(
            table = qualified,
            column, "single-stage script: NOT NULL is not enforced"
        );
        ops.stage3.push(MigrationOp::Comment(format!(
            "{qualified}.{column} should be NOT NULL; skipped in a single-stage script"
        )));
        return;
    }
    ops.stage3.push(MigrationOp::AlterColumn {
        table: qualified.to_string(),
        column: column.to_string(),
        change: ColumnChange::SetNotNull,
    });
}

/// Drop old tables that have no counterpart in the new tree, dependents first.
pub(crate) fn drop_tables(ctx: &DiffContext, ops: &mut StagedOps) {
    for (schema, table) in old_tables_reversed(ctx) {
        if ctx.new_table_for(&schema.name, &table.name).is_none() {
            ops.stage3
                .push(MigrationOp::DropTable(qualified_name(&schema.name, &table.name)));
        }
    }
}

/// Tables of `db`, in `order`, that declare a column of the given type.
pub(crate) fn columns_of_type<'a>(
    db: &'a Database,
    order: &[super::DependencyItem],
    type_schema: &str,
    type_name: &str,
) -> Result<Vec<(&'a Schema, &'a Table, &'a Column)>> {
    let mut found = Vec::new();
    for item in order {
        let Some(ref table_name) = item.table else {
            continue;
        };
        let Some((schema, table)) = db.table(&item.schema, table_name) else {
            continue;
        };
        for column in &table.columns {
            let data_type = resolve_column_type(db, &schema.name, &table.name, &column.name)?;
            if type_refers_to(&data_type, type_schema, type_name) {
                found.push((schema, table, column));
            }
        }
    }
    Ok(found)
}

fn type_refers_to(data_type: &str, type_schema: &str, type_name: &str) -> bool {
    let cleaned: String = data_type
        .trim()
        .chars()
        .filter(|c| *c != '"')
        .collect::<String>()
        .to_lowercase();
    let name = type_name.to_lowercase();
    cleaned == name || cleaned == format!("{}.{name}", type_schema.to_lowercase())
}
