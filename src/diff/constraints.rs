//! Constraint synthesis and the drop / re-add passes.
//!
//! Constraints come from three places: explicit declarations, the primary-key attribute and
//! inline foreign keys. All three are normalized to [`Constraint`] and compared by name,
//! kind and definition. Drops run before any table is touched, in reverse dependency
//! order; primary keys are re-added with their table and other constraints only once every
//! table exists.

use std::collections::HashSet;

use super::planner::{old_tables_reversed, StagedOps};
use super::{DiffContext, MigrationOp};
use crate::model::resolve::{constraint_target, resolve_column_type};
use crate::model::{qualified_name, Constraint, ConstraintKind, Database, Schema, Table};
use crate::render::Renderer;
use crate::util::{expressions_equal, types_equal, Result, SchemaError};

/// Every constraint of a table: primary key first, then inline foreign keys, then explicit
/// declarations.
pub fn table_constraints(
    renderer: &dyn Renderer,
    schema: &Schema,
    table: &Table,
) -> Result<Vec<Constraint>> {
    let mut constraints = Vec::new();

    if !table.primary_key.is_empty() {
        constraints.push(Constraint {
            name: table
                .primary_key_name
                .clone()
                .unwrap_or_else(|| renderer.primary_key_name(&table.name)),
            schema: schema.name.clone(),
            table: table.name.clone(),
            kind: ConstraintKind::PrimaryKey,
            definition: format!("({})", quote_list(renderer, &table.primary_key)),
            references: None,
            columns: table.primary_key.clone(),
            on_delete: None,
            on_update: None,
        });
    }

    for column in &table.columns {
        let Some(ref fk) = column.foreign_key else {
            continue;
        };
        let target_schema = fk.schema.clone().unwrap_or_else(|| schema.name.clone());
        let target_column = fk.column.clone().unwrap_or_else(|| column.name.clone());
        constraints.push(Constraint {
            name: fk
                .constraint_name
                .clone()
                .unwrap_or_else(|| renderer.foreign_key_name(&table.name, &column.name)),
            schema: schema.name.clone(),
            table: table.name.clone(),
            kind: ConstraintKind::ForeignKey,
            definition: format!(
                "({}) REFERENCES {} ({})",
                renderer.quote_ident(&column.name),
                renderer.quote_qualified(&target_schema, &fk.table),
                renderer.quote_ident(&target_column)
            ),
            references: Some((target_schema, fk.table.clone())),
            columns: vec![column.name.clone()],
            on_delete: fk.on_delete,
            on_update: fk.on_update,
        });
    }

    for decl in &table.constraints {
        constraints.push(Constraint {
            name: decl.name.clone(),
            schema: schema.name.clone(),
            table: table.name.clone(),
            kind: decl.kind,
            definition: decl.definition.clone(),
            references: constraint_target(decl)
                .map(|t| (t.schema_or(&schema.name).to_string(), t.table.clone())),
            columns: Vec::new(),
            on_delete: decl.on_delete,
            on_update: decl.on_update,
        });
    }

    let qualified = qualified_name(&schema.name, &table.name);
    let mut names = HashSet::new();
    for constraint in &constraints {
        if !names.insert(constraint.name.as_str()) {
            return Err(SchemaError::definition(
                format!("{qualified}.{}", constraint.name),
                "duplicate constraint name",
            ));
        }
    }
    if constraints
        .iter()
        .filter(|c| c.kind == ConstraintKind::PrimaryKey)
        .count()
        > 1
    {
        return Err(SchemaError::definition(
            &qualified,
            "more than one primary key declared",
        ));
    }
    Ok(constraints)
}

fn quote_list(renderer: &dyn Renderer, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| renderer.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn constraints_equal(a: &Constraint, b: &Constraint) -> bool {
    a.name == b.name
        && a.kind == b.kind
        && expressions_equal(&a.definition, &b.definition)
        && a.on_delete == b.on_delete
        && a.on_update == b.on_update
}

/// Old constraints dropped by the drop pass, keyed by old `(schema, table, name)`.
#[derive(Debug, Default)]
pub(crate) struct ConstraintDiff {
    dropped: HashSet<(String, String, String)>,
}

impl ConstraintDiff {
    fn was_dropped(&self, schema: &str, table: &str, name: &str) -> bool {
        self.dropped
            .contains(&(schema.to_string(), table.to_string(), name.to_string()))
    }
}

/// Drop changed, removed and endangered constraints of tables that survive into the new
/// tree, and the foreign keys of tables about to be dropped. Non-key constraints go before
/// primary keys so no foreign key is left pointing at a dropped key.
pub(crate) fn drop_constraints(ctx: &DiffContext, ops: &mut StagedOps) -> Result<ConstraintDiff> {
    let mut diff = ConstraintDiff::default();
    let Some(old_db) = ctx.old else {
        return Ok(diff);
    };

    let mut planned: Vec<(Constraint, bool)> = Vec::new();
    for (old_schema, old_table) in old_tables_reversed(ctx) {
        let Some((schema, table)) = ctx.new_table_for(&old_schema.name, &old_table.name) else {
            // The table goes in stage 3; its foreign keys must not outlive the keys and
            // columns they reference.
            for constraint in table_constraints(ctx.renderer, old_schema, old_table)? {
                if constraint.kind == ConstraintKind::ForeignKey {
                    planned.push((constraint, true));
                }
            }
            continue;
        };
        let renamed = old_schema.name != schema.name || old_table.name != table.name;
        let old_constraints = table_constraints(ctx.renderer, old_schema, old_table)?;
        let new_constraints = table_constraints(ctx.renderer, schema, table)?;

        for constraint in old_constraints {
            let unchanged = new_constraints
                .iter()
                .any(|c| constraints_equal(c, &constraint));
            let drop = renamed
                || !unchanged
                || foreign_key_endangered(ctx, old_db, old_table, (schema, table), &constraint)?;
            planned.push((constraint, drop));
        }
    }

    for primary in [false, true] {
        for (constraint, drop) in &planned {
            if !drop || (constraint.kind == ConstraintKind::PrimaryKey) != primary {
                continue;
            }
            ops.stage1.push(MigrationOp::DropConstraint {
                table: qualified_name(&constraint.schema, &constraint.table),
                name: constraint.name.clone(),
            });
            diff.dropped.insert((
                constraint.schema.clone(),
                constraint.table.clone(),
                constraint.name.clone(),
            ));
        }
    }
    Ok(diff)
}

/// A foreign key must be rebuilt when its column changes type or when the key it
/// references is rebuilt.
fn foreign_key_endangered(
    ctx: &DiffContext,
    old_db: &Database,
    old_table: &Table,
    (schema, table): (&Schema, &Table),
    constraint: &Constraint,
) -> Result<bool> {
    if constraint.kind != ConstraintKind::ForeignKey {
        return Ok(false);
    }

    for column in &constraint.columns {
        if table.column(column).is_none() {
            return Ok(true);
        }
        let old_type = resolve_column_type(old_db, &constraint.schema, &old_table.name, column)?;
        let new_type = resolve_column_type(ctx.new, &schema.name, &table.name, column)?;
        if !types_equal(&old_type, &new_type) {
            return Ok(true);
        }
    }

    let Some((ref target_schema, ref target_table)) = constraint.references else {
        return Ok(false);
    };
    let Some((old_target_schema, old_target)) = old_db.table(target_schema, target_table) else {
        return Ok(false);
    };
    let Some((new_target_schema, new_target)) = ctx.new_table_for(target_schema, target_table)
    else {
        return Ok(true);
    };
    if old_target_schema.name != new_target_schema.name || old_target.name != new_target.name {
        return Ok(true);
    }

    let old_key = table_constraints(ctx.renderer, old_target_schema, old_target)?
        .into_iter()
        .find(|c| c.kind == ConstraintKind::PrimaryKey);
    let new_key = table_constraints(ctx.renderer, new_target_schema, new_target)?
        .into_iter()
        .find(|c| c.kind == ConstraintKind::PrimaryKey);
    Ok(match (old_key, new_key) {
        (Some(old_key), Some(new_key)) => !constraints_equal(&old_key, &new_key),
        (None, None) => false,
        _ => true,
    })
}

/// Constraints of a new table that are not already in place after the drop pass.
fn pending(
    ctx: &DiffContext,
    diff: &ConstraintDiff,
    schema: &Schema,
    table: &Table,
) -> Result<Vec<Constraint>> {
    let constraints = table_constraints(ctx.renderer, schema, table)?;
    let Some((old_schema, old_table)) = ctx.old_table_for(&schema.name, &table.name) else {
        return Ok(constraints);
    };
    let old_constraints = table_constraints(ctx.renderer, old_schema, old_table)?;

    Ok(constraints
        .into_iter()
        .filter(|c| match old_constraints.iter().find(|o| o.name == c.name) {
            None => true,
            Some(old) => {
                !constraints_equal(old, c)
                    || diff.was_dropped(&old_schema.name, &old_table.name, &old.name)
            }
        })
        .collect())
}

pub(crate) fn add_primary_key(
    ctx: &DiffContext,
    diff: &ConstraintDiff,
    schema: &Schema,
    table: &Table,
    ops: &mut StagedOps,
) -> Result<()> {
    for constraint in pending(ctx, diff, schema, table)? {
        if constraint.kind == ConstraintKind::PrimaryKey {
            ops.stage1.push(MigrationOp::AddConstraint(constraint));
        }
    }
    Ok(())
}

pub(crate) fn add_constraints(
    ctx: &DiffContext,
    diff: &ConstraintDiff,
    schema: &Schema,
    table: &Table,
    ops: &mut StagedOps,
) -> Result<()> {
    for constraint in pending(ctx, diff, schema, table)? {
        if constraint.kind != ConstraintKind::PrimaryKey {
            ops.stage1.push(MigrationOp::AddConstraint(constraint));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, ConstraintDecl, ForeignKeyRef, ReferentialAction};
    use crate::pg::PostgresRenderer;

    fn posts() -> (Schema, Table) {
        let mut table = Table::new("posts");
        table.columns.push(Column::new("id", "integer"));
        table.columns.push(Column {
            data_type: None,
            foreign_key: Some(ForeignKeyRef {
                schema: None,
                table: "users".to_string(),
                column: Some("id".to_string()),
                on_delete: Some(ReferentialAction::Cascade),
                on_update: None,
                constraint_name: None,
            }),
            ..Column::new("author_id", "")
        });
        table.primary_key = vec!["id".to_string()];
        table.constraints.push(ConstraintDecl {
            name: "posts_id_positive".to_string(),
            kind: ConstraintKind::Check,
            definition: "(id > 0)".to_string(),
            references: None,
            on_delete: None,
            on_update: None,
        });
        (Schema::new("app"), table)
    }

    #[test]
    fn constraints_are_synthesized_from_all_sources() {
        let (schema, table) = posts();
        let constraints = table_constraints(&PostgresRenderer::default(), &schema, &table).unwrap();

        let names: Vec<&str> = constraints.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["posts_pkey", "posts_author_id_fkey", "posts_id_positive"]
        );
        assert_eq!(constraints[0].definition, "(id)");
        assert_eq!(
            constraints[1].definition,
            "(author_id) REFERENCES app.users (id)"
        );
        assert_eq!(
            constraints[1].references,
            Some(("app".to_string(), "users".to_string()))
        );
        assert_eq!(constraints[1].on_delete, Some(ReferentialAction::Cascade));
    }

    #[test]
    fn explicit_primary_key_name_is_kept() {
        let (schema, mut table) = posts();
        table.primary_key_name = Some("posts_pk".to_string());
        let constraints = table_constraints(&PostgresRenderer::default(), &schema, &table).unwrap();
        assert_eq!(constraints[0].name, "posts_pk");
    }

    #[test]
    fn duplicate_constraint_names_are_rejected() {
        let (schema, mut table) = posts();
        table.constraints[0].name = "posts_pkey".to_string();
        let err = table_constraints(&PostgresRenderer::default(), &schema, &table).unwrap_err();
        assert!(err.to_string().contains("duplicate constraint name"));
    }

    #[test]
    fn definitions_compare_ignoring_whitespace() {
        let (schema, table) = posts();
        let constraints = table_constraints(&PostgresRenderer::default(), &schema, &table).unwrap();
        let mut respaced = constraints[2].clone();
        respaced.definition = "(  id  >  0 )".to_string();
        assert!(constraints_equal(&constraints[2], &respaced));

        let mut changed = constraints[2].clone();
        changed.definition = "(id > 1)".to_string();
        assert!(!constraints_equal(&constraints[2], &changed));
    }
}
