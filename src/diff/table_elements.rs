//! Per-table elements diffed in the forward pass: indexes, the cluster index and triggers.

use super::planner::StagedOps;
use super::{DiffContext, MigrationOp};
use crate::model::{qualified_name, Index, Schema, Table, Trigger};
use crate::render::Renderer;
use crate::util::{expressions_equal, normalize_expression, optional_expressions_equal};

/// Explicit indexes plus the single-column unique indexes implied by `unique` columns.
pub fn effective_indexes(renderer: &dyn Renderer, table: &Table) -> Vec<Index> {
    let mut indexes = table.indexes.clone();
    for column in table.columns.iter().filter(|c| c.unique) {
        let name = renderer.unique_index_name(&table.name, &column.name);
        if indexes.iter().any(|i| i.name == name) {
            continue;
        }
        indexes.push(Index {
            name,
            unique: true,
            method: None,
            dimensions: vec![column.name.clone()],
            predicate: None,
        });
    }
    indexes
}

fn method(index: &Index) -> String {
    index
        .method
        .as_deref()
        .unwrap_or("btree")
        .to_ascii_lowercase()
}

pub(crate) fn indexes_equal(a: &Index, b: &Index) -> bool {
    a.unique == b.unique
        && method(a) == method(b)
        && a.dimensions.len() == b.dimensions.len()
        && a
            .dimensions
            .iter()
            .zip(&b.dimensions)
            .all(|(x, y)| expressions_equal(x, y))
        && optional_expressions_equal(&a.predicate, &b.predicate)
}

/// Indexes are matched by name. A renamed or moved table keeps its indexes, so drops address
/// the table's new schema.
pub(crate) fn diff_indexes(ctx: &DiffContext, schema: &Schema, table: &Table, ops: &mut StagedOps) {
    let qualified = qualified_name(&schema.name, &table.name);
    let to_indexes = effective_indexes(ctx.renderer, table);
    let from_indexes = ctx
        .old_table_for(&schema.name, &table.name)
        .map(|(_, old_table)| effective_indexes(ctx.renderer, old_table))
        .unwrap_or_default();

    for index in &from_indexes {
        let keep = to_indexes
            .iter()
            .any(|i| i.name == index.name && indexes_equal(i, index));
        if !keep {
            ops.stage1.push(MigrationOp::DropIndex {
                schema: schema.name.clone(),
                name: index.name.clone(),
            });
        }
    }

    for index in &to_indexes {
        let existing = from_indexes.iter().find(|i| i.name == index.name);
        match existing {
            Some(from_index) if indexes_equal(from_index, index) => {}
            _ => ops.stage1.push(MigrationOp::CreateIndex {
                table: qualified.clone(),
                index: index.clone(),
            }),
        }
    }
}

pub(crate) fn diff_cluster(ctx: &DiffContext, schema: &Schema, table: &Table, ops: &mut StagedOps) {
    let previous = ctx
        .old_table_for(&schema.name, &table.name)
        .and_then(|(_, old_table)| old_table.cluster_index.clone());
    if previous == table.cluster_index {
        return;
    }
    ops.stage1.push(MigrationOp::SetCluster {
        table: qualified_name(&schema.name, &table.name),
        index: table.cluster_index.clone(),
    });
}

/// Triggers compare on everything but the table they sit on, which may have been renamed.
pub(crate) fn triggers_equal(a: &Trigger, b: &Trigger) -> bool {
    a.name == b.name
        && a.timing == b.timing
        && a.events == b.events
        && a.for_each == b.for_each
        && normalize_expression(&a.function) == normalize_expression(&b.function)
        && optional_expressions_equal(&a.when, &b.when)
}

pub(crate) fn diff_triggers(ctx: &DiffContext, schema: &Schema, table: &Table, ops: &mut StagedOps) {
    let qualified = qualified_name(&schema.name, &table.name);
    let from_triggers: Vec<&Trigger> = ctx
        .old_table_for(&schema.name, &table.name)
        .map(|(old_schema, old_table)| old_schema.triggers_on(&old_table.name).collect())
        .unwrap_or_default();
    let to_triggers: Vec<&Trigger> = schema.triggers_on(&table.name).collect();

    for trigger in &from_triggers {
        let keep = to_triggers
            .iter()
            .any(|t| t.name == trigger.name && triggers_equal(t, trigger));
        if !keep {
            ops.stage1.push(MigrationOp::DropTrigger {
                table: qualified.clone(),
                name: trigger.name.clone(),
            });
        }
    }

    for trigger in to_triggers {
        let unchanged = from_triggers
            .iter()
            .any(|t| t.name == trigger.name && triggers_equal(t, trigger));
        if !unchanged {
            ops.stage1.push(MigrationOp::CreateTrigger {
                schema: schema.name.clone(),
                trigger: trigger.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, TriggerEvent, TriggerLevel, TriggerTiming};
    use crate::pg::PostgresRenderer;

    fn index(name: &str, dimensions: &[&str]) -> Index {
        Index {
            name: name.to_string(),
            unique: false,
            method: None,
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            predicate: None,
        }
    }

    #[test]
    fn unique_columns_imply_indexes() {
        let mut table = Table::new("users");
        table.columns.push(Column {
            unique: true,
            ..Column::new("email", "text")
        });
        table.indexes.push(index("users_name_idx", &["name"]));

        let indexes = effective_indexes(&PostgresRenderer::default(), &table);
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[1].name, "users_email_key");
        assert!(indexes[1].unique);
        assert_eq!(indexes[1].dimensions, vec!["email".to_string()]);
    }

    #[test]
    fn explicit_index_wins_over_implied_one() {
        let mut table = Table::new("users");
        table.columns.push(Column {
            unique: true,
            ..Column::new("email", "text")
        });
        let mut explicit = index("users_email_key", &["lower(email)"]);
        explicit.unique = true;
        table.indexes.push(explicit);

        let indexes = effective_indexes(&PostgresRenderer::default(), &table);
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].dimensions, vec!["lower(email)".to_string()]);
    }

    #[test]
    fn index_comparison_defaults_method_to_btree() {
        let a = index("i", &["a", "b"]);
        let mut b = index("i", &["a", "b"]);
        b.method = Some("BTREE".to_string());
        assert!(indexes_equal(&a, &b));

        b.method = Some("gin".to_string());
        assert!(!indexes_equal(&a, &b));

        let reordered = index("i", &["b", "a"]);
        assert!(!indexes_equal(&a, &reordered));
    }

    #[test]
    fn trigger_comparison_ignores_table() {
        let a = Trigger {
            name: "touch".to_string(),
            table: "users".to_string(),
            timing: TriggerTiming::Before,
            events: vec![TriggerEvent::Update],
            for_each: TriggerLevel::Row,
            function: "app.touch()".to_string(),
            when: None,
        };
        let mut b = a.clone();
        b.table = "members".to_string();
        assert!(triggers_equal(&a, &b));

        b.events.push(TriggerEvent::Insert);
        assert!(!triggers_equal(&a, &b));
    }
}
