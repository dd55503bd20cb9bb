//! Orchestration of a diff run: the ordered passes and the buckets they write into.
//!
//! Every operation is collected in memory before anything is returned, so a fatal error in
//! any pass yields no script at all.

use tracing::debug;

use super::{
    constraints, data, grants, objects, table_elements, tables, types, DiffContext, MigrationOp,
    PlannedOp,
};
use crate::model::{CustomSql, Schema, Stage, Table};
use crate::util::Result;

/// Operations grouped by the position they take in the final script.
#[derive(Debug, Default)]
pub(crate) struct StagedOps {
    /// Start of stage 1: views are removed before any table they read from changes.
    pub view_drops: Vec<MigrationOp>,
    pub stage1: Vec<MigrationOp>,
    /// End of stage 1: NULL backfills and sequence ownership, once every column exists.
    pub stage1_tail: Vec<MigrationOp>,
    pub stage2: Vec<MigrationOp>,
    pub stage3: Vec<MigrationOp>,
    /// End of stage 3: views, so they see the final column set.
    pub view_creates: Vec<MigrationOp>,
    pub stage4: Vec<MigrationOp>,
}

impl StagedOps {
    pub fn structural_len(&self) -> usize {
        self.stage1.len() + self.stage1_tail.len() + self.stage3.len() + self.stage4.len()
    }

    fn into_plan(self, custom: &[&CustomSql]) -> Vec<PlannedOp> {
        let mut plan = Vec::new();
        let buckets = [
            (Stage::Stage1, vec![self.view_drops, self.stage1, self.stage1_tail]),
            (Stage::Stage2, vec![self.stage2]),
            (Stage::Stage3, vec![self.stage3, self.view_creates]),
            (Stage::Stage4, vec![self.stage4]),
        ];

        for (stage, groups) in buckets {
            let mut push = |op: MigrationOp| plan.push(PlannedOp { stage, op });
            for entry in custom.iter().filter(|c| c.stage == stage && c.before) {
                push_custom(&mut push, entry);
            }
            for op in groups.into_iter().flatten() {
                push(op);
            }
            for entry in custom.iter().filter(|c| c.stage == stage && !c.before) {
                push_custom(&mut push, entry);
            }
        }
        plan
    }
}

fn push_custom(push: &mut impl FnMut(MigrationOp), entry: &CustomSql) {
    if let Some(ref comment) = entry.comment {
        push(MigrationOp::Comment(comment.clone()));
    }
    push(MigrationOp::CustomSql(entry.text.clone()));
}

/// Tables of `ctx.new` in forward dependency order.
fn new_tables<'a>(ctx: &DiffContext<'a>) -> Vec<(&'a Schema, &'a Table)> {
    ctx.new_order
        .iter()
        .filter_map(|item| {
            let table = item.table.as_deref()?;
            ctx.new.table(&item.schema, table)
        })
        .collect()
}

/// Tables of `ctx.old` in reverse dependency order.
pub(crate) fn old_tables_reversed<'a>(ctx: &DiffContext<'a>) -> Vec<(&'a Schema, &'a Table)> {
    let Some(old) = ctx.old else {
        return Vec::new();
    };
    ctx.old_order
        .iter()
        .rev()
        .filter_map(|item| {
            let table = item.table.as_deref()?;
            old.table(&item.schema, table)
        })
        .collect()
}

pub fn plan(ctx: &DiffContext) -> Result<Vec<PlannedOp>> {
    let mut ops = StagedOps::default();

    if ctx.options.emit_schema() {
        tables::check_inheritance(ctx)?;
        plan_structure(ctx, &mut ops)?;
    }

    if ctx.options.emit_data() {
        data::diff_data(ctx, &mut ops)?;
    }

    let custom = if ctx.options.emit_schema() {
        objects::custom_sql(ctx)
    } else {
        Vec::new()
    };

    debug!(
        stage1 = ops.view_drops.len() + ops.stage1.len() + ops.stage1_tail.len(),
        stage2 = ops.stage2.len(),
        stage3 = ops.stage3.len() + ops.view_creates.len(),
        stage4 = ops.stage4.len(),
        custom = custom.len(),
        "diff planned"
    );
    Ok(ops.into_plan(&custom))
}

fn plan_structure(ctx: &DiffContext, ops: &mut StagedOps) -> Result<()> {
    let schemas = DiffContext::schemas_in_order(&ctx.new_order, ctx.new);

    debug!("pass 0: schemas");
    objects::create_schemas(ctx, &schemas, ops);

    debug!("pass 1: types and functions");
    for schema in &schemas {
        types::diff_types(ctx, schema, ops)?;
        objects::diff_functions(ctx, schema, ops);
    }

    debug!("pass 2: constraint drops");
    let constraint_diff = constraints::drop_constraints(ctx, ops)?;

    debug!("pass 3: sequences");
    for schema in &schemas {
        objects::diff_sequences(ctx, schema, ops);
    }

    debug!("pass 4: tables");
    let ordered = new_tables(ctx);
    for &(schema, table) in &ordered {
        tables::diff_table(ctx, schema, table, ops)?;
        table_elements::diff_indexes(ctx, schema, table, ops);
        table_elements::diff_cluster(ctx, schema, table, ops);
        constraints::add_primary_key(ctx, &constraint_diff, schema, table, ops)?;
        table_elements::diff_triggers(ctx, schema, table, ops);
    }
    for &(schema, table) in &ordered {
        constraints::add_constraints(ctx, &constraint_diff, schema, table, ops)?;
    }

    debug!("pass 5: removals");
    tables::drop_tables(ctx, ops);
    objects::drop_removed_objects(ctx, ops);

    grants::diff_privileges(ctx, &schemas, ops);

    debug!("pass 6: views");
    let structural_changes = ops.structural_len() > 0;
    objects::diff_views(ctx, structural_changes, ops);
    Ok(())
}
