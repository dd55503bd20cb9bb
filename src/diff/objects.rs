//! Schema-level objects that are not dependency ordered: schemas, functions, sequences,
//! views and custom SQL.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::OnceLock;

use regex::Regex;
use sqlparser::ast::visit_relations;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::{debug, warn};

use super::planner::StagedOps;
use super::{grants, CommentTarget, DiffContext, MigrationOp, SequenceChanges};
use crate::model::{
    qualified_name, CustomSql, Database, Function, Schema, Sequence, TypeKind, View,
};
use crate::util::{normalize_sql_whitespace, optional_expressions_equal, types_equal};

pub(crate) fn create_schemas(ctx: &DiffContext, schemas: &[&Schema], ops: &mut StagedOps) {
    for schema in schemas {
        let previous = ctx.old_schema(&schema.name);
        if previous.is_none() {
            ops.stage1.push(MigrationOp::CreateSchema(schema.name.clone()));
        }
        let old_description = previous.and_then(|s| s.description.clone());
        if schema.description != old_description {
            ops.stage1.push(MigrationOp::SetComment {
                target: CommentTarget::Schema(schema.name.clone()),
                text: schema.description.clone(),
            });
        }
    }
}

fn functions_equal(a: &Function, b: &Function) -> bool {
    types_equal(&a.returns, &b.returns)
        && a.arguments == b.arguments
        && a.language.eq_ignore_ascii_case(&b.language)
        && normalize_sql_whitespace(&a.definition) == normalize_sql_whitespace(&b.definition)
        && a.volatility == b.volatility
        && a.security_definer == b.security_definer
}

/// Functions are keyed by signature. A changed return type cannot be replaced in place.
pub(crate) fn diff_functions(ctx: &DiffContext, schema: &Schema, ops: &mut StagedOps) {
    let old_schema = ctx.old_schema(&schema.name);

    for function in &schema.functions {
        let previous = old_schema.and_then(|s| s.function(&function.signature()));
        match previous {
            None => ops.stage1.push(MigrationOp::CreateFunction {
                schema: schema.name.clone(),
                function: function.clone(),
                replace: false,
            }),
            Some(previous) if functions_equal(previous, function) => {}
            Some(previous) if !types_equal(&previous.returns, &function.returns) => {
                ops.stage1.push(MigrationOp::DropFunction {
                    name: qualified_name(&schema.name, &previous.name),
                    args: previous.argument_types(),
                });
                ops.stage1.push(MigrationOp::CreateFunction {
                    schema: schema.name.clone(),
                    function: function.clone(),
                    replace: false,
                });
            }
            Some(_) => ops.stage1.push(MigrationOp::CreateFunction {
                schema: schema.name.clone(),
                function: function.clone(),
                replace: true,
            }),
        }
    }
}

/// Start value PostgreSQL picks when none is given: the minimum for ascending sequences, the
/// maximum for descending ones.
fn default_start(sequence: &Sequence) -> i64 {
    if sequence.increment.unwrap_or(1) < 0 {
        sequence.max_value.unwrap_or(-1)
    } else {
        sequence.min_value.unwrap_or(1)
    }
}

fn sequence_changes(old: &Sequence, new: &Sequence) -> SequenceChanges {
    let mut changes = SequenceChanges::default();
    if old.start != new.start {
        changes.start = Some(new.start.unwrap_or_else(|| default_start(new)));
    }
    if old.increment != new.increment {
        changes.increment = Some(new.increment.unwrap_or(1));
    }
    if old.min_value != new.min_value {
        changes.min_value = Some(new.min_value);
    }
    if old.max_value != new.max_value {
        changes.max_value = Some(new.max_value);
    }
    if old.cache != new.cache {
        changes.cache = Some(new.cache.unwrap_or(1));
    }
    if old.cycle != new.cycle {
        changes.cycle = Some(new.cycle);
    }
    changes
}

/// Sequence options change in stage 1. Ownership waits for the stage 1 tail, when the owning
/// column exists.
pub(crate) fn diff_sequences(ctx: &DiffContext, schema: &Schema, ops: &mut StagedOps) {
    let old_schema = ctx.old_schema(&schema.name);

    for sequence in &schema.sequences {
        let qualified = qualified_name(&schema.name, &sequence.name);
        let previous = old_schema.and_then(|s| s.sequence(&sequence.name));

        let old_owned_by = match previous {
            None => {
                ops.stage1.push(MigrationOp::CreateSequence {
                    schema: schema.name.clone(),
                    sequence: sequence.clone(),
                });
                None
            }
            Some(previous) => {
                let changes = sequence_changes(previous, sequence);
                if !changes.is_empty() {
                    ops.stage1.push(MigrationOp::AlterSequence {
                        name: qualified.clone(),
                        changes,
                    });
                }
                previous.owned_by.clone()
            }
        };

        if sequence.owned_by != old_owned_by {
            ops.stage1_tail.push(MigrationOp::AlterSequence {
                name: qualified,
                changes: SequenceChanges {
                    owned_by: Some(sequence.owned_by.clone()),
                    ..Default::default()
                },
            });
        }
    }
}

/// Functions, sequences and types gone from the new tree, dropped after tables. Schemas gone
/// from the new tree are dropped last.
pub(crate) fn drop_removed_objects(ctx: &DiffContext, ops: &mut StagedOps) {
    let Some(old) = ctx.old else {
        return;
    };

    let mut removed_schemas = Vec::new();
    for old_schema in &old.schemas {
        let Some(schema) = ctx.new.schema(&old_schema.name) else {
            removed_schemas.push(old_schema.name.clone());
            continue;
        };

        for function in &old_schema.functions {
            if schema.function(&function.signature()).is_none() {
                ops.stage3.push(MigrationOp::DropFunction {
                    name: qualified_name(&old_schema.name, &function.name),
                    args: function.argument_types(),
                });
            }
        }
        for sequence in &old_schema.sequences {
            if schema.sequence(&sequence.name).is_none() {
                ops.stage3.push(MigrationOp::DropSequence(qualified_name(
                    &old_schema.name,
                    &sequence.name,
                )));
            }
        }
        for type_def in &old_schema.types {
            if schema.type_def(&type_def.name).is_none() {
                ops.stage3.push(MigrationOp::DropType {
                    name: qualified_name(&old_schema.name, &type_def.name),
                    domain: matches!(type_def.kind, TypeKind::Domain { .. }),
                });
            }
        }
    }

    for name in removed_schemas {
        ops.stage3.push(MigrationOp::DropSchema(name));
    }
}

type ViewKey = (String, String);

/// Relations a view query reads from, with unqualified names placed in `default_schema`.
pub fn view_references(query: &str, default_schema: &str) -> HashSet<ViewKey> {
    let mut refs = HashSet::new();
    match Parser::parse_sql(&PostgreSqlDialect {}, query) {
        Ok(statements) => {
            let flow = visit_relations(&statements, |relation| {
                let parts: Vec<String> = relation
                    .to_string()
                    .split('.')
                    .map(|p| p.trim_matches('"').to_string())
                    .collect();
                match parts.as_slice() {
                    [name] => refs.insert((default_schema.to_string(), name.clone())),
                    [.., schema, name] => refs.insert((schema.clone(), name.clone())),
                    [] => false,
                };
                ControlFlow::<()>::Continue(())
            });
            debug_assert!(flow.is_continue());
        }
        Err(err) => {
            debug!(error = %err, "view query did not parse, scanning for FROM and JOIN");
            static RELATION: OnceLock<Regex> = OnceLock::new();
            let re = RELATION.get_or_init(|| {
                Regex::new(r#"(?i)\b(?:FROM|JOIN)\s+(?:("[^"]+"|[a-z_][a-z0-9_$]*)\s*\.\s*)?("[^"]+"|[a-z_][a-z0-9_$]*)"#)
                    .expect("static regex")
            });
            for caps in re.captures_iter(query) {
                let Some(name) = caps.get(2) else {
                    continue;
                };
                let schema = caps
                    .get(1)
                    .map(|m| m.as_str().trim_matches('"'))
                    .unwrap_or(default_schema);
                refs.insert((schema.to_string(), name.as_str().trim_matches('"').to_string()));
            }
        }
    }
    refs
}

/// Views of `db` ordered so that every view comes after the views it reads from; ties keep
/// declaration order. Views caught in a cycle follow in declaration order.
pub fn view_order(db: &Database) -> Vec<(&Schema, &View)> {
    let views: Vec<(&Schema, &View)> = db
        .schemas
        .iter()
        .flat_map(|s| s.views.iter().map(move |v| (s, v)))
        .collect();
    let position: HashMap<ViewKey, usize> = views
        .iter()
        .enumerate()
        .map(|(i, (s, v))| ((s.name.clone(), v.name.clone()), i))
        .collect();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); views.len()];
    let mut in_degree = vec![0usize; views.len()];
    for (i, (schema, view)) in views.iter().enumerate() {
        let deps: BTreeSet<usize> = view_references(&view.query, &schema.name)
            .iter()
            .filter_map(|key| position.get(key).copied())
            .filter(|&j| j != i)
            .collect();
        for j in deps {
            dependents[j].push(i);
            in_degree[i] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..views.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut placed = vec![false; views.len()];
    let mut ordered = Vec::with_capacity(views.len());
    while let Some(i) = ready.pop_first() {
        placed[i] = true;
        ordered.push(views[i]);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if ordered.len() < views.len() {
        let cyclic: Vec<String> = (0..views.len())
            .filter(|&i| !placed[i])
            .map(|i| qualified_name(&views[i].0.name, &views[i].1.name))
            .collect();
        warn!(views = ?cyclic, "circular view references, keeping declaration order");
        ordered.extend((0..views.len()).filter(|&i| !placed[i]).map(|i| views[i]));
    }
    ordered
}

fn view_signature(schema: &Schema, view: &View) -> (String, String, String) {
    (
        schema.name.clone(),
        view.name.clone(),
        normalize_sql_whitespace(view.query.trim().trim_end_matches(';')),
    )
}

fn views_differ(old: &Database, new: &Database) -> bool {
    fn collect(db: &Database) -> HashMap<(String, String, String), &View> {
        db.schemas
            .iter()
            .flat_map(|s| s.views.iter().map(move |v| (view_signature(s, v), v)))
            .collect()
    }
    let old_views = collect(old);
    let new_views = collect(new);
    if old_views.len() != new_views.len() {
        return true;
    }
    new_views.iter().any(|(key, view)| match old_views.get(key) {
        None => true,
        Some(previous) => {
            previous.owner != view.owner
                || previous.grants != view.grants
                || !optional_expressions_equal(&previous.description, &view.description)
        }
    })
}

/// Old views are dropped at the very start of stage 1 and new ones created at the end of
/// stage 3, so every view sees the final column set. Nothing is touched when neither the
/// tables nor the views changed.
pub(crate) fn diff_views(ctx: &DiffContext, structural_changes: bool, ops: &mut StagedOps) {
    if let Some(old) = ctx.old {
        if !structural_changes && !views_differ(old, ctx.new) {
            return;
        }
        for (schema, view) in view_order(old).into_iter().rev() {
            ops.view_drops
                .push(MigrationOp::DropView(qualified_name(&schema.name, &view.name)));
        }
    }

    for (schema, view) in view_order(ctx.new) {
        ops.view_creates.push(MigrationOp::CreateView {
            schema: schema.name.clone(),
            view: view.clone(),
        });
        if view.description.is_some() {
            ops.view_creates.push(MigrationOp::SetComment {
                target: CommentTarget::View(qualified_name(&schema.name, &view.name)),
                text: view.description.clone(),
            });
        }
        grants::view_privileges(ctx, schema, view, ops);
    }
}

/// Custom statements to emit. An upgrade skips entries already present in the old tree.
pub(crate) fn custom_sql<'a>(ctx: &DiffContext<'a>) -> Vec<&'a CustomSql> {
    ctx.new
        .sql
        .iter()
        .filter(|entry| match ctx.old {
            Some(old) => !old.sql.contains(*entry),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(name: &str, query: &str) -> View {
        View {
            name: name.to_string(),
            owner: None,
            description: None,
            query: query.to_string(),
            grants: Vec::new(),
        }
    }

    fn key(schema: &str, name: &str) -> ViewKey {
        (schema.to_string(), name.to_string())
    }

    #[test]
    fn references_come_from_parsed_query() {
        let refs = view_references(
            "SELECT u.id FROM users u JOIN billing.invoices i ON i.user_id = u.id",
            "app",
        );
        assert!(refs.contains(&key("app", "users")));
        assert!(refs.contains(&key("billing", "invoices")));
    }

    #[test]
    fn unparseable_query_falls_back_to_scanning() {
        let refs = view_references("SELECT * FROM app.users WHERE (", "app");
        assert!(refs.contains(&key("app", "users")));
    }

    #[test]
    fn views_follow_the_views_they_read() {
        let mut schema = Schema::new("app");
        schema
            .views
            .push(view("active_admins", "SELECT * FROM app.active_users WHERE admin"));
        schema
            .views
            .push(view("active_users", "SELECT * FROM users WHERE active"));
        schema.views.push(view("counts", "SELECT count(*) FROM users"));
        let db = Database {
            schemas: vec![schema],
            sql: Vec::new(),
        };

        let names: Vec<&str> = view_order(&db).iter().map(|(_, v)| v.name.as_str()).collect();
        assert_eq!(names, vec!["active_users", "active_admins", "counts"]);
    }

    #[test]
    fn sequence_changes_only_name_what_moved() {
        let old = Sequence {
            name: "ids".to_string(),
            owner: None,
            start: Some(1),
            increment: Some(1),
            min_value: None,
            max_value: Some(1000),
            cache: None,
            cycle: false,
            owned_by: None,
            grants: Vec::new(),
        };
        let new = Sequence {
            increment: Some(5),
            max_value: None,
            cycle: true,
            ..old.clone()
        };

        let changes = sequence_changes(&old, &new);
        assert_eq!(changes.increment, Some(5));
        assert_eq!(changes.max_value, Some(None));
        assert_eq!(changes.cycle, Some(true));
        assert_eq!(changes.start, None);
        assert!(sequence_changes(&old, &old).is_empty());
    }

    #[test]
    fn unset_start_falls_back_to_the_default() {
        let old = Sequence {
            name: "ids".to_string(),
            owner: None,
            start: Some(100),
            increment: None,
            min_value: Some(10),
            max_value: None,
            cache: None,
            cycle: false,
            owned_by: None,
            grants: Vec::new(),
        };
        let ascending = Sequence {
            start: None,
            ..old.clone()
        };
        assert_eq!(sequence_changes(&old, &ascending).start, Some(10));

        let descending = Sequence {
            start: None,
            increment: Some(-1),
            min_value: None,
            ..old.clone()
        };
        assert_eq!(sequence_changes(&old, &descending).start, Some(-1));
    }
}
