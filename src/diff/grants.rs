use std::collections::BTreeMap;

use super::planner::StagedOps;
use super::types::requires_rebuild;
use super::{DiffContext, MigrationOp, ObjectKind};
use crate::model::{qualified_name, Grant, Schema, View};
use crate::util::types_equal;

/// Privileges of one role on one object, keyed by upper-cased operation. The value is the
/// grant option.
type RolePrivileges = BTreeMap<String, bool>;

fn by_role(grants: &[Grant]) -> BTreeMap<&str, RolePrivileges> {
    let mut roles: BTreeMap<&str, RolePrivileges> = BTreeMap::new();
    for grant in grants {
        for role in &grant.roles {
            let privileges = roles.entry(role.as_str()).or_default();
            for operation in &grant.operations {
                let option = privileges
                    .entry(operation.trim().to_uppercase())
                    .or_insert(false);
                *option |= grant.with_grant_option;
            }
        }
    }
    roles
}

struct Target<'a> {
    kind: ObjectKind,
    name: String,
    args: Option<String>,
    owner: Option<&'a str>,
    grants: &'a [Grant],
}

/// Owner and grant state of the object before the change; `None` when the object is new or
/// was recreated.
type Previous<'a> = Option<(Option<&'a str>, &'a [Grant])>;

fn diff_object(ctx: &DiffContext, target: &Target, previous: Previous, out: &mut Vec<MigrationOp>) {
    let (old_owner, old_grants) = previous.unwrap_or((None, &[][..]));

    if ctx.options.manage_ownership {
        if let Some(owner) = target.owner {
            if old_owner != Some(owner) {
                out.push(MigrationOp::AlterOwner {
                    object_kind: target.kind,
                    name: target.name.clone(),
                    args: target.args.clone(),
                    owner: owner.to_string(),
                });
            }
        }
    }

    if !ctx.options.manage_grants {
        return;
    }
    let from = by_role(old_grants);
    let to = by_role(target.grants);
    let empty = RolePrivileges::new();

    for (role, from_privileges) in &from {
        let to_privileges = to.get(role).unwrap_or(&empty);
        let revoke: Vec<String> = from_privileges
            .iter()
            .filter(|&(op, &option)| match to_privileges.get(op) {
                None => true,
                Some(&new_option) => option && !new_option,
            })
            .map(|(op, _)| op.clone())
            .collect();
        if !revoke.is_empty() {
            out.push(MigrationOp::RevokePrivileges {
                object_kind: target.kind,
                name: target.name.clone(),
                args: target.args.clone(),
                roles: vec![role.to_string()],
                operations: revoke,
            });
        }
    }

    for (role, to_privileges) in &to {
        let from_privileges = from.get(role).unwrap_or(&empty);
        for with_grant_option in [false, true] {
            let grant: Vec<String> = to_privileges
                .iter()
                .filter(|&(_, &option)| option == with_grant_option)
                .filter(|&(op, &option)| from_privileges.get(op) != Some(&option))
                .map(|(op, _)| op.clone())
                .collect();
            if !grant.is_empty() {
                out.push(MigrationOp::GrantPrivileges {
                    object_kind: target.kind,
                    name: target.name.clone(),
                    args: target.args.clone(),
                    roles: vec![role.to_string()],
                    operations: grant,
                    with_grant_option,
                });
            }
        }
    }
}

/// Owners and grants of schemas, tables, sequences, functions and types. Views are handled
/// with their recreation.
pub(crate) fn diff_privileges(ctx: &DiffContext, schemas: &[&Schema], ops: &mut StagedOps) {
    if !ctx.options.manage_grants && !ctx.options.manage_ownership {
        return;
    }

    for &schema in schemas {
        let old_schema = ctx.old_schema(&schema.name);
        diff_object(
            ctx,
            &Target {
                kind: ObjectKind::Schema,
                name: schema.name.clone(),
                args: None,
                owner: schema.owner.as_deref(),
                grants: &schema.grants,
            },
            old_schema.map(|s| (s.owner.as_deref(), s.grants.as_slice())),
            &mut ops.stage1,
        );

        for table in &schema.tables {
            let previous = ctx
                .old_table_for(&schema.name, &table.name)
                .map(|(_, t)| (t.owner.as_deref(), t.grants.as_slice()));
            diff_object(
                ctx,
                &Target {
                    kind: ObjectKind::Table,
                    name: qualified_name(&schema.name, &table.name),
                    args: None,
                    owner: table.owner.as_deref(),
                    grants: &table.grants,
                },
                previous,
                &mut ops.stage1,
            );
        }

        for sequence in &schema.sequences {
            let previous = old_schema
                .and_then(|s| s.sequence(&sequence.name))
                .map(|q| (q.owner.as_deref(), q.grants.as_slice()));
            diff_object(
                ctx,
                &Target {
                    kind: ObjectKind::Sequence,
                    name: qualified_name(&schema.name, &sequence.name),
                    args: None,
                    owner: sequence.owner.as_deref(),
                    grants: &sequence.grants,
                },
                previous,
                &mut ops.stage1,
            );
        }

        for function in &schema.functions {
            // A changed return type recreates the function without its privileges.
            let previous = old_schema
                .and_then(|s| s.function(&function.signature()))
                .filter(|f| types_equal(&f.returns, &function.returns))
                .map(|f| (f.owner.as_deref(), f.grants.as_slice()));
            diff_object(
                ctx,
                &Target {
                    kind: ObjectKind::Function,
                    name: qualified_name(&schema.name, &function.name),
                    args: Some(function.argument_types()),
                    owner: function.owner.as_deref(),
                    grants: &function.grants,
                },
                previous,
                &mut ops.stage1,
            );
        }

        for type_def in &schema.types {
            let previous = old_schema
                .and_then(|s| s.type_def(&type_def.name))
                .filter(|t| !requires_rebuild(t, type_def))
                .map(|t| (t.owner.as_deref(), &[][..]));
            diff_object(
                ctx,
                &Target {
                    kind: ObjectKind::Type,
                    name: qualified_name(&schema.name, &type_def.name),
                    args: None,
                    owner: type_def.owner.as_deref(),
                    grants: &[],
                },
                previous,
                &mut ops.stage1,
            );
        }
    }
}

/// Owner and grants of a freshly created view.
pub(crate) fn view_privileges(ctx: &DiffContext, schema: &Schema, view: &View, ops: &mut StagedOps) {
    diff_object(
        ctx,
        &Target {
            kind: ObjectKind::View,
            name: qualified_name(&schema.name, &view.name),
            args: None,
            owner: view.owner.as_deref(),
            grants: &view.grants,
        },
        None,
        &mut ops.view_creates,
    );
}
