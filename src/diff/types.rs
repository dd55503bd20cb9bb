//! Enumeration, composite and domain migration.
//!
//! There is no general `ALTER TYPE` for these, so a changed type is rebuilt: every column
//! using it is parked on a placeholder type, the type is dropped and recreated, and the
//! columns are cast back. Two narrower cases avoid the rebuild: enumerations that only gain
//! values, and domains whose base type stays the same.

use super::planner::StagedOps;
use super::tables::columns_of_type;
use super::{ColumnChange, DiffContext, DomainChange, EnumValuePosition, MigrationOp};
use crate::model::{qualified_name, Schema, TypeDef, TypeKind};
use crate::util::{expressions_equal, optional_expressions_equal, types_equal, Result};

pub(crate) fn diff_types(ctx: &DiffContext, schema: &Schema, ops: &mut StagedOps) -> Result<()> {
    let old_schema = ctx.old_schema(&schema.name);

    for type_def in &schema.types {
        let Some(previous) = old_schema.and_then(|s| s.type_def(&type_def.name)) else {
            ops.stage1.push(MigrationOp::CreateType {
                schema: schema.name.clone(),
                type_def: type_def.clone(),
            });
            continue;
        };
        if previous.kind == type_def.kind {
            continue;
        }

        let qualified = qualified_name(&schema.name, &type_def.name);
        if let Some(added) = appended_enum_values(previous, type_def) {
            ops.stage1.extend(added.into_iter().map(|(value, position)| {
                MigrationOp::AddEnumValue {
                    type_name: qualified.clone(),
                    value,
                    position,
                }
            }));
        } else if let Some(changes) = domain_changes(previous, type_def) {
            ops.stage1.extend(changes.into_iter().map(|change| MigrationOp::AlterDomain {
                name: qualified.clone(),
                change,
            }));
        } else {
            rebuild_type(ctx, schema, previous, type_def, ops)?;
        }
    }
    Ok(())
}

/// True when moving from `old` to `new` drops and recreates the type.
pub(crate) fn requires_rebuild(old: &TypeDef, new: &TypeDef) -> bool {
    old.kind != new.kind
        && appended_enum_values(old, new).is_none()
        && domain_changes(old, new).is_none()
}

/// Values added to an enumeration with the position each one is inserted at, or `None`
/// when existing values were removed or reordered.
fn appended_enum_values(
    old: &TypeDef,
    new: &TypeDef,
) -> Option<Vec<(String, Option<EnumValuePosition>)>> {
    let (TypeKind::Enum { values: old_values }, TypeKind::Enum { values: new_values }) =
        (&old.kind, &new.kind)
    else {
        return None;
    };
    let kept: Vec<&String> = new_values
        .iter()
        .filter(|v| old_values.contains(v))
        .collect();
    if kept.len() != old_values.len() || kept.iter().zip(old_values).any(|(a, b)| *a != b) {
        return None;
    }

    let added = new_values
        .iter()
        .enumerate()
        .filter(|(_, v)| !old_values.contains(v))
        .map(|(i, v)| {
            let position = new_values[i + 1..]
                .iter()
                .find(|next| old_values.contains(next))
                .map(|next| EnumValuePosition::Before(next.clone()));
            (v.clone(), position)
        })
        .collect();
    Some(added)
}

/// Targeted `ALTER DOMAIN` changes, or `None` when the base type changed.
fn domain_changes(old: &TypeDef, new: &TypeDef) -> Option<Vec<DomainChange>> {
    let (
        TypeKind::Domain {
            base_type: old_base,
            default: old_default,
            nullable: old_nullable,
            checks: old_checks,
        },
        TypeKind::Domain {
            base_type,
            default,
            nullable,
            checks,
        },
    ) = (&old.kind, &new.kind)
    else {
        return None;
    };
    if !types_equal(old_base, base_type) {
        return None;
    }

    let mut changes = Vec::new();
    if !optional_expressions_equal(old_default, default) {
        changes.push(match default {
            Some(d) => DomainChange::SetDefault(d.clone()),
            None => DomainChange::DropDefault,
        });
    }
    for check in old_checks {
        let kept = checks
            .iter()
            .any(|c| c.name == check.name && expressions_equal(&c.definition, &check.definition));
        if !kept {
            changes.push(DomainChange::DropCheck(check.name.clone()));
        }
    }
    if old_nullable != nullable {
        changes.push(if *nullable {
            DomainChange::DropNotNull
        } else {
            DomainChange::SetNotNull
        });
    }
    for check in checks {
        let existing = old_checks
            .iter()
            .any(|c| c.name == check.name && expressions_equal(&c.definition, &check.definition));
        if !existing {
            changes.push(DomainChange::AddCheck(check.clone()));
        }
    }
    Some(changes)
}

fn rebuild_type(
    ctx: &DiffContext,
    schema: &Schema,
    previous: &TypeDef,
    type_def: &TypeDef,
    ops: &mut StagedOps,
) -> Result<()> {
    let qualified = qualified_name(&schema.name, &type_def.name);
    let placeholder = match previous.kind {
        TypeKind::Domain { ref base_type, .. } => base_type.clone(),
        _ => ctx.renderer.placeholder_type().to_string(),
    };
    let restore_via_text = !matches!(type_def.kind, TypeKind::Domain { .. });

    // Type migration runs before any table rename, so columns are addressed by old names.
    let columns = match ctx.old {
        Some(old) => columns_of_type(old, &ctx.old_order, &schema.name, &previous.name)?,
        None => Vec::new(),
    };

    for &(s, t, column) in &columns {
        let table = qualified_name(&s.name, &t.name);
        let quoted = ctx.renderer.quote_ident(&column.name);
        if column.default.is_some() {
            ops.stage1.push(MigrationOp::AlterColumn {
                table: table.clone(),
                column: column.name.clone(),
                change: ColumnChange::DropDefault,
            });
        }
        ops.stage1.push(MigrationOp::AlterColumn {
            table,
            column: column.name.clone(),
            change: ColumnChange::Type {
                data_type: placeholder.clone(),
                using: Some(format!("{quoted}::{placeholder}")),
            },
        });
    }

    ops.stage1.push(MigrationOp::DropType {
        name: qualified.clone(),
        domain: matches!(previous.kind, TypeKind::Domain { .. }),
    });
    ops.stage1.push(MigrationOp::CreateType {
        schema: schema.name.clone(),
        type_def: type_def.clone(),
    });

    let target = ctx.renderer.quote_qualified(&schema.name, &type_def.name);
    for &(s, t, column) in &columns {
        let table = qualified_name(&s.name, &t.name);
        let quoted = ctx.renderer.quote_ident(&column.name);
        let using = if restore_via_text {
            format!("{quoted}::text::{target}")
        } else {
            format!("{quoted}::{target}")
        };
        ops.stage1.push(MigrationOp::AlterColumn {
            table: table.clone(),
            column: column.name.clone(),
            change: ColumnChange::Type {
                data_type: target.clone(),
                using: Some(using),
            },
        });
        if let Some(ref default) = column.default {
            ops.stage1.push(MigrationOp::AlterColumn {
                table,
                column: column.name.clone(),
                change: ColumnChange::SetDefault(default.clone()),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DomainCheck;

    fn enum_type(values: &[&str]) -> TypeDef {
        TypeDef {
            name: "mood".to_string(),
            owner: None,
            kind: TypeKind::Enum {
                values: values.iter().map(|v| v.to_string()).collect(),
            },
        }
    }

    fn domain(base: &str, nullable: bool, checks: &[(&str, &str)]) -> TypeDef {
        TypeDef {
            name: "amount".to_string(),
            owner: None,
            kind: TypeKind::Domain {
                base_type: base.to_string(),
                default: None,
                nullable,
                checks: checks
                    .iter()
                    .map(|(n, d)| DomainCheck {
                        name: n.to_string(),
                        definition: d.to_string(),
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn enum_values_added_in_place() {
        let old = enum_type(&["happy", "sad"]);
        let new = enum_type(&["ecstatic", "happy", "meh", "sad", "angry"]);
        let added = appended_enum_values(&old, &new).unwrap();
        assert_eq!(
            added,
            vec![
                (
                    "ecstatic".to_string(),
                    Some(EnumValuePosition::Before("happy".to_string()))
                ),
                (
                    "meh".to_string(),
                    Some(EnumValuePosition::Before("sad".to_string()))
                ),
                ("angry".to_string(), None),
            ]
        );
        assert!(!requires_rebuild(&old, &new));
    }

    #[test]
    fn removed_or_reordered_enum_values_force_rebuild() {
        let old = enum_type(&["happy", "sad"]);
        assert!(appended_enum_values(&old, &enum_type(&["happy"])).is_none());
        assert!(appended_enum_values(&old, &enum_type(&["sad", "happy"])).is_none());
        assert!(requires_rebuild(&old, &enum_type(&["sad", "happy"])));
    }

    #[test]
    fn domain_with_same_base_is_altered() {
        let old = domain("numeric", true, &[("positive", "VALUE > 0")]);
        let new = domain("NUMERIC", false, &[("small", "VALUE < 100")]);
        let changes = domain_changes(&old, &new).unwrap();
        assert_eq!(
            changes,
            vec![
                DomainChange::DropCheck("positive".to_string()),
                DomainChange::SetNotNull,
                DomainChange::AddCheck(DomainCheck {
                    name: "small".to_string(),
                    definition: "VALUE < 100".to_string(),
                }),
            ]
        );
    }

    #[test]
    fn domain_with_new_base_is_rebuilt() {
        let old = domain("numeric", true, &[]);
        let new = domain("integer", true, &[]);
        assert!(domain_changes(&old, &new).is_none());
        assert!(requires_rebuild(&old, &new));
    }
}
