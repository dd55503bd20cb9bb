pub mod constraints;
pub mod data;
pub mod dependencies;
pub mod grants;
pub mod objects;
pub mod planner;
pub mod table_elements;
pub mod tables;
pub mod types;

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::model::validate::validate_database;
use crate::model::{
    Constraint, Database, DomainCheck, Function, Index, Schema, Sequence, Stage, Table, Trigger,
    TypeDef, View,
};
use crate::render::Renderer;
use crate::util::{Result, SchemaError};

pub use dependencies::DependencyItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Schema,
    Table,
    Sequence,
    Function,
    View,
    Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentTarget {
    Schema(String),
    Table(String),
    Column { table: String, column: String },
    View(String),
}

/// A column as it appears in `CREATE TABLE` or `ADD COLUMN`, with its type already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnChange {
    Type {
        data_type: String,
        using: Option<String>,
    },
    SetDefault(String),
    DropDefault,
    SetNotNull,
    DropNotNull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainChange {
    SetDefault(String),
    DropDefault,
    SetNotNull,
    DropNotNull,
    AddCheck(DomainCheck),
    DropCheck(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumValuePosition {
    Before(String),
    After(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceChanges {
    pub start: Option<i64>,
    pub increment: Option<i64>,
    pub min_value: Option<Option<i64>>,
    pub max_value: Option<Option<i64>>,
    pub cache: Option<i64>,
    pub cycle: Option<bool>,
    pub owned_by: Option<Option<String>>,
}

impl SequenceChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialValue {
    /// Next value handed out is exactly this.
    Start(i64),
    /// Next value follows the largest value present in the column.
    AfterMax,
}

/// Dialect-independent description of one change. Table, sequence, type and view names are
/// schema-qualified (`schema.name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOp {
    Comment(String),
    CustomSql(String),
    CreateSchema(String),
    DropSchema(String),
    CreateType {
        schema: String,
        type_def: TypeDef,
    },
    DropType {
        name: String,
        domain: bool,
    },
    AddEnumValue {
        type_name: String,
        value: String,
        position: Option<EnumValuePosition>,
    },
    AlterDomain {
        name: String,
        change: DomainChange,
    },
    CreateSequence {
        schema: String,
        sequence: Sequence,
    },
    AlterSequence {
        name: String,
        changes: SequenceChanges,
    },
    DropSequence(String),
    SetSerialValue {
        table: String,
        column: String,
        value: SerialValue,
    },
    CreateFunction {
        schema: String,
        function: Function,
        replace: bool,
    },
    DropFunction {
        name: String,
        args: String,
    },
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
        inherits: Option<String>,
    },
    DropTable(String),
    SetTableSchema {
        table: String,
        schema: String,
    },
    RenameTable {
        table: String,
        new_name: String,
    },
    AddColumn {
        table: String,
        column: ColumnDef,
    },
    DropColumn {
        table: String,
        column: String,
    },
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    AlterColumn {
        table: String,
        column: String,
        change: ColumnChange,
    },
    /// Populate NULLs of a column: with `value`, or with the column default when `None`.
    BackfillColumn {
        table: String,
        column: String,
        value: Option<String>,
    },
    AddConstraint(Constraint),
    DropConstraint {
        table: String,
        name: String,
    },
    CreateIndex {
        table: String,
        index: Index,
    },
    DropIndex {
        schema: String,
        name: String,
    },
    SetCluster {
        table: String,
        index: Option<String>,
    },
    CreateTrigger {
        schema: String,
        trigger: Trigger,
    },
    DropTrigger {
        table: String,
        name: String,
    },
    CreateView {
        schema: String,
        view: View,
    },
    DropView(String),
    AlterOwner {
        object_kind: ObjectKind,
        name: String,
        args: Option<String>,
        owner: String,
    },
    GrantPrivileges {
        object_kind: ObjectKind,
        name: String,
        args: Option<String>,
        roles: Vec<String>,
        operations: Vec<String>,
        with_grant_option: bool,
    },
    RevokePrivileges {
        object_kind: ObjectKind,
        name: String,
        args: Option<String>,
        roles: Vec<String>,
        operations: Vec<String>,
    },
    SetComment {
        target: CommentTarget,
        text: Option<String>,
    },
    /// Row values are rendered literals.
    InsertRow {
        table: String,
        columns: Vec<String>,
        values: Vec<String>,
    },
    UpdateRow {
        table: String,
        assignments: Vec<(String, String)>,
        key: Vec<(String, String)>,
        previous: Vec<(String, String)>,
    },
    DeleteRow {
        table: String,
        key: Vec<(String, String)>,
    },
}

/// One operation placed in its stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOp {
    pub stage: Stage,
    pub op: MigrationOp,
}

#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Follow `old_name`/`old_schema` markers to find an object's previous identity.
    pub rename_tracking: bool,
    /// The stages will be concatenated and run as one script.
    pub single_stage: bool,
    pub only_schema_sql: bool,
    pub only_data_sql: bool,
    pub manage_grants: bool,
    pub manage_ownership: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            rename_tracking: true,
            single_stage: false,
            only_schema_sql: false,
            only_data_sql: false,
            manage_grants: true,
            manage_ownership: true,
        }
    }
}

impl DiffOptions {
    pub fn ignore_old_names(mut self) -> Self {
        self.rename_tracking = false;
        self
    }

    pub fn with_single_stage(mut self, single_stage: bool) -> Self {
        self.single_stage = single_stage;
        self
    }

    pub fn with_only_schema_sql(mut self, only: bool) -> Self {
        self.only_schema_sql = only;
        self
    }

    pub fn with_only_data_sql(mut self, only: bool) -> Self {
        self.only_data_sql = only;
        self
    }

    pub fn with_manage_grants(mut self, manage: bool) -> Self {
        self.manage_grants = manage;
        self
    }

    pub fn with_manage_ownership(mut self, manage: bool) -> Self {
        self.manage_ownership = manage;
        self
    }

    pub(crate) fn emit_schema(&self) -> bool {
        !self.only_data_sql
    }

    pub(crate) fn emit_data(&self) -> bool {
        !self.only_schema_sql
    }
}

type TableKey = (String, String);

/// Everything a diff run reads: both trees, their dependency orders and the table
/// correspondence across versions.
pub struct DiffContext<'a> {
    pub old: Option<&'a Database>,
    pub new: &'a Database,
    pub new_order: Vec<DependencyItem>,
    pub old_order: Vec<DependencyItem>,
    pub options: &'a DiffOptions,
    pub renderer: &'a dyn Renderer,
    new_to_old: HashMap<TableKey, TableKey>,
    old_to_new: HashMap<TableKey, TableKey>,
}

impl<'a> DiffContext<'a> {
    pub fn new(
        old: Option<&'a Database>,
        new: &'a Database,
        new_order: Option<&[DependencyItem]>,
        old_order: Option<&[DependencyItem]>,
        renderer: &'a dyn Renderer,
        options: &'a DiffOptions,
    ) -> Result<Self> {
        let new_order = match new_order {
            Some(order) => {
                check_order("new", order, new, old)?;
                order.to_vec()
            }
            None => {
                debug!("no dependency order supplied for new tree; using declaration order");
                dependencies::natural_order(new)
            }
        };
        let old_order = match (old, old_order) {
            (Some(old_db), Some(order)) => {
                check_order("old", order, old_db, Some(new))?;
                order.to_vec()
            }
            (Some(old_db), None) => {
                debug!("no dependency order supplied for old tree; using declaration order");
                dependencies::natural_order(old_db)
            }
            (None, _) => Vec::new(),
        };

        let mut new_to_old = HashMap::new();
        let mut old_to_new = HashMap::new();
        if let Some(old_db) = old {
            for (schema, table) in new.tables() {
                let Some(key) = counterpart_key(old_db, schema, table, options.rename_tracking)?
                else {
                    continue;
                };
                let new_key = (schema.name.clone(), table.name.clone());
                if let Some(previous) = old_to_new.insert(key.clone(), new_key.clone()) {
                    return Err(SchemaError::definition(
                        format!("{}.{}", new_key.0, new_key.1),
                        format!(
                            "{}.{} is already the previous version of {}.{}",
                            key.0, key.1, previous.0, previous.1
                        ),
                    ));
                }
                new_to_old.insert(new_key, key);
            }
        }

        Ok(Self {
            old,
            new,
            new_order,
            old_order,
            options,
            renderer,
            new_to_old,
            old_to_new,
        })
    }

    /// The old version of a new table, following rename markers.
    pub fn old_table_for(&self, schema: &str, table: &str) -> Option<(&'a Schema, &'a Table)> {
        let old = self.old?;
        let (s, t) = self
            .new_to_old
            .get(&(schema.to_string(), table.to_string()))?;
        old.table(s, t)
    }

    /// The new version of an old table, following rename markers.
    pub fn new_table_for(&self, schema: &str, table: &str) -> Option<(&'a Schema, &'a Table)> {
        let (s, t) = self
            .old_to_new
            .get(&(schema.to_string(), table.to_string()))?;
        self.new.table(s, t)
    }

    pub fn old_schema(&self, name: &str) -> Option<&'a Schema> {
        self.old.and_then(|db| db.schema(name))
    }

    pub fn is_upgrade(&self) -> bool {
        self.old.is_some()
    }

    /// Schema names in the order their first item appears in `order`, followed by any schema
    /// of `db` the order does not mention.
    pub(crate) fn schemas_in_order(order: &[DependencyItem], db: &'a Database) -> Vec<&'a Schema> {
        let mut seen = HashSet::new();
        let mut schemas = Vec::new();
        for item in order {
            if seen.insert(item.schema.as_str()) {
                if let Some(schema) = db.schema(&item.schema) {
                    schemas.push(schema);
                }
            }
        }
        for schema in &db.schemas {
            if seen.insert(schema.name.as_str()) {
                schemas.push(schema);
            }
        }
        schemas
    }
}

/// Old `(schema, table)` a new table continues.
fn counterpart_key(
    old: &Database,
    schema: &Schema,
    table: &Table,
    rename_tracking: bool,
) -> Result<Option<TableKey>> {
    let identity = (schema.name.clone(), table.name.clone());
    let identity_exists = old.table(&identity.0, &identity.1).is_some();

    if rename_tracking && (table.old_name.is_some() || table.old_schema.is_some()) {
        let marker = (
            table.old_schema.clone().unwrap_or_else(|| schema.name.clone()),
            table.old_name.clone().unwrap_or_else(|| table.name.clone()),
        );
        if marker != identity && old.table(&marker.0, &marker.1).is_some() {
            if identity_exists {
                return Err(SchemaError::definition(
                    format!("{}.{}", identity.0, identity.1),
                    format!(
                        "ambiguous rename: both {}.{} and {}.{} exist in the previous version",
                        marker.0, marker.1, identity.0, identity.1
                    ),
                ));
            }
            return Ok(Some(marker));
        }
    }

    Ok(identity_exists.then_some(identity))
}

fn check_order(
    label: &str,
    order: &[DependencyItem],
    db: &Database,
    other: Option<&Database>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for item in order {
        if !seen.insert(item) {
            return Err(SchemaError::InvalidOrder(format!(
                "{label} order lists {item} more than once"
            )));
        }
        let known = match item.table {
            Some(ref table) => {
                db.table(&item.schema, table).is_some()
                    || other.is_some_and(|o| o.table(&item.schema, table).is_some())
            }
            None => {
                db.schema(&item.schema).is_some()
                    || other.is_some_and(|o| o.schema(&item.schema).is_some())
            }
        };
        if !known {
            return Err(SchemaError::InvalidOrder(format!(
                "{label} order references {item}, which exists in neither version"
            )));
        }
    }
    for (schema, table) in db.tables() {
        let item = DependencyItem::table(&schema.name, &table.name);
        if !seen.contains(&item) {
            return Err(SchemaError::InvalidOrder(format!(
                "{label} order does not mention {item}"
            )));
        }
    }
    Ok(())
}

/// Diff two trees with orders computed by the dependency resolver. `old: None` produces the
/// full creation script for `new`.
pub fn compute_diff(
    old: Option<&Database>,
    new: &Database,
    renderer: &dyn Renderer,
    options: &DiffOptions,
) -> Result<Vec<PlannedOp>> {
    validate_database(new)?;
    if let Some(old) = old {
        validate_database(old)?;
    }
    let new_order = dependencies::order(new);
    let old_order = old.map(dependencies::order);
    let ctx = DiffContext::new(
        old,
        new,
        Some(&new_order),
        old_order.as_deref(),
        renderer,
        options,
    )?;
    planner::plan(&ctx)
}

/// Diff two trees with caller-supplied dependency orders; `None` falls back to declaration
/// order.
pub fn compute_diff_with_orders(
    old: Option<&Database>,
    new: &Database,
    new_order: Option<&[DependencyItem]>,
    old_order: Option<&[DependencyItem]>,
    renderer: &dyn Renderer,
    options: &DiffOptions,
) -> Result<Vec<PlannedOp>> {
    validate_database(new)?;
    if let Some(old) = old {
        validate_database(old)?;
    }
    let ctx = DiffContext::new(old, new, new_order, old_order, renderer, options)?;
    planner::plan(&ctx)
}
