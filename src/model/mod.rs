//! Schema Tree: the read-only, per-version model of a database definition.
//!
//! Trees are produced by an external provider (here: JSON through [`crate::parser`]) and are
//! never mutated by the differ.

pub mod resolve;
pub mod validate;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Database {
    #[serde(default)]
    pub schemas: Vec<Schema>,
    /// Free-form statements tagged with the stage they belong to.
    #[serde(default)]
    pub sql: Vec<CustomSql>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub grants: Vec<Grant>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub views: Vec<View>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Name this table had in the previous release.
    #[serde(default)]
    pub old_name: Option<String>,
    /// Schema this table lived in during the previous release.
    #[serde(default)]
    pub old_schema: Option<String>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub primary_key_name: Option<String>,
    #[serde(default)]
    pub inherits: Option<TableRef>,
    #[serde(default)]
    pub cluster_index: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDecl>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub grants: Vec<Grant>,
    #[serde(default)]
    pub rows: Option<Rows>,
}

/// Reference to a table, optionally outside the referencing object's schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TableRef {
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
}

impl TableRef {
    pub fn schema_or<'a>(&'a self, default_schema: &'a str) -> &'a str {
        self.schema.as_deref().unwrap_or(default_schema)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    #[serde(default, rename = "type")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub foreign_key: Option<ForeignKeyRef>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Default as SQL expression text (`'abc'`, `0`, `NULL`, `now()`).
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub old_name: Option<String>,
    /// Expression used in `ALTER COLUMN … TYPE … USING` when the type changes.
    #[serde(default)]
    pub convert_using: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Explicit first value of an auto-incrementing column.
    #[serde(default)]
    pub serial_start: Option<i64>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: Some(data_type.into()),
            foreign_key: None,
            nullable: true,
            default: None,
            unique: false,
            old_name: None,
            convert_using: None,
            description: None,
            serial_start: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKeyRef {
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
    /// Referenced column; defaults to the referencing column's name.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub on_delete: Option<ReferentialAction>,
    #[serde(default)]
    pub on_update: Option<ReferentialAction>,
    #[serde(default)]
    pub constraint_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
}

impl ConstraintKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "PRIMARY KEY",
            ConstraintKind::ForeignKey => "FOREIGN KEY",
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::Check => "CHECK",
        }
    }
}

/// A constraint as declared on a table. The differ works on [`Constraint`], which also
/// covers primary keys and inline foreign keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintDecl {
    pub name: String,
    pub kind: ConstraintKind,
    /// Text following the kind keyword, e.g. `(a, b)` or `(org_id) REFERENCES app.orgs (id)`.
    pub definition: String,
    /// Target of a foreign key; parsed from `definition` when absent.
    #[serde(default)]
    pub references: Option<TableRef>,
    #[serde(default)]
    pub on_delete: Option<ReferentialAction>,
    #[serde(default)]
    pub on_update: Option<ReferentialAction>,
}

/// Unified constraint record synthesized from explicit declarations, the primary-key
/// attribute and inline foreign keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub name: String,
    pub schema: String,
    pub table: String,
    pub kind: ConstraintKind,
    pub definition: String,
    pub references: Option<(String, String)>,
    /// Local columns of an inline foreign key or primary key.
    pub columns: Vec<String>,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    #[serde(default)]
    pub unique: bool,
    /// Access method (`btree`, `gin`, …).
    #[serde(default)]
    pub method: Option<String>,
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub predicate: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rows {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "RowRepr", into = "RowRepr")]
pub struct Row {
    pub cells: Vec<Cell>,
    /// The row must not exist.
    pub delete: bool,
}

impl Row {
    /// Cell at `index`; `None` when the row is shorter than the column list.
    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RowRepr {
    Cells(Vec<Cell>),
    Full {
        cells: Vec<Cell>,
        #[serde(default)]
        delete: bool,
    },
}

impl From<RowRepr> for Row {
    fn from(repr: RowRepr) -> Self {
        match repr {
            RowRepr::Cells(cells) => Row {
                cells,
                delete: false,
            },
            RowRepr::Full { cells, delete } => Row { cells, delete },
        }
    }
}

impl From<Row> for RowRepr {
    fn from(row: Row) -> Self {
        if row.delete {
            RowRepr::Full {
                cells: row.cells,
                delete: true,
            }
        } else {
            RowRepr::Cells(row.cells)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "CellRepr", into = "CellRepr")]
pub struct Cell {
    pub value: Option<String>,
    pub null: bool,
    pub empty: bool,
    /// `value` is a raw SQL expression and must not be escaped.
    pub sql: bool,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn null() -> Self {
        Self {
            null: true,
            ..Default::default()
        }
    }

    pub fn raw_sql(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            sql: true,
            ..Default::default()
        }
    }

    /// Identity used when matching rows by primary key.
    pub fn identity(&self) -> String {
        if self.null {
            return "NULL".to_string();
        }
        if self.empty {
            return String::new();
        }
        self.value.clone().unwrap_or_else(|| "NULL".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum CellRepr {
    Text(String),
    Null(()),
    Full {
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        null: bool,
        #[serde(default)]
        empty: bool,
        #[serde(default)]
        sql: bool,
    },
}

impl From<CellRepr> for Cell {
    fn from(repr: CellRepr) -> Self {
        match repr {
            CellRepr::Text(value) => Cell::text(value),
            CellRepr::Null(()) => Cell::null(),
            CellRepr::Full {
                value,
                null,
                empty,
                sql,
            } => Cell {
                value,
                null,
                empty,
                sql,
            },
        }
    }
}

impl From<Cell> for CellRepr {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell {
                value: Some(value),
                null: false,
                empty: false,
                sql: false,
            } => CellRepr::Text(value),
            Cell {
                value,
                null,
                empty,
                sql,
            } => CellRepr::Full {
                value,
                null,
                empty,
                sql,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sequence {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub increment: Option<i64>,
    #[serde(default)]
    pub min_value: Option<i64>,
    #[serde(default)]
    pub max_value: Option<i64>,
    #[serde(default)]
    pub cache: Option<i64>,
    #[serde(default)]
    pub cycle: bool,
    /// `table.column` owning the sequence.
    #[serde(default)]
    pub owned_by: Option<String>,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeDef {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(flatten)]
    pub kind: TypeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeKind {
    Enum {
        values: Vec<String>,
    },
    Composite {
        fields: Vec<TypeField>,
    },
    Domain {
        base_type: String,
        #[serde(default)]
        default: Option<String>,
        #[serde(default = "default_true")]
        nullable: bool,
        #[serde(default)]
        checks: Vec<DomainCheck>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeField {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainCheck {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct View {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub query: String,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub arguments: Vec<FunctionArg>,
    pub returns: String,
    pub language: String,
    /// Function body, emitted verbatim.
    pub definition: String,
    #[serde(default)]
    pub volatility: Option<Volatility>,
    #[serde(default)]
    pub security_definer: bool,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl Function {
    /// Argument types joined the way they appear in a signature.
    pub fn argument_types(&self) -> String {
        self.arguments
            .iter()
            .map(|a| a.data_type.to_lowercase())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.argument_types())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionArg {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    Immutable,
    Stable,
    Volatile,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trigger {
    pub name: String,
    pub table: String,
    pub timing: TriggerTiming,
    pub events: Vec<TriggerEvent>,
    #[serde(default)]
    pub for_each: TriggerLevel,
    /// Function call executed by the trigger, e.g. `app.touch_updated()`.
    pub function: String,
    #[serde(default)]
    pub when: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
    Truncate,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerLevel {
    #[default]
    Row,
    Statement,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Grant {
    pub roles: Vec<String>,
    pub operations: Vec<String>,
    #[serde(default)]
    pub with_grant_option: bool,
}

/// The four ordered phases of an upgrade script.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Additive changes.
    Stage1,
    /// Static data reconciliation.
    Stage2,
    /// Destructive and constraining changes, view recreation.
    Stage3,
    /// Statements explicitly tagged to run last.
    Stage4,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Stage1, Stage::Stage2, Stage::Stage3, Stage::Stage4];

    pub fn number(&self) -> usize {
        match self {
            Stage::Stage1 => 1,
            Stage::Stage2 => 2,
            Stage::Stage3 => 3,
            Stage::Stage4 => 4,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage{}", self.number())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomSql {
    pub stage: Stage,
    /// Emit at the start of the stage instead of the end.
    #[serde(default)]
    pub before: bool,
    pub text: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    pub fn table(&self, schema: &str, table: &str) -> Option<(&Schema, &Table)> {
        let schema = self.schema(schema)?;
        schema.table(table).map(|t| (schema, t))
    }

    /// Every table with its schema, in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = (&Schema, &Table)> {
        self.schemas
            .iter()
            .flat_map(|s| s.tables.iter().map(move |t| (s, t)))
    }

    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        // Plain data with string keys; serialization cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        let hash = Sha256::digest(json.as_bytes());
        hex::encode(hash)
    }
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.name == name)
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|v| v.name == name)
    }

    pub fn function(&self, signature: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.signature() == signature)
    }

    pub fn triggers_on<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Trigger> {
        self.triggers.iter().filter(move |t| t.table == table)
    }
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

pub fn qualified_name(schema: &str, name: &str) -> String {
    format!("{schema}.{name}")
}

/// Split `schema.name`; an unqualified name lands in `public`.
pub fn parse_qualified_name(qualified: &str) -> (String, String) {
    match qualified.split_once('.') {
        Some((schema, name)) => (schema.to_string(), name.to_string()),
        None => ("public".to_string(), qualified.to_string()),
    }
}
