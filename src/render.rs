//! The per-dialect rendering seam and the staged statement list it produces.

use crate::diff::{MigrationOp, PlannedOp};
use crate::model::{parse_qualified_name, Cell, Stage};

/// Dialect-specific SQL text for planned operations.
pub trait Renderer {
    fn name(&self) -> &'static str;

    fn quote_ident(&self, ident: &str) -> String;

    fn quote_qualified(&self, schema: &str, name: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(name))
    }

    /// Quote a `schema.name` string.
    fn quote_qualified_name(&self, qualified: &str) -> String {
        let (schema, name) = parse_qualified_name(qualified);
        self.quote_qualified(&schema, &name)
    }

    /// Name given to a primary key declared without one.
    fn primary_key_name(&self, table: &str) -> String {
        format!("{table}_pkey")
    }

    /// Name given to an inline foreign key declared without one.
    fn foreign_key_name(&self, table: &str, column: &str) -> String {
        format!("{table}_{column}_fkey")
    }

    /// Name of the index a column's `unique` flag stands for.
    fn unique_index_name(&self, table: &str, column: &str) -> String {
        format!("{table}_{column}_key")
    }

    /// Neutral type columns are parked on while an enumeration is rebuilt.
    fn placeholder_type(&self) -> &'static str {
        "text"
    }

    /// Literal for a row cell of the given column type.
    fn literal(&self, data_type: &str, cell: &Cell) -> String;

    fn render(&self, op: &MigrationOp) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedStatement {
    pub stage: Stage,
    pub sql: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedScript {
    pub statements: Vec<StagedStatement>,
}

impl StagedScript {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn stage(&self, stage: Stage) -> impl Iterator<Item = &str> {
        self.statements
            .iter()
            .filter(move |s| s.stage == stage)
            .map(|s| s.sql.as_str())
    }

    pub fn stage_len(&self, stage: Stage) -> usize {
        self.stage(stage).count()
    }

    /// Statements of one stage, newline-separated.
    pub fn stage_sql(&self, stage: Stage) -> String {
        let mut out = String::new();
        for sql in self.stage(stage) {
            out.push_str(sql);
            out.push('\n');
        }
        out
    }

    /// All stages concatenated in execution order.
    pub fn to_sql(&self) -> String {
        Stage::ALL.iter().map(|s| self.stage_sql(*s)).collect()
    }
}

pub fn render_plan(renderer: &dyn Renderer, plan: &[PlannedOp]) -> StagedScript {
    let statements = plan
        .iter()
        .flat_map(|planned| {
            renderer
                .render(&planned.op)
                .into_iter()
                .map(move |sql| StagedStatement {
                    stage: planned.stage,
                    sql,
                })
        })
        .collect();
    StagedScript { statements }
}
