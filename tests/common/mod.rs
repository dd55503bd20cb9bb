#![allow(unused_imports, dead_code)]

pub use ddlstage::diff::dependencies::{depends_on, order};
pub use ddlstage::diff::{compute_diff, DependencyItem, DiffOptions, MigrationOp};
pub use ddlstage::model::{Database, Stage};
pub use ddlstage::parser::parse_definition_str;
pub use ddlstage::pg::PostgresRenderer;
pub use ddlstage::render::render_plan;
pub use ddlstage::util::SchemaError;
pub use serde_json::json;
pub use tempfile;

pub fn parse(value: serde_json::Value) -> Database {
    parse_definition_str(&value.to_string()).unwrap()
}

/// Stage texts of `old -> new`, stages 1 to 4.
pub fn diff_sql_with(
    old: Option<&Database>,
    new: &Database,
    options: &DiffOptions,
) -> Result<[String; 4], SchemaError> {
    let renderer = PostgresRenderer::default();
    let plan = compute_diff(old, new, &renderer, options)?;
    let script = render_plan(&renderer, &plan);
    Ok(Stage::ALL.map(|stage| script.stage_sql(stage)))
}

pub fn diff_sql(old: Option<&Database>, new: &Database) -> [String; 4] {
    diff_sql_with(old, new, &DiffOptions::default()).unwrap()
}

/// One schema `app` holding the given tables.
pub fn app(tables: serde_json::Value) -> Database {
    parse(json!({"schemas": [{"name": "app", "tables": tables}]}))
}

pub fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
