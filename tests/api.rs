use std::fs;
use std::path::Path;

use ddlstage::prelude::*;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// A release split across files: one per table, plus shared settings.
fn release(dir: &Path, with_email: bool) {
    write(
        dir,
        "app.json",
        r#"{"schemas": [{"name": "app", "owner": "app_owner"}]}"#,
    );
    let users = if with_email {
        r#"{"schemas": [{"name": "app", "tables": [{"name": "users", "primary_key": ["id"], "columns": [
            {"name": "id", "type": "integer"}, {"name": "email", "type": "text"}
        ]}]}]}"#
    } else {
        r#"{"schemas": [{"name": "app", "tables": [{"name": "users", "primary_key": ["id"], "columns": [
            {"name": "id", "type": "integer"}
        ]}]}]}"#
    };
    write(dir, "tables/users.json", users);
    write(
        dir,
        "tables/orders.json",
        r#"{"schemas": [{"name": "app", "owner": "app_owner", "tables": [{"name": "orders", "columns": [
            {"name": "id", "type": "integer"},
            {"name": "user_id", "foreign_key": {"table": "users", "column": "id"}}
        ]}]}], "sql": [{"stage": "stage4", "text": "ANALYZE app.orders;"}]}"#,
    );
}

fn source(dir: &Path) -> Vec<String> {
    vec![dir.to_string_lossy().into_owned()]
}

#[test]
fn upgrade_between_directories() {
    let root = TempDir::new().unwrap();
    let (old, new) = (root.path().join("r1"), root.path().join("r2"));
    release(&old, false);
    release(&new, true);

    let result = upgrade(&UpgradeOptions::new(source(&old), source(&new))).unwrap();

    assert_eq!(result.stage_counts(), [1, 0, 0, 0]);
    assert_eq!(
        stage_text(&result, Stage::Stage1),
        "ALTER TABLE app.users ADD COLUMN email text;\n"
    );
    assert!(result.operations.iter().all(|p| p.stage == Stage::Stage1));
    assert_ne!(result.old_fingerprint.as_deref(), Some(result.new_fingerprint.as_str()));
}

#[test]
fn split_definition_builds_in_dependency_order() {
    let dir = TempDir::new().unwrap();
    release(dir.path(), false);

    let result = build(&BuildOptions::new(source(dir.path()))).unwrap();
    let stage1 = stage_text(&result, Stage::Stage1);

    let users = stage1.find("CREATE TABLE app.users").unwrap();
    let orders = stage1.find("CREATE TABLE app.orders").unwrap();
    assert!(users < orders);
    assert!(stage1.contains("ALTER SCHEMA app OWNER TO app_owner;"));
    assert_eq!(stage_text(&result, Stage::Stage4), "ANALYZE app.orders;\n");

    let order = dependency_order(&source(dir.path())).unwrap();
    let names: Vec<String> = order.items.iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["app.users", "app.orders"]);
}

#[test]
fn conflicting_schema_owners_fail_to_load() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.json", r#"{"schemas": [{"name": "app", "owner": "alice"}]}"#);
    write(dir.path(), "b.json", r#"{"schemas": [{"name": "app", "owner": "bob"}]}"#);

    let err = build(&BuildOptions::new(source(dir.path()))).unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
    assert!(err.to_string().contains("conflicting owner"));
}

#[test]
fn malformed_json_names_the_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "broken.json", r#"{"schemas": [{"name": "app",}]}"#);

    let err = build(&BuildOptions::new(source(dir.path()))).unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
    assert!(err.to_string().contains("broken.json"));
}

#[test]
fn long_stages_roll_over_into_numbered_files() {
    let dir = TempDir::new().unwrap();
    let defs = dir.path().join("defs");
    let out = dir.path().join("out");
    release(&defs, true);

    let options = BuildOptions::new(source(&defs))
        .with_output_dir(&out)
        .with_prefix("v2")
        .with_statements_per_file(2);
    let result = build(&options).unwrap();

    let stage1_len = result.stage_counts()[0];
    assert!(stage1_len > 2);
    let parts = stage1_len.div_ceil(2);
    assert_eq!(result.files.len(), parts + 3);
    assert!(out.join("v2_stage1.sql").exists());
    assert!(out.join("v2_stage1_2.sql").exists());

    let second = fs::read_to_string(out.join("v2_stage1_2.sql")).unwrap();
    assert!(second.starts_with(&format!("-- ddlstage stage1 (part 2 of {parts})\n")));
    assert!(fs::read_to_string(out.join("v2_stage2.sql"))
        .unwrap()
        .starts_with("-- ddlstage stage2\n-- to:   "));
}

#[test]
fn quoting_every_name_is_an_output_choice() {
    let dir = TempDir::new().unwrap();
    release(dir.path(), false);

    let result = build(&BuildOptions::new(source(dir.path())).quote_all_names()).unwrap();
    assert!(stage_text(&result, Stage::Stage1).contains("CREATE TABLE \"app\".\"users\""));
}
