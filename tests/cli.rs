use std::fs;
use std::path::Path;

use assert_cmd::Command;
use tempfile::TempDir;

const OLD: &str = r#"{"schemas": [{"name": "app", "tables": [
    {"name": "users", "primary_key": ["id"], "columns": [{"name": "id", "type": "integer"}]}
]}]}"#;

const NEW: &str = r#"{"schemas": [{"name": "app", "tables": [
    {"name": "users", "primary_key": ["id"], "columns": [
        {"name": "id", "type": "integer"},
        {"name": "email", "type": "text"}
    ]},
    {"name": "sessions", "primary_key": ["id"], "columns": [
        {"name": "id", "type": "integer"},
        {"name": "user_id", "foreign_key": {"table": "users", "column": "id"}}
    ]}
]}]}"#;

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

fn ddlstage() -> Command {
    let mut cmd = Command::cargo_bin("ddlstage").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn build_prints_stages_to_stdout() {
    let dir = TempDir::new().unwrap();
    let new = write(dir.path(), "new.json", NEW);

    let assert = ddlstage().args(["build", &new]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

    assert!(stdout.starts_with("-- stage1\n"));
    assert!(stdout.contains("CREATE TABLE app.users"));
    assert!(stdout.contains("CREATE TABLE app.sessions"));
    assert!(!stdout.contains("-- stage3"));
}

#[test]
fn upgrade_writes_stage_files() {
    let dir = TempDir::new().unwrap();
    let old = write(dir.path(), "old.json", OLD);
    let new = write(dir.path(), "new.json", NEW);
    let out = dir.path().join("out");

    let assert = ddlstage()
        .args(["upgrade", "--old", &old, "--new", &new, "--prefix", "release"])
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

    for n in 1..=4 {
        let name = format!("release_stage{n}.sql");
        assert!(out.join(&name).exists(), "{name} missing");
        assert!(stdout.contains(&name));
    }
    let stage1 = fs::read_to_string(out.join("release_stage1.sql")).unwrap();
    assert!(stage1.starts_with("-- ddlstage stage1\n-- from: "));
    assert!(stage1.contains("ALTER TABLE app.users ADD COLUMN email text;"));
}

#[test]
fn upgrade_reads_options_from_environment() {
    let dir = TempDir::new().unwrap();
    let old = write(dir.path(), "old.json", OLD);
    let new = write(dir.path(), "new.json", NEW);
    let out = dir.path().join("out");

    ddlstage()
        .env("DDLSTAGE_OUTPUT_DIR", &out)
        .env("DDLSTAGE_SINGLE_STAGE", "true")
        .args(["upgrade", "--old", &old, "--new", &new])
        .assert()
        .success();

    let script = fs::read_to_string(out.join("ddlstage.sql")).unwrap();
    assert!(script.starts_with("-- ddlstage single-stage script\n"));
    assert!(script.contains("-- stage1\n"));
}

#[test]
fn identical_definitions_report_no_changes() {
    let dir = TempDir::new().unwrap();
    let old = write(dir.path(), "old.json", OLD);

    let assert = ddlstage()
        .args(["upgrade", "--old", &old, "--new", &old])
        .assert()
        .success();
    let output = assert.get_output();
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No changes."));
}

#[test]
fn order_lists_dependencies_first() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "schema.json", NEW);
    let source = dir.path().to_string_lossy().into_owned();

    let assert = ddlstage().args(["order", &source]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

    assert_eq!(stdout, "app.users\napp.sessions\n");
}

#[test]
fn definition_errors_fail_without_output() {
    let dir = TempDir::new().unwrap();
    let broken = write(
        dir.path(),
        "broken.json",
        r#"{"schemas": [{"name": "app", "tables": [
            {"name": "t", "columns": [{"name": "id"}]}
        ]}]}"#,
    );

    let assert = ddlstage().args(["build", &broken]).assert().failure();
    let output = assert.get_output();
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("app.t.id"));
}

#[test]
fn missing_sources_are_reported() {
    let dir = TempDir::new().unwrap();
    let pattern = dir.path().join("*.json").to_string_lossy().into_owned();

    let assert = ddlstage().args(["build", &pattern]).assert().failure();
    assert!(String::from_utf8_lossy(&assert.get_output().stderr)
        .contains("No definition files found matching pattern"));
}
