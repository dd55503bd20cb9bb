mod common;

use common::*;

fn with_schema(schema: serde_json::Value) -> Database {
    parse(json!({"schemas": [schema]}))
}

fn add_one(definition: &str, returns: &str) -> serde_json::Value {
    json!({
        "name": "add_one",
        "arguments": [{"name": "n", "type": "integer"}],
        "returns": returns,
        "language": "sql",
        "volatility": "immutable",
        "definition": definition
    })
}

#[test]
fn functions_and_triggers_are_created_around_their_table() {
    let db = with_schema(json!({
        "name": "app",
        "tables": [{"name": "users", "columns": [{"name": "id", "type": "integer"}]}],
        "functions": [{
            "name": "touch",
            "returns": "trigger",
            "language": "plpgsql",
            "definition": "BEGIN RETURN NEW; END;"
        }],
        "triggers": [{
            "name": "users_touch",
            "table": "users",
            "timing": "before",
            "events": ["insert", "update"],
            "function": "app.touch"
        }]
    }));
    let [stage1, _, _, _] = diff_sql(None, &db);

    assert_eq!(
        stage1,
        "CREATE SCHEMA IF NOT EXISTS app;\n\
         CREATE FUNCTION app.touch() RETURNS trigger LANGUAGE plpgsql AS $$BEGIN RETURN NEW; END;$$;\n\
         CREATE TABLE app.users (\n    id integer\n);\n\
         CREATE TRIGGER users_touch BEFORE INSERT OR UPDATE ON app.users FOR EACH ROW EXECUTE FUNCTION app.touch();\n"
    );
}

#[test]
fn changed_body_replaces_the_function_in_place() {
    let old = with_schema(json!({"name": "app", "functions": [add_one("SELECT n + 1", "integer")]}));
    let new = with_schema(json!({"name": "app", "functions": [add_one("SELECT 1 + n", "integer")]}));
    let [stage1, _, stage3, _] = diff_sql(Some(&old), &new);

    assert_eq!(
        stage1,
        "CREATE OR REPLACE FUNCTION app.add_one(n integer) RETURNS integer LANGUAGE sql IMMUTABLE AS $$SELECT 1 + n$$;\n"
    );
    assert!(stage3.is_empty());
}

#[test]
fn reformatted_body_is_not_a_change() {
    let old = with_schema(json!({"name": "app", "functions": [add_one("SELECT n + 1", "integer")]}));
    let new = with_schema(json!({"name": "app", "functions": [add_one("SELECT n\n    + 1", "integer")]}));

    assert!(diff_sql(Some(&old), &new).iter().all(String::is_empty));
}

#[test]
fn removed_function_is_dropped_in_stage3() {
    let old = with_schema(json!({"name": "app", "functions": [add_one("SELECT n + 1", "integer")]}));
    let new = with_schema(json!({"name": "app"}));
    let [stage1, _, stage3, _] = diff_sql(Some(&old), &new);

    assert!(stage1.is_empty());
    assert_eq!(stage3, "DROP FUNCTION app.add_one(integer);\n");
}

#[test]
fn dollar_quote_tag_avoids_the_body() {
    let db = with_schema(json!({"name": "app", "functions": [add_one("SELECT $$n$$::text", "text")]}));
    let [stage1, _, _, _] = diff_sql(None, &db);

    assert!(stage1.contains("AS $fn1$SELECT $$n$$::text$fn1$;"));
}

fn tickets(sequence: serde_json::Value) -> Database {
    with_schema(json!({
        "name": "app",
        "tables": [{"name": "tickets", "columns": [{"name": "id", "type": "integer"}]}],
        "sequences": [sequence]
    }))
}

#[test]
fn sequence_options_change_in_place() {
    let old = tickets(json!({"name": "ticket_seq", "start": 100, "increment": 5}));
    let new = tickets(json!({"name": "ticket_seq", "start": 100, "increment": 10, "cycle": true}));
    let [stage1, _, _, _] = diff_sql(Some(&old), &new);

    assert_eq!(stage1, "ALTER SEQUENCE app.ticket_seq INCREMENT BY 10 CYCLE;\n");
}

#[test]
fn sequence_ownership_waits_for_the_column() {
    let db = tickets(json!({"name": "ticket_seq", "start": 100, "owned_by": "tickets.id"}));
    let [stage1, _, _, _] = diff_sql(None, &db);

    assert_eq!(
        stage1,
        "CREATE SCHEMA IF NOT EXISTS app;\n\
         CREATE SEQUENCE app.ticket_seq START WITH 100;\n\
         CREATE TABLE app.tickets (\n    id integer\n);\n\
         ALTER SEQUENCE app.ticket_seq OWNED BY app.tickets.id;\n"
    );

    let released = tickets(json!({"name": "ticket_seq", "start": 100}));
    let [stage1, _, _, _] = diff_sql(Some(&db), &released);
    assert_eq!(stage1, "ALTER SEQUENCE app.ticket_seq OWNED BY NONE;\n");
}

#[test]
fn removed_sequence_is_dropped_in_stage3() {
    let old = tickets(json!({"name": "ticket_seq"}));
    let new = with_schema(json!({
        "name": "app",
        "tables": [{"name": "tickets", "columns": [{"name": "id", "type": "integer"}]}]
    }));
    let [_, _, stage3, _] = diff_sql(Some(&old), &new);

    assert_eq!(stage3, "DROP SEQUENCE IF EXISTS app.ticket_seq;\n");
}

fn audited(timing: &str) -> Database {
    with_schema(json!({
        "name": "app",
        "tables": [{"name": "users", "columns": [{"name": "id", "type": "integer"}]}],
        "triggers": [{
            "name": "users_audit",
            "table": "users",
            "timing": timing,
            "events": ["delete"],
            "for_each": "statement",
            "function": "audit.record()"
        }]
    }))
}

#[test]
fn changed_trigger_is_dropped_and_recreated() {
    let [stage1, _, _, _] = diff_sql(Some(&audited("before")), &audited("after"));

    assert_eq!(
        stage1,
        "DROP TRIGGER users_audit ON app.users;\n\
         CREATE TRIGGER users_audit AFTER DELETE ON app.users FOR EACH STATEMENT EXECUTE FUNCTION audit.record();\n"
    );
    assert!(diff_sql(Some(&audited("after")), &audited("after"))
        .iter()
        .all(String::is_empty));
}

fn with_custom_sql(sql: serde_json::Value) -> Database {
    parse(json!({
        "schemas": [{"name": "app", "tables": [{
            "name": "flags",
            "primary_key": ["id"],
            "columns": [{"name": "id", "type": "integer"}],
            "rows": {"columns": ["id"], "rows": [["1"]]}
        }]}],
        "sql": sql
    }))
}

#[test]
fn custom_sql_brackets_the_generated_statements() {
    let db = with_custom_sql(json!([
        {"stage": "stage2", "before": true, "comment": "guard", "text": "SET LOCAL lock_timeout = '5s';"},
        {"stage": "stage2", "text": "SELECT 1;"},
        {"stage": "stage4", "text": "ANALYZE app.flags;\n"}
    ]));
    let [_, stage2, _, stage4] = diff_sql(None, &db);

    let lines: Vec<&str> = stage2.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "-- guard");
    assert_eq!(lines[1], "SET LOCAL lock_timeout = '5s';");
    assert!(lines[2].starts_with("INSERT INTO app.flags (id) VALUES ("));
    assert_eq!(lines[3], "SELECT 1;");
    assert_eq!(stage4, "ANALYZE app.flags;\n");
}

#[test]
fn custom_sql_already_shipped_is_not_repeated() {
    let old = with_custom_sql(json!([{"stage": "stage4", "text": "ANALYZE;"}]));
    let new = with_custom_sql(json!([
        {"stage": "stage4", "text": "ANALYZE;"},
        {"stage": "stage4", "text": "VACUUM app.flags;"}
    ]));
    let [_, _, _, stage4] = diff_sql(Some(&old), &new);

    assert_eq!(stage4, "VACUUM app.flags;\n");
}

#[test]
fn dropping_an_explicit_start_restores_the_default() {
    let old = tickets(json!({"name": "ticket_seq", "start": 100}));
    let new = tickets(json!({"name": "ticket_seq"}));
    let [stage1, _, _, _] = diff_sql(Some(&old), &new);

    assert_eq!(stage1, "ALTER SEQUENCE app.ticket_seq START WITH 1;\n");
}
