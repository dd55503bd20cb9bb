mod common;

use common::*;

fn reporting(extra_column: bool, top_query: &str) -> Database {
    let mut columns = vec![json!({"name": "id", "type": "integer"})];
    if extra_column {
        columns.push(json!({"name": "email", "type": "text"}));
    }
    parse(json!({"schemas": [{
        "name": "app",
        "tables": [{"name": "users", "columns": columns}],
        "views": [
            {
                "name": "v_top",
                "query": top_query,
                "owner": "report_owner",
                "grants": [{"roles": ["reader"], "operations": ["select"]}]
            },
            {"name": "v_base", "query": "SELECT id FROM app.users;"}
        ]
    }]}))
}

const TOP: &str = "SELECT id FROM app.v_base";

#[test]
fn build_creates_views_last_in_dependency_order() {
    let db = reporting(false, TOP);
    let [stage1, _, stage3, _] = diff_sql(None, &db);

    assert!(!stage1.contains("VIEW"));
    assert_eq!(
        stage3,
        "CREATE VIEW app.v_base AS SELECT id FROM app.users;\n\
         CREATE VIEW app.v_top AS SELECT id FROM app.v_base;\n\
         ALTER VIEW app.v_top OWNER TO report_owner;\n\
         GRANT SELECT ON TABLE app.v_top TO reader;\n"
    );
}

#[test]
fn table_change_drops_views_first_and_recreates_them_last() {
    let old = reporting(false, TOP);
    let new = reporting(true, TOP);
    let [stage1, _, stage3, _] = diff_sql(Some(&old), &new);

    assert_eq!(
        stage1,
        "DROP VIEW app.v_top;\n\
         DROP VIEW app.v_base;\n\
         ALTER TABLE app.users ADD COLUMN email text;\n"
    );
    assert!(stage3.starts_with("CREATE VIEW app.v_base AS"));
    assert!(stage3.ends_with("GRANT SELECT ON TABLE app.v_top TO reader;\n"));
}

#[test]
fn changed_query_alone_rebuilds_views() {
    let old = reporting(false, TOP);
    let new = reporting(false, "SELECT id FROM app.v_base WHERE id > 0");
    let [stage1, _, stage3, _] = diff_sql(Some(&old), &new);

    assert_eq!(stage1, "DROP VIEW app.v_top;\nDROP VIEW app.v_base;\n");
    assert!(stage3.contains("CREATE VIEW app.v_top AS SELECT id FROM app.v_base WHERE id > 0;"));
}

#[test]
fn unchanged_views_are_left_alone() {
    let old = reporting(false, TOP);
    let new = reporting(false, "SELECT  id\n  FROM app.v_base");

    assert!(diff_sql(Some(&old), &new).iter().all(String::is_empty));
}

#[test]
fn view_description_is_set_after_creation() {
    let db = parse(json!({"schemas": [{
        "name": "app",
        "tables": [{"name": "users", "columns": [{"name": "id", "type": "integer"}]}],
        "views": [{"name": "ids", "query": "SELECT id FROM app.users", "description": "user ids"}]
    }]}));
    let [_, _, stage3, _] = diff_sql(None, &db);

    assert_eq!(
        stage3,
        "CREATE VIEW app.ids AS SELECT id FROM app.users;\n\
         COMMENT ON VIEW app.ids IS 'user ids';\n"
    );
}
