mod common;

use common::*;
use proptest::prelude::*;

/// Tables `t0..tn` declared in `declared` order; `edges[i]` lists the tables `ti` references.
fn graph_db(declared: &[usize], edges: &[Vec<usize>], empty_schemas: usize) -> Database {
    let tables: Vec<serde_json::Value> = declared
        .iter()
        .map(|&i| {
            let mut columns = vec![json!({"name": "id", "type": "integer", "nullable": false})];
            for &j in &edges[i] {
                columns.push(json!({
                    "name": format!("ref_{j}"),
                    "foreign_key": {"table": format!("t{j}"), "column": "id"}
                }));
            }
            json!({"name": format!("t{i}"), "primary_key": ["id"], "columns": columns})
        })
        .collect();

    let mut schemas = vec![json!({"name": "app", "tables": tables})];
    for k in 0..empty_schemas {
        schemas.push(json!({"name": format!("empty{k}")}));
    }
    parse(json!({ "schemas": schemas }))
}

fn acyclic() -> impl Strategy<Value = (Vec<usize>, Vec<Vec<usize>>)> {
    (1usize..12).prop_flat_map(|n| {
        let edges = (0..n)
            .map(|i| proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=i))
            .collect::<Vec<_>>();
        let declared = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
        (declared, edges)
    })
}

fn any_graph() -> impl Strategy<Value = (Vec<usize>, Vec<Vec<usize>>)> {
    (1usize..10).prop_flat_map(|n| {
        let edges = (0..n)
            .map(move |_| proptest::sample::subsequence((0..n).collect::<Vec<_>>(), 0..=n))
            .collect::<Vec<_>>();
        let declared = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
        (declared, edges)
    })
}

proptest! {
    #[test]
    fn dependents_follow_dependencies_on_acyclic_trees((declared, edges) in acyclic()) {
        let db = graph_db(&declared, &edges, 0);
        let ordered = order(&db);
        let position = |item: &DependencyItem| ordered.iter().position(|o| o == item).unwrap();

        for a in &ordered {
            for b in &ordered {
                if depends_on(&db, a, b) {
                    prop_assert!(position(a) > position(b), "{a} must follow {b}");
                }
            }
        }
    }

    #[test]
    fn resolution_is_a_permutation_even_with_cycles(
        (declared, edges) in any_graph(),
        empty_schemas in 0usize..3,
    ) {
        let db = graph_db(&declared, &edges, empty_schemas);
        let ordered = order(&db);

        let mut expected: Vec<DependencyItem> = declared
            .iter()
            .map(|i| DependencyItem::table("app", format!("t{i}")))
            .collect();
        expected.extend((0..empty_schemas).map(|k| DependencyItem::placeholder(format!("empty{k}"))));
        expected.sort();

        let mut actual = ordered.clone();
        actual.sort();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(ordered.iter().filter(|i| i.is_placeholder()).count(), empty_schemas);
    }

    #[test]
    fn resolution_is_deterministic((declared, edges) in any_graph()) {
        let db = graph_db(&declared, &edges, 1);
        prop_assert_eq!(order(&db), order(&db));
    }
}

#[test]
fn cross_schema_references_are_ordered() {
    let db = parse(json!({"schemas": [
        {"name": "sales", "tables": [
            {"name": "orders", "primary_key": ["id"], "columns": [
                {"name": "id", "type": "integer"},
                {"name": "customer_id", "foreign_key": {"schema": "crm", "table": "customers", "column": "id"}}
            ]}
        ]},
        {"name": "crm", "tables": [
            {"name": "customers", "primary_key": ["id"], "columns": [{"name": "id", "type": "integer"}]}
        ]}
    ]}));

    assert_eq!(
        order(&db),
        vec![
            DependencyItem::table("crm", "customers"),
            DependencyItem::table("sales", "orders"),
        ]
    );
}

#[test]
fn explicit_foreign_key_constraints_count() {
    let db = app(json!([
        {"name": "lines", "primary_key": ["id"], "columns": [
            {"name": "id", "type": "integer"},
            {"name": "invoice_id", "type": "integer"}
        ], "constraints": [
            {"name": "lines_invoice_fk", "kind": "foreign_key",
             "definition": "(invoice_id) REFERENCES app.invoices (id)",
             "references": {"table": "invoices"}}
        ]},
        {"name": "invoices", "primary_key": ["id"], "columns": [{"name": "id", "type": "integer"}]}
    ]));

    let items = order(&db);
    assert_eq!(items[0], DependencyItem::table("app", "invoices"));
    assert_eq!(items[1], DependencyItem::table("app", "lines"));
}
