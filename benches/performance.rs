//! Throughput of dependency resolution and diffing on generated trees.
//!
//! Trees are chains of tables declared in reverse dependency order, so the resolver has to
//! move every table. Each table carries a few columns and static rows so the data differ
//! also has work to do.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use ddlstage::diff::{compute_diff, dependencies, DiffOptions};
use ddlstage::model::Database;
use ddlstage::parser::parse_definition_str;
use ddlstage::pg::PostgresRenderer;

fn chain(tables: usize, rows: usize, revision: usize) -> Database {
    let tables: Vec<serde_json::Value> = (0..tables)
        .rev()
        .map(|i| {
            let mut columns = vec![
                json!({"name": "id", "type": "integer", "nullable": false}),
                json!({"name": "label", "type": "text"}),
                json!({"name": "amount", "type": "numeric(12,2)", "default": "0"}),
            ];
            if i > 0 {
                columns.push(json!({
                    "name": "prev_id",
                    "foreign_key": {"table": format!("t{}", i - 1), "column": "id"}
                }));
            }
            let data: Vec<Vec<String>> = (1..=rows)
                .map(|k| vec![k.to_string(), format!("row {k} rev {}", (k + revision) % 3)])
                .collect();
            json!({
                "name": format!("t{i}"),
                "primary_key": ["id"],
                "columns": columns,
                "indexes": [{"name": format!("t{i}_label_idx"), "dimensions": ["label"]}],
                "rows": {"columns": ["id", "label"], "rows": data}
            })
        })
        .collect();

    parse_definition_str(&json!({"schemas": [{"name": "app", "tables": tables}]}).to_string())
        .unwrap()
}

fn bench_dependency_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("dependency_order");
    for size in [10, 100, 400] {
        let db = chain(size, 0, 0);
        group.bench_with_input(BenchmarkId::from_parameter(size), &db, |b, db| {
            b.iter(|| dependencies::order(black_box(db)))
        });
    }
    group.finish();
}

fn bench_upgrade(c: &mut Criterion) {
    let renderer = PostgresRenderer::default();
    let options = DiffOptions::default();
    let mut group = c.benchmark_group("upgrade");
    for size in [10, 100] {
        let old = chain(size, 50, 0);
        let new = chain(size, 50, 1);
        group.bench_with_input(BenchmarkId::from_parameter(size), &(old, new), |b, (old, new)| {
            b.iter(|| compute_diff(Some(black_box(old)), black_box(new), &renderer, &options))
        });
    }
    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let renderer = PostgresRenderer::default();
    let options = DiffOptions::default();
    let db = chain(100, 20, 0);
    c.bench_function("build_100_tables", |b| {
        b.iter(|| compute_diff(None, black_box(&db), &renderer, &options))
    });
}

criterion_group!(benches, bench_dependency_order, bench_upgrade, bench_build);
criterion_main!(benches);
