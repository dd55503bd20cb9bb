//! Table dependency ordering.
//!
//! Tables are ordered so that every table follows the tables it references through foreign
//! keys or inherits from. Acyclic input gets a topological order (Kahn's algorithm, ties broken
//! by declaration order). When a cycle remains, the leftover items are ordered with a capped
//! demotion heuristic: the result is best-effort, never a failure.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::resolve::constraint_target;
use crate::model::{qualified_name, Database};

/// Demotions allowed per item, as a multiple of the table count.
const DEMOTION_CAP_FACTOR: usize = 3;

/// A unit of ordering. `table: None` marks a schema that declares no tables; it still
/// receives per-schema passes but must be skipped wherever a real table is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyItem {
    pub schema: String,
    pub table: Option<String>,
}

impl DependencyItem {
    pub fn table(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: Some(table.into()),
        }
    }

    pub fn placeholder(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.table.is_none()
    }
}

impl fmt::Display for DependencyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table {
            Some(ref table) => write!(f, "{}", qualified_name(&self.schema, table)),
            None => write!(f, "{}.<no tables>", self.schema),
        }
    }
}

/// Declaration order: every table, plus one placeholder per table-less schema at the
/// position of its schema.
pub fn natural_order(db: &Database) -> Vec<DependencyItem> {
    let mut items = Vec::new();
    for schema in &db.schemas {
        if schema.tables.is_empty() {
            items.push(DependencyItem::placeholder(&schema.name));
        }
        for table in &schema.tables {
            items.push(DependencyItem::table(&schema.name, &table.name));
        }
    }
    items
}

/// Tables `(schema, table)` that the given table depends on, excluding itself.
pub fn table_dependencies(db: &Database, schema: &str, table: &str) -> BTreeSet<(String, String)> {
    let mut deps = BTreeSet::new();
    let Some((s, t)) = db.table(schema, table) else {
        return deps;
    };

    for column in &t.columns {
        if let Some(ref fk) = column.foreign_key {
            deps.insert((
                fk.schema.clone().unwrap_or_else(|| s.name.clone()),
                fk.table.clone(),
            ));
        }
    }
    for decl in &t.constraints {
        if let Some(target) = constraint_target(decl) {
            deps.insert((target.schema_or(&s.name).to_string(), target.table.clone()));
        }
    }
    if let Some(ref parent) = t.inherits {
        deps.insert((parent.schema_or(&s.name).to_string(), parent.table.clone()));
    }

    deps.remove(&(schema.to_string(), table.to_string()));
    deps
}

/// Whether `a` has an inline foreign key to, an explicit foreign key constraint on, or
/// inherits from `b`.
pub fn depends_on(db: &Database, a: &DependencyItem, b: &DependencyItem) -> bool {
    match (&a.table, &b.table) {
        (Some(a_table), Some(b_table)) => table_dependencies(db, &a.schema, a_table)
            .contains(&(b.schema.clone(), b_table.clone())),
        _ => false,
    }
}

/// Order every table of `db` so dependents follow their dependencies.
pub fn order(db: &Database) -> Vec<DependencyItem> {
    let items = natural_order(db);
    let index_of: HashMap<&DependencyItem, usize> =
        items.iter().enumerate().map(|(i, item)| (item, i)).collect();

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(items.len(), items.len());
    let nodes: Vec<NodeIndex> = (0..items.len()).map(|i| graph.add_node(i)).collect();
    let mut deps: Vec<HashSet<usize>> = vec![HashSet::new(); items.len()];

    for (i, item) in items.iter().enumerate() {
        let Some(ref table) = item.table else {
            continue;
        };
        for (dep_schema, dep_table) in table_dependencies(db, &item.schema, table) {
            let dep = DependencyItem::table(dep_schema, dep_table);
            if let Some(&j) = index_of.get(&dep) {
                if deps[i].insert(j) {
                    graph.add_edge(nodes[j], nodes[i], ());
                }
            }
        }
    }

    let mut in_degree: Vec<usize> = deps.iter().map(HashSet::len).collect();
    let mut ready: BTreeSet<usize> = (0..items.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted: Vec<usize> = Vec::with_capacity(items.len());

    while let Some(next) = ready.pop_first() {
        sorted.push(next);
        for dependent in graph.neighbors(nodes[next]) {
            let d = graph[dependent];
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if sorted.len() == items.len() {
        return sorted.into_iter().map(|i| items[i].clone()).collect();
    }

    let emitted: HashSet<usize> = sorted.iter().copied().collect();
    let remaining: Vec<usize> = (0..items.len()).filter(|i| !emitted.contains(i)).collect();

    for component in tarjan_scc(&graph) {
        if component.len() > 1 {
            let mut names: Vec<String> = component
                .iter()
                .map(|n| items[graph[*n]].to_string())
                .collect();
            names.sort();
            warn!(
                tables = %names.join(", "),
                "foreign key / inheritance cycle; falling back to best-effort ordering"
            );
        }
    }

    let table_count = items.iter().filter(|i| !i.is_placeholder()).count();
    let tail = demotion_order(&items, remaining, &deps, table_count);
    sorted.extend(tail);
    sorted.into_iter().map(|i| items[i].clone()).collect()
}

/// Repeatedly moves an item that depends on a later item to the end of the list. An item
/// demoted more than `DEMOTION_CAP_FACTOR × table_count` times is left where it is.
fn demotion_order(
    items: &[DependencyItem],
    mut list: Vec<usize>,
    deps: &[HashSet<usize>],
    table_count: usize,
) -> Vec<usize> {
    let cap = DEMOTION_CAP_FACTOR * table_count.max(1);
    let mut demotions: HashMap<usize, usize> = HashMap::new();
    let mut i = 0;

    while i < list.len() {
        let current = list[i];
        let count = demotions.get(&current).copied().unwrap_or(0);
        let must_move = count <= cap && list[i + 1..].iter().any(|j| deps[current].contains(j));

        if must_move {
            list.remove(i);
            list.push(current);
            let count = demotions.entry(current).or_insert(0);
            *count += 1;
            if *count > cap {
                warn!(
                    table = %items[current],
                    demotions = *count,
                    "dependency demotion cap exceeded; order for this table is not guaranteed"
                );
            }
        } else {
            i += 1;
        }
    }

    debug!(items = list.len(), "ordered cyclic remainder by demotion");
    list
}
