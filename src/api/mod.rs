//! High-level API for embedding ddlstage in other applications.
//!
//! These functions mirror the CLI commands: load definitions, diff them, render the four
//! stages and optionally write them to disk.
//!
//! # Example
//!
//! ```no_run
//! use ddlstage::api::{upgrade, UpgradeOptions};
//!
//! let result = upgrade(
//!     &UpgradeOptions::new(vec!["release-1/".into()], vec!["release-2/".into()])
//!         .with_output_dir("out"),
//! )
//! .unwrap();
//!
//! for path in &result.files {
//!     println!("{}", path.display());
//! }
//! ```

mod error;
mod options;
mod results;

pub use error::Error;
pub use options::{BuildOptions, OutputOptions, UpgradeOptions};
pub use results::{OrderResult, ScriptResult};

use tracing::info;

use crate::diff::{compute_diff, dependencies, DiffOptions};
use crate::model::validate::validate_database;
use crate::model::{Database, Stage};
use crate::parser::load_definition_sources;
use crate::pg::PostgresRenderer;
use crate::render::render_plan;
use crate::sink::{write_script, FileSink, ScriptHeader};

fn load(sources: &[String]) -> Result<Database, Error> {
    load_definition_sources(sources).map_err(|e| Error::parse(e.to_string()))
}

fn renderer(quote_all_names: bool) -> PostgresRenderer {
    PostgresRenderer::new().with_quote_all_names(quote_all_names)
}

/// Diff, render and write. Nothing is written unless the whole diff succeeds.
fn run(
    old: Option<&Database>,
    new: &Database,
    diff: &DiffOptions,
    output: &OutputOptions,
    quote_all_names: bool,
) -> Result<ScriptResult, Error> {
    let renderer = renderer(quote_all_names);
    let operations = compute_diff(old, new, &renderer, diff).map_err(Error::from_diff)?;
    let script = render_plan(&renderer, &operations);

    let header = ScriptHeader {
        old_fingerprint: old.map(Database::fingerprint),
        new_fingerprint: new.fingerprint(),
    };

    let mut files = Vec::new();
    if let Some(ref dir) = output.dir {
        let mut sink = FileSink::new(dir, output.prefix.clone(), header.clone())
            .with_statements_per_file(output.statements_per_file)
            .with_single_stage(diff.single_stage);
        write_script(&mut sink, &script).map_err(|e| Error::output(e.to_string()))?;
        files = sink.written().to_vec();
    }

    let result = ScriptResult {
        operations,
        script,
        files,
        old_fingerprint: header.old_fingerprint,
        new_fingerprint: header.new_fingerprint,
    };
    let [stage1, stage2, stage3, stage4] = result.stage_counts();
    info!(
        stage1,
        stage2,
        stage3,
        stage4,
        files = result.files.len(),
        "rendered {} script",
        if old.is_some() { "upgrade" } else { "build" }
    );
    Ok(result)
}

/// Render the creation script for a definition.
pub fn build(options: &BuildOptions) -> Result<ScriptResult, Error> {
    let new = load(&options.sources)?;
    build_from(&new, options)
}

/// Render the creation script for an already loaded tree. `options.sources` is ignored.
pub fn build_from(new: &Database, options: &BuildOptions) -> Result<ScriptResult, Error> {
    run(
        None,
        new,
        &options.diff,
        &options.output,
        options.quote_all_names,
    )
}

/// Render the staged upgrade script from one definition to another.
pub fn upgrade(options: &UpgradeOptions) -> Result<ScriptResult, Error> {
    let old = load(&options.old_sources)?;
    let new = load(&options.new_sources)?;
    upgrade_from(&old, &new, options)
}

/// Render the upgrade script between two loaded trees. The sources in `options` are ignored.
pub fn upgrade_from(
    old: &Database,
    new: &Database,
    options: &UpgradeOptions,
) -> Result<ScriptResult, Error> {
    run(
        Some(old),
        new,
        &options.diff,
        &options.output,
        options.quote_all_names,
    )
}

/// Resolve the dependency order of a definition.
pub fn dependency_order(sources: &[String]) -> Result<OrderResult, Error> {
    let db = load(sources)?;
    validate_database(&db).map_err(Error::from_diff)?;
    Ok(OrderResult {
        items: dependencies::order(&db),
    })
}

/// Text of one stage, newline-separated.
pub fn stage_text(result: &ScriptResult, stage: Stage) -> String {
    result.script.stage_sql(stage)
}
