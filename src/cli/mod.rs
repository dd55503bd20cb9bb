use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ddlstage::api::{self, BuildOptions, ScriptResult, UpgradeOptions};
use ddlstage::diff::DiffOptions;
use ddlstage::model::Stage;

#[derive(Parser)]
#[command(name = "ddlstage")]
#[command(about = "Compile declarative schema definitions into staged SQL scripts", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(long, short, global = true, env = "DDLSTAGE_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the creation script for a definition
    Build {
        /// Definition files, directories or glob patterns
        #[arg(required = true)]
        sources: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        diff: DiffArgs,
    },

    /// Render the staged upgrade script between two definitions
    Upgrade {
        /// Currently deployed definition
        #[arg(long, required = true, num_args = 1..)]
        old: Vec<String>,

        /// Target definition
        #[arg(long, required = true, num_args = 1..)]
        new: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        diff: DiffArgs,

        /// Compare by current names only, ignoring old_name/old_schema markers
        #[arg(long, env = "DDLSTAGE_IGNORE_OLD_NAMES")]
        ignore_old_names: bool,
    },

    /// Print the resolved table dependency order
    Order {
        #[arg(required = true)]
        sources: Vec<String>,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Write stage files here instead of printing to stdout
    #[arg(long, short = 'o', env = "DDLSTAGE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Stage file name prefix
    #[arg(long, default_value = "ddlstage", env = "DDLSTAGE_PREFIX")]
    prefix: String,

    /// Start a new file after this many statements
    #[arg(long, env = "DDLSTAGE_STATEMENTS_PER_FILE")]
    statements_per_file: Option<usize>,

    /// Quote every identifier
    #[arg(long, env = "DDLSTAGE_QUOTE_ALL_NAMES")]
    quote_all_names: bool,
}

#[derive(Args)]
struct DiffArgs {
    /// Produce one script to run as a whole (NOT NULL is not enforced)
    #[arg(long, env = "DDLSTAGE_SINGLE_STAGE")]
    single_stage: bool,

    /// Emit schema changes only
    #[arg(long, conflicts_with = "only_data", env = "DDLSTAGE_ONLY_SCHEMA")]
    only_schema: bool,

    /// Emit static data changes only
    #[arg(long, env = "DDLSTAGE_ONLY_DATA")]
    only_data: bool,

    /// Leave grants untouched
    #[arg(long, env = "DDLSTAGE_NO_GRANTS")]
    no_grants: bool,

    /// Leave object owners untouched
    #[arg(long, env = "DDLSTAGE_NO_OWNERSHIP")]
    no_ownership: bool,
}

impl DiffArgs {
    fn options(&self) -> DiffOptions {
        DiffOptions::default()
            .with_single_stage(self.single_stage)
            .with_only_schema_sql(self.only_schema)
            .with_only_data_sql(self.only_data)
            .with_manage_grants(!self.no_grants)
            .with_manage_ownership(!self.no_ownership)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "ddlstage=debug" } else { "ddlstage=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Print the script to stdout unless it was written to files.
fn emit(result: &ScriptResult) -> Result<()> {
    let mut out = io::stdout().lock();
    if !result.files.is_empty() {
        for path in &result.files {
            writeln!(out, "{}", path.display())?;
        }
        return Ok(());
    }
    for stage in Stage::ALL {
        let sql = api::stage_text(result, stage);
        if sql.is_empty() {
            continue;
        }
        writeln!(out, "-- {stage}")?;
        write!(out, "{sql}")?;
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            sources,
            output,
            diff,
        } => {
            let mut options = BuildOptions::new(sources)
                .with_prefix(output.prefix)
                .with_diff_options(diff.options());
            options.output.dir = output.output_dir;
            options.output.statements_per_file = output.statements_per_file;
            options.quote_all_names = output.quote_all_names;

            let result = api::build(&options).context("build failed")?;
            emit(&result)
        }
        Commands::Upgrade {
            old,
            new,
            output,
            diff,
            ignore_old_names,
        } => {
            let mut diff_options = diff.options();
            if ignore_old_names {
                diff_options = diff_options.ignore_old_names();
            }
            let mut options = UpgradeOptions::new(old, new)
                .with_prefix(output.prefix)
                .with_diff_options(diff_options);
            options.output.dir = output.output_dir;
            options.output.statements_per_file = output.statements_per_file;
            options.quote_all_names = output.quote_all_names;

            let result = api::upgrade(&options).context("upgrade failed")?;
            if result.is_empty() {
                eprintln!("No changes.");
            }
            emit(&result)
        }
        Commands::Order { sources } => {
            let result = api::dependency_order(&sources).context("dependency resolution failed")?;
            let mut out = io::stdout().lock();
            for item in &result.items {
                writeln!(out, "{item}")?;
            }
            Ok(())
        }
    }
}
