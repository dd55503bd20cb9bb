//! Convenient re-exports for common ddlstage usage.
//!
//! # Example
//!
//! ```no_run
//! use ddlstage::prelude::*;
//!
//! let result = build(&BuildOptions::new(vec!["schema/".into()]).with_output_dir("out")).unwrap();
//!
//! println!("Wrote {} files", result.files.len());
//! ```

// Entry points
pub use crate::api::{build, build_from, dependency_order, stage_text, upgrade, upgrade_from};

// Options
pub use crate::api::{BuildOptions, OutputOptions, UpgradeOptions};
pub use crate::diff::DiffOptions;

// Results
pub use crate::api::{OrderResult, ScriptResult};

// Error types
pub use crate::api::Error;

// Core types
pub use crate::diff::{DependencyItem, MigrationOp, PlannedOp};
pub use crate::model::{Database, Stage};
pub use crate::sink::{FileSink, MemorySink, StageSink};
