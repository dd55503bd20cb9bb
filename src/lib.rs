//! ddlstage - declarative schema compiler and staged upgrade differ.
//!
//! A database is described as a tree of schemas, tables, types, views and static rows.
//! ddlstage renders the SQL that creates that tree from nothing, or the SQL that upgrades a
//! previous version of it, split into four stages: additive changes, static data,
//! destructive changes, and statements that must run last.
//!
//! # Quick Start
//!
//! ```no_run
//! use ddlstage::prelude::*;
//!
//! let result = upgrade(&UpgradeOptions::new(
//!     vec!["release-1/".into()],
//!     vec!["release-2/".into()],
//! ))
//! .unwrap();
//!
//! print!("{}", stage_text(&result, Stage::Stage1));
//! ```
//!
//! # Modules
//!
//! - [`api`] - High-level API mirroring CLI commands
//! - [`prelude`] - Convenient re-exports for common usage
//! - [`model`] - Schema tree types
//! - [`diff`] - Dependency resolution, structural and data differs
//! - [`sink`] - Destinations for the four stage streams

pub mod api;
pub mod diff;
pub mod model;
pub mod parser;
pub mod pg;
pub mod prelude;
pub mod render;
pub mod sink;
pub mod util;
