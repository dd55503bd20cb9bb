use std::path::PathBuf;

use crate::diff::{DependencyItem, PlannedOp};
use crate::model::Stage;
use crate::render::StagedScript;

/// Result of a build or upgrade run.
#[derive(Debug, Clone)]
pub struct ScriptResult {
    /// Planned operations in execution order
    pub operations: Vec<PlannedOp>,
    /// Rendered statements tagged with their stage
    pub script: StagedScript,
    /// Files written, when an output directory was given
    pub files: Vec<PathBuf>,
    pub old_fingerprint: Option<String>,
    pub new_fingerprint: String,
}

impl ScriptResult {
    /// Whether the run produced no statements (the trees are equivalent).
    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    /// Statement count per stage, stages 1 to 4.
    pub fn stage_counts(&self) -> [usize; 4] {
        Stage::ALL.map(|stage| self.script.stage_len(stage))
    }
}

/// Result of resolving a definition's dependency order.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub items: Vec<DependencyItem>,
}
