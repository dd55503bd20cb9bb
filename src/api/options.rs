use std::path::PathBuf;

use crate::diff::DiffOptions;

/// Where and how rendered stages are written.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Directory for the stage files; `None` keeps the script in memory only.
    pub dir: Option<PathBuf>,
    /// File name prefix (`<prefix>_stage1.sql`, …).
    pub prefix: String,
    /// Roll over to a new file after this many statements.
    pub statements_per_file: Option<usize>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: "ddlstage".into(),
            statements_per_file: None,
        }
    }
}

/// Options for rendering a full creation script.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Definition sources: files, directories or glob patterns
    pub sources: Vec<String>,
    pub output: OutputOptions,
    pub diff: DiffOptions,
    /// Quote every identifier, not only those that need it
    pub quote_all_names: bool,
}

impl BuildOptions {
    pub fn new(sources: Vec<String>) -> Self {
        Self {
            sources,
            ..Default::default()
        }
    }

    /// Write stage files into `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output.dir = Some(dir.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output.prefix = prefix.into();
        self
    }

    pub fn with_statements_per_file(mut self, limit: usize) -> Self {
        self.output.statements_per_file = Some(limit);
        self
    }

    pub fn with_diff_options(mut self, diff: DiffOptions) -> Self {
        self.diff = diff;
        self
    }

    pub fn quote_all_names(mut self) -> Self {
        self.quote_all_names = true;
        self
    }
}

/// Options for rendering an upgrade script between two definitions.
#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    /// Sources of the currently deployed definition
    pub old_sources: Vec<String>,
    /// Sources of the target definition
    pub new_sources: Vec<String>,
    pub output: OutputOptions,
    pub diff: DiffOptions,
    pub quote_all_names: bool,
}

impl UpgradeOptions {
    pub fn new(old_sources: Vec<String>, new_sources: Vec<String>) -> Self {
        Self {
            old_sources,
            new_sources,
            ..Default::default()
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output.dir = Some(dir.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output.prefix = prefix.into();
        self
    }

    pub fn with_statements_per_file(mut self, limit: usize) -> Self {
        self.output.statements_per_file = Some(limit);
        self
    }

    pub fn with_diff_options(mut self, diff: DiffOptions) -> Self {
        self.diff = diff;
        self
    }

    pub fn quote_all_names(mut self) -> Self {
        self.quote_all_names = true;
        self
    }
}
