//! Destinations for rendered stage streams.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::model::Stage;
use crate::render::StagedScript;
use crate::util::{Result, SchemaError};

/// Four append-only streams, one per stage. Statements of a stage arrive in execution order.
pub trait StageSink {
    fn write(&mut self, stage: Stage, statement: &str) -> Result<()>;

    /// Flush whatever the sink buffered. Called once after the last statement.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Send every statement of `script` to `sink` and finish it.
pub fn write_script(sink: &mut dyn StageSink, script: &StagedScript) -> Result<()> {
    for statement in &script.statements {
        sink.write(statement.stage, &statement.sql)?;
    }
    sink.finish()
}

#[derive(Debug, Default)]
pub struct MemorySink {
    stages: [Vec<String>; 4],
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self, stage: Stage) -> &[String] {
        &self.stages[stage.number() - 1]
    }

    pub fn text(&self, stage: Stage) -> String {
        self.statements(stage)
            .iter()
            .map(|s| format!("{s}\n"))
            .collect()
    }
}

impl StageSink for MemorySink {
    fn write(&mut self, stage: Stage, statement: &str) -> Result<()> {
        self.stages[stage.number() - 1].push(statement.to_string());
        Ok(())
    }
}

/// Identifies the trees a script was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptHeader {
    pub old_fingerprint: Option<String>,
    pub new_fingerprint: String,
}

impl ScriptHeader {
    fn render(&self, title: &str) -> String {
        let mut header = format!("-- ddlstage {title}\n");
        if let Some(ref old) = self.old_fingerprint {
            header.push_str(&format!("-- from: {old}\n"));
        }
        header.push_str(&format!("-- to:   {}\n\n", self.new_fingerprint));
        header
    }
}

/// Writes `<prefix>_stage<N>.sql` per stage, rolling over to `<prefix>_stage<N>_<k>.sql`
/// once a file holds `statements_per_file` statements. In single-stage mode all stages go
/// to `<prefix>.sql`. Nothing touches the disk before [`StageSink::finish`].
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    prefix: String,
    statements_per_file: Option<usize>,
    single_stage: bool,
    header: ScriptHeader,
    stages: [Vec<String>; 4],
    written: Vec<PathBuf>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, header: ScriptHeader) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            statements_per_file: None,
            single_stage: false,
            header,
            stages: Default::default(),
            written: Vec::new(),
        }
    }

    pub fn with_statements_per_file(mut self, limit: Option<usize>) -> Self {
        self.statements_per_file = limit.filter(|n| *n > 0);
        self
    }

    pub fn with_single_stage(mut self, single_stage: bool) -> Self {
        self.single_stage = single_stage;
        self
    }

    /// Files written by [`StageSink::finish`], in execution order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write_file(&mut self, path: PathBuf, content: &str) -> Result<()> {
        fs::write(&path, content)
            .map_err(|e| SchemaError::IoError(format!("Failed to write {}: {e}", path.display())))?;
        debug!(path = %path.display(), "wrote script");
        self.written.push(path);
        Ok(())
    }

    fn path(&self, name: String) -> PathBuf {
        Path::new(&self.dir).join(name)
    }
}

impl StageSink for FileSink {
    fn write(&mut self, stage: Stage, statement: &str) -> Result<()> {
        self.stages[stage.number() - 1].push(statement.to_string());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            SchemaError::IoError(format!("Failed to create {}: {e}", self.dir.display()))
        })?;
        let stages = std::mem::take(&mut self.stages);

        if self.single_stage {
            let mut content = self.header.render("single-stage script");
            for (stage, statements) in Stage::ALL.iter().zip(&stages) {
                if statements.is_empty() {
                    continue;
                }
                content.push_str(&format!("-- {stage}\n"));
                for statement in statements {
                    content.push_str(statement);
                    content.push('\n');
                }
            }
            let path = self.path(format!("{}.sql", self.prefix));
            return self.write_file(path, &content);
        }

        for (stage, statements) in Stage::ALL.iter().zip(&stages) {
            let chunk_size = self.statements_per_file.unwrap_or(usize::MAX);
            let mut segments: Vec<&[String]> = statements.chunks(chunk_size).collect();
            if segments.is_empty() {
                segments.push(&[]);
            }
            let total = segments.len();
            for (k, segment) in segments.into_iter().enumerate() {
                let name = if k == 0 {
                    format!("{}_{stage}.sql", self.prefix)
                } else {
                    format!("{}_{stage}_{}.sql", self.prefix, k + 1)
                };
                let title = if total > 1 {
                    format!("{stage} (part {} of {total})", k + 1)
                } else {
                    stage.to_string()
                };
                let mut content = self.header.render(&title);
                for statement in segment {
                    content.push_str(statement);
                    content.push('\n');
                }
                let path = self.path(name);
                self.write_file(path, &content)?;
            }
        }
        Ok(())
    }
}
