use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::stability::{StabilityDetector, completed_files};
use crate::extract::tools::run_checked;
use crate::model::WorkItem;
use crate::util::file_name_lossy;

/// Separator between several local paths in one source cell.
pub const SOURCE_PATH_SEPARATOR: char = ';';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Files placed in the staging directory for extraction.
    Documents(Vec<PathBuf>),
    /// Nothing could be retrieved; recorded as a processed row.
    NoDocument,
    /// Retrieval failed before any document was known; the row stays pending.
    Unavailable(String),
}

/// Retrieves the documents of one work item into the staging directory.
pub trait DocumentSource {
    fn name(&self) -> &'static str;

    fn fetch(&mut self, item: &WorkItem, staging_dir: &Path) -> Result<FetchOutcome>;
}

/// Source cells hold local file paths, resolved against `base_dir` when
/// relative.
pub struct LocalPathSource {
    base_dir: PathBuf,
}

impl LocalPathSource {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }
}

impl DocumentSource for LocalPathSource {
    fn name(&self) -> &'static str {
        "local"
    }

    fn fetch(&mut self, item: &WorkItem, staging_dir: &Path) -> Result<FetchOutcome> {
        let Some(source) = item.source.as_deref().filter(|value| !value.trim().is_empty()) else {
            return Ok(FetchOutcome::Unavailable("empty source".to_string()));
        };

        fs::create_dir_all(staging_dir)
            .with_context(|| format!("failed to create {}", staging_dir.display()))?;

        let mut staged = Vec::new();
        for (index, raw) in source
            .split(SOURCE_PATH_SEPARATOR)
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .enumerate()
        {
            let original = self.base_dir.join(raw);
            if !original.is_file() {
                warn!(identity = %item.identity, path = %original.display(), "source document not found");
                continue;
            }

            let mut target = staging_dir.join(file_name_lossy(&original));
            if target.exists() {
                target = staging_dir.join(format!("{}_{}", index, file_name_lossy(&original)));
            }
            fs::copy(&original, &target).with_context(|| {
                format!(
                    "failed to stage {} into {}",
                    original.display(),
                    target.display()
                )
            })?;
            staged.push(target);
        }

        if staged.is_empty() {
            return Ok(FetchOutcome::NoDocument);
        }
        Ok(FetchOutcome::Documents(staged))
    }
}

/// Delegates retrieval to an external program invoked as
/// `<program> <args>... <source> <staging_dir>`, then waits for the
/// download in the staging directory to settle.
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    detector: StabilityDetector,
    partial_suffixes: Vec<String>,
}

impl CommandSource {
    pub fn new(
        program: &str,
        args: &[String],
        detector: StabilityDetector,
        partial_suffixes: &[String],
    ) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
            detector,
            partial_suffixes: partial_suffixes.to_vec(),
        }
    }
}

impl DocumentSource for CommandSource {
    fn name(&self) -> &'static str {
        "command"
    }

    fn fetch(&mut self, item: &WorkItem, staging_dir: &Path) -> Result<FetchOutcome> {
        let Some(source) = item.source.as_deref().filter(|value| !value.trim().is_empty()) else {
            return Ok(FetchOutcome::Unavailable("empty source".to_string()));
        };

        fs::create_dir_all(staging_dir)
            .with_context(|| format!("failed to create {}", staging_dir.display()))?;

        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(source).arg(staging_dir);
        if let Err(error) = run_checked(&mut command, &self.program, staging_dir) {
            return Ok(FetchOutcome::Unavailable(format!("{:#}", error)));
        }

        let Some(settled) = self.detector.wait_for_file(staging_dir) else {
            return Ok(FetchOutcome::NoDocument);
        };

        let mut documents = completed_files(staging_dir, &self.partial_suffixes);
        if !documents.contains(&settled) {
            documents.push(settled);
        }
        info!(identity = %item.identity, files = documents.len(), "fetched documents");
        Ok(FetchOutcome::Documents(documents))
    }
}
