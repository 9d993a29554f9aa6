use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::{error, info, warn};

use super::ledger::Ledger;
use super::quota::{InvocationCounter, QuotaGovernor};
use super::source::{DocumentSource, FetchOutcome};
use super::summary::{MANIFEST_PREFIX, write_manifest, write_summary};
use crate::config::{LedgerSchema, NO_DOCUMENT_SENTINEL, StatePaths};
use crate::extract::{FileOutcome, FileReport, MergedText, Orchestrator};
use crate::model::{
    BatchConfigEcho, BatchCounts, BatchPaths, BatchRunManifest, DocumentProvenance,
    ExtractionMethod, ItemProvenance, WorkItem,
};
use crate::util::{
    clear_directory, ensure_directory, file_name_lossy, now_utc_string, sha256_file,
    utc_compact_string,
};

const MANIFEST_VERSION: u32 = 1;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    /// No unprocessed row is left.
    Completed,
    /// The per-invocation row cap was hit with rows still pending.
    Paused,
    /// The lifetime invocation cap was already reached; nothing was touched.
    Stopped,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Paused => "paused_quota",
            Self::Stopped => "stopped_max_invocations",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub outcome: RunOutcome,
    /// Counter value after this invocation.
    pub invocation: u64,
    pub counts: BatchCounts,
    pub manifest_path: Option<PathBuf>,
}

/// Everything accumulated while `Running`, kept for finalization.
#[derive(Default)]
struct Session {
    counts: BatchCounts,
    items: Vec<ItemProvenance>,
    warnings: Vec<String>,
    summary_rows: Vec<Vec<String>>,
}

pub struct BatchRunner {
    ledger_path: PathBuf,
    schema: LedgerSchema,
    paths: StatePaths,
    quota: QuotaGovernor,
    orchestrator: Orchestrator,
    config_echo: BatchConfigEcho,
}

impl BatchRunner {
    pub fn new(
        ledger_path: &Path,
        schema: LedgerSchema,
        paths: StatePaths,
        quota: QuotaGovernor,
        orchestrator: Orchestrator,
        config_echo: BatchConfigEcho,
    ) -> Self {
        Self {
            ledger_path: ledger_path.to_path_buf(),
            schema,
            paths,
            quota,
            orchestrator,
            config_echo,
        }
    }

    /// One invocation of the checkpointed batch. The counter is bumped and
    /// the summary and manifest are written on every exit from the running
    /// state, including errors.
    pub fn run(&self, source: &mut dyn DocumentSource) -> Result<BatchReport> {
        let counter = InvocationCounter::new(&self.paths.counter_path);
        let previous = counter.read()?;

        if self.quota.lifetime_exhausted(previous) {
            info!(
                invocations = previous,
                max_invocations = self.quota.config().max_invocations.unwrap_or_default(),
                "maximum invocations reached, stopping"
            );
            return Ok(BatchReport {
                outcome: RunOutcome::Stopped,
                invocation: previous,
                counts: BatchCounts::default(),
                manifest_path: None,
            });
        }

        let mut ledger = Ledger::load(&self.ledger_path, &self.schema)?;
        ensure_directory(&self.paths.staging_dir)?;

        let started = Utc::now();
        let started_at = now_utc_string();
        let run_id = format!(
            "{}{}_{:04}",
            MANIFEST_PREFIX,
            utc_compact_string(started),
            previous.saturating_add(1)
        );
        info!(
            run_id = %run_id,
            ledger = %self.ledger_path.display(),
            rows = ledger.row_count(),
            pending = ledger.pending_count(),
            source = source.name(),
            "batch invocation started"
        );

        let mut session = Session::default();
        session.counts.ledger_rows = ledger.row_count();
        session.counts.pending_rows_before = ledger.pending_count();

        let result = self.process(&mut ledger, source, &mut session);
        session.counts.pending_rows_after = ledger.pending_count();
        session
            .warnings
            .extend(clear_directory(&self.paths.staging_dir));

        let finalized = self.finalize(&counter, &ledger, &run_id, &started_at, &result, session);

        match (result, finalized) {
            (Ok(outcome), Ok((invocation, counts, manifest_path))) => {
                info!(
                    run_id = %run_id,
                    outcome = outcome.as_str(),
                    invocation,
                    attempted = counts.rows_attempted,
                    recorded = counts.results_recorded,
                    pending = counts.pending_rows_after,
                    "batch invocation finished"
                );
                Ok(BatchReport {
                    outcome,
                    invocation,
                    counts,
                    manifest_path: Some(manifest_path),
                })
            }
            (Ok(_), Err(finalize_error)) => Err(finalize_error),
            (Err(run_error), Ok(_)) => Err(run_error),
            (Err(run_error), Err(finalize_error)) => {
                error!(error = %format!("{finalize_error:#}"), "batch finalization failed");
                Err(run_error)
            }
        }
    }

    fn process(
        &self,
        ledger: &mut Ledger,
        source: &mut dyn DocumentSource,
        session: &mut Session,
    ) -> Result<RunOutcome> {
        let Some(resume_row) = ledger.first_pending(0) else {
            info!("no unprocessed rows with a source left");
            return Ok(RunOutcome::Completed);
        };
        let window_end = self.quota.window_end(resume_row, ledger.row_count());
        info!(
            row = resume_row,
            window_end,
            "resuming from first unprocessed row"
        );

        for index in resume_row..window_end {
            let item = ledger
                .item(index)
                .ok_or_else(|| anyhow!("ledger row {} vanished during the run", index))?;
            if item.is_processed() {
                continue;
            }
            if !has_source(&item) {
                info!(row = index, identity = %item.identity, "skipping row without source");
                session.counts.rows_skipped_without_source += 1;
                continue;
            }

            self.process_item(ledger, source, &item, session)?;
        }

        match ledger.first_pending(window_end) {
            Some(next_row) => {
                info!(
                    attempted = session.counts.rows_attempted,
                    next_row,
                    "row quota reached, pausing"
                );
                Ok(RunOutcome::Paused)
            }
            None => Ok(RunOutcome::Completed),
        }
    }

    fn process_item(
        &self,
        ledger: &mut Ledger,
        source: &mut dyn DocumentSource,
        item: &WorkItem,
        session: &mut Session,
    ) -> Result<()> {
        session
            .warnings
            .extend(clear_directory(&self.paths.staging_dir));
        session.counts.rows_attempted += 1;
        info!(row = item.row, identity = %item.identity, "processing row");

        let outcome = source
            .fetch(item, &self.paths.staging_dir)
            .unwrap_or_else(|fetch_error| FetchOutcome::Unavailable(format!("{fetch_error:#}")));

        let provenance = match outcome {
            FetchOutcome::Documents(documents) => {
                let merged = self.orchestrator.process(&documents);
                ledger.record_result(item.row, &merged.text)?;
                record_merged(item, &merged, session)
            }
            FetchOutcome::NoDocument => {
                warn!(row = item.row, identity = %item.identity, "no document retrieved");
                ledger.record_result(item.row, NO_DOCUMENT_SENTINEL)?;
                session.counts.results_recorded += 1;
                session.counts.sentinel_results += 1;
                item_provenance(item, "no_document", NO_DOCUMENT_SENTINEL, Vec::new())
            }
            FetchOutcome::Unavailable(reason) => {
                warn!(row = item.row, identity = %item.identity, reason = %reason, "documents unavailable, row left pending");
                ledger.record_error(item.row, &reason)?;
                session.counts.rows_left_pending += 1;
                session
                    .warnings
                    .push(format!("row {} ({}): {}", item.row, item.identity, reason));
                item_provenance(item, "unavailable", "", Vec::new())
            }
        };

        ledger.checkpoint()?;
        info!(row = item.row, identity = %item.identity, outcome = %provenance.outcome, "checkpoint written");

        if let Some(cells) = ledger.row_cells(item.row) {
            session.summary_rows.push(cells.clone());
        }
        session.items.push(provenance);
        session
            .warnings
            .extend(clear_directory(&self.paths.staging_dir));
        Ok(())
    }

    fn finalize(
        &self,
        counter: &InvocationCounter,
        ledger: &Ledger,
        run_id: &str,
        started_at: &str,
        result: &Result<RunOutcome>,
        session: Session,
    ) -> Result<(u64, BatchCounts, PathBuf)> {
        let invocation = counter.increment()?;

        let summary = write_summary(
            &self.paths.summary_path,
            ledger.headers(),
            &session.summary_rows,
        );
        if let Err(summary_error) = &summary {
            error!(error = %format!("{summary_error:#}"), "failed to write summary");
        } else {
            info!(
                path = %self.paths.summary_path.display(),
                rows = session.summary_rows.len(),
                "summary written"
            );
        }

        let (status, failure_reason) = match result {
            Ok(outcome) => (outcome.as_str().to_string(), None),
            Err(run_error) => ("failed".to_string(), Some(format!("{run_error:#}"))),
        };
        let manifest = BatchRunManifest {
            manifest_version: MANIFEST_VERSION,
            run_id: run_id.to_string(),
            status,
            invocation,
            started_at: started_at.to_string(),
            updated_at: now_utc_string(),
            failure_reason,
            config: self.config_echo.clone(),
            paths: BatchPaths {
                ledger_path: self.ledger_path.display().to_string(),
                counter_path: self.paths.counter_path.display().to_string(),
                staging_dir: self.paths.staging_dir.display().to_string(),
                summary_path: self.paths.summary_path.display().to_string(),
            },
            counts: session.counts,
            items: session.items,
            warnings: session.warnings,
        };
        let manifest_path = write_manifest(&self.paths.manifest_dir, &manifest)?;
        info!(path = %manifest_path.display(), "run manifest written");

        summary?;
        Ok((invocation, manifest.counts, manifest_path))
    }
}

fn has_source(item: &WorkItem) -> bool {
    item.source
        .as_deref()
        .is_some_and(|value| !value.trim().is_empty())
}

fn record_merged(item: &WorkItem, merged: &MergedText, session: &mut Session) -> ItemProvenance {
    let counts = &mut session.counts;
    counts.results_recorded += 1;
    if merged.sentinel {
        counts.sentinel_results += 1;
    }

    for file in &merged.files {
        counts.files_seen += 1;
        match file.outcome {
            FileOutcome::Extracted => counts.files_with_text += 1,
            FileOutcome::Excluded => counts.files_excluded += 1,
            FileOutcome::Unsupported => counts.files_unsupported += 1,
            FileOutcome::ArchiveFailed => counts.archives_failed += 1,
            FileOutcome::Empty => {}
        }
        match file.method {
            Some(ExtractionMethod::NativeLayer) => counts.native_layer_files += 1,
            Some(ExtractionMethod::Ocr) => counts.ocr_files += 1,
            Some(ExtractionMethod::ExternalSubprocess) => counts.external_subprocess_files += 1,
            None => {}
        }
    }
    session.warnings.extend(
        merged
            .warnings
            .iter()
            .map(|warning| format!("row {} ({}): {}", item.row, item.identity, warning)),
    );

    let outcome = if merged.sentinel { "no_text" } else { "extracted" };
    let documents = merged.files.iter().map(document_provenance).collect();
    item_provenance(item, outcome, &merged.text, documents)
}

fn document_provenance(file: &FileReport) -> DocumentProvenance {
    DocumentProvenance {
        file_name: file_name_lossy(&file.path),
        format: file.format,
        method: file.method,
        outcome: file.outcome.as_str().to_string(),
        char_count: file.char_count,
        sha256: sha256_file(&file.path).ok(),
    }
}

fn item_provenance(
    item: &WorkItem,
    outcome: &str,
    result: &str,
    documents: Vec<DocumentProvenance>,
) -> ItemProvenance {
    ItemProvenance {
        row: item.row,
        identity: item.identity.clone(),
        outcome: outcome.to_string(),
        result_chars: result.chars().count(),
        documents,
    }
}
