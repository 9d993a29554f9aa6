use std::path::Path;

use anyhow::{Result, bail};
use tracing::info;

use crate::batch::quota::QuotaGovernor;
use crate::batch::run::BatchRunner;
use crate::batch::source::{CommandSource, DocumentSource, LocalPathSource};
use crate::batch::stability::StabilityDetector;
use crate::cli::{BatchArgs, SourceMode};
use crate::config::{ExtractionConfig, LedgerSchema, QuotaConfig, StabilityConfig, StatePaths};
use crate::extract::Orchestrator;
use crate::model::BatchConfigEcho;

pub fn run(args: BatchArgs) -> Result<()> {
    let extraction = ExtractionConfig::from(&args.extraction);
    let quota = QuotaConfig::from(&args);
    let paths = StatePaths::from(&args.state);
    let mut source = build_source(&args)?;

    info!(
        ledger = %args.ledger.ledger.display(),
        state_dir = %paths.state_dir.display(),
        source_mode = args.source_mode.as_str(),
        rows_per_run = quota.rows_per_invocation.map(|cap| cap.to_string()).unwrap_or_else(|| "unlimited".to_string()),
        max_invocations = quota.max_invocations.map(|cap| cap.to_string()).unwrap_or_else(|| "unlimited".to_string()),
        "batch requested"
    );

    let echo = config_echo(&extraction, quota, args.source_mode);
    let runner = BatchRunner::new(
        &args.ledger.ledger,
        LedgerSchema::from(&args.ledger),
        paths,
        QuotaGovernor::new(quota),
        Orchestrator::new(&extraction),
        echo,
    );
    let report = runner.run(source.as_mut())?;

    info!(
        outcome = report.outcome.as_str(),
        invocation = report.invocation,
        rows_attempted = report.counts.rows_attempted,
        results_recorded = report.counts.results_recorded,
        rows_pending = report.counts.pending_rows_after,
        manifest = %report
            .manifest_path
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_default(),
        "batch complete"
    );

    Ok(())
}

fn build_source(args: &BatchArgs) -> Result<Box<dyn DocumentSource>> {
    match args.source_mode {
        SourceMode::Local => {
            let base_dir = args
                .ledger
                .ledger
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            Ok(Box::new(LocalPathSource::new(base_dir)))
        }
        SourceMode::Command => {
            let Some(program) = args.fetch_command.as_deref() else {
                bail!("--source-mode command requires --fetch-command");
            };
            let stability = StabilityConfig::from(args);
            let partial_suffixes = stability.partial_suffixes.clone();
            Ok(Box::new(CommandSource::new(
                program,
                &args.fetch_args,
                StabilityDetector::new(stability),
                &partial_suffixes,
            )))
        }
    }
}

fn config_echo(extraction: &ExtractionConfig, quota: QuotaConfig, source_mode: SourceMode) -> BatchConfigEcho {
    BatchConfigEcho {
        exclude_token: extraction.exclude_token.clone(),
        ocr_mode: extraction.ocr_mode.as_str().to_string(),
        ocr_lang: extraction.ocr_lang.clone(),
        page_limit: extraction.page_limit,
        ocr_min_text_chars: extraction.ocr_min_text_chars,
        doc_converter: extraction.doc_converter.clone(),
        rows_per_invocation: quota.rows_per_invocation,
        max_invocations: quota.max_invocations,
        source_mode: source_mode.as_str().to_string(),
    }
}
