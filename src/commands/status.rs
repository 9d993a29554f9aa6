use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::batch::ledger::Ledger;
use crate::batch::quota::InvocationCounter;
use crate::batch::summary::latest_manifest;
use crate::cli::StatusArgs;
use crate::config::{LedgerSchema, NO_DOCUMENT_SENTINEL, NO_TEXT_SENTINEL, StatePaths};
use crate::model::BatchRunManifest;

#[derive(Debug, Default, PartialEq, Eq)]
struct LedgerTotals {
    rows: usize,
    processed: usize,
    pending: usize,
    sentinel_results: usize,
    with_error: usize,
    next_row: Option<usize>,
    next_identity: Option<String>,
}

fn ledger_totals(ledger: &Ledger) -> LedgerTotals {
    let mut totals = LedgerTotals {
        rows: ledger.row_count(),
        next_row: ledger.first_pending(0),
        ..LedgerTotals::default()
    };

    for item in ledger.items() {
        match item.result.as_deref() {
            Some(NO_DOCUMENT_SENTINEL) | Some(NO_TEXT_SENTINEL) => {
                totals.processed += 1;
                totals.sentinel_results += 1;
            }
            Some(_) => totals.processed += 1,
            None => totals.pending += 1,
        }
        if item.error.is_some() {
            totals.with_error += 1;
        }
        if Some(item.row) == totals.next_row {
            totals.next_identity = Some(item.identity);
        }
    }

    totals
}

pub fn run(args: StatusArgs) -> Result<()> {
    let paths = StatePaths::from(&args.state);
    info!(
        ledger = %args.ledger.ledger.display(),
        state_dir = %paths.state_dir.display(),
        "status requested"
    );

    let invocations = InvocationCounter::new(&paths.counter_path).read()?;
    info!(
        path = %paths.counter_path.display(),
        invocations,
        max_invocations = args.max_invocations.map(|cap| cap.to_string()).unwrap_or_else(|| "unlimited".to_string()),
        exhausted = args.max_invocations.is_some_and(|cap| invocations >= cap),
        "invocation counter"
    );

    if args.ledger.ledger.exists() {
        let ledger = Ledger::load(&args.ledger.ledger, &LedgerSchema::from(&args.ledger))?;
        let totals = ledger_totals(&ledger);
        info!(
            rows = totals.rows,
            processed = totals.processed,
            pending = totals.pending,
            sentinel_results = totals.sentinel_results,
            with_error = totals.with_error,
            next_row = totals.next_row.map(|row| row.to_string()).unwrap_or_else(|| "none".to_string()),
            next_identity = %totals.next_identity.unwrap_or_default(),
            "ledger status"
        );
    } else {
        warn!(path = %args.ledger.ledger.display(), "ledger missing");
    }

    match latest_manifest(&paths.manifest_dir)? {
        Some(path) => {
            let raw = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let manifest: BatchRunManifest = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            info!(
                run_id = %manifest.run_id,
                status = %manifest.status,
                invocation = manifest.invocation,
                started_at = %manifest.started_at,
                updated_at = %manifest.updated_at,
                failure_reason = %manifest.failure_reason.unwrap_or_default(),
                rows_attempted = manifest.counts.rows_attempted,
                results_recorded = manifest.counts.results_recorded,
                ocr_files = manifest.counts.ocr_files,
                warnings = manifest.warnings.len(),
                "latest batch run"
            );
        }
        None => warn!(path = %paths.manifest_dir.display(), "no batch run manifest yet"),
    }

    Ok(())
}
