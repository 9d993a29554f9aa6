use std::io::Write;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::ExtractArgs;
use crate::config::ExtractionConfig;
use crate::extract::{FileOutcome, Orchestrator};
use crate::util::write_atomically;

pub fn run(args: ExtractArgs) -> Result<()> {
    let missing = args
        .paths
        .iter()
        .filter(|path| !path.is_file())
        .map(|path| path.display().to_string())
        .collect::<Vec<String>>();
    if !missing.is_empty() {
        bail!("input files not found: {}", missing.join(", "));
    }

    let config = ExtractionConfig::from(&args.extraction);
    info!(
        files = args.paths.len(),
        ocr_mode = config.ocr_mode.as_str(),
        page_limit = config.page_limit,
        exclude_token = %config.exclude_token,
        "extraction requested"
    );

    let merged = Orchestrator::new(&config).process(&args.paths);
    let with_text = merged
        .files
        .iter()
        .filter(|file| file.outcome == FileOutcome::Extracted)
        .count();
    info!(
        files_seen = merged.files.len(),
        files_with_text = with_text,
        chars = merged.text.chars().count(),
        sentinel = merged.sentinel,
        warnings = merged.warnings.len(),
        "extraction finished"
    );

    match &args.output {
        Some(output) => {
            let mut data = merged.text.into_bytes();
            data.push(b'\n');
            write_atomically(output, &data)?;
            info!(path = %output.display(), "merged text written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", merged.text).context("failed to write merged text to stdout")?;
        }
    }

    Ok(())
}
