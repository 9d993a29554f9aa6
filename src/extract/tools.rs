use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, bail};
use chrono::Utc;

pub fn command_available(program: &str) -> bool {
    Command::new(program).arg("--version").output().is_ok()
}

/// Runs `program` and returns its output, failing on spawn errors and
/// non-zero exit codes.
pub fn run_checked(command: &mut Command, program: &str, subject: &Path) -> Result<Output> {
    let output = command
        .output()
        .with_context(|| format!("failed to execute {} for {}", program, subject.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "{} returned non-zero exit status for {}: {}",
            program,
            subject.display(),
            stderr.trim()
        );
    }

    Ok(output)
}

/// Best-effort UTF-8 decode: invalid sequences are dropped, NULs removed.
pub fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|character| *character != char::REPLACEMENT_CHARACTER && *character != '\u{0000}')
        .collect()
}

/// Unique scratch location in the system temp directory for one document.
pub fn scratch_path(document: &Path, purpose: &str) -> PathBuf {
    let stem = document
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("document");
    let safe_stem = stem
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character
            } else {
                '_'
            }
        })
        .collect::<String>();

    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    std::env::temp_dir().join(format!(
        "tenderdocs_{}_{}_{}_{}",
        purpose,
        safe_stem,
        std::process::id(),
        stamp
    ))
}
