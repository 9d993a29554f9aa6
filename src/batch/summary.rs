use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::ledger::encode_csv;
use crate::model::BatchRunManifest;
use crate::util::{ensure_directory, write_atomically, write_json_pretty};

pub const MANIFEST_PREFIX: &str = "batch_run_";

/// Spreadsheet-friendly export of the rows touched by one invocation. The
/// BOM makes spreadsheet tools decode non-ASCII text as UTF-8.
pub fn write_summary(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
    let data = encode_csv(headers, rows.iter(), true)?;
    write_atomically(path, &data)
        .with_context(|| format!("failed to write summary {}", path.display()))
}

pub fn write_manifest(manifest_dir: &Path, manifest: &BatchRunManifest) -> Result<PathBuf> {
    ensure_directory(manifest_dir)?;
    let path = manifest_dir.join(format!("{}.json", manifest.run_id));
    write_json_pretty(&path, manifest)?;
    Ok(path)
}

/// Newest run manifest by file name; names embed a sortable UTC stamp.
pub fn latest_manifest(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    let entries = match fs::read_dir(manifest_dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed to list {}", manifest_dir.display()));
        }
    };

    let mut manifests = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with(MANIFEST_PREFIX))
        })
        .collect::<Vec<PathBuf>>();
    manifests.sort();

    Ok(manifests.pop())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_starts_with_bom_and_keeps_ledger_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let headers = vec!["reference".to_string(), "merged_text".to_string()];
        let rows = vec![vec!["AO-1".to_string(), "Marché public".to_string()]];

        write_summary(&path, &headers, &rows).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"\xEF\xBB\xBF"));
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<&str>>(),
            vec!["reference,merged_text", "AO-1,Marché public"]
        );
    }

    #[test]
    fn latest_manifest_picks_newest_stamp() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_manifest(&dir.path().join("missing")).unwrap(), None);

        for name in [
            "batch_run_20240101T000000Z.json",
            "batch_run_20240301T000000Z.json",
            "notes.json",
            "batch_run_20240201T000000Z.json",
        ] {
            fs::write(dir.path().join(name), b"{}").unwrap();
        }

        assert_eq!(
            latest_manifest(dir.path()).unwrap(),
            Some(dir.path().join("batch_run_20240301T000000Z.json"))
        );
    }
}
