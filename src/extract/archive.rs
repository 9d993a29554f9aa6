use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;
use zip::ZipArchive;

pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Directory an archive unpacks into: a sibling named after the archive
/// without its extension.
pub fn expansion_dir(archive_path: &Path) -> PathBuf {
    let stem = archive_path
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_else(|| "archive".into());
    archive_path.with_file_name(stem)
}

/// Unpacks `archive_path` next to itself and returns every regular file
/// below the unpack directory, sorted by path. The archive is left in place.
pub fn expand_archive(archive_path: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open archive {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("failed to read archive {}", archive_path.display()))?;

    let target_dir = expansion_dir(archive_path);
    fs::create_dir_all(&target_dir)
        .with_context(|| format!("failed to create {}", target_dir.display()))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).with_context(|| {
            format!(
                "failed to read entry {} of {}",
                index,
                archive_path.display()
            )
        })?;

        // Entries escaping the target directory are dropped.
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("failed to create {}", out_path.display()))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut out_file = File::create(&out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out_file)
            .with_context(|| format!("failed to unpack {}", out_path.display()))?;
    }

    collect_files(&target_dir)
}

pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::fixtures::zip_bytes;

    #[test]
    fn expands_nested_entries_into_sibling_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("DCE_2024.zip");
        fs::write(
            &archive_path,
            zip_bytes(&[
                ("RC.pdf", b"rc".as_slice()),
                ("annexes/CPS.docx", b"cps".as_slice()),
                ("annexes/bpu/BPU.doc", b"bpu".as_slice()),
            ]),
        )
        .unwrap();

        let files = expand_archive(&archive_path).unwrap();

        let target = dir.path().join("DCE_2024");
        assert_eq!(
            files,
            vec![
                target.join("RC.pdf"),
                target.join("annexes/CPS.docx"),
                target.join("annexes/bpu/BPU.doc"),
            ]
        );
        assert!(archive_path.exists());
    }

    #[test]
    fn corrupt_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("broken.zip");
        fs::write(&archive_path, b"PK\x03\x04 truncated").unwrap();

        assert!(expand_archive(&archive_path).is_err());
    }

    #[test]
    fn archive_detection_is_case_insensitive() {
        assert!(is_archive(Path::new("DOSSIER.ZIP")));
        assert!(!is_archive(Path::new("dossier.pdf")));
        assert!(!is_archive(Path::new("zip")));
    }
}
