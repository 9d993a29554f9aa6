//! Document text extraction: archive expansion, format dispatch with
//! fallback tiers, normalization and merging into one text per work item.

pub mod archive;
pub mod chain;
pub mod classify;
#[cfg(test)]
pub mod fixtures;
pub mod normalize;
pub mod office;
pub mod pdf;
pub mod tools;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use self::archive::{expand_archive, is_archive};
use self::chain::ExtractorChain;
use self::classify::{Classification, classify};
use self::normalize::normalize_text;
use crate::config::{ExtractionConfig, NO_DOCUMENT_SENTINEL, NO_TEXT_SENTINEL};
use crate::model::{DocumentFormat, ExtractionMethod};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FileOutcome {
    Extracted,
    Empty,
    Excluded,
    Unsupported,
    ArchiveFailed,
}

impl FileOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extracted => "extracted",
            Self::Empty => "empty",
            Self::Excluded => "excluded",
            Self::Unsupported => "unsupported",
            Self::ArchiveFailed => "archive_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub format: Option<DocumentFormat>,
    pub method: Option<ExtractionMethod>,
    pub outcome: FileOutcome,
    pub char_count: usize,
}

impl FileReport {
    fn skipped(path: &Path, outcome: FileOutcome) -> Self {
        Self {
            path: path.to_path_buf(),
            format: None,
            method: None,
            outcome,
            char_count: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergedText {
    pub text: String,
    /// True when `text` is one of the fixed "nothing extracted" values.
    pub sentinel: bool,
    pub files: Vec<FileReport>,
    pub warnings: Vec<String>,
}

pub struct Orchestrator {
    exclude_token: String,
    pdf: ExtractorChain,
    docx: ExtractorChain,
    doc: ExtractorChain,
}

impl Orchestrator {
    pub fn new(config: &ExtractionConfig) -> Self {
        let orchestrator = Self {
            exclude_token: config.exclude_token.clone(),
            pdf: pdf::pdf_chain(config),
            docx: office::docx_chain(),
            doc: office::doc_chain(config),
        };
        debug!(
            pdf = ?orchestrator.pdf.tier_methods(),
            docx = ?orchestrator.docx.tier_methods(),
            doc = ?orchestrator.doc.tier_methods(),
            "extractor chains"
        );
        orchestrator
    }

    fn chain_for(&self, format: DocumentFormat) -> &ExtractorChain {
        match format {
            DocumentFormat::Pdf => &self.pdf,
            DocumentFormat::Docx => &self.docx,
            DocumentFormat::Doc => &self.doc,
        }
    }

    /// Merged text for one work item's document set. Never fails: unusable
    /// files contribute nothing and an empty outcome becomes a sentinel.
    pub fn process(&self, documents: &[PathBuf]) -> MergedText {
        let mut files = Vec::new();
        let mut warnings = Vec::new();
        let mut texts = Vec::new();

        for path in self.expand(documents, &mut files, &mut warnings) {
            let (report, text) = self.extract_file(&path, &mut warnings);
            files.push(report);
            if let Some(text) = text {
                texts.push(text);
            }
        }

        let (text, sentinel) = merge_texts(texts, !documents.is_empty());
        MergedText {
            text,
            sentinel,
            files,
            warnings,
        }
    }

    /// Replaces each archive by the files it unpacks to. A corrupt archive
    /// contributes no files.
    fn expand(
        &self,
        documents: &[PathBuf],
        files: &mut Vec<FileReport>,
        warnings: &mut Vec<String>,
    ) -> Vec<PathBuf> {
        let mut expanded = Vec::new();
        for path in documents {
            if !is_archive(path) {
                expanded.push(path.clone());
                continue;
            }

            match expand_archive(path) {
                Ok(unpacked) => {
                    info!(archive = %path.display(), files = unpacked.len(), "expanded archive");
                    expanded.extend(unpacked);
                }
                Err(error) => {
                    warn!(archive = %path.display(), error = %format!("{error:#}"), "failed to unzip");
                    warnings.push(format!("failed to unzip {}: {:#}", path.display(), error));
                    files.push(FileReport::skipped(path, FileOutcome::ArchiveFailed));
                }
            }
        }
        expanded
    }

    /// Exclusion filter, classification, extraction and normalization of
    /// one file. Returns the normalized text when it is non-empty.
    pub fn extract_file(&self, path: &Path, warnings: &mut Vec<String>) -> (FileReport, Option<String>) {
        let format = match classify(path, &self.exclude_token) {
            Classification::Excluded => {
                info!(path = %path.display(), token = %self.exclude_token, "skipped excluded document");
                return (FileReport::skipped(path, FileOutcome::Excluded), None);
            }
            Classification::Unsupported => {
                info!(path = %path.display(), "skipped unsupported document");
                return (FileReport::skipped(path, FileOutcome::Unsupported), None);
            }
            Classification::Supported(format) => format,
        };

        let raw = self.chain_for(format).run(path, warnings);
        let text = normalize_text(&raw.text);
        let char_count = text.chars().count();
        info!(
            path = %path.display(),
            format = format.as_str(),
            method = raw.method.map(|method| method.as_str()).unwrap_or("none"),
            chars = char_count,
            "extracted document"
        );

        let outcome = if text.is_empty() {
            FileOutcome::Empty
        } else {
            FileOutcome::Extracted
        };
        let report = FileReport {
            path: path.to_path_buf(),
            format: Some(format),
            method: raw.method,
            outcome,
            char_count,
        };

        (report, (!text.is_empty()).then_some(text))
    }
}

/// Joins non-empty texts with a blank line. With nothing to join, returns
/// the sentinel matching whether any document was present at all.
pub fn merge_texts(texts: Vec<String>, any_document: bool) -> (String, bool) {
    let texts = texts
        .into_iter()
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<String>>();

    if !texts.is_empty() {
        return (texts.join("\n\n"), false);
    }

    let sentinel = if any_document {
        NO_TEXT_SENTINEL
    } else {
        NO_DOCUMENT_SENTINEL
    };
    (sentinel.to_string(), true)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::extract::fixtures::{docx_bytes, zip_bytes};

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(&ExtractionConfig::default())
    }

    #[test]
    fn merges_non_excluded_documents_with_blank_line() {
        let dir = tempfile::tempdir().unwrap();
        let alpha = dir.path().join("alpha.docx");
        let terms = dir.path().join("CPS_conditions.docx");
        let beta = dir.path().join("beta.docx");
        fs::write(&alpha, docx_bytes(&["Alpha"])).unwrap();
        fs::write(&terms, docx_bytes(&["Standard terms"])).unwrap();
        fs::write(&beta, docx_bytes(&["Beta"])).unwrap();

        let merged = orchestrator().process(&[alpha, terms, beta]);

        assert_eq!(merged.text, "Alpha\n\nBeta");
        assert!(!merged.sentinel);
        let outcomes = merged
            .files
            .iter()
            .map(|file| file.outcome)
            .collect::<Vec<FileOutcome>>();
        assert_eq!(
            outcomes,
            vec![
                FileOutcome::Extracted,
                FileOutcome::Excluded,
                FileOutcome::Extracted
            ]
        );
    }

    #[test]
    fn nothing_usable_yields_no_text_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.docx");
        let terms = dir.path().join("cps.docx");
        let drawing = dir.path().join("plan.dwg");
        fs::write(&empty, docx_bytes(&["", "  "])).unwrap();
        fs::write(&terms, docx_bytes(&["Standard terms"])).unwrap();
        fs::write(&drawing, b"dwg").unwrap();

        let merged = orchestrator().process(&[empty, terms, drawing]);

        assert_eq!(merged.text, NO_TEXT_SENTINEL);
        assert!(merged.sentinel);
    }

    #[test]
    fn empty_document_set_yields_no_document_sentinel() {
        let merged = orchestrator().process(&[]);
        assert_eq!(merged.text, NO_DOCUMENT_SENTINEL);
        assert!(merged.sentinel);
    }

    #[test]
    fn archives_are_expanded_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("dce.zip");
        let rc = docx_bytes(&["Règlement   de consultation"]);
        let cps = docx_bytes(&["Cahier des prescriptions spéciales"]);
        let avis = docx_bytes(&["Avis d'appel d'offres"]);
        fs::write(
            &archive,
            zip_bytes(&[
                ("1_RC.docx", rc.as_slice()),
                ("2_CPS.docx", cps.as_slice()),
                ("pieces/3_avis.docx", avis.as_slice()),
                ("pieces/readme.txt", b"ignored".as_slice()),
            ]),
        )
        .unwrap();

        let merged = orchestrator().process(&[archive]);

        assert_eq!(
            merged.text,
            "Règlement de consultation\n\nAvis d'appel d'offres"
        );
        assert!(dir.path().join("dce").is_dir());
    }

    #[test]
    fn corrupt_archive_contributes_nothing_but_other_documents_continue() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        let notice = dir.path().join("notice.docx");
        fs::write(&archive, b"not a zip").unwrap();
        fs::write(&notice, docx_bytes(&["Avis rectificatif"])).unwrap();

        let merged = orchestrator().process(&[archive, notice]);

        assert_eq!(merged.text, "Avis rectificatif");
        assert_eq!(merged.files[0].outcome, FileOutcome::ArchiveFailed);
        assert_eq!(merged.warnings.len(), 1);
    }

    #[test]
    fn only_corrupt_archive_yields_no_text_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"not a zip").unwrap();

        let merged = orchestrator().process(&[archive]);
        assert_eq!(merged.text, NO_TEXT_SENTINEL);
    }

    #[test]
    fn merge_texts_skips_blank_entries() {
        let (text, sentinel) = merge_texts(
            vec!["Alpha".to_string(), " \n".to_string(), "Beta".to_string()],
            true,
        );
        assert_eq!(text, "Alpha\n\nBeta");
        assert!(!sentinel);
    }
}
