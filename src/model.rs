use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Doc,
}

impl DocumentFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Doc => "doc",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    NativeLayer,
    Ocr,
    ExternalSubprocess,
}

impl ExtractionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NativeLayer => "native_layer",
            Self::Ocr => "ocr",
            Self::ExternalSubprocess => "external_subprocess",
        }
    }
}

/// Raw output of one extractor chain for one file, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub text: String,
    pub format: DocumentFormat,
    /// Last tier that contributed text; `None` when every tier came back empty.
    pub method: Option<ExtractionMethod>,
}

impl ExtractionResult {
    pub fn empty(format: DocumentFormat) -> Self {
        Self {
            text: String::new(),
            format,
            method: None,
        }
    }
}

/// One ledger row seen through the ledger schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub row: usize,
    pub identity: String,
    pub source: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl WorkItem {
    pub fn is_processed(&self) -> bool {
        self.result.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProvenance {
    pub file_name: String,
    pub format: Option<DocumentFormat>,
    pub method: Option<ExtractionMethod>,
    pub outcome: String,
    pub char_count: usize,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemProvenance {
    pub row: usize,
    pub identity: String,
    pub outcome: String,
    pub result_chars: usize,
    pub documents: Vec<DocumentProvenance>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchCounts {
    pub ledger_rows: usize,
    pub pending_rows_before: usize,
    pub pending_rows_after: usize,
    pub rows_attempted: usize,
    pub results_recorded: usize,
    pub sentinel_results: usize,
    pub rows_left_pending: usize,
    pub rows_skipped_without_source: usize,
    pub files_seen: usize,
    pub files_excluded: usize,
    pub files_unsupported: usize,
    pub files_with_text: usize,
    pub native_layer_files: usize,
    pub ocr_files: usize,
    pub external_subprocess_files: usize,
    pub archives_failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfigEcho {
    pub exclude_token: String,
    pub ocr_mode: String,
    pub ocr_lang: String,
    pub page_limit: usize,
    pub ocr_min_text_chars: usize,
    pub doc_converter: String,
    pub rows_per_invocation: Option<usize>,
    pub max_invocations: Option<u64>,
    pub source_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPaths {
    pub ledger_path: String,
    pub counter_path: String,
    pub staging_dir: String,
    pub summary_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub invocation: u64,
    pub started_at: String,
    pub updated_at: String,
    pub failure_reason: Option<String>,
    pub config: BatchConfigEcho,
    pub paths: BatchPaths,
    pub counts: BatchCounts,
    pub items: Vec<ItemProvenance>,
    pub warnings: Vec<String>,
}
