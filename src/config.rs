use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{BatchArgs, ExtractionArgs, LedgerArgs, OcrMode, StateArgs};

pub const DEFAULT_EXCLUDE_TOKEN: &str = "cps";
pub const DEFAULT_OCR_LANG: &str = "fra+ara+eng";
pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const DEFAULT_OCR_MIN_TEXT_CHARS: usize = 50;
pub const DEFAULT_DOC_CONVERTER: &str = "antiword";

pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_STABLE_SAMPLES: u32 = 3;
pub const DEFAULT_PARTIAL_SUFFIXES: [&str; 2] = [".crdownload", ".part"];
/// Chrome writes these next to a download while it is being assembled.
pub const TRANSIENT_FILE_PREFIX: &str = ".com.google.Chrome.";

pub const DEFAULT_STATE_DIR: &str = ".cache/tenderdocs";
pub const COUNTER_FILE_NAME: &str = "batch_counter.txt";
pub const STAGING_DIR_NAME: &str = "staging";
pub const SUMMARY_FILE_NAME: &str = "tender_results_summary.csv";

pub const NO_DOCUMENT_SENTINEL: &str = "No document downloaded";
pub const NO_TEXT_SENTINEL: &str = "No relevant text extracted";

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub exclude_token: String,
    pub ocr_mode: OcrMode,
    pub ocr_lang: String,
    pub page_limit: usize,
    pub ocr_min_text_chars: usize,
    pub doc_converter: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            exclude_token: DEFAULT_EXCLUDE_TOKEN.to_string(),
            ocr_mode: OcrMode::Auto,
            ocr_lang: DEFAULT_OCR_LANG.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
            ocr_min_text_chars: DEFAULT_OCR_MIN_TEXT_CHARS,
            doc_converter: DEFAULT_DOC_CONVERTER.to_string(),
        }
    }
}

impl From<&ExtractionArgs> for ExtractionConfig {
    fn from(args: &ExtractionArgs) -> Self {
        Self {
            exclude_token: args.exclude_token.clone(),
            ocr_mode: args.ocr_mode,
            ocr_lang: args.ocr_lang.clone(),
            page_limit: args.page_limit.max(1),
            ocr_min_text_chars: args.ocr_min_text_chars,
            doc_converter: args.doc_converter.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StabilityConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub stable_samples: u32,
    pub partial_suffixes: Vec<String>,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            stable_samples: DEFAULT_STABLE_SAMPLES,
            partial_suffixes: DEFAULT_PARTIAL_SUFFIXES
                .iter()
                .map(|suffix| suffix.to_string())
                .collect(),
        }
    }
}

impl StabilityConfig {
    /// Number of samples that fit into the timeout; always at least one.
    pub fn max_samples(&self) -> u64 {
        let interval_ms = self.poll_interval.as_millis().max(1);
        let samples = self.timeout.as_millis() / interval_ms;
        u64::try_from(samples).unwrap_or(u64::MAX).max(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaConfig {
    pub rows_per_invocation: Option<usize>,
    pub max_invocations: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct LedgerSchema {
    pub id_column: String,
    pub source_column: String,
    pub result_column: String,
    pub error_column: String,
}

impl Default for LedgerSchema {
    fn default() -> Self {
        Self {
            id_column: "reference".to_string(),
            source_column: "source".to_string(),
            result_column: "merged_text".to_string(),
            error_column: "error".to_string(),
        }
    }
}

impl From<&LedgerArgs> for LedgerSchema {
    fn from(args: &LedgerArgs) -> Self {
        Self {
            id_column: args.id_column.clone(),
            source_column: args.source_column.clone(),
            result_column: args.result_column.clone(),
            error_column: args.error_column.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub counter_path: PathBuf,
    pub staging_dir: PathBuf,
    pub summary_path: PathBuf,
    pub manifest_dir: PathBuf,
}

impl StatePaths {
    pub fn under(state_dir: &Path) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            counter_path: state_dir.join(COUNTER_FILE_NAME),
            staging_dir: state_dir.join(STAGING_DIR_NAME),
            summary_path: state_dir.join(SUMMARY_FILE_NAME),
            manifest_dir: state_dir.join("manifests"),
        }
    }
}

impl From<&StateArgs> for StatePaths {
    fn from(args: &StateArgs) -> Self {
        let defaults = Self::under(&args.state_dir);
        Self {
            counter_path: args.counter_path.clone().unwrap_or(defaults.counter_path),
            staging_dir: args.staging_dir.clone().unwrap_or(defaults.staging_dir),
            summary_path: args.summary_path.clone().unwrap_or(defaults.summary_path),
            ..defaults
        }
    }
}

impl From<&BatchArgs> for StabilityConfig {
    fn from(args: &BatchArgs) -> Self {
        let partial_suffixes = if args.partial_suffixes.is_empty() {
            Self::default().partial_suffixes
        } else {
            args.partial_suffixes.clone()
        };

        Self {
            timeout: Duration::from_secs(args.download_timeout_secs),
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            stable_samples: args.stable_samples.max(1),
            partial_suffixes,
        }
    }
}

impl From<&BatchArgs> for QuotaConfig {
    fn from(args: &BatchArgs) -> Self {
        Self {
            rows_per_invocation: args.rows_per_run,
            max_invocations: args.max_invocations,
        }
    }
}
