use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{
    DEFAULT_DOC_CONVERTER, DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_EXCLUDE_TOKEN, DEFAULT_OCR_LANG,
    DEFAULT_OCR_MIN_TEXT_CHARS, DEFAULT_PAGE_LIMIT, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_STABLE_SAMPLES, DEFAULT_STATE_DIR,
};

#[derive(Parser, Debug)]
#[command(
    name = "tenderdocs",
    version,
    about = "Tender attachment text extraction with resumable batch checkpoints"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract merged text from local documents and archives
    Extract(ExtractArgs),
    /// Process the next unprocessed ledger rows within the configured quota
    Batch(BatchArgs),
    /// Report ledger progress and invocation counter state
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractionArgs {
    #[arg(long, default_value = DEFAULT_EXCLUDE_TOKEN)]
    pub exclude_token: String,

    #[arg(long, value_enum, default_value_t = OcrMode::Auto)]
    pub ocr_mode: OcrMode,

    #[arg(long, default_value = DEFAULT_OCR_LANG)]
    pub ocr_lang: String,

    #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
    pub page_limit: usize,

    #[arg(long, default_value_t = DEFAULT_OCR_MIN_TEXT_CHARS)]
    pub ocr_min_text_chars: usize,

    #[arg(long, default_value = DEFAULT_DOC_CONVERTER)]
    pub doc_converter: String,
}

#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    #[arg(long)]
    pub ledger: PathBuf,

    #[arg(long, default_value = "reference")]
    pub id_column: String,

    #[arg(long, default_value = "source")]
    pub source_column: String,

    #[arg(long, default_value = "merged_text")]
    pub result_column: String,

    #[arg(long, default_value = "error")]
    pub error_column: String,
}

#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    #[arg(long, default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    #[arg(long)]
    pub counter_path: Option<PathBuf>,

    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    #[arg(long)]
    pub summary_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub extraction: ExtractionArgs,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[command(flatten)]
    pub state: StateArgs,

    #[command(flatten)]
    pub extraction: ExtractionArgs,

    #[arg(long)]
    pub rows_per_run: Option<usize>,

    #[arg(long)]
    pub max_invocations: Option<u64>,

    #[arg(long, value_enum, default_value_t = SourceMode::Local)]
    pub source_mode: SourceMode,

    #[arg(long)]
    pub fetch_command: Option<String>,

    #[arg(long = "fetch-arg", allow_hyphen_values = true)]
    pub fetch_args: Vec<String>,

    #[arg(long, default_value_t = DEFAULT_DOWNLOAD_TIMEOUT_SECS)]
    pub download_timeout_secs: u64,

    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    #[arg(long, default_value_t = DEFAULT_STABLE_SAMPLES)]
    pub stable_samples: u32,

    #[arg(long = "partial-suffix")]
    pub partial_suffixes: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[command(flatten)]
    pub state: StateArgs,

    #[arg(long)]
    pub max_invocations: Option<u64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OcrMode {
    Off,
    Auto,
    Force,
}

impl OcrMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Auto => "auto",
            Self::Force => "force",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SourceMode {
    /// Source cells hold local file paths separated by `;`
    Local,
    /// Source cells are handed to an external fetch command
    Command,
}

impl SourceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Command => "command",
        }
    }
}
