use std::path::Path;

use anyhow::Result;
use tracing::{debug, warn};

use crate::model::{DocumentFormat, ExtractionMethod, ExtractionResult};

pub trait TextExtractor {
    fn method(&self) -> ExtractionMethod;

    fn extract(&self, path: &Path) -> Result<String>;
}

/// When a tier runs, judged against the text accumulated by earlier tiers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Applicability {
    Always,
    /// Runs only while the accumulated text, trimmed, has fewer characters.
    BelowChars(usize),
}

impl Applicability {
    pub fn applies(self, accumulated: &str) -> bool {
        match self {
            Self::Always => true,
            Self::BelowChars(threshold) => accumulated.trim().chars().count() < threshold,
        }
    }
}

pub struct Tier {
    pub extractor: Box<dyn TextExtractor>,
    pub applicability: Applicability,
}

/// Ordered fallback policy for one document format.
pub struct ExtractorChain {
    format: DocumentFormat,
    tiers: Vec<Tier>,
}

impl ExtractorChain {
    pub fn new(format: DocumentFormat) -> Self {
        Self {
            format,
            tiers: Vec::new(),
        }
    }

    pub fn then(mut self, extractor: impl TextExtractor + 'static, applicability: Applicability) -> Self {
        self.tiers.push(Tier {
            extractor: Box::new(extractor),
            applicability,
        });
        self
    }

    pub fn tier_methods(&self) -> Vec<ExtractionMethod> {
        self.tiers.iter().map(|tier| tier.extractor.method()).collect()
    }

    /// Runs every applicable tier. Tier errors are logged and pushed to
    /// `warnings`; they never escape, so a fully failed chain yields empty text.
    pub fn run(&self, path: &Path, warnings: &mut Vec<String>) -> ExtractionResult {
        let mut result = ExtractionResult::empty(self.format);

        for tier in &self.tiers {
            let method = tier.extractor.method();
            if !tier.applicability.applies(&result.text) {
                debug!(path = %path.display(), method = method.as_str(), "tier not applicable");
                continue;
            }

            match tier.extractor.extract(path) {
                Ok(text) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    result.text.push_str(&text);
                    result.text.push('\n');
                    result.method = Some(method);
                }
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        method = method.as_str(),
                        error = %format!("{error:#}"),
                        "extraction tier failed"
                    );
                    warnings.push(format!(
                        "{} extraction failed for {}: {:#}",
                        method.as_str(),
                        path.display(),
                        error
                    ));
                }
            }
        }

        result
    }
}
