use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::debug;

use super::chain::{Applicability, ExtractorChain, TextExtractor};
use super::tools::{command_available, decode_lossy, run_checked, scratch_path};
use crate::cli::OcrMode;
use crate::config::ExtractionConfig;
use crate::model::{DocumentFormat, ExtractionMethod};

const OCR_RENDER_DPI: u32 = 300;

/// Text layer of the first `page_limit` pages via `pdftotext`.
pub struct PdfTextLayer {
    pub page_limit: usize,
}

/// Rasterizes the first `page_limit` pages with `pdftoppm` and runs
/// `tesseract` over each image.
pub struct PdfOcr {
    pub page_limit: usize,
    pub lang: String,
}

pub fn pdf_chain(config: &ExtractionConfig) -> ExtractorChain {
    let chain = ExtractorChain::new(DocumentFormat::Pdf).then(
        PdfTextLayer {
            page_limit: config.page_limit,
        },
        Applicability::Always,
    );

    let ocr = PdfOcr {
        page_limit: config.page_limit,
        lang: config.ocr_lang.clone(),
    };
    match config.ocr_mode {
        OcrMode::Off => chain,
        OcrMode::Auto => chain.then(ocr, Applicability::BelowChars(config.ocr_min_text_chars)),
        OcrMode::Force => chain.then(ocr, Applicability::Always),
    }
}

impl TextExtractor for PdfTextLayer {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::NativeLayer
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let pages = extract_pages_with_pdftotext(path, self.page_limit)?;
        debug!(path = %path.display(), pages = pages.len(), "read pdf text layer");

        let mut text = String::new();
        for page in pages.iter().take(self.page_limit) {
            text.push_str(page);
            text.push('\n');
        }
        Ok(text)
    }
}

impl TextExtractor for PdfOcr {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ocr
    }

    fn extract(&self, path: &Path) -> Result<String> {
        if !command_available("pdftoppm") || !command_available("tesseract") {
            bail!(
                "OCR requested for {} but pdftoppm/tesseract are unavailable",
                path.display()
            );
        }

        let scratch_dir = scratch_path(path, "ocr");
        fs::create_dir_all(&scratch_dir)
            .with_context(|| format!("failed to create {}", scratch_dir.display()))?;

        let result = self.ocr_pages(path, &scratch_dir);
        let _ = fs::remove_dir_all(&scratch_dir);
        result
    }
}

impl PdfOcr {
    fn ocr_pages(&self, pdf_path: &Path, scratch_dir: &Path) -> Result<String> {
        let images = rasterize_pages(pdf_path, scratch_dir, self.page_limit)?;

        let mut text = String::new();
        for image in images.iter().take(self.page_limit) {
            let output = run_checked(
                Command::new("tesseract")
                    .arg(image)
                    .arg("stdout")
                    .arg("-l")
                    .arg(&self.lang),
                "tesseract",
                image,
            )?;
            text.push_str(&decode_lossy(&output.stdout));
            text.push('\n');
        }

        Ok(text)
    }
}

fn extract_pages_with_pdftotext(pdf_path: &Path, page_limit: usize) -> Result<Vec<String>> {
    let output = run_checked(
        Command::new("pdftotext")
            .arg("-enc")
            .arg("UTF-8")
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg(page_limit.to_string())
            .arg(pdf_path)
            .arg("-"),
        "pdftotext",
        pdf_path,
    )?;

    let raw = decode_lossy(&output.stdout);
    let mut pages: Vec<String> = raw.split('\u{000C}').map(str::to_string).collect();

    while let Some(last_page) = pages.last() {
        if last_page.trim().is_empty() {
            pages.pop();
            continue;
        }
        break;
    }

    Ok(pages)
}

fn rasterize_pages(pdf_path: &Path, scratch_dir: &Path, page_limit: usize) -> Result<Vec<PathBuf>> {
    let output_root = scratch_dir.join("page");
    run_checked(
        Command::new("pdftoppm")
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg(page_limit.to_string())
            .arg("-r")
            .arg(OCR_RENDER_DPI.to_string())
            .arg("-png")
            .arg(pdf_path)
            .arg(&output_root),
        "pdftoppm",
        pdf_path,
    )?;

    // pdftoppm zero-pads page numbers to a common width, so name order is page order.
    let mut images = fs::read_dir(scratch_dir)
        .with_context(|| format!("failed to read {}", scratch_dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("png"))
                .unwrap_or(false)
        })
        .collect::<Vec<PathBuf>>();
    images.sort();

    if images.is_empty() {
        bail!(
            "pdftoppm did not produce any page image for {}",
            pdf_path.display()
        );
    }

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::fixtures::minimal_pdf;

    #[test]
    fn text_layer_reads_well_formed_pdf() {
        if !command_available("pdftotext") {
            eprintln!("skipping text_layer_reads_well_formed_pdf: pdftotext not installed");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("avis.pdf");
        fs::write(&path, minimal_pdf("Appel d offres ouvert numero 12")).unwrap();

        let text = PdfTextLayer { page_limit: 10 }.extract(&path).unwrap();
        assert!(text.contains("Appel d offres ouvert numero 12"));
    }

    #[test]
    fn truncated_pdf_degrades_to_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        let pdf = minimal_pdf("Appel d offres");
        fs::write(&path, &pdf[..pdf.len() / 3]).unwrap();

        let chain = pdf_chain(&ExtractionConfig::default());
        let mut warnings = Vec::new();
        let result = chain.run(&path, &mut warnings);

        assert!(result.text.trim().is_empty());
        assert_eq!(result.format, DocumentFormat::Pdf);
    }

    #[test]
    fn ocr_mode_controls_fallback_tiers() {
        let mut config = ExtractionConfig {
            ocr_mode: OcrMode::Off,
            ..ExtractionConfig::default()
        };
        assert_eq!(
            pdf_chain(&config).tier_methods(),
            vec![ExtractionMethod::NativeLayer]
        );

        config.ocr_mode = OcrMode::Auto;
        assert_eq!(
            pdf_chain(&config).tier_methods(),
            vec![ExtractionMethod::NativeLayer, ExtractionMethod::Ocr]
        );
    }
}
