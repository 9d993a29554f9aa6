use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;

use super::chain::{Applicability, ExtractorChain, TextExtractor};
use super::tools::{decode_lossy, run_checked};
use crate::config::ExtractionConfig;
use crate::model::{DocumentFormat, ExtractionMethod};

const DOCX_BODY_PART: &str = "word/document.xml";

/// Non-empty paragraphs of a WordprocessingML package, in document order.
pub struct DocxParagraphs;

/// Legacy binary `.doc` through an external plain-text converter.
pub struct DocConverter {
    pub program: String,
}

pub fn docx_chain() -> ExtractorChain {
    ExtractorChain::new(DocumentFormat::Docx).then(DocxParagraphs, Applicability::Always)
}

pub fn doc_chain(config: &ExtractionConfig) -> ExtractorChain {
    ExtractorChain::new(DocumentFormat::Doc).then(
        DocConverter {
            program: config.doc_converter.clone(),
        },
        Applicability::Always,
    )
}

impl TextExtractor for DocxParagraphs {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::NativeLayer
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .with_context(|| format!("failed to read docx package {}", path.display()))?;

        let mut xml = String::new();
        archive
            .by_name(DOCX_BODY_PART)
            .with_context(|| format!("{} has no {}", path.display(), DOCX_BODY_PART))?
            .read_to_string(&mut xml)
            .with_context(|| format!("failed to read {} in {}", DOCX_BODY_PART, path.display()))?;

        let paragraphs = paragraphs_from_document_xml(&xml)
            .with_context(|| format!("failed to parse {} in {}", DOCX_BODY_PART, path.display()))?;

        Ok(paragraphs
            .into_iter()
            .filter(|paragraph| !paragraph.trim().is_empty())
            .collect::<Vec<String>>()
            .join("\n"))
    }
}

/// Collects the text of every paragraph element, table cells and text boxes
/// included. A paragraph is emitted when it closes, so text-box paragraphs
/// come out before the paragraph that anchors them and the order can differ
/// from the visual reading order.
fn paragraphs_from_document_xml(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut open_paragraphs: Vec<String> = Vec::new();
    let mut paragraphs = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event()? {
            Event::Start(element) => match element.local_name().as_ref() {
                b"p" => open_paragraphs.push(String::new()),
                b"t" => in_text_run = true,
                _ => {}
            },
            Event::Empty(element) => match element.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" => push_to_open(&mut open_paragraphs, "\t"),
                b"br" | b"cr" => push_to_open(&mut open_paragraphs, "\n"),
                _ => {}
            },
            Event::Text(text) if in_text_run => {
                let text = text.unescape()?;
                push_to_open(&mut open_paragraphs, &text);
            }
            Event::End(element) => match element.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    if let Some(paragraph) = open_paragraphs.pop() {
                        paragraphs.push(paragraph);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

fn push_to_open(open_paragraphs: &mut [String], text: &str) {
    if let Some(current) = open_paragraphs.last_mut() {
        current.push_str(text);
    }
}

impl TextExtractor for DocConverter {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::ExternalSubprocess
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let output = run_checked(Command::new(&self.program).arg(path), &self.program, path)?;
        Ok(decode_lossy(&output.stdout))
    }
}
