use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use csv::{ReaderBuilder, WriterBuilder};
use tracing::info;

use crate::config::LedgerSchema;
use crate::model::WorkItem;
use crate::util::write_atomically;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Positions of the schema columns inside a ledger row. This is the only
/// place a `WorkItem` is read from or written back to row cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub id: usize,
    pub source: usize,
    pub result: usize,
    pub error: usize,
}

impl ColumnMap {
    pub fn read(&self, index: usize, cells: &[String]) -> WorkItem {
        WorkItem {
            row: index,
            identity: cell(cells, self.id).unwrap_or_default(),
            source: cell(cells, self.source),
            result: cell(cells, self.result),
            error: cell(cells, self.error),
        }
    }

    /// Writes the mutable fields of `item` back. Identity and source are
    /// owned by whoever fills the ledger and are never rewritten.
    pub fn write(&self, item: &WorkItem, cells: &mut [String]) {
        cells[self.result] = item.result.clone().unwrap_or_default();
        cells[self.error] = item.error.clone().unwrap_or_default();
    }
}

fn cell(cells: &[String], index: usize) -> Option<String> {
    cells
        .get(index)
        .filter(|value| !value.is_empty())
        .cloned()
}

/// Tabular work ledger held fully in memory and rewritten in full on every
/// checkpoint. Columns unknown to the schema are carried through untouched.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    columns: ColumnMap,
    has_bom: bool,
}

impl Ledger {
    pub fn load(path: &Path, schema: &LedgerSchema) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read ledger {}", path.display()))?;
        let has_bom = bytes.starts_with(UTF8_BOM);
        let body = if has_bom {
            &bytes[UTF8_BOM.len()..]
        } else {
            &bytes[..]
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(body);

        let mut headers = reader
            .headers()
            .with_context(|| format!("failed to read ledger header {}", path.display()))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<String>>();
        if headers.iter().all(|header| header.is_empty()) {
            bail!("ledger {} has no header row", path.display());
        }

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.with_context(|| {
                format!("failed to parse ledger row {} in {}", index + 1, path.display())
            })?;
            let mut row = record.iter().map(str::to_string).collect::<Vec<String>>();
            if row.len() > headers.len() {
                if row[headers.len()..].iter().any(|cell| !cell.trim().is_empty()) {
                    bail!(
                        "ledger row {} in {} has {} cells but the header has {}",
                        index + 1,
                        path.display(),
                        row.len(),
                        headers.len()
                    );
                }
                row.truncate(headers.len());
            }
            rows.push(row);
        }

        let id = require_column(&headers, &schema.id_column, path)?;
        let source = require_column(&headers, &schema.source_column, path)?;
        let result = ensure_column(&mut headers, &schema.result_column, path);
        let error = ensure_column(&mut headers, &schema.error_column, path);

        for row in &mut rows {
            if row.len() < headers.len() {
                row.resize(headers.len(), String::new());
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
            columns: ColumnMap {
                id,
                source,
                result,
                error,
            },
            has_bom,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row_cells(&self, index: usize) -> Option<&Vec<String>> {
        self.rows.get(index)
    }

    pub fn item(&self, index: usize) -> Option<WorkItem> {
        self.rows
            .get(index)
            .map(|cells| self.columns.read(index, cells))
    }

    pub fn items(&self) -> Vec<WorkItem> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, cells)| self.columns.read(index, cells))
            .collect()
    }

    /// First row at or after `from` whose result is still null and whose
    /// source is set. Rows without a source never become the resume point.
    pub fn first_pending(&self, from: usize) -> Option<usize> {
        (from..self.rows.len()).find(|&index| {
            let cells = &self.rows[index];
            cells[self.columns.result].is_empty() && !cells[self.columns.source].trim().is_empty()
        })
    }

    pub fn pending_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|cells| cells[self.columns.result].is_empty())
            .count()
    }

    /// Stores a non-null result and clears any earlier error marker.
    /// A row holding a result is never rewritten.
    pub fn record_result(&mut self, index: usize, text: &str) -> Result<()> {
        let mut item = self.existing_item(index)?;
        if item.is_processed() {
            bail!(
                "refusing to overwrite result of ledger row {} ({})",
                index,
                item.identity
            );
        }
        if text.is_empty() {
            bail!("empty result for ledger row {} ({})", index, item.identity);
        }

        item.result = Some(text.to_string());
        item.error = None;
        self.columns.write(&item, &mut self.rows[index]);
        Ok(())
    }

    /// Leaves the result null and sets the error marker, so a later
    /// invocation retries the row.
    pub fn record_error(&mut self, index: usize, reason: &str) -> Result<()> {
        let mut item = self.existing_item(index)?;
        if item.is_processed() {
            bail!(
                "refusing to mark processed ledger row {} ({}) as failed",
                index,
                item.identity
            );
        }

        item.error = Some(reason.to_string()).filter(|reason| !reason.is_empty());
        self.columns.write(&item, &mut self.rows[index]);
        Ok(())
    }

    fn existing_item(&self, index: usize) -> Result<WorkItem> {
        self.item(index).ok_or_else(|| {
            anyhow!(
                "ledger row {} out of range ({} rows in {})",
                index,
                self.rows.len(),
                self.path.display()
            )
        })
    }

    /// Persists the whole ledger. Readers see either the previous or the new
    /// file, never a partial one.
    pub fn checkpoint(&self) -> Result<()> {
        let data = encode_csv(&self.headers, self.rows.iter(), self.has_bom)?;
        write_atomically(&self.path, &data)
            .with_context(|| format!("failed to checkpoint ledger {}", self.path.display()))
    }
}

fn require_column(headers: &[String], name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|header| header == name)
        .ok_or_else(|| {
            anyhow!(
                "ledger {} has no '{}' column (found: {})",
                path.display(),
                name,
                headers.join(", ")
            )
        })
}

fn ensure_column(headers: &mut Vec<String>, name: &str, path: &Path) -> usize {
    if let Some(index) = headers.iter().position(|header| header == name) {
        return index;
    }

    info!(ledger = %path.display(), column = name, "adding missing ledger column");
    headers.push(name.to_string());
    headers.len() - 1
}

/// Serializes a header plus rows, optionally prefixed with a UTF-8 BOM.
pub fn encode_csv<'a, I>(headers: &[String], rows: I, bom: bool) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a Vec<String>>,
{
    let buffer = if bom { UTF8_BOM.to_vec() } else { Vec::new() };
    let mut writer = WriterBuilder::new().flexible(true).from_writer(buffer);

    writer
        .write_record(headers)
        .context("failed to encode csv header")?;
    for row in rows {
        writer
            .write_record(row)
            .context("failed to encode csv row")?;
    }

    writer
        .into_inner()
        .map_err(|error| anyhow!("failed to flush csv buffer: {}", error.error()))
}
