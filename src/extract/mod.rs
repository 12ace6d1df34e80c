//! Content Extraction
//!
//! Turns a stored object into bounded, normalized text for the analyzer and
//! the similarity memory. Extraction never fails: unsupported, corrupt or
//! missing input produces a diagnostic string the reasoner can read.
//!
//! Output is prefixed with a format tag, e.g. `[TXT]: ...` or `[CSV Sample]:`.

use crate::storage::{base_name, split_extension, StorageBackend};
use crate::utils::head_tail_sample;
use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Reader};
use std::io::Cursor;

/// Default cap on extracted text
pub const MAX_CHARS: usize = 8000;

/// Rows sampled from CSV files (after the header)
const CSV_SAMPLE_ROWS: usize = 5;

/// Rows sampled per spreadsheet sheet
const SHEET_SAMPLE_ROWS: usize = 20;

const ERROR_TAG: &str = "[Error]";
const UNSUPPORTED_TAG: &str = "[Unsupported";

#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Extract bounded text from `id`. Never fails.
    async fn extract(&self, backend: &dyn StorageBackend, id: &str) -> String;
}

/// True when `text` is an extraction diagnostic rather than content
pub fn is_diagnostic(text: &str) -> bool {
    text.starts_with(ERROR_TAG) || text.starts_with(UNSUPPORTED_TAG)
}

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Csv,
    Pdf,
    Docx,
    Spreadsheet,
    Sqlite,
    Unknown,
}

impl Format {
    fn detect(file_name: &str) -> Self {
        let (_, ext) = split_extension(file_name);
        let ext = ext.trim_start_matches('.').to_lowercase();

        match ext.as_str() {
            "csv" | "tsv" => Self::Csv,
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Self::Spreadsheet,
            "sqlite" | "sqlite3" | "db" => Self::Sqlite,
            "txt" | "md" | "log" | "json" | "yaml" | "yml" | "toml" | "ini" | "xml" | "html"
            | "htm" | "rtf" | "eml" => Self::Text,
            "" => Self::Unknown,
            other => {
                let is_text = mime_guess::from_ext(other)
                    .first()
                    .map(|m| m.type_() == mime_guess::mime::TEXT)
                    .unwrap_or(false);
                if is_text {
                    Self::Text
                } else {
                    Self::Unknown
                }
            }
        }
    }
}

/// Multi-format extractor used by the decision loop and the executor
#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    max_chars: usize,
}

impl DocumentExtractor {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Extract from bytes already in hand
    pub fn extract_bytes(&self, file_name: &str, bytes: &[u8]) -> String {
        let tag = tag_for(file_name);
        let text = match Format::detect(file_name) {
            Format::Text => Ok(format!("[{}]: {}", tag, decode_text(bytes))),
            Format::Csv => Ok(format!("[CSV Sample]:\n{}", csv_sample(bytes))),
            Format::Pdf => extract_pdf(bytes).map(|t| format!("[PDF]: {}", t)),
            Format::Docx => extract_docx(bytes).map(|t| format!("[DOCX]: {}", t)),
            Format::Spreadsheet => extract_spreadsheet(bytes).map(|t| format!("[{}]:\n{}", tag, t)),
            Format::Sqlite => extract_sqlite_tables(bytes).map(|t| format!("[SQLite Tables]: {}", t)),
            Format::Unknown => sniff_text(bytes)
                .map(|t| format!("[TEXT]: {}", t))
                .ok_or_else(|| format!("{}: {}]: no text extractor for this format", UNSUPPORTED_TAG, tag)),
        };

        match text {
            Ok(text) => head_tail_sample(&text, self.max_chars),
            // Unsupported diagnostics are complete messages already
            Err(e) if e.starts_with(UNSUPPORTED_TAG) => e,
            Err(e) => format!("{}: could not extract {}: {}", ERROR_TAG, file_name, e),
        }
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new(MAX_CHARS)
    }
}

#[async_trait]
impl ContentExtractor for DocumentExtractor {
    async fn extract(&self, backend: &dyn StorageBackend, id: &str) -> String {
        match backend.read(id).await {
            Ok(bytes) => self.extract_bytes(base_name(id), &bytes),
            Err(e) => {
                tracing::warn!("[Extract] Failed to read {}: {}", id, e);
                format!("{}: could not read {}: {}", ERROR_TAG, id, e)
            }
        }
    }
}

fn tag_for(file_name: &str) -> String {
    let (_, ext) = split_extension(file_name);
    let ext = ext.trim_start_matches('.');
    if ext.is_empty() {
        "FILE".to_string()
    } else {
        ext.to_uppercase()
    }
}

/// Lossy UTF-8 with control characters (other than newline/tab) removed
fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Treat extension-less files as text when they decode cleanly
fn sniff_text(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(4096)];
    if head.is_empty() || head.contains(&0) {
        return None;
    }
    match std::str::from_utf8(head) {
        Ok(_) => Some(decode_text(bytes)),
        // A multi-byte character cut at the head boundary is still text
        Err(e) if e.error_len().is_none() => Some(decode_text(bytes)),
        Err(_) => None,
    }
}

/// Header plus the first rows
fn csv_sample(bytes: &[u8]) -> String {
    decode_text(bytes)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(CSV_SAMPLE_ROWS + 1)
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_pdf(bytes: &[u8]) -> Result<String, String> {
    // pdf-extract panics on some malformed documents
    let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| "PDF parser panicked".to_string())?;

    let text = result.map_err(|e| e.to_string())?;
    let text = collapse_blank_lines(&text);
    if text.trim().is_empty() {
        return Err("PDF contains no extractable text (scanned image?)".to_string());
    }
    Ok(text)
}

fn extract_docx(bytes: &[u8]) -> Result<String, String> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| e.to_string())?;

    let mut paragraphs = Vec::new();
    for child in &docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            let mut line = String::new();
            for p_child in &paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = p_child {
                    for r_child in &run.children {
                        if let docx_rs::RunChild::Text(text) = r_child {
                            line.push_str(&text.text);
                        }
                    }
                }
            }
            if !line.trim().is_empty() {
                paragraphs.push(line);
            }
        }
    }

    if paragraphs.is_empty() {
        return Err("document has no text paragraphs".to_string());
    }
    Ok(paragraphs.join("\n"))
}

fn extract_spreadsheet(bytes: &[u8]) -> Result<String, String> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| e.to_string())?;

    let mut out = Vec::new();
    for name in workbook.sheet_names() {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                tracing::debug!("[Extract] Skipping sheet {}: {}", name, e);
                continue;
            }
        };

        out.push(format!("## Sheet: {}", name));
        for row in range.rows().take(SHEET_SAMPLE_ROWS) {
            let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            if cells.iter().any(|c| !c.is_empty()) {
                out.push(cells.join(" | "));
            }
        }
    }

    if out.is_empty() {
        return Err("workbook has no readable sheets".to_string());
    }
    Ok(out.join("\n"))
}

/// Table names of an SQLite database
fn extract_sqlite_tables(bytes: &[u8]) -> Result<String, String> {
    // rusqlite opens files, so stage the bytes in the temp dir
    let staging = std::env::temp_dir().join(format!("sorterra-{}.sqlite", uuid::Uuid::new_v4()));
    std::fs::write(&staging, bytes).map_err(|e| e.to_string())?;

    let result = (|| -> Result<Vec<String>, rusqlite::Error> {
        let conn = rusqlite::Connection::open_with_flags(
            &staging,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?;
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    })();

    let _ = std::fs::remove_file(&staging);
    result.map(|names| names.join(", ")).map_err(|e| e.to_string())
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::detect("notes.TXT"), Format::Text);
        assert_eq!(Format::detect("data.csv"), Format::Csv);
        assert_eq!(Format::detect("report.pdf"), Format::Pdf);
        assert_eq!(Format::detect("budget.xlsx"), Format::Spreadsheet);
        assert_eq!(Format::detect("memo.docx"), Format::Docx);
        assert_eq!(Format::detect("photo.jpg"), Format::Unknown);
        assert_eq!(Format::detect("README"), Format::Unknown);
    }

    #[test]
    fn test_text_is_tagged() {
        let extractor = DocumentExtractor::default();
        let text = extractor.extract_bytes("invoice.txt", b"INVOICE #1024\nVendor: AWS\nTotal: $150.00");
        assert_eq!(text, "[TXT]: INVOICE #1024\nVendor: AWS\nTotal: $150.00");
        assert!(!is_diagnostic(&text));
    }

    #[test]
    fn test_csv_samples_header_and_five_rows() {
        let mut csv = String::from("id,amount\n");
        for i in 0..50 {
            csv.push_str(&format!("{},{}\n", i, i * 10));
        }
        let text = DocumentExtractor::default().extract_bytes("ledger.csv", csv.as_bytes());

        assert!(text.starts_with("[CSV Sample]:\nid,amount\n0,0"));
        assert!(text.ends_with("4,40"));
    }

    #[test]
    fn test_long_text_is_head_tail_sampled() {
        let body = format!("BEGIN {} FINISH", "lorem ipsum ".repeat(2000));
        let text = DocumentExtractor::new(500).extract_bytes("big.md", body.as_bytes());

        assert!(text.starts_with("[MD]: BEGIN"));
        assert!(text.ends_with("FINISH"));
        assert!(text.contains("[truncated"));
    }

    #[test]
    fn test_binary_is_unsupported() {
        let text = DocumentExtractor::default().extract_bytes("photo.jpg", &[0xFF, 0xD8, 0x00, 0x10]);
        assert!(is_diagnostic(&text));
        assert!(text.contains("JPG"));
    }

    #[test]
    fn test_corrupt_pdf_is_diagnostic() {
        let text = DocumentExtractor::default().extract_bytes("broken.pdf", b"not a pdf at all");
        assert!(text.starts_with("[Error]"));
    }

    #[test]
    fn test_extensionless_text_is_sniffed() {
        let text = DocumentExtractor::default().extract_bytes("README", b"Setup guide");
        assert_eq!(text, "[TEXT]: Setup guide");
    }

    #[tokio::test]
    async fn test_missing_object_is_diagnostic() {
        let backend = MemoryBackend::new();
        let text = DocumentExtractor::default().extract(&backend, "inbox/gone.txt").await;
        assert!(is_diagnostic(&text));
        assert!(text.contains("inbox/gone.txt"));
    }

    #[tokio::test]
    async fn test_sqlite_lists_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sqlite");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE users (id INTEGER); CREATE TABLE orders (id INTEGER);")
                .unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        let text = DocumentExtractor::default().extract_bytes("app.sqlite", &bytes);
        assert_eq!(text, "[SQLite Tables]: orders, users");
    }
}
