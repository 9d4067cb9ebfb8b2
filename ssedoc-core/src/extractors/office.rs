//! Office documents
//!
//! The upload is read as a Word document first. When that fails it is opened as a
//! workbook and the first rows of its first sheet are returned instead.

use super::{clean_text, read_bytes, ContentExtractor, ExtractionError};
use calamine::{Reader, Xlsx};
use std::fs::File;
use std::io::Cursor;
use tracing::debug;

pub struct OfficeExtractor {
    sheet_preview_rows: usize,
}

impl OfficeExtractor {
    pub fn new(sheet_preview_rows: usize) -> Self {
        Self { sheet_preview_rows }
    }
}

impl ContentExtractor for OfficeExtractor {
    fn name(&self) -> &'static str {
        "office"
    }

    fn extract(&self, file: &mut File) -> Result<String, ExtractionError> {
        let bytes = read_bytes(file)?;

        let docx_error = match extract_docx(&bytes) {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };
        debug!(error = %docx_error, "Not a Word document, trying workbook preview");

        extract_sheet_preview(bytes, self.sheet_preview_rows).map_err(|sheet_error| {
            ExtractionError::Malformed(format!(
                "neither docx ({}) nor xlsx ({})",
                docx_error, sheet_error
            ))
        })
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, String> {
    let doc = docx_rs::read_docx(bytes).map_err(|e| e.to_string())?;

    let mut output = String::new();
    for child in &doc.document.children {
        push_document_child(child, &mut output);
    }
    Ok(clean_text(&output))
}

fn push_document_child(element: &docx_rs::DocumentChild, output: &mut String) {
    match element {
        docx_rs::DocumentChild::Paragraph(para) => {
            push_paragraph(para, output);
            output.push('\n');
        }
        docx_rs::DocumentChild::Table(table) => {
            for row in &table.rows {
                let docx_rs::TableChild::TableRow(tr) = row;
                let mut cells = Vec::new();
                for cell in &tr.cells {
                    let docx_rs::TableRowChild::TableCell(tc) = cell;
                    let mut text = String::new();
                    for content in &tc.children {
                        if let docx_rs::TableCellContent::Paragraph(para) = content {
                            push_paragraph(para, &mut text);
                        }
                    }
                    cells.push(text);
                }
                output.push_str(&cells.join(" | "));
                output.push('\n');
            }
        }
        _ => {}
    }
}

fn push_paragraph(para: &docx_rs::Paragraph, output: &mut String) {
    for child in &para.children {
        match child {
            docx_rs::ParagraphChild::Run(run) => push_run(run, output),
            docx_rs::ParagraphChild::Hyperlink(link) => {
                for link_child in &link.children {
                    if let docx_rs::ParagraphChild::Run(run) = link_child {
                        push_run(run, output);
                    }
                }
            }
            _ => {}
        }
    }
}

fn push_run(run: &docx_rs::Run, output: &mut String) {
    for run_child in &run.children {
        match run_child {
            docx_rs::RunChild::Text(text) => output.push_str(&text.text),
            docx_rs::RunChild::Tab(_) => output.push('\t'),
            _ => {}
        }
    }
}

fn extract_sheet_preview(bytes: Vec<u8>, rows: usize) -> Result<String, String> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;

    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| "workbook has no sheets".to_string())?;
    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| e.to_string())?;

    let mut output = String::new();
    for row in range.rows().take(rows) {
        let cells: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
        output.push_str(&cells.join(";"));
        output.push('\n');
    }
    Ok(output)
}
