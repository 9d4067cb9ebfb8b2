//! Content type detection from the first bytes of an upload

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

/// Bytes inspected for signature detection
pub const SNIFF_LEN: usize = 512;

pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const PDF_MIME: &str = "application/pdf";
pub const ZIP_MIME: &str = "application/zip";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Sniffed MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedType {
    mime: String,
}

impl DetectedType {
    pub fn new(mime: impl Into<String>) -> Self {
        Self { mime: mime.into() }
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn essence(&self) -> String {
        mime_essence(&self.mime)
    }

    pub fn is_text(&self) -> bool {
        self.mime.starts_with("text/")
    }

    pub fn is_pdf(&self) -> bool {
        self.essence() == PDF_MIME
    }

    /// Word or spreadsheet OOXML package
    pub fn is_ooxml(&self) -> bool {
        let essence = self.essence();
        essence == DOCX_MIME || essence == XLSX_MIME
    }

    /// Any zip container, OOXML included
    pub fn is_zip_container(&self) -> bool {
        self.is_ooxml() || self.essence() == ZIP_MIME
    }
}

impl std::fmt::Display for DetectedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.mime)
    }
}

/// MIME type without parameters, lowercased
pub fn mime_essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Detect from a head buffer
///
/// Binary signatures win; otherwise UTF-8 without control bytes is text.
pub fn sniff(head: &[u8]) -> DetectedType {
    let head = &head[..head.len().min(SNIFF_LEN)];

    if let Some(kind) = infer::get(head) {
        return DetectedType::new(kind.mime_type());
    }

    if looks_like_text(head) {
        DetectedType::new(TEXT_PLAIN_UTF8)
    } else {
        DetectedType::new(OCTET_STREAM)
    }
}

/// Read the head of `file`, sniff it and rewind
pub fn sniff_file(file: &mut File) -> std::io::Result<DetectedType> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(sniff(&head))
}

fn looks_like_text(head: &[u8]) -> bool {
    let valid = match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte sequence cut at the buffer end is still text
        Err(e) => e.error_len().is_none(),
    };

    valid && !head.iter().any(|&b| is_binary_control(b))
}

fn is_binary_control(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
