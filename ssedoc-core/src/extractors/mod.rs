//! Content extractors
//!
//! An extractor turns one spooled upload into plain text. Extractors are pure with
//! respect to session state and run on the blocking pool.
//!
//! Dispatch goes through an [`ExtractorTable`]: `(predicate, extractor)` routes
//! checked in registration order. The standard table, highest priority first:
//!
//! 1. **office** - sniffed zip/OOXML container declared or sniffed as docx/xlsx
//! 2. **pdf** - sniffed `application/pdf`
//! 3. **delimited** - declared `text/csv`, full file
//! 4. **delimited-preview** - sniffed text with a `.csv`/`.tsv` name, first N records
//! 5. **text** - any other sniffed text
//!
//! Nothing matching means unsupported content.

pub mod delimited;
pub mod detect;
pub mod office;
pub mod pdf;
pub mod text;

pub use delimited::DelimitedExtractor;
pub use detect::DetectedType;
pub use office::OfficeExtractor;
pub use pdf::PdfExtractor;
pub use text::PlainTextExtractor;

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Extraction failures
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("content is not valid UTF-8")]
    Encoding,

    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Plain-text extraction from an open upload
pub trait ContentExtractor: Send + Sync {
    /// Route name, used in logs and failure reasons
    fn name(&self) -> &'static str;

    /// Extract text; `file` is positioned at the start
    fn extract(&self, file: &mut File) -> Result<String, ExtractionError>;
}

/// What a route predicate gets to look at
#[derive(Debug, Clone, Copy)]
pub struct ContentProbe<'a> {
    pub filename: &'a str,
    pub declared_type: Option<&'a str>,
    pub detected: &'a DetectedType,
}

impl<'a> ContentProbe<'a> {
    /// Lowercased file extension
    pub fn extension(&self) -> Option<String> {
        Path::new(self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Declared type without parameters, lowercased
    pub fn declared_essence(&self) -> Option<String> {
        self.declared_type.map(detect::mime_essence)
    }
}

type Predicate = Box<dyn Fn(&ContentProbe<'_>) -> bool + Send + Sync>;

struct Route {
    predicate: Predicate,
    extractor: Arc<dyn ContentExtractor>,
}

/// Ordered dispatch table
#[derive(Default)]
pub struct ExtractorTable {
    routes: Vec<Route>,
}

impl ExtractorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard routes in fixed priority order
    pub fn standard(preview_rows: usize) -> Self {
        Self::new().with_standard_routes(preview_rows)
    }

    /// Append the standard routes below any already registered
    pub fn with_standard_routes(self, preview_rows: usize) -> Self {
        self.with_route(is_office, OfficeExtractor::new(preview_rows))
            .with_route(is_pdf, PdfExtractor)
            .with_route(is_declared_csv, DelimitedExtractor::full())
            .with_route(is_delimited_text, DelimitedExtractor::preview(preview_rows))
            .with_route(is_text, PlainTextExtractor)
    }

    /// Append a route with the lowest priority so far
    pub fn with_route<P, E>(mut self, predicate: P, extractor: E) -> Self
    where
        P: Fn(&ContentProbe<'_>) -> bool + Send + Sync + 'static,
        E: ContentExtractor + 'static,
    {
        self.routes.push(Route {
            predicate: Box::new(predicate),
            extractor: Arc::new(extractor),
        });
        self
    }

    /// First extractor whose predicate accepts the probe
    pub fn route(&self, probe: &ContentProbe<'_>) -> Option<Arc<dyn ContentExtractor>> {
        self.routes
            .iter()
            .find(|route| (route.predicate)(probe))
            .map(|route| Arc::clone(&route.extractor))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for ExtractorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|r| r.extractor.name()))
            .finish()
    }
}

fn is_office(probe: &ContentProbe<'_>) -> bool {
    if !probe.detected.is_zip_container() {
        return false;
    }
    let declared_office = probe
        .declared_essence()
        .map_or(false, |t| t == detect::DOCX_MIME || t == detect::XLSX_MIME);
    let named_office = probe
        .extension()
        .map_or(false, |e| e == "docx" || e == "xlsx");

    probe.detected.is_ooxml() || declared_office || named_office
}

fn is_pdf(probe: &ContentProbe<'_>) -> bool {
    probe.detected.is_pdf()
}

fn is_declared_csv(probe: &ContentProbe<'_>) -> bool {
    probe.declared_essence().as_deref() == Some("text/csv")
}

fn is_delimited_text(probe: &ContentProbe<'_>) -> bool {
    probe.detected.is_text() && probe.extension().map_or(false, |e| e == "csv" || e == "tsv")
}

fn is_text(probe: &ContentProbe<'_>) -> bool {
    probe.detected.is_text()
}

/// Read the whole upload as UTF-8, dropping a leading byte-order mark
pub(crate) fn read_utf8(file: &mut File) -> Result<String, ExtractionError> {
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let text = String::from_utf8(bytes).map_err(|_| ExtractionError::Encoding)?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

pub(crate) fn read_bytes(file: &mut File) -> Result<Vec<u8>, ExtractionError> {
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Trim every line and drop blank ones
pub(crate) fn clean_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
pub mod mock {
    use super::*;

    /// Mock extractor for testing
    pub struct MockExtractor {
        pub content: String,
        pub should_fail: bool,
        pub should_panic: bool,
    }

    impl MockExtractor {
        pub fn returning(content: &str) -> Self {
            Self {
                content: content.to_string(),
                should_fail: false,
                should_panic: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                should_fail: true,
                ..Self::returning("")
            }
        }

        pub fn panicking() -> Self {
            Self {
                should_panic: true,
                ..Self::returning("")
            }
        }
    }

    impl ContentExtractor for MockExtractor {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn extract(&self, _file: &mut File) -> Result<String, ExtractionError> {
            if self.should_panic {
                panic!("mock extractor panic");
            }
            if self.should_fail {
                return Err(ExtractionError::Malformed("mock failure".to_string()));
            }
            Ok(self.content.clone())
        }
    }
}
