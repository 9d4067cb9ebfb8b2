//! PDF text via pdf-extract

use super::{clean_text, read_bytes, ContentExtractor, ExtractionError};
use std::fs::File;
use tracing::warn;

pub struct PdfExtractor;

impl ContentExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extract(&self, file: &mut File) -> Result<String, ExtractionError> {
        let bytes = read_bytes(file)?;

        // pdf-extract can panic on malformed fonts
        let text = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(&bytes)
        })) {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(ExtractionError::Malformed(e.to_string())),
            Err(_) => {
                warn!(size = bytes.len(), "PDF parser panicked");
                return Err(ExtractionError::Malformed("pdf parser panicked".to_string()));
            }
        };

        Ok(clean_text(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write};

    #[test]
    fn test_truncated_pdf_is_malformed() {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(b"%PDF-1.4\n1 0 obj\n<<").unwrap();
        tmp.seek(SeekFrom::Start(0)).unwrap();

        assert!(matches!(
            PdfExtractor.extract(&mut tmp),
            Err(ExtractionError::Malformed(_))
        ));
    }
}
