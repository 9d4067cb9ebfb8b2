//! Plain UTF-8 text

use super::{read_utf8, ContentExtractor, ExtractionError};
use std::fs::File;

pub struct PlainTextExtractor;

impl ContentExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extract(&self, file: &mut File) -> Result<String, ExtractionError> {
        read_utf8(file)
    }
}
