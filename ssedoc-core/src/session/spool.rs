//! Spooled uploads
//!
//! Each accepted multipart part is written to its own temporary file. The file is
//! removed when the owning [`SubmittedFile`] (or the worker it moved into) drops.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Debug)]
pub struct SubmittedFile {
    filename: String,
    declared_type: Option<String>,
    size: u64,
    spool: NamedTempFile,
}

impl SubmittedFile {
    /// Spool `bytes` to a fresh temporary file
    pub fn from_bytes(
        filename: &str,
        declared_type: Option<&str>,
        bytes: &[u8],
    ) -> std::io::Result<Self> {
        let mut spool = tempfile::Builder::new().prefix("ssedoc-").tempfile()?;
        spool.write_all(bytes)?;
        spool.flush()?;

        Ok(Self {
            filename: filename.to_string(),
            declared_type: declared_type
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            size: bytes.len() as u64,
            spool,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn declared_type(&self) -> Option<&str> {
        self.declared_type.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        self.spool.path()
    }

    pub(crate) fn into_parts(self) -> (String, Option<String>, NamedTempFile) {
        (self.filename, self.declared_type, self.spool)
    }
}
