//! PDF text extraction.
//!
//! `pdf-extract` returns the whole document as one string with form feeds
//! (`\x0C`) between pages; [`split_pages`] turns that back into numbered pages.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use ragpdf_core::config::PdfSettings;
use ragpdf_core::error::{Error, Result};
use ragpdf_core::traits::Extractor;
use ragpdf_core::types::Page;

const PAGE_BREAK: char = '\x0C';

#[derive(Debug, Clone)]
pub struct PdfExtractor {
    max_bytes: u64,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::from_settings(&PdfSettings::default())
    }
}

impl PdfExtractor {
    pub fn new(max_file_size_mb: u64) -> Self {
        Self { max_bytes: max_file_size_mb.saturating_mul(1024 * 1024) }
    }

    pub fn from_settings(settings: &PdfSettings) -> Self {
        Self::new(settings.max_file_size_mb)
    }

    fn check_file(&self, path: &Path) -> Result<()> {
        let meta = fs::metadata(path)
            .map_err(|e| Error::UnreadablePdf(format!("{}: {}", path.display(), e)))?;
        if !meta.is_file() {
            return Err(Error::UnreadablePdf(format!("{} is not a file", path.display())));
        }
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            return Err(Error::UnreadablePdf(format!("{} is not a .pdf file", path.display())));
        }
        if meta.len() > self.max_bytes {
            return Err(Error::UnreadablePdf(format!(
                "{} is {} bytes, limit is {} bytes",
                path.display(),
                meta.len(),
                self.max_bytes
            )));
        }
        Ok(())
    }
}

impl Extractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<Page>> {
        self.check_file(path)?;
        let bytes = fs::read(path).map_err(|e| Error::UnreadablePdf(format!("{}: {}", path.display(), e)))?;

        // pdf-extract panics on some malformed inputs
        let text = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(&bytes)))
            .map_err(|_| Error::UnreadablePdf(format!("{}: parser aborted on malformed input", path.display())))?
            .map_err(|e| Error::UnreadablePdf(format!("{}: {}", path.display(), e)))?;

        let pages = split_pages(&text);
        if pages.is_empty() {
            return Err(Error::EmptyDocument(path.display().to_string()));
        }
        tracing::info!(path = %path.display(), pages = pages.len(), "extracted PDF text");
        Ok(pages)
    }
}

/// Split extractor output on form feeds. Page numbers are 1-based and keep
/// their position when blank pages are dropped. Text without any form feed
/// is treated as a single page.
pub fn split_pages(text: &str) -> Vec<Page> {
    text.split(PAGE_BREAK)
        .enumerate()
        .filter(|(_, t)| !t.trim().is_empty())
        .map(|(i, t)| Page::new(i + 1, t.trim()))
        .collect()
}
