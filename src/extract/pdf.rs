// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! PDF text extraction

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::debug;

use super::{FileKind, TextExtractor};
use crate::{AblageError, Result};

/// Extractor for PDF files
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract body text; pdf-extract panics on some malformed files
    fn extract_body(bytes: &[u8]) -> Result<String> {
        match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(AblageError::ExtractionDegraded(format!("PDF text extraction failed: {}", e))),
            Err(_) => Err(AblageError::ExtractionDegraded("PDF parser panicked".to_string())),
        }
    }

    /// Title and subject from the document info dictionary
    fn metadata_text(bytes: &[u8]) -> Option<String> {
        let doc = lopdf::Document::load_mem(bytes).ok()?;
        let info_ref = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
        let info = doc.get_dictionary(info_ref).ok()?;

        let mut parts = Vec::new();
        for key in [&b"Title"[..], &b"Subject"[..]] {
            if let Ok(value) = info.get(key).and_then(|v| v.as_str()) {
                let value = String::from_utf8_lossy(value).trim().to_string();
                if !value.is_empty() {
                    parts.push(value);
                }
            }
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn kind(&self) -> FileKind {
        FileKind::Pdf
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        let body = Self::extract_body(&bytes);

        match body {
            Ok(text) if !text.trim().is_empty() => Ok(text),
            // Scanned PDFs have no text layer; the metadata may still name the document
            other => match Self::metadata_text(&bytes) {
                Some(meta) => {
                    debug!("Using PDF metadata for {:?}", path);
                    Ok(meta)
                }
                None => other,
            },
        }
    }
}
