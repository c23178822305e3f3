// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Word processing documents (DOCX)

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;
use std::path::Path;

use super::{FileKind, TextExtractor};
use crate::{AblageError, Result};

/// Extractor for Office Open XML word documents
pub struct DocxExtractor;

impl DocxExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Collect `<w:t>` runs, one line per paragraph
    pub fn text_from_document_xml(xml: &str) -> Result<String> {
        let mut reader = Reader::from_str(xml);
        let mut text = String::new();
        let mut in_text = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"w:t" => in_text = false,
                    b"w:p" => text.push('\n'),
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.name().as_ref() {
                    b"w:tab" => text.push('\t'),
                    b"w:br" => text.push('\n'),
                    _ => {}
                },
                Ok(Event::Text(t)) if in_text => {
                    let unescaped = t
                        .unescape()
                        .map_err(|e| AblageError::ExtractionDegraded(format!("Bad DOCX text: {}", e)))?;
                    text.push_str(&unescaped);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(AblageError::ExtractionDegraded(format!(
                        "Malformed document.xml at {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {}
            }
        }

        Ok(text)
    }
}

impl Default for DocxExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn kind(&self) -> FileKind {
        FileKind::WordDocument
    }

    fn supported_extensions(&self) -> &[&str] {
        &["docx", "docm"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| AblageError::ExtractionDegraded(format!("Failed to open DOCX: {}", e)))?;

        // DOCX stores content in word/document.xml
        let mut document_xml = archive
            .by_name("word/document.xml")
            .map_err(|_| AblageError::ExtractionDegraded("No document.xml found".to_string()))?;

        let mut content = String::new();
        document_xml.read_to_string(&mut content)?;

        Self::text_from_document_xml(&content)
    }
}
