// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Plain-text extraction for inbox documents
//!
//! Extraction never fails: a broken or unsupported file yields empty text and
//! a diagnostic, and the document is then classified by its file name.

pub mod document;
pub mod pdf;
pub mod text;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

use crate::Result;

/// Document families the extractor distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Pdf,
    WordDocument,
    PlainText,
    Unknown,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileKind::Pdf => "pdf",
            FileKind::WordDocument => "word document",
            FileKind::PlainText => "plain text",
            FileKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Result of running the extractor over one file
#[derive(Debug, Clone)]
pub struct Extraction {
    pub kind: FileKind,
    pub text: String,
    /// Set when extraction degraded to empty text
    pub diagnostic: Option<String>,
    pub truncated: bool,
}

/// Trait for per-format text extractors
pub trait TextExtractor: Send + Sync {
    /// Name of this extractor
    fn name(&self) -> &'static str;

    /// Kind reported for files this extractor handles
    fn kind(&self) -> FileKind;

    /// File extensions this extractor handles
    fn supported_extensions(&self) -> &[&str];

    /// Check if this extractor can handle a file
    fn can_handle(&self, path: &Path) -> bool {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            self.supported_extensions().iter().any(|e| e.eq_ignore_ascii_case(ext))
        } else {
            false
        }
    }

    /// Extract the full text of a file
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Registry of all text extractors
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
    max_chars: usize,
}

impl ExtractorRegistry {
    /// Create a registry with the PDF, DOCX and plain-text extractors
    pub fn new(max_chars: usize) -> Self {
        let mut registry = Self {
            extractors: Vec::new(),
            max_chars,
        };
        registry.register(Box::new(pdf::PdfExtractor::new()));
        registry.register(Box::new(document::DocxExtractor::new()));
        registry.register(Box::new(text::PlainTextExtractor::new()));
        registry
    }

    pub fn register(&mut self, extractor: Box<dyn TextExtractor>) {
        self.extractors.push(extractor);
    }

    /// Find the extractor for a file
    pub fn find_extractor(&self, path: &Path) -> Option<&dyn TextExtractor> {
        self.extractors
            .iter()
            .find(|e| e.can_handle(path))
            .map(|e| e.as_ref())
    }

    pub fn kind_of(&self, path: &Path) -> FileKind {
        self.find_extractor(path)
            .map(|e| e.kind())
            .unwrap_or(FileKind::Unknown)
    }

    /// Best-effort text, truncated to the configured prefix length
    pub fn extract(&self, path: &Path) -> Extraction {
        let extractor = match self.find_extractor(path) {
            Some(e) => e,
            None => {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                let diagnostic = if ext.eq_ignore_ascii_case("doc") {
                    "legacy .doc format is not supported".to_string()
                } else {
                    format!("no extractor for '{}'", ext)
                };
                debug!("{:?}: {}", path, diagnostic);
                return Extraction {
                    kind: FileKind::Unknown,
                    text: String::new(),
                    diagnostic: Some(diagnostic),
                    truncated: false,
                };
            }
        };

        match extractor.extract(path) {
            Ok(full) => {
                let (text, truncated) = truncate_chars(&full, self.max_chars);
                let diagnostic = if text.trim().is_empty() {
                    Some(format!("{} extractor found no text", extractor.name()))
                } else {
                    None
                };
                Extraction {
                    kind: extractor.kind(),
                    text,
                    diagnostic,
                    truncated,
                }
            }
            Err(e) => {
                warn!("Extraction degraded for {:?}: {}", path, e);
                Extraction {
                    kind: extractor.kind(),
                    text: String::new(),
                    diagnostic: Some(e.to_string()),
                    truncated: false,
                }
            }
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn extractor_names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }
}

/// Keep the first `max_chars` characters; documents front-load what identifies them
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Calculate file hash for content identity
pub fn calculate_file_hash(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    let hash = blake3::hash(&data);
    Ok(hash.to_hex().to_string())
}
