// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Plain text files

use std::path::Path;

use super::{FileKind, TextExtractor};
use crate::Result;

/// Extractor for plain text; non-UTF-8 input is read as ISO-8859-1
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(bytes: Vec<u8>) -> String {
        match String::from_utf8(bytes) {
            Ok(text) => text,
            // Latin-1 maps every byte to the code point of the same value
            Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
        }
    }
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn kind(&self) -> FileKind {
        FileKind::PlainText
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown", "csv", "log", "text"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        Ok(Self::decode(std::fs::read(path)?))
    }
}
