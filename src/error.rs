// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Ablage

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Ablage operations
pub type Result<T> = std::result::Result<T, AblageError>;

/// Ablage error types
#[derive(Error, Debug)]
pub enum AblageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decision store error: {0}")]
    Store(String),

    /// Text extraction failed; the item is still classified by file name.
    #[error("Extraction degraded: {0}")]
    ExtractionDegraded(String),

    /// The inference call itself failed (timeout, refused, bad status).
    #[error("Inference backend error: {0}")]
    Backend(String),

    /// The backend answered, but not with a usable suggestion document.
    #[error("Unusable model output: {0}")]
    ParseFailed(String),

    #[error("No pending decision for {}", .0.display())]
    NotFound(PathBuf),

    #[error("Folder '{folder}' was not offered and is not a known category")]
    InvalidChoice { folder: String },

    #[error("Decision for {} was already resolved", .0.display())]
    AlreadyResolved(PathBuf),

    #[error("Placement of {} failed: {reason}", .item.display())]
    PlacementFailed { item: PathBuf, reason: String },
}

impl AblageError {
    /// Errors caused by the caller of `resolve`, as opposed to pipeline faults.
    pub fn is_operator_error(&self) -> bool {
        matches!(
            self,
            AblageError::NotFound(_)
                | AblageError::InvalidChoice { .. }
                | AblageError::AlreadyResolved(_)
        )
    }
}
