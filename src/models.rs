// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Records flowing through the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::extract::FileKind;

/// Items are identified by their absolute source path
pub type ItemId = PathBuf;

/// A document discovered in the inbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxItem {
    pub id: ItemId,
    pub kind: FileKind,
    pub size: u64,
    /// Extracted text after truncation, possibly empty
    pub text: String,
    /// Why extraction degraded, if it did
    pub diagnostic: Option<String>,
    pub content_hash: String,
    pub discovered_at: DateTime<Utc>,
}

impl InboxItem {
    pub fn file_name(&self) -> String {
        file_name_of(&self.id)
    }

    /// What the model gets to see: the text, or the file name when there is none
    pub fn prompt_text(&self) -> String {
        if self.text.trim().is_empty() {
            format!("Dateiname: {}\nDateityp: {}", self.file_name(), self.kind)
        } else {
            self.text.clone()
        }
    }

    /// Short summary stored with each decision
    pub fn summary(&self) -> String {
        let preview = preview(&self.text, 200);
        if preview.is_empty() {
            self.file_name()
        } else {
            format!("{}: {}", self.file_name(), preview)
        }
    }
}

/// One ranked destination proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub folder: String,
    pub reason: String,
    pub confidence: f64,
    /// Proposed folder that does not exist yet
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub novel: bool,
}

/// Why a suggestion did not come from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    BackendUnavailable,
    UnusableOutput,
}

impl FallbackReason {
    pub fn rationale(&self) -> &'static str {
        match self {
            FallbackReason::BackendUnavailable => "fallback: inference backend unavailable",
            FallbackReason::UnusableOutput => "fallback: model output unusable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuggestionSource {
    Model,
    Fallback { reason: FallbackReason },
}

/// Three ranked candidates for one inbox item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub item: ItemId,
    pub candidates: Vec<Candidate>,
    pub source: SuggestionSource,
    pub generated_at: DateTime<Utc>,
}

impl Suggestion {
    /// True when the UI should show degraded mode
    pub fn is_degraded(&self) -> bool {
        matches!(self.source, SuggestionSource::Fallback { .. })
    }

    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn offers(&self, folder: &str) -> bool {
        self.candidates.iter().any(|c| c.folder == folder)
    }
}

/// A suggestion waiting for the operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDecision {
    pub item: InboxItem,
    pub suggestion: Suggestion,
    pub preview: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of a resolved decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub item: ItemId,
    pub file_name: String,
    pub summary: String,
    pub content_hash: String,
    pub chosen_folder: String,
    pub top_folder: Option<String>,
    pub matched_top: bool,
    pub degraded: bool,
    pub decided_at: DateTime<Utc>,
}

/// A committed decision whose file could not be moved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementFailure {
    pub record: DecisionRecord,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// First `max_chars` characters, with an ellipsis when cut
pub fn preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
