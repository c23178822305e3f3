// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Schema validation for model output
//!
//! The model's answer is checked against the expected document shape right
//! here; nothing loosely typed travels further into the pipeline.

use serde::Deserialize;
use std::collections::HashSet;

use crate::categories::{validate_folder_name, CategorySet};
use crate::models::Candidate;
use crate::{AblageError, Result};

pub const CANDIDATE_COUNT: usize = 3;

#[derive(Deserialize)]
struct RawResponse {
    suggestions: Vec<RawCandidate>,
}

#[derive(Deserialize)]
struct RawCandidate {
    folder: String,
    reason: String,
    confidence: f64,
    #[serde(default)]
    new: bool,
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let body = &trimmed[start + 3..];
    let body = body.strip_prefix("json").unwrap_or(body);
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parse the backend's `response` string into exactly three valid candidates
pub fn parse_suggestions(raw: &str, categories: &CategorySet, allow_novel: bool) -> Result<Vec<Candidate>> {
    // Fences are only looked for when the answer is not a bare document;
    // a reason may itself contain backticks
    let parsed: RawResponse = match serde_json::from_str(raw.trim()) {
        Ok(parsed) => parsed,
        Err(_) => serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| AblageError::ParseFailed(format!("not the expected JSON document: {}", e)))?,
    };

    if parsed.suggestions.len() != CANDIDATE_COUNT {
        return Err(AblageError::ParseFailed(format!(
            "expected {} suggestions, got {}",
            CANDIDATE_COUNT,
            parsed.suggestions.len()
        )));
    }

    let mut seen = HashSet::new();
    let mut candidates = Vec::with_capacity(CANDIDATE_COUNT);

    for raw in parsed.suggestions {
        let folder = raw.folder;

        if !seen.insert(folder.clone()) {
            return Err(AblageError::ParseFailed(format!("folder '{}' suggested twice", folder)));
        }

        if !(0.0..=1.0).contains(&raw.confidence) {
            return Err(AblageError::ParseFailed(format!(
                "confidence {} for '{}' is outside [0, 1]",
                raw.confidence, folder
            )));
        }

        let novel = if categories.contains(&folder) {
            false
        } else if allow_novel && raw.new && validate_folder_name(&folder).is_ok() {
            true
        } else {
            return Err(AblageError::ParseFailed(format!("unknown folder '{}'", folder)));
        };

        candidates.push(Candidate {
            folder,
            reason: raw.reason,
            confidence: raw.confidence,
            novel,
        });
    }

    Ok(candidates)
}
