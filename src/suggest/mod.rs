// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Suggestion engine: prompt, ask the model, validate, fall back
//!
//! One exchange moves through `Sent -> AwaitingResponse -> Parsed | ParseFailed
//! | BackendError`. Backend errors are retried with exponential backoff;
//! unusable output is re-prompted once with a stricter instruction. When both
//! budgets are spent the engine returns a deterministic fallback, so callers
//! always get a three-candidate suggestion.

pub mod fallback;
pub mod parse;
pub mod prompt;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::categories::CategorySet;
use crate::config::EngineConfig;
use crate::models::{Candidate, DecisionRecord, FallbackReason, InboxItem, Suggestion, SuggestionSource};
use crate::{AblageError, Result};

use self::prompt::{build_prompt, PromptContext};

/// A text-generation endpoint
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Send a prompt, return the raw model output
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Retry and timeout budget for one suggestion
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total backend attempts per prompt
    pub attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub backoff: Duration,
    pub timeout: Duration,
    pub parse_retries: u32,
}

impl From<&EngineConfig> for RetryPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            backoff: config.backoff(),
            timeout: config.timeout(),
            parse_retries: config.parse_retries,
        }
    }
}

impl RetryPolicy {
    fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// What the engine knows besides the document itself
pub struct SuggestionContext<'a> {
    pub categories: &'a CategorySet,
    /// Most recent first, capped
    pub history: &'a [DecisionRecord],
    /// Decision counts per folder, for the fallback ranking
    pub frequencies: &'a [(String, u64)],
}

/// Terminal states of one prompt/response exchange
#[derive(Debug)]
enum Exchange {
    Parsed(Vec<Candidate>),
    ParseFailed(String),
    BackendError(String),
}

pub struct SuggestionEngine {
    backend: Arc<dyn InferenceBackend>,
    policy: RetryPolicy,
    allow_novel: bool,
}

impl SuggestionEngine {
    pub fn new(backend: Arc<dyn InferenceBackend>, policy: RetryPolicy, allow_novel: bool) -> Self {
        Self {
            backend,
            policy,
            allow_novel,
        }
    }

    /// Produce a suggestion for one item; never fails
    pub async fn suggest(&self, item: &InboxItem, ctx: &SuggestionContext<'_>) -> Suggestion {
        let text = item.prompt_text();
        let prompt_ctx = PromptContext {
            text: &text,
            categories: ctx.categories,
            history: ctx.history,
            allow_novel: self.allow_novel,
        };

        let mut previous_error: Option<String> = None;
        let mut reprompts_left = self.policy.parse_retries;

        let outcome = loop {
            let prompt = build_prompt(&prompt_ctx, previous_error.as_deref());
            match self.exchange(&prompt, ctx.categories).await {
                Exchange::Parsed(candidates) => break Ok(candidates),
                Exchange::BackendError(e) => {
                    warn!("Inference backend unavailable for {:?}: {}", item.id, e);
                    break Err(FallbackReason::BackendUnavailable);
                }
                Exchange::ParseFailed(e) if reprompts_left > 0 => {
                    warn!("Unusable model output for {:?} ({}), re-prompting", item.id, e);
                    reprompts_left -= 1;
                    previous_error = Some(e);
                }
                Exchange::ParseFailed(e) => {
                    warn!("Unusable model output for {:?} ({}), giving up", item.id, e);
                    break Err(FallbackReason::UnusableOutput);
                }
            }
        };

        match outcome {
            Ok(candidates) => {
                info!(
                    "Suggested for {}: {}",
                    item.file_name(),
                    candidates
                        .iter()
                        .map(|c| format!("{} ({:.2})", c.folder, c.confidence))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                Suggestion {
                    item: item.id.clone(),
                    candidates,
                    source: SuggestionSource::Model,
                    generated_at: Utc::now(),
                }
            }
            Err(reason) => self.fallback(item, ctx, reason),
        }
    }

    /// The deterministic, non-model suggestion
    pub fn fallback(&self, item: &InboxItem, ctx: &SuggestionContext<'_>, reason: FallbackReason) -> Suggestion {
        Suggestion {
            item: item.id.clone(),
            candidates: fallback::fallback_candidates(ctx.categories, &item.text, ctx.frequencies, reason),
            source: SuggestionSource::Fallback { reason },
            generated_at: Utc::now(),
        }
    }

    async fn exchange(&self, prompt: &str, categories: &CategorySet) -> Exchange {
        match self.generate_with_retry(prompt).await {
            Err(e) => Exchange::BackendError(e.to_string()),
            Ok(raw) => match parse::parse_suggestions(&raw, categories, self.allow_novel) {
                Ok(candidates) => Exchange::Parsed(candidates),
                Err(e) => {
                    debug!("Rejected model output: {}", raw);
                    Exchange::ParseFailed(e.to_string())
                }
            },
        }
    }

    /// Generate with timeout, retry and exponential backoff
    async fn generate_with_retry(&self, prompt: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..self.policy.attempts {
            if attempt > 0 {
                let delay = self.policy.delay_before(attempt);
                warn!("Retrying inference in {:?} (attempt {})", delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.policy.timeout, self.backend.generate(prompt)).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => last_error = Some(e),
                Err(_) => {
                    last_error = Some(AblageError::Backend(format!(
                        "request timed out after {:?}",
                        self.policy.timeout
                    )))
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AblageError::Backend("no attempts made".to_string())))
    }
}
